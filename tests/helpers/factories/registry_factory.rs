use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::command::errors::RoutingError;
use crate::registry::handler::Handler;
use crate::registry::loader::{LoadContext, ModuleLoader, Registry};

use super::handler_factory::HandlerFactory;

pub struct RegistryFactory {
    registry: Registry,
    closed: Arc<AtomicUsize>,
}

impl RegistryFactory {
    /// A registry serving the `demo` namespace.
    pub fn new() -> Self {
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&closed);
        let mut registry = Registry::new();
        registry.register("demo", move |ctx| {
            HandlerFactory::new()
                .with_namespace(ctx.namespace)
                .with_close_counter(Arc::clone(&counter))
                .with_streams(ctx.streams.clone())
                .create()
        });
        Self { registry, closed }
    }

    pub fn with_route_dir(mut self, dir: &Path) -> Self {
        self.registry = self.registry.with_route_dir(dir);
        self
    }

    /// Registers a factory that builds a handler for the wrong namespace.
    pub fn with_mismatched(mut self, namespace: &str) -> Self {
        self.registry
            .register(namespace, |_| HandlerFactory::new().with_namespace("other").create());
        self
    }

    /// Registers a factory that panics while building its handler.
    pub fn with_panicking(mut self, namespace: &str) -> Self {
        let message = format!("{namespace} failed to initialise");
        self.registry.register(namespace, move |_| panic!("{message}"));
        self
    }

    /// Shared counter of closed `demo` handlers.
    pub fn closed_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.closed)
    }

    pub fn create(self) -> Registry {
        self.registry
    }
}

/// Loader wrapper that counts how often each call reaches the inner loader.
pub struct CountingLoader<L> {
    inner: L,
    loads: AtomicUsize,
}

impl<L: ModuleLoader> CountingLoader<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl<L: ModuleLoader> ModuleLoader for CountingLoader<L> {
    fn load(&self, namespace: &str, ctx: &LoadContext<'_>) -> Result<Handler, RoutingError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(namespace, ctx)
    }
}
