use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::debug;

use crate::command::errors::RoutingError;
use crate::registry::handler::Handler;
use crate::shared::config::DispatchConfig;
use crate::shared::response::PartSink;

/// Caller-supplied value handed to every module factory. Opaque to the
/// engine; factories downcast it to whatever the embedding application put in.
#[derive(Clone, Default)]
pub struct AppContext(Option<Arc<dyn Any + Send + Sync>>);

impl AppContext {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    pub fn empty() -> Self {
        Self(None)
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|value| value.downcast_ref::<T>())
    }
}

impl fmt::Debug for AppContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AppContext")
            .field(&self.0.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Ambient values a loader receives with each namespace it is asked for.
#[derive(Debug, Clone, Copy)]
pub struct LoadContext<'a> {
    pub settings: &'a DispatchConfig,
    pub app: &'a AppContext,
    pub streams: &'a PartSink,
}

/// Resolves a namespace name into a handler.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, namespace: &str, ctx: &LoadContext<'_>) -> Result<Handler, RoutingError>;
}

/// What a module factory is called with.
#[derive(Debug)]
pub struct ModuleContext<'a> {
    pub namespace: &'a str,
    pub settings: &'a DispatchConfig,
    pub app: &'a AppContext,
    /// Writes parts of the module's own into the current response
    pub streams: PartSink,
    /// Contents of `<route_dir>/<namespace>.toml` when a route directory is set
    pub manifest: Option<toml::Table>,
}

pub type ModuleFactory =
    Arc<dyn Fn(&ModuleContext<'_>) -> Result<Handler, RoutingError> + Send + Sync>;

/// Maps namespace names to factories.
///
/// With a route directory attached, a namespace is only loadable when its
/// manifest file exists there; the parsed manifest is passed to the factory.
#[derive(Clone, Default)]
pub struct Registry {
    factories: HashMap<String, ModuleFactory>,
    route_dir: Option<PathBuf>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.route_dir = Some(dir.into());
        self
    }

    pub fn register<F>(&mut self, namespace: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ModuleContext<'_>) -> Result<Handler, RoutingError> + Send + Sync + 'static,
    {
        self.factories.insert(namespace.into(), Arc::new(factory));
        self
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn route_dir(&self) -> Option<&Path> {
        self.route_dir.as_deref()
    }

    fn read_manifest(&self, namespace: &str) -> Result<Option<toml::Table>, RoutingError> {
        let Some(dir) = &self.route_dir else {
            return Ok(None);
        };
        let path = dir.join(format!("{namespace}.toml"));
        let raw = fs::read_to_string(&path).map_err(|source| RoutingError::UnreadableManifest {
            namespace: namespace.to_string(),
            path: path.clone(),
            source,
        })?;
        let manifest = raw
            .parse::<toml::Table>()
            .map_err(|source| RoutingError::InvalidManifest {
                namespace: namespace.to_string(),
                source,
            })?;
        Ok(Some(manifest))
    }
}

impl ModuleLoader for Registry {
    fn load(&self, namespace: &str, ctx: &LoadContext<'_>) -> Result<Handler, RoutingError> {
        let factory = self
            .factories
            .get(namespace)
            .ok_or_else(|| RoutingError::UnknownNamespace(namespace.to_string()))?;
        let manifest = self.read_manifest(namespace)?;

        debug!(
            target: "batch_rpc::loader",
            namespace,
            has_manifest = manifest.is_some(),
            "Loading module"
        );

        let handler = factory(&ModuleContext {
            namespace,
            settings: ctx.settings,
            app: ctx.app,
            streams: ctx.streams.clone(),
            manifest,
        })?;

        if handler.namespace() != namespace {
            return Err(RoutingError::invalid_handler(
                namespace,
                format!("factory built a handler for `{}`", handler.namespace()),
            ));
        }
        Ok(handler)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("namespaces", &self.factories.keys().collect::<Vec<_>>())
            .field("route_dir", &self.route_dir)
            .finish()
    }
}

/// Startup check for a configured route directory.
pub fn check_route_dir(dir: &Path) -> anyhow::Result<()> {
    let metadata =
        fs::metadata(dir).with_context(|| format!("Invalid route directory {}", dir.display()))?;
    if !metadata.is_dir() {
        bail!("Invalid route directory {}: not a directory", dir.display());
    }
    fs::read_dir(dir)
        .with_context(|| format!("Invalid route directory {}: not readable", dir.display()))?;
    Ok(())
}
