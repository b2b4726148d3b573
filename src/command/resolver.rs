use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::command::errors::RoutingError;
use crate::registry::handler::{Handler, ParamSpec};
use crate::registry::loader::{AppContext, LoadContext, ModuleLoader};
use crate::shared::config::DispatchConfig;
use crate::shared::response::PartSink;

/// Turns namespace names into handlers, loading each at most once per batch.
///
/// Failed loads are not cached; a later entry naming the same namespace
/// retries the loader.
pub struct OperationResolver<'a> {
    loader: &'a dyn ModuleLoader,
    settings: &'a DispatchConfig,
    app: &'a AppContext,
    streams: PartSink,
    cache: HashMap<String, Arc<Handler>>,
}

impl<'a> OperationResolver<'a> {
    pub fn new(
        loader: &'a dyn ModuleLoader,
        settings: &'a DispatchConfig,
        app: &'a AppContext,
    ) -> Self {
        Self {
            loader,
            settings,
            app,
            streams: PartSink::detached(),
            cache: HashMap::new(),
        }
    }

    /// Hands `streams` to every module loaded from here on.
    pub fn with_streams(mut self, streams: PartSink) -> Self {
        self.streams = streams;
        self
    }

    pub fn resolve(&mut self, namespace: &str) -> Result<Arc<Handler>, RoutingError> {
        if let Some(handler) = self.cache.get(namespace) {
            return Ok(Arc::clone(handler));
        }

        let ctx = LoadContext {
            settings: self.settings,
            app: self.app,
            streams: &self.streams,
        };
        let handler = match self.loader.load(namespace, &ctx) {
            Ok(handler) => Arc::new(handler),
            Err(err) => {
                warn!(target: "batch_rpc::resolver", namespace, error = %err, "Namespace did not resolve");
                return Err(err);
            }
        };

        debug!(
            target: "batch_rpc::resolver",
            namespace,
            operations = handler.len(),
            "Namespace resolved"
        );
        self.cache
            .insert(namespace.to_string(), Arc::clone(&handler));
        Ok(handler)
    }

    /// Number of handlers loaded so far in this batch.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

/// Output of `HELP`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationListing {
    pub functions: Vec<String>,
}

/// Output of `HELP:<name>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationDescription {
    pub function: String,
    pub args: Vec<ParamSpec>,
    #[serde(rename = "return")]
    pub returns: String,
}

impl OperationDescription {
    /// Shape returned when the described operation does not exist.
    pub fn invalid() -> Self {
        Self {
            function: "Invalid operation".to_string(),
            args: Vec::new(),
            returns: "void".to_string(),
        }
    }
}

pub fn list_operations(handler: &Handler) -> OperationListing {
    OperationListing {
        functions: handler.operation_names().map(str::to_string).collect(),
    }
}

pub fn describe_operation(handler: &Handler, name: &str) -> OperationDescription {
    match handler.operation(name) {
        Some(spec) => OperationDescription {
            function: spec.name().to_string(),
            args: spec.params().to_vec(),
            returns: spec.return_type().to_string(),
        },
        None => OperationDescription::invalid(),
    }
}
