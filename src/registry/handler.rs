use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use indexmap::IndexMap;
use serde::Serialize;

use crate::command::errors::RoutingError;
use crate::command::result::Payload;
use crate::command::types::{HELP_OPERATION, HELP_PREFIX, is_valid_function};
use crate::registry::arguments::Arguments;

pub type InvokeFuture = BoxFuture<'static, anyhow::Result<Payload>>;

type InvokeFn = Arc<dyn Fn(Arguments) -> InvokeFuture + Send + Sync>;
type CloseHook = Box<dyn FnOnce(&str) + Send + Sync>;

/// One declared parameter. `declared_type` is informational only; values are
/// never coerced to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub declared_type: String,
    pub optional: bool,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            optional: false,
        }
    }

    pub fn optional(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            optional: true,
        }
    }
}

/// Capability descriptor for a single operation: its name, ordered parameter
/// metadata, display return type and the function that runs it.
#[derive(Clone)]
pub struct OperationSpec {
    name: String,
    params: Vec<ParamSpec>,
    returns: String,
    invoke: InvokeFn,
}

impl OperationSpec {
    pub fn new<F, Fut>(name: impl Into<String>, invoke: F) -> Self
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Payload>> + Send + 'static,
    {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: "void".to_string(),
            invoke: Arc::new(move |args| invoke(args).boxed()),
        }
    }

    pub fn required(mut self, name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        self.params.push(ParamSpec::required(name, declared_type));
        self
    }

    pub fn optional(mut self, name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        self.params.push(ParamSpec::optional(name, declared_type));
        self
    }

    pub fn returns(mut self, declared_type: impl Into<String>) -> Self {
        self.returns = declared_type.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn return_type(&self) -> &str {
        &self.returns
    }

    pub fn invoke(&self, args: Arguments) -> InvokeFuture {
        (self.invoke)(args)
    }
}

impl fmt::Debug for OperationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationSpec")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .finish_non_exhaustive()
    }
}

/// A loaded namespace: an ordered table of invocable operations.
///
/// A handler lives for one batch. The optional close hook runs when the
/// batch's namespace cache drops it and is never listed as an operation.
pub struct Handler {
    namespace: String,
    operations: IndexMap<String, OperationSpec>,
    on_close: Option<CloseHook>,
}

impl Handler {
    pub fn builder(namespace: impl Into<String>) -> HandlerBuilder {
        HandlerBuilder {
            namespace: namespace.into(),
            operations: Vec::new(),
            on_close: None,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn operation(&self, name: &str) -> Option<&OperationSpec> {
        self.operations.get(name)
    }

    /// Operation names in registration order.
    pub fn operation_names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl Drop for Handler {
    fn drop(&mut self) {
        if let Some(hook) = self.on_close.take() {
            hook(&self.namespace);
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("namespace", &self.namespace)
            .field("operations", &self.operations.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

pub struct HandlerBuilder {
    namespace: String,
    operations: Vec<OperationSpec>,
    on_close: Option<CloseHook>,
}

impl HandlerBuilder {
    pub fn operation(mut self, spec: OperationSpec) -> Self {
        self.operations.push(spec);
        self
    }

    pub fn on_close<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&str) + Send + Sync + 'static,
    {
        self.on_close = Some(Box::new(hook));
        self
    }

    /// Checks the operation table and produces the handler.
    ///
    /// # Errors
    ///
    /// Returns `RoutingError::InvalidHandler` when an operation name is not
    /// reachable from the wire, collides with the `HELP` pseudo-operation, or
    /// is registered twice.
    pub fn build(self) -> Result<Handler, RoutingError> {
        let mut operations = IndexMap::with_capacity(self.operations.len());
        for spec in self.operations {
            if !is_valid_function(spec.name())
                || spec.name() == HELP_OPERATION
                || spec.name().starts_with(HELP_PREFIX)
            {
                return Err(RoutingError::invalid_handler(
                    &self.namespace,
                    format!("operation name `{}` is not allowed", spec.name()),
                ));
            }
            if let Some(previous) = operations.insert(spec.name().to_string(), spec) {
                return Err(RoutingError::invalid_handler(
                    &self.namespace,
                    format!("operation `{}` registered twice", previous.name()),
                ));
            }
        }

        Ok(Handler {
            namespace: self.namespace,
            operations,
            on_close: self.on_close,
        })
    }
}
