use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde_json::{Map, Value, map};
use tracing::{debug, warn};

use crate::command::errors::{DispatchError, OperationError};
use crate::command::resolver::{OperationResolver, describe_operation, list_operations};
use crate::command::result::{OperationResult, Payload};
use crate::command::types::{Envelope, Invocation, OperationCall};
use crate::registry::arguments::Arguments;
use crate::registry::handler::OperationSpec;
use crate::registry::loader::{AppContext, ModuleLoader};
use crate::shared::config::DispatchConfig;
use crate::shared::response::PartSink;

/// Walks a batch in envelope order, one entry at a time.
///
/// Each call to [`next_entry`](Self::next_entry) fully processes one entry
/// and yields its result; failures of an entry never escape it. The only
/// error the dispatcher itself yields is a loop-level fault, after which it
/// yields nothing more.
pub struct BatchDispatcher<'a> {
    entries: map::IntoIter,
    total: usize,
    processed: usize,
    halted: bool,
    resolver: OperationResolver<'a>,
    settings: &'a DispatchConfig,
}

impl<'a> BatchDispatcher<'a> {
    pub fn new(
        envelope: Envelope,
        loader: &'a dyn ModuleLoader,
        settings: &'a DispatchConfig,
        app: &'a AppContext,
    ) -> Self {
        Self {
            total: envelope.len(),
            entries: envelope.payload.into_iter(),
            processed: 0,
            halted: false,
            resolver: OperationResolver::new(loader, settings, app),
            settings,
        }
    }

    /// Lets modules loaded during this batch write their own parts.
    pub fn with_streams(mut self, streams: PartSink) -> Self {
        self.resolver = self.resolver.with_streams(streams);
        self
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn remaining(&self) -> usize {
        if self.halted { 0 } else { self.entries.len() }
    }

    pub async fn next_entry(&mut self) -> Option<Result<(String, OperationResult), DispatchError>> {
        if self.halted {
            return None;
        }

        if let Some(limit) = self.settings.max_entries {
            if self.processed >= limit && self.entries.len() > 0 {
                self.halted = true;
                warn!(
                    target: "batch_rpc::dispatch",
                    limit,
                    count = self.total,
                    "Batch exceeds the entry limit, aborting"
                );
                return Some(Err(DispatchError::TooManyEntries {
                    count: self.total,
                    limit,
                }));
            }
        }

        let (id, entry) = self.entries.next()?;
        self.processed += 1;

        // A panic anywhere in the entry, module loading included, fails only
        // this entry
        let result = match AssertUnwindSafe(self.process(&id, entry))
            .catch_unwind()
            .await
        {
            Ok(result) => OperationResult::from(result),
            Err(panic) => OperationResult::Failure(OperationError::from_panic(panic)),
        };
        debug!(
            target: "batch_rpc::dispatch",
            id = %id,
            success = result.is_success(),
            "Entry processed"
        );
        Some(Ok((id, result)))
    }

    async fn process(&mut self, id: &str, entry: Value) -> Result<Payload, OperationError> {
        let call = OperationCall::from_entry(id, entry)?;
        let handler = self.resolver.resolve(&call.ns).map_err(|err| {
            OperationError::recoverable("Invalid namespace").with_source(err)
        })?;

        match call.invocation() {
            Invocation::ListOperations => Ok(Payload::value(list_operations(&handler))),
            Invocation::DescribeOperation(name) => {
                Ok(Payload::value(describe_operation(&handler, name)))
            }
            Invocation::Call(name) => {
                let spec = handler
                    .operation(name)
                    .ok_or_else(|| OperationError::recoverable("Invalid operation"))?;
                let args = bind_arguments(spec, &call.arguments)?;

                debug!(
                    target: "batch_rpc::dispatch",
                    id,
                    namespace = %call.ns,
                    operation = name,
                    "Invoking operation"
                );

                spec.invoke(args).await.map_err(OperationError::from_anyhow)
            }
        }
    }
}

/// Binds supplied arguments to the operation's declared parameters.
///
/// Values pass through unchanged. A `null` counts as absent; undeclared
/// arguments are ignored.
pub fn bind_arguments(
    spec: &OperationSpec,
    supplied: &Map<String, Value>,
) -> Result<Arguments, OperationError> {
    let mut args = Arguments::new();
    for param in spec.params() {
        match supplied.get(&param.name) {
            None | Some(Value::Null) if param.optional => {}
            None | Some(Value::Null) => {
                return Err(OperationError::recoverable(format!(
                    "Missing argument `{}` `{}`",
                    param.name,
                    spec.name()
                )));
            }
            Some(value) => args.bind(&param.name, value.clone()),
        }
    }
    Ok(args)
}
