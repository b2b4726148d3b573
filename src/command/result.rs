use std::fmt;

use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::Serialize;
use serde_json::Value;

use crate::command::errors::OperationError;

/// Lazily produced sequence elements. An `Err` element failed to convert to
/// JSON and is skipped by the encoder.
pub type ValueStream = BoxStream<'static, serde_json::Result<Value>>;

/// What a successful operation hands back.
pub enum Payload {
    /// A scalar or mapping, already converted to JSON.
    Value(serde_json::Result<Value>),
    /// A finite or unbounded sequence, encoded element by element.
    Sequence(ValueStream),
}

impl Payload {
    pub fn value<T: Serialize>(value: T) -> Self {
        Payload::Value(serde_json::to_value(value))
    }

    pub fn json(value: Value) -> Self {
        Payload::Value(Ok(value))
    }

    /// Wraps an iterator; elements are converted only when the encoder pulls
    /// them.
    pub fn sequence<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: Send + 'static,
        T: Serialize + 'static,
    {
        Payload::Sequence(stream::iter(items.into_iter().map(serde_json::to_value)).boxed())
    }

    pub fn stream<S, T>(items: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
        T: Serialize + 'static,
    {
        Payload::Sequence(items.map(serde_json::to_value).boxed())
    }

    pub fn is_sequence(&self) -> bool {
        matches!(self, Payload::Sequence(_))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::json(value)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Payload::Sequence(_) => f.write_str("Sequence(..)"),
        }
    }
}

/// Outcome of one batch entry.
#[derive(Debug)]
pub enum OperationResult {
    Success(Payload),
    Failure(OperationError),
}

impl OperationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, OperationResult::Success(_))
    }
}

impl From<Result<Payload, OperationError>> for OperationResult {
    fn from(result: Result<Payload, OperationError>) -> Self {
        match result {
            Ok(payload) => OperationResult::Success(payload),
            Err(err) => OperationResult::Failure(err),
        }
    }
}
