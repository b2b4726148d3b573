use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::command::errors::OperationError;

/// Arguments bound to a single invocation, keyed by declared parameter name.
///
/// Values are passed exactly as the client sent them; the typed accessors are
/// a convenience for operation code and report conversion problems as
/// recoverable failures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Map<String, Value>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bind(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    #[track_caller]
    pub fn required<T: DeserializeOwned>(&self, name: &str) -> Result<T, OperationError> {
        match self.optional(name)? {
            Some(value) => Ok(value),
            None => Err(OperationError::recoverable(format!(
                "Missing argument `{name}`"
            ))),
        }
    }

    #[track_caller]
    pub fn optional<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, OperationError> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::deserialize(value).map(Some).map_err(|err| {
                OperationError::recoverable(format!("Invalid argument `{name}`")).with_source(err)
            }),
        }
    }
}

impl From<Map<String, Value>> for Arguments {
    fn from(values: Map<String, Value>) -> Self {
        Self { values }
    }
}
