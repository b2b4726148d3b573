use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::command::errors::OperationError;

pub const HELP_OPERATION: &str = "HELP";
pub const HELP_PREFIX: &str = "HELP:";
pub const JSON_CONTENT_TYPE: &str = "application/json";

static ID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[[:alnum:]:._-]+$").expect("valid id pattern"));
static NAMESPACE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[[:alnum:]][[:alnum:]_]*$").expect("valid namespace pattern"));
static FUNCTION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[[:alnum:]][[:alnum:]_:]*$").expect("valid function pattern"));

pub fn is_valid_id(id: &str) -> bool {
    ID_PATTERN.is_match(id)
}

pub fn is_valid_namespace(ns: &str) -> bool {
    NAMESPACE_PATTERN.is_match(ns)
}

pub fn is_valid_function(function: &str) -> bool {
    FUNCTION_PATTERN.is_match(function)
}

/// Transport facts the parser needs, filled in by the frontend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub content_type: Option<String>,
    pub secure: bool,
}

impl RequestMeta {
    pub fn new(content_type: Option<&str>, secure: bool) -> Self {
        Self {
            content_type: content_type.map(str::to_string),
            secure,
        }
    }

    /// Media type without parameters, lowercased.
    pub fn media_type(&self) -> Option<String> {
        self.content_type.as_deref().map(|value| {
            value
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_ascii_lowercase()
        })
    }
}

/// A validated batch request. `payload` keeps the client's key order.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub version: i64,
    pub payload: Map<String, Value>,
}

impl Envelope {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.payload.keys().map(String::as_str)
    }
}

/// One entry of the batch after syntax validation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationCall {
    pub ns: String,
    pub function: String,
    pub arguments: Map<String, Value>,
}

/// What an entry asks the resolved handler for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation<'a> {
    ListOperations,
    DescribeOperation(&'a str),
    Call(&'a str),
}

impl OperationCall {
    /// Validates an entry's id and fields.
    ///
    /// # Errors
    ///
    /// Returns a recoverable `BadRequest` failure naming the first problem:
    /// the id, the namespace, the operation or the arguments.
    pub fn from_entry(id: &str, entry: Value) -> Result<Self, OperationError> {
        if !is_valid_id(id) {
            return Err(OperationError::recoverable(format!("Invalid id {id}")));
        }

        let Value::Object(mut fields) = entry else {
            return Err(OperationError::recoverable("Invalid namespace"));
        };

        let ns = match fields.remove("ns") {
            Some(Value::String(ns)) if is_valid_namespace(&ns) => ns,
            _ => return Err(OperationError::recoverable("Invalid namespace")),
        };

        let function = match fields.remove("function") {
            Some(Value::String(function)) if is_valid_function(&function) => function,
            _ => return Err(OperationError::recoverable("Invalid operation")),
        };

        let arguments = match fields.remove("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(arguments)) => arguments,
            Some(_) => return Err(OperationError::recoverable("Invalid arguments")),
        };

        Ok(Self {
            ns,
            function,
            arguments,
        })
    }

    pub fn invocation(&self) -> Invocation<'_> {
        if self.function == HELP_OPERATION {
            Invocation::ListOperations
        } else if let Some(name) = self.function.strip_prefix(HELP_PREFIX) {
            Invocation::DescribeOperation(name)
        } else {
            Invocation::Call(&self.function)
        }
    }
}
