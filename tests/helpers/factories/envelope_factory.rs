use serde_json::{Map, Value, json};

use crate::command::types::{Envelope, RequestMeta};

pub struct EnvelopeFactory {
    version: Value,
    payload: Map<String, Value>,
}

impl EnvelopeFactory {
    pub fn new() -> Self {
        Self {
            version: json!(1),
            payload: Map::new(),
        }
    }

    pub fn with_version(mut self, version: Value) -> Self {
        self.version = version;
        self
    }

    /// Adds `{ns, function, arguments}` under `id`. `Value::Null` arguments
    /// are left out of the entry.
    pub fn with_call(mut self, id: &str, ns: &str, function: &str, arguments: Value) -> Self {
        let mut entry = Map::new();
        entry.insert("ns".into(), json!(ns));
        entry.insert("function".into(), json!(function));
        if !arguments.is_null() {
            entry.insert("arguments".into(), arguments);
        }
        self.payload.insert(id.to_string(), Value::Object(entry));
        self
    }

    pub fn with_entry(mut self, id: &str, entry: Value) -> Self {
        self.payload.insert(id.to_string(), entry);
        self
    }

    pub fn create(self) -> Value {
        json!({ "version": self.version, "payload": self.payload })
    }

    pub fn body(self) -> Vec<u8> {
        serde_json::to_vec(&self.create()).expect("envelope serializes")
    }

    pub fn envelope(self) -> Envelope {
        let version = self.version.as_i64().unwrap_or(1);
        Envelope {
            version,
            payload: self.payload,
        }
    }

    /// Metadata of a well-formed secure JSON request.
    pub fn meta() -> RequestMeta {
        RequestMeta::new(Some("application/json"), true)
    }
}
