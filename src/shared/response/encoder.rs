use std::panic::AssertUnwindSafe;

use futures::{FutureExt, StreamExt};
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use serde_json::Value;
use tokio::io::AsyncWrite;
use tracing::warn;

use crate::command::errors::{OperationError, PROTOCOL_VERSION, panic_message};
use crate::command::result::{OperationResult, Payload, ValueStream};
use crate::shared::response::{JSON_MIME, MultipartWriter, strip_private_keys};

/// Written when even a failure body cannot be serialized.
const FALLBACK_FAILURE: &[u8] =
    br#"{"error":true,"message":"Internal error","version":100,"code":500}"#;

#[derive(Serialize)]
struct FailureBody<'a> {
    error: bool,
    message: &'a str,
    version: u32,
    code: u16,
}

#[derive(Serialize)]
struct SuccessBody<'a> {
    error: bool,
    result: &'a Value,
}

// `{"<id>": body}` without building an intermediate map
struct Keyed<'a, T> {
    id: &'a str,
    body: T,
}

impl<T: Serialize> Serialize for Keyed<'_, T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.id, &self.body)?;
        map.end()
    }
}

#[track_caller]
fn invalid_encoding(err: serde_json::Error) -> OperationError {
    OperationError::internal("Invalid JSON encoding").with_source(err)
}

/// Whether an entry went out as a success or a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emitted {
    Success,
    Failure,
}

/// Renders entry results as JSON parts of a multipart response.
pub struct ResponseEncoder<W> {
    writer: MultipartWriter<W>,
    debug: bool,
}

impl<W> ResponseEncoder<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: MultipartWriter<W>, debug: bool) -> Self {
        Self { writer, debug }
    }

    pub fn writer(&self) -> &MultipartWriter<W> {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut MultipartWriter<W> {
        &mut self.writer
    }

    pub async fn emit(&mut self, id: &str, result: OperationResult) -> Emitted {
        match result {
            OperationResult::Success(Payload::Value(Ok(mut value))) => {
                strip_private_keys(&mut value);
                let body = Keyed {
                    id,
                    body: SuccessBody {
                        error: false,
                        result: &value,
                    },
                };
                match serde_json::to_vec(&body) {
                    Ok(bytes) => {
                        self.write_part(&bytes).await;
                        Emitted::Success
                    }
                    Err(err) => self.emit_failure(id, invalid_encoding(err)).await,
                }
            }
            OperationResult::Success(Payload::Value(Err(err))) => {
                self.emit_failure(id, invalid_encoding(err)).await
            }
            OperationResult::Success(Payload::Sequence(items)) => {
                self.emit_sequence(id, items).await;
                Emitted::Success
            }
            OperationResult::Failure(err) => self.emit_failure(id, err).await,
        }
    }

    /// Writes a failure that belongs to no entry: a rejected request or a
    /// fault of the driving loop. The body is not keyed by an id.
    pub async fn emit_fault(&mut self, err: OperationError) {
        err.log(None);
        let bytes = self.failure_bytes(&err, None);
        self.write_part(&bytes).await;
    }

    pub async fn finish(self) -> W {
        self.writer.finish().await
    }

    async fn emit_failure(&mut self, id: &str, err: OperationError) -> Emitted {
        err.log(Some(id));
        let bytes = self.failure_bytes(&err, Some(id));
        self.write_part(&bytes).await;
        Emitted::Failure
    }

    fn failure_bytes(&self, err: &OperationError, id: Option<&str>) -> Vec<u8> {
        let body = FailureBody {
            error: true,
            message: err.client_message(self.debug),
            version: PROTOCOL_VERSION,
            code: err.code(),
        };
        let encoded = match id {
            Some(id) => serde_json::to_vec(&Keyed { id, body }),
            None => serde_json::to_vec(&body),
        };
        encoded.unwrap_or_else(|_| FALLBACK_FAILURE.to_vec())
    }

    async fn write_part(&mut self, bytes: &[u8]) {
        let part = self.writer.open_part(JSON_MIME).await;
        self.writer.write(part, bytes).await;
        self.writer.close_part(part).await;
    }

    /// Streams `{"<id>":{"error":false,"result":[...]}}` one element at a time.
    ///
    /// Elements that fail to convert are skipped. A panic while producing an
    /// element ends the sequence early, as does a dead transport.
    async fn emit_sequence(&mut self, id: &str, mut items: ValueStream) {
        let part = self.writer.open_part(JSON_MIME).await;
        let head = format!(
            "{{{}:{{\"error\":false,\"result\":[",
            Value::String(id.to_string())
        );
        self.writer.write(part, head.as_bytes()).await;

        let mut index = 0usize;
        let mut written = 0usize;
        loop {
            if self.writer.is_broken() {
                warn!(target: "batch_rpc::response", id, "Transport gone, sequence abandoned");
                break;
            }
            let next = match AssertUnwindSafe(items.next()).catch_unwind().await {
                Ok(next) => next,
                Err(panic) => {
                    warn!(
                        target: "batch_rpc::response",
                        id,
                        index,
                        panic = panic_message(&*panic),
                        "Sequence producer panicked, sequence ended early"
                    );
                    break;
                }
            };
            let Some(element) = next else { break };

            let encoded = element.and_then(|mut value| {
                strip_private_keys(&mut value);
                serde_json::to_vec(&value)
            });
            match encoded {
                Ok(bytes) => {
                    if written > 0 {
                        self.writer.write(part, b",").await;
                    }
                    self.writer.write(part, &bytes).await;
                    written += 1;
                }
                Err(err) => {
                    warn!(
                        target: "batch_rpc::response",
                        id,
                        index,
                        error = %err,
                        "Sequence element skipped: not encodable"
                    );
                }
            }
            index += 1;
        }

        self.writer.write(part, b"]}}").await;
        self.writer.close_part(part).await;
    }
}
