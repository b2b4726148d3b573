use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use futures::StreamExt;
use futures::stream;
use serde::ser::Error as _;
use serde_json::json;

use crate::command::errors::{OperationError, RoutingError};
use crate::command::result::Payload;
use crate::registry::arguments::Arguments;
use crate::registry::handler::{Handler, OperationSpec};
use crate::shared::response::PartSink;

/// Builds the `demo` handler used across tests. Its operations cover every
/// result shape the encoder knows about.
pub struct HandlerFactory {
    namespace: String,
    closed: Option<Arc<AtomicUsize>>,
    streams: PartSink,
}

impl HandlerFactory {
    pub fn new() -> Self {
        Self {
            namespace: "demo".into(),
            closed: None,
            streams: PartSink::detached(),
        }
    }

    /// Sink the `report` operations write their text parts to.
    pub fn with_streams(mut self, streams: PartSink) -> Self {
        self.streams = streams;
        self
    }

    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.namespace = namespace.to_string();
        self
    }

    /// Counts how often the handler's close hook runs.
    pub fn with_close_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.closed = Some(counter);
        self
    }

    pub fn create(self) -> Result<Handler, RoutingError> {
        let streams = self.streams;
        let open_streams = streams.clone();
        let mut builder = Handler::builder(self.namespace)
            .operation(
                OperationSpec::new("add", add)
                    .required("a", "int")
                    .optional("b", "int")
                    .returns("int"),
            )
            .operation(OperationSpec::new("fail_typed", fail_typed))
            .operation(OperationSpec::new("fail_user", fail_user))
            .operation(OperationSpec::new("fail_plain", fail_plain))
            .operation(OperationSpec::new("boom", boom))
            .operation(
                OperationSpec::new("items", items)
                    .required("count", "int")
                    .returns("iterable"),
            )
            .operation(OperationSpec::new("empty", empty).returns("iterable"))
            .operation(OperationSpec::new("private", private).returns("object"))
            .operation(OperationSpec::new("bad_json", bad_json))
            .operation(
                OperationSpec::new("report", move |args| report(streams.clone(), args, true))
                    .required("text", "string"),
            )
            .operation(
                OperationSpec::new("report_open", move |args| {
                    report(open_streams.clone(), args, false)
                })
                .required("text", "string"),
            );

        if let Some(counter) = self.closed {
            builder = builder.on_close(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        builder.build()
    }
}

async fn add(args: Arguments) -> anyhow::Result<Payload> {
    let a: i64 = args.required("a")?;
    let b: i64 = args.optional("b")?.unwrap_or(0);
    Ok(Payload::value(a + b))
}

async fn fail_typed(_args: Arguments) -> anyhow::Result<Payload> {
    Err(OperationError::forbidden("Not yours").into())
}

async fn fail_user(_args: Arguments) -> anyhow::Result<Payload> {
    Err(OperationError::recoverable("Quota exceeded").into())
}

async fn fail_plain(_args: Arguments) -> anyhow::Result<Payload> {
    Err(anyhow!("database exploded").context("loading account"))
}

async fn boom(_args: Arguments) -> anyhow::Result<Payload> {
    panic!("boom");
}

/// `count` elements `0..count`, except that element 1 fails to encode.
async fn items(args: Arguments) -> anyhow::Result<Payload> {
    let count: i64 = args.required("count")?;
    let elements = (0..count).map(|n| {
        if n == 1 {
            Err(serde_json::Error::custom("element 1 is not encodable"))
        } else {
            Ok(json!({ "n": n, "_internal": n * 10 }))
        }
    });
    Ok(Payload::Sequence(stream::iter(elements).boxed()))
}

async fn empty(_args: Arguments) -> anyhow::Result<Payload> {
    Ok(Payload::sequence(Vec::<i64>::new()))
}

async fn private(_args: Arguments) -> anyhow::Result<Payload> {
    Ok(Payload::json(json!({
        "id": 1,
        "_secret": "hidden",
        "nested": { "_token": "x", "ok": true },
        "list": [{ "_x": 1, "y": 2 }]
    })))
}

async fn bad_json(_args: Arguments) -> anyhow::Result<Payload> {
    Ok(Payload::Value(Err(serde_json::Error::custom("not representable"))))
}

/// Writes `text` to a text part of its own, closing it only when `close`.
async fn report(streams: PartSink, args: Arguments, close: bool) -> anyhow::Result<Payload> {
    let text: String = args.required("text")?;
    let stream = streams.open_text();
    streams.printf(stream, format_args!("report: {text}"));
    if close {
        streams.close(stream);
    }
    Ok(Payload::value(text.len()))
}
