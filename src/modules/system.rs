use serde_json::{Value, json};

use crate::command::errors::{OperationError, PROTOCOL_VERSION, RoutingError};
use crate::command::result::Payload;
use crate::registry::arguments::Arguments;
use crate::registry::handler::{Handler, OperationSpec};
use crate::registry::loader::ModuleContext;
use crate::shared::response::PartSink;

pub const NAMESPACE: &str = "system";

/// Largest `count` accepted by `sequence`.
pub const MAX_SEQUENCE: u64 = 100_000;

pub fn handler(ctx: &ModuleContext<'_>) -> Result<Handler, RoutingError> {
    let streams = ctx.streams.clone();
    Handler::builder(ctx.namespace)
        .operation(OperationSpec::new("ping", ping).returns("string"))
        .operation(OperationSpec::new("version", version).returns("object"))
        .operation(
            OperationSpec::new("echo", echo)
                .required("value", "mixed")
                .returns("mixed"),
        )
        .operation(
            OperationSpec::new("sequence", sequence)
                .required("count", "int")
                .optional("start", "int")
                .returns("iterable"),
        )
        .operation(
            OperationSpec::new("print", move |args| print(streams.clone(), args))
                .required("text", "string")
                .returns("void"),
        )
        .build()
}

async fn ping(_args: Arguments) -> anyhow::Result<Payload> {
    Ok(Payload::value("pong"))
}

async fn version(_args: Arguments) -> anyhow::Result<Payload> {
    Ok(Payload::json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": PROTOCOL_VERSION,
    })))
}

async fn echo(args: Arguments) -> anyhow::Result<Payload> {
    let value: Value = args.required("value")?;
    Ok(Payload::json(value))
}

async fn sequence(args: Arguments) -> anyhow::Result<Payload> {
    let count: u64 = args.required("count")?;
    let start: i64 = args.optional("start")?.unwrap_or(0);
    if count > MAX_SEQUENCE {
        return Err(OperationError::recoverable(format!(
            "`count` must be at most {MAX_SEQUENCE}"
        ))
        .into());
    }
    Ok(Payload::sequence((0..count as i64).map(move |offset| start + offset)))
}

/// Writes `text` as a `text/plain` part of its own, ahead of the entry's
/// result.
async fn print(streams: PartSink, args: Arguments) -> anyhow::Result<Payload> {
    let text: String = args.required("text")?;
    let stream = streams.open_text();
    streams.print(stream, text);
    streams.close(stream);
    Ok(Payload::json(Value::Null))
}
