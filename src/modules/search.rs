use serde_json::Value;

use crate::command::errors::{OperationError, RoutingError};
use crate::command::result::Payload;
use crate::filter::FilterCompiler;
use crate::registry::arguments::Arguments;
use crate::registry::handler::{Handler, OperationSpec};
use crate::registry::loader::ModuleContext;

pub const NAMESPACE: &str = "search";

/// `compile(filter, prefix?)`: the compiled predicate and its parameters,
/// for clients that build queries through another channel.
///
/// A `field_prefix` string in the namespace manifest sets the prefix used
/// when the caller passes none.
pub fn handler(ctx: &ModuleContext<'_>) -> Result<Handler, RoutingError> {
    let default_prefix = match ctx.manifest.as_ref().and_then(|m| m.get("field_prefix")) {
        None => String::new(),
        Some(toml::Value::String(prefix)) => prefix.clone(),
        Some(_) => {
            return Err(RoutingError::invalid_handler(
                ctx.namespace,
                "`field_prefix` must be a string",
            ));
        }
    };

    Handler::builder(ctx.namespace)
        .operation(
            OperationSpec::new("compile", move |args| compile(args, default_prefix.clone()))
                .required("filter", "object")
                .optional("prefix", "string")
                .returns("object"),
        )
        .build()
}

async fn compile(args: Arguments, default_prefix: String) -> anyhow::Result<Payload> {
    let filter: Value = args.required("filter")?;
    let prefix: String = args.optional("prefix")?.unwrap_or(default_prefix);

    let compiled = FilterCompiler::new()
        .with_field_prefix(prefix)
        .compile(&filter)
        .map_err(|err| OperationError::recoverable(err.to_string()).with_source(err))?;
    Ok(Payload::value(compiled))
}
