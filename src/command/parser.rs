use serde_json::{Map, Value};
use tracing::debug;

use crate::command::errors::{OperationError, RequestError};
use crate::command::types::{Envelope, JSON_CONTENT_TYPE, RequestMeta};

/// Decodes and validates a batch request.
///
/// Every rejection is folded into one recoverable "Invalid request" failure;
/// the specific reason only travels as the failure's cause.
pub fn parse_request(body: &[u8], meta: &RequestMeta) -> Result<Envelope, OperationError> {
    parse_envelope(body, meta).map_err(OperationError::invalid_request)
}

pub fn parse_envelope(body: &[u8], meta: &RequestMeta) -> Result<Envelope, RequestError> {
    match meta.media_type() {
        Some(media_type) if media_type == JSON_CONTENT_TYPE => {}
        other => {
            return Err(RequestError::InvalidContentType(
                other.unwrap_or_else(|| "<none>".to_string()),
            ));
        }
    }
    if !meta.secure {
        return Err(RequestError::InsecureTransport);
    }

    let Value::Object(mut body) = serde_json::from_slice::<Value>(body)? else {
        return Err(RequestError::NotAnObject);
    };

    let version = parse_version(&body).ok_or(RequestError::MissingVersion)?;
    let payload = match body.remove("payload") {
        Some(Value::Object(payload)) => payload,
        _ => return Err(RequestError::MissingPayload),
    };

    debug!(
        target: "batch_rpc::parser",
        version,
        entries = payload.len(),
        "Parsed batch envelope"
    );

    Ok(Envelope { version, payload })
}

/// Accepts a number or a numeric string, truncated to an integer. Zero counts
/// as missing.
fn parse_version(body: &Map<String, Value>) -> Option<i64> {
    let version = match body.get("version")? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().and_then(truncate)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().and_then(truncate))
        }
        _ => None,
    }?;
    (version != 0).then_some(version)
}

fn truncate(value: f64) -> Option<i64> {
    value.is_finite().then(|| value.trunc() as i64)
}
