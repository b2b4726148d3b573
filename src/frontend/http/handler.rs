use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{ALLOW, CONTENT_TYPE, HeaderMap, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use tracing::{debug, info, warn};

use crate::command::errors::RequestError;
use crate::command::runner::BatchRunner;
use crate::command::types::RequestMeta;
use crate::frontend::context::FrontendContext;
use crate::shared::response::{Boundary, TEXT_MIME};

use super::body::{ResponseBody, full_body, reader_body};

const FORWARDED_PROTO: &str = "x-forwarded-proto";

/// True when the connection reached us over TLS, either because the
/// deployment says so or because the terminating proxy reported `https`.
pub fn is_secure(headers: &HeaderMap, assume_secure: bool) -> bool {
    assume_secure
        || headers
            .get(FORWARDED_PROTO)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

pub fn request_meta(headers: &HeaderMap, assume_secure: bool) -> RequestMeta {
    RequestMeta::new(
        headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok()),
        is_secure(headers, assume_secure),
    )
}

fn text_response(status: StatusCode, text: &'static str) -> Response<ResponseBody> {
    let mut response = Response::new(full_body(text));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_MIME));
    response
}

async fn read_body(body: Incoming, limit: usize) -> Result<Bytes, RequestError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            Err(RequestError::BodyTooLarge { limit })
        }
        Err(err) => Err(RequestError::UnreadableBody(err.to_string())),
    }
}

/// Serves one HTTP request.
///
/// The batch runs on its own task and writes into an in-memory pipe; the
/// response body streams from the other end, so parts reach the client as
/// soon as they are flushed.
pub async fn handle_request(
    req: Request<Incoming>,
    ctx: Arc<FrontendContext>,
) -> Result<Response<ResponseBody>, Infallible> {
    if req.uri().path() != ctx.server.endpoint {
        return Ok(text_response(StatusCode::NOT_FOUND, "Not Found"));
    }
    if req.method() != Method::POST {
        let mut response = text_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static("POST"));
        return Ok(response);
    }

    let meta = request_meta(req.headers(), ctx.server.assume_secure);
    let body = read_body(req.into_body(), ctx.server.max_body_bytes).await;

    let boundary = Boundary::random();
    let content_type = match HeaderValue::from_str(&boundary.content_type()) {
        Ok(value) => value,
        Err(err) => {
            warn!(target: "batch_rpc::http", error = %err, "Boundary is not a valid header value");
            return Ok(text_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
            ));
        }
    };

    debug!(
        target: "batch_rpc::http",
        boundary = %boundary,
        secure = meta.secure,
        body_ok = body.is_ok(),
        "Starting batch response"
    );

    let chunk_size = ctx.dispatch.chunk_size;
    let (writer, reader) = tokio::io::duplex(chunk_size.max(1));

    tokio::spawn(async move {
        let runner = BatchRunner::new(ctx.loader.as_ref(), &ctx.dispatch, &ctx.app);
        match body {
            Ok(bytes) => {
                let (summary, _) = runner.run(&bytes, &meta, writer, boundary).await;
                info!(
                    target: "batch_rpc::http",
                    entries = summary.entries(),
                    failed = summary.failed,
                    aborted = summary.aborted,
                    "Batch response sent"
                );
            }
            Err(err) => {
                runner.reject(err, writer, boundary).await;
            }
        }
    });

    let mut response = Response::new(reader_body(reader, chunk_size));
    response.headers_mut().insert(CONTENT_TYPE, content_type);
    Ok(response)
}
