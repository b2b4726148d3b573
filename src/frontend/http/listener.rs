use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::frontend::context::FrontendContext;

use super::handler::handle_request;

pub async fn run_http_server(ctx: Arc<FrontendContext>) -> anyhow::Result<()> {
    let addr: SocketAddr = ctx.server.http_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!(
        target: "batch_rpc::http",
        "HTTP server running at http://{addr}{}",
        ctx.server.endpoint
    );

    serve(listener, ctx, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target: "batch_rpc::http", error = %err, "Cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    })
    .await
}

/// Accepts connections on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    ctx: Arc<FrontendContext>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    // Optional connection limit, unlimited when unset or zero
    let connection_semaphore = ctx
        .server
        .max_connections
        .filter(|max| *max > 0)
        .map(|max| Arc::new(Semaphore::new(max)));

    tokio::pin!(shutdown);

    loop {
        // Waiting for a free slot must not hold up shutdown
        let permit = match &connection_semaphore {
            Some(semaphore) => tokio::select! {
                permit = Arc::clone(semaphore).acquire_owned() => Some(permit?),
                _ = &mut shutdown => {
                    info!(target: "batch_rpc::http", "HTTP server shutting down while at connection limit");
                    break;
                }
            },
            None => None,
        };

        let accept_result = tokio::select! {
            result = listener.accept() => result,
            _ = &mut shutdown => {
                info!(target: "batch_rpc::http", "HTTP server shutting down, stopping accept loop");
                break;
            }
        };

        let (stream, peer_addr) = match accept_result {
            Ok(accepted) => accepted,
            Err(err) => {
                warn!(target: "batch_rpc::http", error = %err, "Failed to accept HTTP connection");
                continue;
            }
        };
        debug!(target: "batch_rpc::http", peer = %peer_addr, "Connection accepted");

        let io = TokioIo::new(stream);
        let ctx = Arc::clone(&ctx);

        tokio::spawn(async move {
            // Each exchange owns its connection; the permit is held until it closes
            let _permit = permit;
            let mut builder = hyper::server::conn::http1::Builder::new();
            builder.keep_alive(false);

            if let Err(err) = builder
                .serve_connection(
                    io,
                    service_fn(move |req| handle_request(req, Arc::clone(&ctx))),
                )
                .await
            {
                if !err.is_incomplete_message() && !err.is_canceled() {
                    warn!(target: "batch_rpc::http", error = %err, "Error serving connection");
                }
            }
        });
    }

    info!(target: "batch_rpc::http", "HTTP server shutdown complete");
    Ok(())
}
