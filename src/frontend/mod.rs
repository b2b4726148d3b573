pub mod context;
pub mod http;

use std::sync::Arc;

use context::FrontendContext;

use crate::registry::loader::{AppContext, ModuleLoader};

/// Serves the batch endpoint until ctrl-c.
pub async fn start_all(loader: Arc<dyn ModuleLoader>, app: AppContext) -> anyhow::Result<()> {
    let ctx = FrontendContext::from_config(loader, app);
    http::listener::run_http_server(ctx).await
}
