use std::path::Path;
use std::sync::Arc;

use batch_rpc::frontend::start_all;
use batch_rpc::logging;
use batch_rpc::modules::builtin_registry;
use batch_rpc::registry::{AppContext, ModuleLoader, check_route_dir};
use batch_rpc::shared::config::CONFIG;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(&CONFIG.logging)?;
    info!(target: "batch_rpc", "batch_rpc is starting...");

    let mut registry = builtin_registry();
    if let Some(dir) = &CONFIG.dispatch.route_dir {
        check_route_dir(Path::new(dir))?;
        registry = registry.with_route_dir(dir);
    }
    info!(
        target: "batch_rpc",
        namespaces = ?registry.namespaces().collect::<Vec<_>>(),
        route_dir = ?registry.route_dir(),
        "Module registry ready"
    );

    let loader: Arc<dyn ModuleLoader> = Arc::new(registry);
    start_all(loader, AppContext::empty()).await
}
