use std::fmt;
use std::sync::Arc;

use crate::registry::loader::{AppContext, ModuleLoader};
use crate::shared::config::{CONFIG, DispatchConfig, ServerConfig, Settings};

/// Everything a connection task needs, shared read-only across requests.
/// Nothing in here is mutated per request.
#[derive(Clone)]
pub struct FrontendContext {
    pub server: ServerConfig,
    pub dispatch: DispatchConfig,
    pub loader: Arc<dyn ModuleLoader>,
    pub app: AppContext,
}

impl FrontendContext {
    pub fn new(settings: &Settings, loader: Arc<dyn ModuleLoader>, app: AppContext) -> Arc<Self> {
        Arc::new(Self {
            server: settings.server.clone(),
            dispatch: settings.dispatch.clone(),
            loader,
            app,
        })
    }

    pub fn from_config(loader: Arc<dyn ModuleLoader>, app: AppContext) -> Arc<Self> {
        Self::new(&CONFIG, loader, app)
    }
}

impl fmt::Debug for FrontendContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrontendContext")
            .field("server", &self.server)
            .field("dispatch", &self.dispatch)
            .field("app", &self.app)
            .finish_non_exhaustive()
    }
}
