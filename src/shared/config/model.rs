use serde::Deserialize;
use std::env;

use crate::shared::response::DEFAULT_CHUNK_SIZE;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub http_addr: String,
    /// Path of the batch endpoint; every other path answers 404.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Treat every connection as secure. For deployments where TLS terminates
    /// upstream without setting `X-Forwarded-Proto`.
    #[serde(default)]
    pub assume_secure: bool,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Optional cap on concurrently served connections (unset = unlimited)
    pub max_connections: Option<usize>,
}

/// Settings the batch engine itself reads. Passed down explicitly, never
/// looked up through `CONFIG` from inside the engine.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Surface real failure messages to clients
    #[serde(default)]
    pub debug: bool,
    /// Directory holding one `<namespace>.toml` manifest per loadable namespace
    pub route_dir: Option<String>,
    /// Entries processed before the batch is aborted with a loop-level failure
    pub max_entries: Option<usize>,
    /// Per-part buffer size that triggers a flush to the transport
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            debug: false,
            route_dir: None,
            max_entries: None,
            chunk_size: default_chunk_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub log_dir: String,
    pub stdout_level: String,
    pub file_level: String,
}

fn default_endpoint() -> String {
    "/batch".to_string()
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

pub fn load_settings() -> Result<Settings, config::ConfigError> {
    let config_path = env::var("BATCH_RPC_CONFIG").unwrap_or_else(|_| "config".to_string());

    let settings: Settings = config::Config::builder()
        .add_source(config::File::with_name(&config_path))
        .add_source(
            config::Environment::with_prefix("BATCH_RPC")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    Ok(settings)
}
