pub mod global;
pub mod model;

pub use global::CONFIG;
pub use model::{DispatchConfig, LoggingConfig, ServerConfig, Settings, load_settings};
