pub mod config;
pub mod error;
pub mod template;
pub mod types;

pub use config::GatewatchConfig;
pub use error::{ConfigError, ConfigResult};
pub use types::*;
