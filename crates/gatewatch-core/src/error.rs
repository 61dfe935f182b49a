//! Configuration errors. All of them are fatal at startup.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no gateways configured")]
    NoGateways,

    #[error("gateway {index}: invalid IPv4 address {value:?}")]
    InvalidAddress { index: usize, value: String },

    #[error("gateway {index}: invalid route {value:?}")]
    InvalidRoute { index: usize, value: String },

    #[error("gateway {index}: routes are only allowed on dhcp_backup gateways")]
    RoutesNotAllowed { index: usize },

    #[error("gateway {index}: {kind} gateways need an interface")]
    MissingInterface { index: usize, kind: &'static str },

    #[error("every configured gateway is host_check; nothing can carry the default route")]
    NoRoutableGateway,

    #[error("invalid setting: {0}")]
    InvalidSetting(String),

    #[error("command {name:?} has a malformed template: {template:?}")]
    InvalidTemplate { name: &'static str, template: String },
}
