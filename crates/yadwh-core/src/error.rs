//! Error types for credential configuration.

use thiserror::Error;

/// Result type alias for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while building the credential store.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("registry credential is not valid base64: {0}")]
    RegistryAuthEncoding(#[from] base64::DecodeError),

    #[error("invalid registry credential: {0}")]
    RegistryAuth(&'static str),

    #[error("no webhook groups configured; set {prefix}<key>=<secret> (at least {min_len} chars)")]
    NoGroups { prefix: &'static str, min_len: usize },
}
