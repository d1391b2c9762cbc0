use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid browserslist declaration in {}: {message}", path.display())]
    Invalid { path: PathBuf, message: String },

    #[error("Invalid doiuse settings: {0}")]
    Settings(#[from] serde_json::Error),
}
