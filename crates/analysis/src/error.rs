use doiuse_config::ConfigError;
use doiuse_engine::ScanError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("No doiuse settings have been received yet")]
    NotInitialized,
}

/// A validation pass failed for a reason the user should hear about.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scan(#[from] ScanError),
}
