use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The scanning engine could not be located.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(
        "Failed to load the doiuse library for {}. Install it in your workspace with \
         'npm install --save-dev doiuse postcss' and retry.",
        workspace_root.display()
    )]
    EngineNotFound { workspace_root: PathBuf },

    #[error("Node.js was not found on PATH. It is required to run doiuse.")]
    NodeNotFound,
}

/// A single scan failed.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The stylesheet could not be parsed. Expected while the user is typing.
    #[error("CSS syntax error: {0}")]
    Parse(String),

    /// The engine rejected the request (bad query, missing syntax module, ...).
    #[error("doiuse failed: {0}")]
    Engine(String),

    #[error("doiuse bridge I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("doiuse bridge exited with code {code}: {stderr}")]
    ProcessFailed { code: i32, stderr: String },

    #[error("doiuse bridge protocol error: {0}")]
    Protocol(String),

    #[error("doiuse scan timed out after {0:?}")]
    Timeout(Duration),
}

impl ScanError {
    /// Whether the bridge process is no longer usable after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::ProcessFailed { .. } | Self::Protocol(_) | Self::Timeout(_)
        )
    }
}
