use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote {operation} failed: {message}")]
    Remote {
        operation: &'static str,
        message: String,
    },

    #[error("Remote {operation} timed out after {secs} seconds")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("Sync cancelled")]
    Cancelled,

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Invalid file name {0:?}: would not produce a contained path")]
    InvalidName(String),

    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("Stage queue closed")]
    QueueClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Wrap a bridge failure from a remote call, keeping cancellation distinct.
    pub fn remote(operation: &'static str, error: BridgeError) -> Self {
        match error {
            BridgeError::Cancelled => SyncError::Cancelled,
            other => SyncError::Remote {
                operation,
                message: other.to_string(),
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
