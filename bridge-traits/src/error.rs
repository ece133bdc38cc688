use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Bridge operation cancelled")]
    Cancelled,

    /// The remote resource does not exist (anymore).
    #[error("Not found: {0}")]
    NotFound(String),

    /// The archive is corrupt or in an unsupported format.
    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    /// An archive entry would resolve outside the extraction directory.
    #[error("Archive entry escapes destination directory: {entry}")]
    UnsafeArchiveEntry { entry: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether retrying the same operation could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::UnsafeArchiveEntry { .. }
                | Self::InvalidArchive(_)
                | Self::NotFound(_)
                | Self::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsafe_entry_is_not_retryable() {
        let error = BridgeError::UnsafeArchiveEntry {
            entry: "../evil.txt".to_string(),
        };
        assert!(!error.is_retryable());
        assert_eq!(
            error.to_string(),
            "Archive entry escapes destination directory: ../evil.txt"
        );

        assert!(!BridgeError::InvalidArchive("bad header".to_string()).is_retryable());
        assert!(!BridgeError::NotFound("file 7".to_string()).is_retryable());
        assert!(BridgeError::OperationFailed("boom".to_string()).is_retryable());
    }
}
