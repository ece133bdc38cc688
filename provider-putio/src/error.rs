//! Error types for the put.io provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// put.io provider errors
#[derive(Error, Debug)]
pub enum PutioError {
    /// Token was rejected by the API
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The file or zip does not exist (HTTP 404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// API request returned an error
    #[error("put.io API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// The server gave up building an archive
    #[error("Zip {zip_id} failed on the server: {status}")]
    ArchiveFailed { zip_id: String, status: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for put.io operations
pub type Result<T> = std::result::Result<T, PutioError>;

impl From<PutioError> for BridgeError {
    fn from(error: PutioError) -> Self {
        match error {
            PutioError::AuthenticationFailed(msg) => {
                BridgeError::OperationFailed(format!("Authentication failed: {}", msg))
            }
            PutioError::NotFound(msg) => BridgeError::NotFound(msg),
            PutioError::ApiError {
                status_code,
                message,
            } => BridgeError::OperationFailed(format!(
                "API error (status {}): {}",
                status_code, message
            )),
            PutioError::ArchiveFailed { zip_id, status } => BridgeError::OperationFailed(
                format!("Zip {} failed on the server: {}", zip_id, status),
            ),
            PutioError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            PutioError::BridgeError(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = PutioError::ApiError {
            status_code: 404,
            message: "File not found".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "put.io API error (status 404): File not found"
        );
    }

    #[test]
    fn test_error_conversion() {
        let error = PutioError::AuthenticationFailed("invalid_grant".to_string());
        let bridge_error: BridgeError = error.into();
        assert!(matches!(bridge_error, BridgeError::OperationFailed(_)));

        let missing: BridgeError = PutioError::NotFound("file_id 7".to_string()).into();
        assert!(matches!(missing, BridgeError::NotFound(_)));

        let passthrough: BridgeError = PutioError::BridgeError(BridgeError::Cancelled).into();
        assert!(matches!(passthrough, BridgeError::Cancelled));
    }
}
