//! Domain error types
//!
//! `DomainError` covers validation of configured values. `DriveError` is the
//! taxonomy every remote operation reports through, so the sync engine can
//! decide what to retry and what to surface without knowing which backend
//! produced it.

use thiserror::Error;

/// Errors that can occur while validating domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid remote path format
    #[error("Invalid remote path: {0}")]
    InvalidRemotePath(String),

    /// Invalid local target path
    #[error("Invalid target path: {0}")]
    InvalidTargetPath(String),

    /// Invalid file extension entry
    #[error("Invalid extension: {0}")]
    InvalidExtension(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Guidance shown when the remote service blocks an account.
pub const ACCOUNT_BLOCKED_GUIDANCE: &str =
    "The account was blocked by the drive's risk control. Wait before retrying, \
     lower rate_limiting values, or log in again in a browser to clear the block.";

/// Errors reported by cloud-drive operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriveError {
    /// The API answered with an error envelope
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The API answered with a block page instead of data
    #[error("Account blocked: {0}")]
    AccountBlocked(String),

    /// A path, directory or file does not exist remotely
    #[error("Not found: {0}")]
    NotFound(String),

    /// A polled remote job did not finish before its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A download failed after it started
    #[error("Transfer failed: {0}")]
    Transfer(String),

    /// The surrounding run was cancelled
    #[error("Operation cancelled")]
    Cancelled,

    /// A payload could not be decoded (encryption envelope, JSON, text)
    #[error("Decode error: {0}")]
    Decode(String),

    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),
}

impl DriveError {
    /// Whether retrying the same operation can reasonably succeed.
    ///
    /// Blocks, missing objects, bad payloads and cancellation are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriveError::Protocol(_)
                | DriveError::Timeout(_)
                | DriveError::Transfer(_)
                | DriveError::Network(_)
        )
    }

    /// User-facing text for the error, with guidance for account blocks.
    pub fn user_message(&self) -> String {
        match self {
            DriveError::AccountBlocked(_) => ACCOUNT_BLOCKED_GUIDANCE.to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DriveError::NotFound("/media/tv".to_string());
        assert_eq!(err.to_string(), "Not found: /media/tv");

        let err = DomainError::InvalidExtension("mkv!".to_string());
        assert_eq!(err.to_string(), "Invalid extension: mkv!");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(DriveError::Network("reset".into()).is_retryable());
        assert!(DriveError::Transfer("eof".into()).is_retryable());
        assert!(DriveError::Timeout("export".into()).is_retryable());
        assert!(DriveError::Protocol("errno 990".into()).is_retryable());

        assert!(!DriveError::AccountBlocked("405".into()).is_retryable());
        assert!(!DriveError::NotFound("x".into()).is_retryable());
        assert!(!DriveError::Decode("bad base64".into()).is_retryable());
        assert!(!DriveError::Cancelled.is_retryable());
    }

    #[test]
    fn test_blocked_message_is_distinct() {
        let blocked = DriveError::AccountBlocked("<!doctypehtml>".into());
        assert_eq!(blocked.user_message(), ACCOUNT_BLOCKED_GUIDANCE);

        let generic = DriveError::Protocol("state false".into());
        assert_eq!(generic.user_message(), "Protocol error: state false");
    }
}
