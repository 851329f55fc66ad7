/*!
Error types for the Mongovault core engine.
*/

use thiserror::Error;

/// Result type used throughout the Mongovault core.
pub type Result<T> = std::result::Result<T, VaultError>;

/// Errors that can occur during backup and restore operations.
#[derive(Error, Debug)]
pub enum VaultError {
    /// The server could not be reached at all (network, DNS, connection refused)
    #[error("Connection unavailable: {0}")]
    ConnectionUnavailable(String),

    /// The server did not become selectable within the selection window
    #[error("Server selection timed out: {0}")]
    ServerTimeout(String),

    /// A single encoded line could not be decoded back into a document
    #[error("Malformed record on line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    /// Transfer of one collection failed, on either the backup or restore side
    #[error("Transfer of collection '{collection}' failed: {reason}")]
    CollectionTransferFailed { collection: String, reason: String },

    /// A run finished with fewer successful collections than attempted
    #[error("Run incomplete: {succeeded} of {attempted} collections succeeded")]
    RunIncomplete { succeeded: usize, attempted: usize },

    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors reported by the database driver
    #[error("Database error: {0}")]
    Database(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl VaultError {
    /// Create a new connection-unavailable error
    pub fn connection_unavailable<S: Into<String>>(msg: S) -> Self {
        Self::ConnectionUnavailable(msg.into())
    }

    /// Create a new server-timeout error
    pub fn server_timeout<S: Into<String>>(msg: S) -> Self {
        Self::ServerTimeout(msg.into())
    }

    /// Create a new malformed-record error for the given 1-based line number
    pub fn malformed_record<S: Into<String>>(line: u64, reason: S) -> Self {
        Self::MalformedRecord {
            line,
            reason: reason.into(),
        }
    }

    /// Create a new per-collection transfer failure
    pub fn collection_failed<S1, S2>(collection: S1, reason: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        Self::CollectionTransferFailed {
            collection: collection.into(),
            reason: reason.into(),
        }
    }

    /// Create a new database error
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// True for errors that mean the session itself is unusable.
    ///
    /// These abort a whole run before any file I/O; everything else is
    /// recoverable at the line or collection level.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionUnavailable(_) | Self::ServerTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VaultError::malformed_record(17, "unexpected end of input");
        assert_eq!(
            err.to_string(),
            "Malformed record on line 17: unexpected end of input"
        );

        let err = VaultError::collection_failed("orders", "duplicate key");
        assert!(err.to_string().contains("orders"));
        assert!(err.to_string().contains("duplicate key"));
    }

    #[test]
    fn test_connection_error_classification() {
        assert!(VaultError::connection_unavailable("refused").is_connection_error());
        assert!(VaultError::server_timeout("no server selected").is_connection_error());
        assert!(!VaultError::validation("bad port").is_connection_error());
        assert!(!VaultError::malformed_record(1, "x").is_connection_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: VaultError = io_err.into();
        assert!(matches!(err, VaultError::Io(_)));
    }
}
