//! Error types for the SCUM admin client.

use thiserror::Error;

/// Errors that can occur when using the admin client.
#[derive(Debug, Error)]
pub enum AdminClientError {
    /// The request could not be delivered or the response could not be read.
    #[error("http transport error: {0}")]
    Http(String),

    /// The backend answered with a non-success status code.
    #[error("unexpected status {status}: {message}")]
    Status {
        /// HTTP status code returned by the backend.
        status: u16,
        /// Error text from the response body, or the raw body when it had none.
        message: String,
    },

    /// Login or registration was refused by the backend.
    #[error("authentication rejected: {message}")]
    AuthRejected {
        /// Message shown to the operator.
        message: String,
    },

    /// A session was missing its token or its user identity.
    #[error("session is incomplete")]
    IncompleteSession,

    /// Failed to serialize or deserialize a JSON payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The durable key-value store could not be read or written.
    #[error("storage error: {0}")]
    Storage(String),

    /// A request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// An operation requires a session, but none is present.
    #[error("not authenticated")]
    NotAuthenticated,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for admin client operations.
pub type Result<T> = std::result::Result<T, AdminClientError>;
