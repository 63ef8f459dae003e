//! Error types for Clover
//!
//! This module defines the error taxonomy shared by the conversation store,
//! the completion backend, the auth client, and the session operations,
//! using `thiserror` for ergonomic error handling.
//!
//! No variant is fatal: every failure path hands control back to the caller
//! with enough context to render a message and let the user retry.

use thiserror::Error;

/// Main error type for Clover operations
#[derive(Error, Debug)]
pub enum CloverError {
    /// Bad credentials, or a bearer token the remote side rejected
    ///
    /// Requires the user to sign in again.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Timeouts, refused connections, DNS failures
    #[error("Network error: {0}")]
    Network(String),

    /// The store rejected a write, or a response did not have the expected shape
    #[error("Remote validation error: {0}")]
    RemoteValidation(String),

    /// The fragment stream broke after it had started
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    /// The store no longer recognizes the conversation identifier
    #[error("Conversation not found: {0}")]
    NotFound(String),

    /// An operation needs a selected conversation and none is selected
    #[error("No conversation is selected")]
    NoSelection,

    /// A send is already in flight for this conversation
    #[error("A message is already being sent to conversation {0}")]
    Busy(String),

    /// Any other non-success status returned by a remote service
    #[error("Remote error {status}: {message}")]
    Remote {
        /// HTTP status code
        status: u16,
        /// Response body, verbatim
        message: String,
    },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

impl CloverError {
    /// Classify a transport-level `reqwest` failure
    ///
    /// Decode failures mean the remote answered with something we could not
    /// parse; everything else is treated as a network problem.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CloverError::RemoteValidation(err.to_string())
        } else {
            CloverError::Network(err.to_string())
        }
    }

    /// Map a non-success HTTP status and its body to an error variant
    ///
    /// # Arguments
    ///
    /// * `status` - Response status code
    /// * `body` - Response body text, surfaced verbatim
    /// * `subject` - What the request was about (a conversation id, or a
    ///   short description), used for `NotFound`
    ///
    /// # Examples
    ///
    /// ```
    /// use clover::error::CloverError;
    /// use reqwest::StatusCode;
    ///
    /// let err = CloverError::from_status(StatusCode::NOT_FOUND, "", "abc");
    /// assert!(matches!(err, CloverError::NotFound(id) if id == "abc"));
    /// ```
    pub fn from_status(status: reqwest::StatusCode, body: &str, subject: &str) -> Self {
        use reqwest::StatusCode;

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CloverError::Authentication(
                format!("{} ({}). Please sign in again", body.trim(), status),
            ),
            StatusCode::NOT_FOUND => CloverError::NotFound(subject.to_string()),
            StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                CloverError::RemoteValidation(body.to_string())
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                CloverError::Network(format!("{} ({})", body.trim(), status))
            }
            _ => CloverError::Remote {
                status: status.as_u16(),
                message: body.to_string(),
            },
        }
    }

    /// Returns `true` when the user must sign in again before retrying
    pub fn requires_reauthentication(&self) -> bool {
        matches!(self, CloverError::Authentication(_))
    }
}

/// Result type alias for Clover operations
pub type Result<T> = std::result::Result<T, CloverError>;
