//! Client error types

use thiserror::Error;

/// Client error type
///
/// Text reported by the native core is carried verbatim; see [`ClientError::message`].
#[derive(Error, Debug)]
pub enum ClientError {
    /// Host value could not be serialized for the boundary
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Native response was not the expected envelope
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// Native core reported an evaluation failure
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Native core could not resolve or parse a table
    #[error("Decision load error: {0}")]
    DecisionLoad(String),

    /// Callback token is not registered (wrapper bug, not a usage error)
    #[error("Invalid handle: {0}")]
    InvalidHandle(usize),

    /// Native library could not be opened or lacks the entry symbol
    #[error("Library error: {0}")]
    Library(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Message without the kind prefix.
    ///
    /// For `Evaluation` and `DecisionLoad` this is exactly the native text.
    pub fn message(&self) -> String {
        match self {
            ClientError::Encoding(m)
            | ClientError::Decoding(m)
            | ClientError::Evaluation(m)
            | ClientError::DecisionLoad(m)
            | ClientError::Library(m)
            | ClientError::Config(m) => m.clone(),
            ClientError::InvalidHandle(token) => format!("token {} is not registered", token),
        }
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
