//! Error types for calq-core

use thiserror::Error;

/// Main error type for the calq-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A required argument was missing or malformed
    #[error("invalid argument: {0}")]
    Validation(String),

    /// `identify` was called with a different actor on an identified session
    #[error("identify() must not be called more than once for the same user (current actor {current:?}, requested {requested:?})")]
    AlreadyIdentified { current: String, requested: String },

    /// `profile` was called before the session was identified
    #[error("a client must be identified (call identify()) before calling profile()")]
    ProfileWhileAnonymous,

    /// The cookie could not be written because output has already started
    #[error("unable to write cookie {name:?}: headers have already been sent")]
    HeadersSent { name: String },

    /// No response from the API server after exhausting retries
    #[error("failed to reach Calq API server ({host}) for {endpoint} after {retries} retries")]
    DeliveryFailed {
        host: String,
        endpoint: String,
        retries: u32,
    },

    /// The API server answered with a non-200 status
    #[error("Calq API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// HTTP transport could not be constructed
    #[error("transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Shorthand for [`Error::Validation`]
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }
}

/// Result type alias for calq-core
pub type Result<T> = std::result::Result<T, Error>;
