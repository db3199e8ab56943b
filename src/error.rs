//! Error types for the rendering proxy

use thiserror::Error;

/// Result type alias for render operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while serving a render request
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to initialize the engine
    #[error("Engine initialization failed: {0}")]
    InitializationError(String),

    /// Failed to load a URL
    #[error("Failed to load URL: {0}")]
    LoadError(String),

    /// Failed to read the rendered document
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Failed to execute JavaScript
    #[error("Script execution failed: {0}")]
    ScriptError(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Network error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// The incoming (or returned) wire message could not be decoded
    #[error("Invalid render request: {0}")]
    Decode(#[from] DecodeError),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than the engine
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Decode(_))
    }
}

/// A single wire field failed to decode
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A mandatory field was not submitted
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// The field is not valid base64 or not UTF-8 once decoded
    #[error("field `{field}` is not valid encoded text: {reason}")]
    InvalidEncoding { field: &'static str, reason: String },

    /// The field decoded to text but the embedded JSON is malformed
    #[error("field `{field}` does not hold the expected JSON value: {reason}")]
    InvalidJson { field: &'static str, reason: String },

    /// The decoded URL is not an absolute URL
    #[error("`{0}` is not an absolute URL")]
    InvalidUrl(String),

    /// Only GET and POST navigations are supported
    #[error("unsupported method `{0}` (expected GET or POST)")]
    InvalidMethod(String),

    /// A boolean flag carried an unrecognised value
    #[error("field `{field}` is not a boolean: `{value}`")]
    InvalidFlag { field: &'static str, value: String },
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}
