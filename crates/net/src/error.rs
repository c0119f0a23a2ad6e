//! Network error types

use std::io;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection rejected: {0}")]
    Rejected(String),

    #[error("Not connected")]
    NotConnected,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
}

impl From<Error> for porter_core::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Api { status: 403, message } => porter_core::Error::PermissionDenied(message),
            Error::Io(e) => porter_core::Error::Io(e),
            other => porter_core::Error::Platform(other.to_string()),
        }
    }
}
