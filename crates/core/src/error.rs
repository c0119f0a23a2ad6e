//! Error types for Porter Core

use thiserror::Error;

use crate::models::RoleId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Role not found: {0}")]
    RoleNotFound(RoleId),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Platform error: {0}")]
    Platform(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True for the insufficient-privilege condition the platform reports
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Error::PermissionDenied(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
