use thiserror::Error;

use crate::config::ConfigError;
use crate::transport::TransportError;

/// Errors surfaced while bootstrapping or executing actions
#[derive(Debug, Error)]
pub enum SyncError {
    /// The attempt this work belongs to has been superseded
    #[error("connection attempt superseded")]
    Stale,

    #[error("not connected")]
    NotConnected,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Unexpected payload at {path}: {reason}")]
    Payload { path: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Action options that cannot be executed
    #[error("{0}")]
    InvalidOptions(String),
}

impl SyncError {
    pub fn payload(path: impl Into<String>, reason: impl ToString) -> Self {
        SyncError::Payload {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, SyncError::Stale)
    }
}
