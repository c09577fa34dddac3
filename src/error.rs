//! Error types for the read model.

use crate::types::OrderId;
use thiserror::Error;

/// Main error type for read model operations.
#[derive(Debug, Error)]
pub enum ReadModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Read model is locked by another process")]
    Locked,

    #[error("Read model not initialized")]
    NotInitialized,

    #[error("Read model already exists")]
    AlreadyExists,

    #[error("Invalid read model format: {0}")]
    InvalidFormat(String),

    /// An order snapshot that cannot be written (negative total, empty line).
    #[error("Invalid order {order_id}: {reason}")]
    InvalidOrder { order_id: OrderId, reason: String },

    /// Caller input rejected before any storage access.
    #[error("{0}")]
    Validation(String),

    /// The commerce system could not provide the requested data.
    #[error("Commerce error: {0}")]
    Commerce(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Config error: {0}")]
    Config(String),
}

impl ReadModelError {
    /// True for errors caused by caller input rather than by the system.
    pub fn is_validation(&self) -> bool {
        matches!(self, ReadModelError::Validation(_))
    }
}

impl From<rmp_serde::encode::Error> for ReadModelError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        ReadModelError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ReadModelError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        ReadModelError::Deserialization(e.to_string())
    }
}

impl From<serde_json::Error> for ReadModelError {
    fn from(e: serde_json::Error) -> Self {
        ReadModelError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for ReadModelError {
    fn from(e: toml::de::Error) -> Self {
        ReadModelError::Config(e.to_string())
    }
}

/// Result type for read model operations.
pub type Result<T> = std::result::Result<T, ReadModelError>;
