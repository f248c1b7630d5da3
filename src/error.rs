//! Error types for StrataKV
//!
//! Provides a unified error type for all operations. A missing key is not an
//! error: lookups return `Option`.

use thiserror::Error;

/// Result type alias using StrataError
pub type Result<T> = std::result::Result<T, StrataError>;

/// Unified error type for StrataKV operations
#[derive(Debug, Error)]
pub enum StrataError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Integrity Errors
    // -------------------------------------------------------------------------
    /// Checksum or format violation in a WAL, table or manifest file
    #[error("Corruption: {0}")]
    Corruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Usage Errors
    // -------------------------------------------------------------------------
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Another handle or process holds exclusive access to the location
    #[error("Database is locked: {0}")]
    Locked(String),

    #[error("Database is not open")]
    NotOpen,

    // -------------------------------------------------------------------------
    // Background Errors
    // -------------------------------------------------------------------------
    /// A background failure that makes further writes unsafe
    #[error("Background error: {0}")]
    Background(String),
}

impl StrataError {
    pub(crate) fn corruption(msg: impl Into<String>) -> Self {
        StrataError::Corruption(msg.into())
    }

    /// Whether this error reports damaged on-disk data
    pub fn is_corruption(&self) -> bool {
        matches!(self, StrataError::Corruption(_))
    }
}

impl From<bincode::Error> for StrataError {
    fn from(err: bincode::Error) -> Self {
        StrataError::Serialization(err.to_string())
    }
}

impl From<lz4_flex::block::DecompressError> for StrataError {
    fn from(err: lz4_flex::block::DecompressError) -> Self {
        StrataError::Corruption(format!("block decompression failed: {}", err))
    }
}
