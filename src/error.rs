//! Error types for compressed polynomial arrays.

use thiserror::Error;

/// Error variants for compressed array operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An index was provided that is out of the array's bounds.
    #[error("index out of bounds: {0}")]
    IndexOutOfBounds(usize),

    /// A serialized byte stream is malformed or inconsistent.
    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// An I/O error occurred during serialization or deserialization.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for compressed array operations.
pub type Result<T> = std::result::Result<T, Error>;
