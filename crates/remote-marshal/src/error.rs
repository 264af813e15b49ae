//! Marshaling error types

use thiserror::Error;

/// Upper bound on a decoded sequence length, to prevent memory exhaustion
pub const MAX_SEQUENCE_ELEMENTS: u32 = 16 * 1024 * 1024;

/// Encoding/decoding errors
#[derive(Debug, Error)]
pub enum MarshalError {
    /// Buffer underflow - not enough data
    #[error("buffer underflow: needed {needed} bytes, have {have}")]
    BufferUnderflow { needed: usize, have: usize },

    /// A tag byte outside the range the type accepts
    #[error("invalid tag {tag:#04x} for {type_name}")]
    InvalidTag { type_name: &'static str, tag: u8 },

    /// Sequence length above [`MAX_SEQUENCE_ELEMENTS`]
    #[error("sequence length {requested} exceeds limit {limit}")]
    LengthLimitExceeded { requested: u32, limit: u32 },

    /// Fixed-size array decoded with the wrong element count
    #[error("array size mismatch: expected {expected}, got {got}")]
    ArraySizeMismatch { expected: usize, got: usize },

    /// Bytes left over after a complete value was read
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    /// UTF-8 decoding error
    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),

    /// Type-specific failure
    #[error("{0}")]
    Custom(String),
}

impl MarshalError {
    /// Build a type-specific error
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }
}

/// Result type for marshaling operations
pub type Result<T> = std::result::Result<T, MarshalError>;
