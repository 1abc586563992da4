//! Error types for data parsing in gattlink-types.

use thiserror::Error;

/// Errors that can occur when parsing GATT descriptor data.
///
/// This error type is platform-agnostic and does not include
/// transport errors (those belong in gattlink-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Not enough bytes to decode the value.
    #[error("Insufficient bytes: requires {expected} bytes, got {actual}")]
    InsufficientBytes {
        /// Number of bytes required.
        expected: usize,
        /// Number of bytes supplied.
        actual: usize,
    },

    /// The bytes decoded to a value outside the defined range.
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Result type alias using gattlink-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
