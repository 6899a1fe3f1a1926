//! Typed errors for the core primitives.
//!
//! Request handlers never unwind; failures travel as `Status` bytes on the
//! wire. `CoreError` covers the cases that happen before a request exists,
//! such as startup I/O and entropy failures.

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("system entropy source failed: {0}")]
    Rng(String),

    #[error("invalid hex input: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("hex input decodes to {actual} bytes, expected {expected}")]
    HexLength { expected: usize, actual: usize },

    #[error("denomination {0} outside [-8, 6]")]
    InvalidDenomination(i8),

    #[error("serial number {0} out of range")]
    SerialOutOfRange(u32),
}
