//! Errors returned when building identifiers from text or raw bytes.

use thiserror::Error;

/// Error returned when a hex string cannot be decoded into a fixed-width identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The string does not hold exactly two hex characters per byte.
    #[error("invalid hex length: expected {expected} characters, got {actual}")]
    InvalidLength {
        /// Number of characters required (`2 * width`).
        expected: usize,
        /// Number of characters received.
        actual: usize,
    },
    /// The string contains a character outside `[0-9a-fA-F]`.
    #[error("invalid hex character {character:?} at index {index}")]
    InvalidCharacter {
        /// The offending character.
        character: char,
        /// Its position in the input.
        index: usize,
    },
}

/// Error returned when a byte slice does not have the identifier's width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid byte length: expected {expected} bytes, got {actual}")]
pub struct SizeError {
    /// Width of the identifier.
    pub expected: usize,
    /// Length of the slice received.
    pub actual: usize,
}
