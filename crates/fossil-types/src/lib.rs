//! Fixed-width identifiers for the fossilizer.
//!
//! This crate provides the byte primitives every other crate builds on:
//! - [`Id20`] / [`Id32`]: canonical 20- and 32-byte identifiers
//! - [`Id20Rev`] / [`Id32Rev`]: twins whose hex and JSON forms are byte-reversed
//! - strict hex parsing (exactly two characters per byte, either case)

mod bytes;
mod error;
mod reversed;

pub use bytes::FixedBytes;
pub use error::{ParseError, SizeError};
pub use reversed::ReversedBytes;

/// 20-byte identifier (e.g. a RIPEMD-160 digest or address).
pub type Id20 = FixedBytes<20>;

/// 32-byte identifier. Leaves, roots and every Merkle node are `Id32`.
pub type Id32 = FixedBytes<32>;

/// 20-byte identifier rendered byte-reversed.
pub type Id20Rev = ReversedBytes<20>;

/// 32-byte identifier rendered byte-reversed (e.g. a Bitcoin transaction id).
pub type Id32Rev = ReversedBytes<32>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases_have_expected_width() {
        assert_eq!(Id20::LEN, 20);
        assert_eq!(Id32::LEN, 32);
        assert_eq!(Id20Rev::LEN, 20);
        assert_eq!(Id32Rev::LEN, 32);
        assert_eq!(std::mem::size_of::<Id32Rev>(), 32);
    }

    #[test]
    fn test_default_is_zero() {
        assert_eq!(Id32::default(), Id32::ZERO);
        assert_eq!(Id20Rev::default().to_hex(), "00".repeat(20));
    }
}
