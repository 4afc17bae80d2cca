//! Byte-reversed identifiers.
//!
//! Some anchors (Bitcoin in particular) store transaction identifiers
//! little-endian but display them big-endian. [`ReversedBytes`] stores the
//! little-endian form and renders the big-endian one, so the reversal happens
//! once, in the type, rather than at every call site.

use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    bytes::{decode_fixed, FixedBytes, HexVisitor},
    error::{ParseError, SizeError},
};

/// A byte array of exactly `N` bytes whose text forms are byte-reversed.
///
/// Storage is identical to [`FixedBytes`]; `to_hex`, `Display` and serde all
/// render the bytes in reverse order, so the wire hex of a reversed id equals
/// the hex of its canonical twin.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ReversedBytes<const N: usize>(pub [u8; N]);

impl<const N: usize> ReversedBytes<N> {
    /// Width of the identifier in bytes.
    pub const LEN: usize = N;

    /// All-zero identifier.
    pub const ZERO: Self = Self([0u8; N]);

    /// Wrap an array holding the already-reversed bytes.
    pub const fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    /// Copy from a slice that must be exactly `N` bytes long.
    pub fn from_slice(src: &[u8]) -> Result<Self, SizeError> {
        FixedBytes::<N>::from_slice(src).map(|b| Self(b.0))
    }

    /// Parse the displayed (reversed) hex form.
    pub fn from_hex(src: &str) -> Result<Self, ParseError> {
        decode_fixed::<N>(src).map(Self::from_displayed)
    }

    /// Lowercase hex of the bytes in reverse order.
    pub fn to_hex(&self) -> String {
        self.canonical().to_hex()
    }

    /// Borrow the stored bytes.
    pub const fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    /// Consume and return the stored bytes.
    pub const fn into_inner(self) -> [u8; N] {
        self.0
    }

    /// Write these bytes into `out` in reverse order. `self` is left untouched.
    pub fn reverse_into(&self, out: &mut FixedBytes<N>) {
        for (dst, src) in out.0.iter_mut().zip(self.0.iter().rev()) {
            *dst = *src;
        }
    }

    /// Canonical twin: the bytes as they are displayed.
    pub fn canonical(&self) -> FixedBytes<N> {
        let mut out = FixedBytes::ZERO;
        self.reverse_into(&mut out);
        out
    }

    fn from_displayed(displayed: [u8; N]) -> Self {
        FixedBytes(displayed).reversed()
    }
}

impl<const N: usize> Default for ReversedBytes<N> {
    fn default() -> Self {
        Self::ZERO
    }
}

// Compare on the canonical form without materialising it.
impl<const N: usize> Ord for ReversedBytes<N> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.iter().rev().cmp(other.0.iter().rev())
    }
}

impl<const N: usize> PartialOrd for ReversedBytes<N> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<const N: usize> fmt::Debug for ReversedBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReversedBytes<{}>({self})", N)
    }
}

impl<const N: usize> fmt::Display for ReversedBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(self, f)
    }
}

impl<const N: usize> fmt::LowerHex for ReversedBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            f.write_str("0x")?;
        }
        for byte in self.0.iter().rev() {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl<const N: usize> FromStr for ReversedBytes<N> {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl<const N: usize> From<[u8; N]> for ReversedBytes<N> {
    fn from(bytes: [u8; N]) -> Self {
        Self(bytes)
    }
}

impl<const N: usize> TryFrom<&[u8]> for ReversedBytes<N> {
    type Error = SizeError;

    fn try_from(src: &[u8]) -> Result<Self, Self::Error> {
        Self::from_slice(src)
    }
}

impl<const N: usize> AsRef<[u8]> for ReversedBytes<N> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const N: usize> Serialize for ReversedBytes<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de, const N: usize> Deserialize<'de> for ReversedBytes<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(HexVisitor::new(Self::from_displayed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Id20, Id20Rev, Id32Rev};

    /// `12 34 56 78 90` repeated to 20 bytes.
    fn sample_bytes() -> [u8; 20] {
        let mut out = [0u8; 20];
        for (i, b) in out.iter_mut().enumerate() {
            *b = [0x12, 0x34, 0x56, 0x78, 0x90][i % 5];
        }
        out
    }

    #[test]
    fn test_hex_is_reversed() {
        let rev = Id20Rev::new(sample_bytes());
        assert_eq!(rev.to_hex(), "9078563412".repeat(4));
        assert_eq!(Id20::new(sample_bytes()).to_hex(), "1234567890".repeat(4));
    }

    #[test]
    fn test_json_scenario() {
        let canonical = Id20::new(sample_bytes());
        let reversed = Id20Rev::new(sample_bytes());

        let canonical_json = serde_json::to_string(&canonical).unwrap();
        let reversed_json = serde_json::to_string(&reversed).unwrap();
        assert_eq!(canonical_json, format!("\"{}\"", "1234567890".repeat(4)));
        assert_eq!(reversed_json, format!("\"{}\"", "9078563412".repeat(4)));

        let decoded: Id20Rev = serde_json::from_str(&reversed_json).unwrap();
        assert_eq!(decoded.into_inner(), sample_bytes());

        // The canonical twin renders exactly the wire hex.
        let mut twin = Id20::ZERO;
        decoded.reverse_into(&mut twin);
        assert_eq!(twin.to_hex(), "9078563412".repeat(4));
        assert_eq!(twin.reversed(), decoded);
    }

    #[test]
    fn test_canonical_and_reversed_parse_differ() {
        let src = "00112233445566778899aabbccddeeff00112233";
        let canonical = Id20::from_hex(src).unwrap();
        let reversed = Id20Rev::from_hex(src).unwrap();
        assert_ne!(canonical.into_inner(), reversed.into_inner());
        assert_eq!(reversed.to_hex(), src);

        let palindrome = "ab".repeat(32);
        assert_eq!(
            Id32Rev::from_hex(&palindrome).unwrap().into_inner(),
            crate::Id32::from_hex(&palindrome).unwrap().into_inner()
        );
    }

    #[test]
    fn test_ordering_follows_canonical_form() {
        let mut low = [0u8; 20];
        let mut high = [0u8; 20];
        // Last stored byte is the first displayed byte.
        low[0] = 0xff;
        high[19] = 0x01;
        assert!(Id20Rev::new(high) > Id20Rev::new(low));
        assert_eq!(
            Id20Rev::new(high).cmp(&Id20Rev::new(low)),
            Id20Rev::new(high).canonical().cmp(&Id20Rev::new(low).canonical())
        );
    }

    #[test]
    fn test_from_hex_errors_match_canonical() {
        assert_eq!(
            Id20Rev::from_hex("zz"),
            Err(ParseError::InvalidLength { expected: 40, actual: 2 })
        );
        assert!(matches!(
            Id20Rev::from_hex(&"q".repeat(40)),
            Err(ParseError::InvalidCharacter { character: 'q', index: 0 })
        ));
    }
}
