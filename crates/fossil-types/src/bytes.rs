//! Canonical fixed-width byte identifiers.

use std::{fmt, marker::PhantomData, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{
    error::{ParseError, SizeError},
    reversed::ReversedBytes,
};

/// Decode exactly `2 * N` hex characters (either case) into `N` bytes.
pub(crate) fn decode_fixed<const N: usize>(src: &str) -> Result<[u8; N], ParseError> {
    if src.len() != N * 2 {
        return Err(ParseError::InvalidLength { expected: N * 2, actual: src.len() });
    }

    let mut out = [0u8; N];
    hex::decode_to_slice(src, &mut out).map_err(|err| match err {
        hex::FromHexError::InvalidHexCharacter { c, index } => {
            ParseError::InvalidCharacter { character: c, index }
        }
        hex::FromHexError::OddLength | hex::FromHexError::InvalidStringLength => {
            ParseError::InvalidLength { expected: N * 2, actual: src.len() }
        }
    })?;
    Ok(out)
}

/// Visitor shared by the canonical and reversed serde impls: both travel as a
/// hex string and differ only in how the decoded bytes are stored.
pub(crate) struct HexVisitor<T, const N: usize> {
    build: fn([u8; N]) -> T,
    _marker: PhantomData<T>,
}

impl<T, const N: usize> HexVisitor<T, N> {
    pub(crate) const fn new(build: fn([u8; N]) -> T) -> Self {
        Self { build, _marker: PhantomData }
    }
}

impl<T, const N: usize> de::Visitor<'_> for HexVisitor<T, N> {
    type Value = T;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a hex string of {} characters", N * 2)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        decode_fixed::<N>(v).map(self.build).map_err(E::custom)
    }
}

/// A byte array of exactly `N` bytes in canonical order.
///
/// Hex and JSON representations follow the stored byte order. Ordering is
/// lexicographic on the bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct FixedBytes<const N: usize>(pub [u8; N]);

impl<const N: usize> FixedBytes<N> {
    /// Width of the identifier in bytes.
    pub const LEN: usize = N;

    /// All-zero identifier.
    pub const ZERO: Self = Self([0u8; N]);

    /// Wrap an array.
    pub const fn new(bytes: [u8; N]) -> Self {
        Self(bytes)
    }

    /// Copy from a slice that must be exactly `N` bytes long.
    pub fn from_slice(src: &[u8]) -> Result<Self, SizeError> {
        <[u8; N]>::try_from(src)
            .map(Self)
            .map_err(|_| SizeError { expected: N, actual: src.len() })
    }

    /// Parse from exactly `2 * N` hex characters, upper or lower case.
    pub fn from_hex(src: &str) -> Result<Self, ParseError> {
        decode_fixed(src).map(Self)
    }

    /// Lowercase hex encoding without prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Borrow the underlying array.
    pub const fn as_bytes(&self) -> &[u8; N] {
        &self.0
    }

    /// Consume and return the underlying array.
    pub const fn into_inner(self) -> [u8; N] {
        self.0
    }

    /// Write these bytes into `out` in reverse order. `self` is left untouched.
    pub fn reverse_into(&self, out: &mut ReversedBytes<N>) {
        for (dst, src) in out.0.iter_mut().zip(self.0.iter().rev()) {
            *dst = *src;
        }
    }

    /// Byte-reversed twin of this identifier.
    pub fn reversed(&self) -> ReversedBytes<N> {
        let mut out = ReversedBytes::ZERO;
        self.reverse_into(&mut out);
        out
    }
}

impl<const N: usize> Default for FixedBytes<N> {
    fn default() -> Self {
        Self::ZERO
    }
}

impl<const N: usize> fmt::Debug for FixedBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FixedBytes<{}>({self})", N)
    }
}

impl<const N: usize> fmt::Display for FixedBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(self, f)
    }
}

impl<const N: usize> fmt::LowerHex for FixedBytes<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            f.write_str("0x")?;
        }
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl<const N: usize> FromStr for FixedBytes<N> {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl<const N: usize> From<[u8; N]> for FixedBytes<N> {
    fn from(bytes: [u8; N]) -> Self {
        Self(bytes)
    }
}

impl<const N: usize> From<FixedBytes<N>> for [u8; N] {
    fn from(id: FixedBytes<N>) -> Self {
        id.0
    }
}

impl<const N: usize> TryFrom<&[u8]> for FixedBytes<N> {
    type Error = SizeError;

    fn try_from(src: &[u8]) -> Result<Self, Self::Error> {
        Self::from_slice(src)
    }
}

impl<const N: usize> AsRef<[u8]> for FixedBytes<N> {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<const N: usize> AsRef<[u8; N]> for FixedBytes<N> {
    fn as_ref(&self) -> &[u8; N] {
        &self.0
    }
}

impl<const N: usize> Serialize for FixedBytes<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de, const N: usize> Deserialize<'de> for FixedBytes<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(HexVisitor::new(Self))
    }
}
