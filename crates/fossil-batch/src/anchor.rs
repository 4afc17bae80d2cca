//! Anchor capability
//!
//! An anchor takes a 32-byte root and returns an opaque receipt once the root
//! is durably recorded by an external trust root (typically a blockchain
//! transaction id). The driver owns timeouts, retries and parallelism; an
//! implementation only classifies its failures as retryable or fatal.

use std::{error::Error as StdError, fmt, sync::Arc};

use async_trait::async_trait;
use fossil_merkle::Sha256Hasher;
use fossil_types::Id32;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Opaque proof that a root was anchored. Serialized as lowercase hex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AnchorReceipt(Vec<u8>);

impl AnchorReceipt {
    /// Wrap raw receipt bytes.
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrow the receipt bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the receipt.
    pub fn into_inner(self) -> Vec<u8> {
        self.0
    }

    /// Lowercase hex, no prefix.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Number of receipt bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the receipt is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for AnchorReceipt {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<Id32> for AnchorReceipt {
    fn from(id: Id32) -> Self {
        Self(id.into_inner().to_vec())
    }
}

impl fmt::Display for AnchorReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for AnchorReceipt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AnchorReceipt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map(Self).map_err(de::Error::custom)
    }
}

/// Whether an anchor failure is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorErrorKind {
    /// Transient: network hiccup, rate limit, timeout.
    Retryable,
    /// Permanent: the same call will fail again.
    Fatal,
}

impl fmt::Display for AnchorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retryable => f.write_str("retryable"),
            Self::Fatal => f.write_str("fatal"),
        }
    }
}

/// Error returned by [`Anchor::anchor`].
#[derive(Debug, Clone, Error)]
#[error("{kind} anchor error: {source}")]
pub struct AnchorError {
    kind: AnchorErrorKind,
    #[source]
    source: Arc<dyn StdError + Send + Sync>,
}

impl AnchorError {
    /// A failure the driver should retry.
    pub fn retryable(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self { kind: AnchorErrorKind::Retryable, source: Arc::from(err.into()) }
    }

    /// A failure that ends the batch.
    pub fn fatal(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self { kind: AnchorErrorKind::Fatal, source: Arc::from(err.into()) }
    }

    /// Kind of failure.
    pub const fn kind(&self) -> AnchorErrorKind {
        self.kind
    }

    /// Whether the driver retries this error.
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind, AnchorErrorKind::Retryable)
    }
}

/// External trust anchor.
#[async_trait]
pub trait Anchor: Send + Sync {
    /// Name of the network roots are anchored to (e.g. `bitcoin:test3`).
    fn network(&self) -> &str;

    /// Anchor `root` and return the receipt once it is durably recorded.
    async fn anchor(&self, root: &Id32) -> Result<AnchorReceipt, AnchorError>;
}

/// Anchor that records nothing; the receipt is `SHA256(root)`.
#[derive(Debug, Clone)]
pub struct DummyAnchor {
    network: String,
}

impl DummyAnchor {
    /// Create a dummy anchor reporting the `dummy` network.
    pub fn new() -> Self {
        Self { network: "dummy".to_string() }
    }

    /// Create a dummy anchor reporting `network`.
    pub fn with_network(network: impl Into<String>) -> Self {
        Self { network: network.into() }
    }

    /// Receipt this anchor returns for `root`.
    pub fn receipt_for(root: &Id32) -> AnchorReceipt {
        Sha256Hasher::hash(root.as_bytes()).into()
    }
}

impl Default for DummyAnchor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Anchor for DummyAnchor {
    fn network(&self) -> &str {
        &self.network
    }

    async fn anchor(&self, root: &Id32) -> Result<AnchorReceipt, AnchorError> {
        Ok(Self::receipt_for(root))
    }
}
