//! Batch fossilizer
//!
//! Accepts a stream of digests, periodically commits them to an external
//! trust anchor as a single Merkle root and hands every submitter an
//! [`Evidence`] that proves inclusion without trusting the fossilizer.
//!
//! - [`Fossilizer`]: the driver (batching, sealing, anchoring, publishing)
//! - [`Anchor`]: the external capability, with [`DummyAnchor`] for tests
//! - [`Config`]: interval, batch size, persistence and retry settings
//! - [`Metrics`]: prometheus counters of completed batches
//! - [`BatchArchive`]: completed batches as stored on disk

mod anchor;
mod archive;
mod batch;
mod config;
mod error;
mod evidence;
mod fossilizer;
mod metrics;
mod wal;

pub use anchor::{Anchor, AnchorError, AnchorErrorKind, AnchorReceipt, DummyAnchor};
pub use archive::{archive_file_name, BatchArchive};
pub use batch::{BatchHandle, BatchState};
pub use config::{Config, DEFAULT_INTERVAL, DEFAULT_MAX_LEAVES};
pub use error::{ArchiveError, BatchError, BatchErrorKind, FossilizerError, PersistenceError};
pub use evidence::{Evidence, Fossil};
pub use fossilizer::{Fossilizer, Info};
pub use metrics::Metrics;
pub use wal::{segment_file_name, PENDING_LOG};

pub use async_trait::async_trait;
