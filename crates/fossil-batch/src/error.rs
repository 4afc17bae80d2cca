//! Error types for the fossilizer

use std::{io, path::PathBuf, sync::Arc, time::Duration};

use fossil_merkle::TreeError;
use fossil_types::Id32;
use thiserror::Error;

use crate::anchor::AnchorError;

/// Error returned by [`Fossilizer`](crate::Fossilizer) operations.
#[derive(Debug, Clone, Error)]
pub enum FossilizerError {
    /// The fossilizer no longer accepts submissions.
    #[error("fossilizer is shut down")]
    Stopped,
    /// An earlier persistence failure disabled submissions.
    #[error("fossilizer disabled after persistence failure: {0}")]
    Poisoned(Arc<PersistenceError>),
    /// Batches were still in flight when the shutdown deadline elapsed.
    #[error("shutdown deadline of {timeout:?} elapsed with {in_flight} tasks in flight")]
    ShutdownDeadline {
        /// Configured deadline.
        timeout: Duration,
        /// Tasks still running when it elapsed.
        in_flight: usize,
    },
    /// Reading or writing the persistence directory failed.
    #[error(transparent)]
    Persistence(Arc<PersistenceError>),
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The metric counters could not be registered.
    #[error("failed to register metrics: {0}")]
    Metrics(Arc<prometheus::Error>),
}

impl From<PersistenceError> for FossilizerError {
    fn from(err: PersistenceError) -> Self {
        Self::Persistence(Arc::new(err))
    }
}

impl From<prometheus::Error> for FossilizerError {
    fn from(err: prometheus::Error) -> Self {
        Self::Metrics(Arc::new(err))
    }
}

/// Failure to read or write the pending log or an archive.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Filesystem error.
    #[error("i/o error on {}: {}", .path.display(), .source)]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
    /// A file exists but cannot be decoded.
    #[error("corrupt file {}: {}", .path.display(), .source)]
    Corrupt {
        /// File involved.
        path: PathBuf,
        /// Decoding error.
        #[source]
        source: ArchiveError,
    },
}

impl PersistenceError {
    /// Adapter for `map_err` that attaches `path` to an I/O error.
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Failure to decode a `batch-<N>.archive` file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ArchiveError {
    /// The input ends before the field at `offset`.
    #[error("truncated archive: needed {needed} bytes at offset {offset}")]
    Truncated {
        /// Offset of the field being read.
        offset: usize,
        /// Bytes required from that offset.
        needed: usize,
    },
    /// Bytes remain after the receipt.
    #[error("{0} trailing bytes after receipt")]
    TrailingBytes(usize),
    /// The archive declares zero leaves.
    #[error("archive has no leaves")]
    Empty,
    /// The stored root does not match the leaves.
    #[error("root mismatch: stored {stored}, computed {computed}")]
    RootMismatch {
        /// Root written in the archive.
        stored: Id32,
        /// Root rebuilt from the archived leaves.
        computed: Id32,
    },
}

/// Terminal error delivered to a [`BatchHandle`](crate::BatchHandle).
#[derive(Debug, Clone, Error)]
#[error("batch {batch_number} failed: {kind}")]
pub struct BatchError {
    /// Batch the submission belonged to.
    pub batch_number: u64,
    /// Cause.
    pub kind: BatchErrorKind,
}

impl BatchError {
    pub(crate) const fn new(batch_number: u64, kind: BatchErrorKind) -> Self {
        Self { batch_number, kind }
    }
}

/// Cause of a [`BatchError`].
#[derive(Debug, Clone, Error)]
pub enum BatchErrorKind {
    /// The tree could not be built.
    #[error(transparent)]
    Tree(#[from] TreeError),
    /// Anchoring failed permanently or ran out of attempts.
    #[error("anchoring failed after {attempts} attempt(s): {source}")]
    Anchor {
        /// Attempts made.
        attempts: u32,
        /// Last error returned.
        #[source]
        source: AnchorError,
    },
    /// The batch never completed: shutdown cancelled it.
    #[error("cancelled: {0}")]
    Cancelled(&'static str),
    /// The pending log could not be written.
    #[error(transparent)]
    Persistence(Arc<PersistenceError>),
}
