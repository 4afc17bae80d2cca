//! Lifecycle of a sealed batch
//!
//! ```text
//! Accepting -> Sealing -> Anchoring -> Publishing -> Done
//!                 \            \            \
//!                  `------------`------------`--> Failed
//! ```
//!
//! `Accepting` is owned by the [`Fossilizer`](crate::Fossilizer); everything
//! after it runs in one task per batch.

use std::{
    fmt,
    future::Future,
    mem,
    path::PathBuf,
    pin::Pin,
    sync::Arc,
    task::{Context as TaskContext, Poll},
    time::{Duration, Instant},
};

use fossil_merkle::StaticTree;
use fossil_types::Id32;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    anchor::{Anchor, AnchorError, AnchorReceipt},
    archive::BatchArchive,
    config::Config,
    error::{BatchError, BatchErrorKind, PersistenceError},
    evidence::{Evidence, Fossil},
    metrics::Metrics,
};

type Outcome = Result<Fossil, BatchError>;

/// Stage of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Open for submissions.
    Accepting,
    /// Closed; the tree is being built.
    Sealing,
    /// Waiting for the anchor to record the root.
    Anchoring,
    /// Delivering evidence to handles and subscribers.
    Publishing,
    /// Evidence delivered and the batch archived.
    Done,
    /// Ended without evidence.
    Failed,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Accepting => "accepting",
            Self::Sealing => "sealing",
            Self::Anchoring => "anchoring",
            Self::Publishing => "publishing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Resolves to the [`Fossil`] of one submitted leaf once its batch
/// completes, or to the error that ended the batch.
#[derive(Debug)]
pub struct BatchHandle {
    batch_number: u64,
    index: usize,
    rx: oneshot::Receiver<Outcome>,
}

impl BatchHandle {
    /// Batch the leaf was added to.
    pub const fn batch_number(&self) -> u64 {
        self.batch_number
    }

    /// Position of the leaf in its batch.
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Block the current thread until the batch completes.
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_wait(self) -> Outcome {
        let batch_number = self.batch_number;
        self.rx.blocking_recv().unwrap_or_else(|_| Err(dropped(batch_number)))
    }
}

impl Future for BatchHandle {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let batch_number = self.batch_number;
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or_else(|_| Err(dropped(batch_number))))
    }
}

const fn dropped(batch_number: u64) -> BatchError {
    BatchError::new(batch_number, BatchErrorKind::Cancelled("batch ended without a result"))
}

/// Sending half of a [`BatchHandle`].
#[derive(Debug)]
pub(crate) struct Waiter {
    index: usize,
    tx: oneshot::Sender<Outcome>,
}

impl Waiter {
    /// Create a waiter for leaf `index` of batch `batch_number` and its handle.
    pub(crate) fn new(batch_number: u64, index: usize) -> (Self, BatchHandle) {
        let (tx, rx) = oneshot::channel();
        (Self { index, tx }, BatchHandle { batch_number, index, rx })
    }

    /// Resolve the handle with `err`.
    pub(crate) fn fail(self, err: BatchError) {
        // The caller may have dropped its handle.
        let _ = self.tx.send(Err(err));
    }
}

/// State shared by every batch task.
pub(crate) struct Context {
    pub(crate) config: Config,
    pub(crate) anchor: Arc<dyn Anchor>,
    /// Bounds concurrent anchoring.
    pub(crate) permits: Semaphore,
    /// Fires when the shutdown deadline elapses.
    pub(crate) deadline: CancellationToken,
    pub(crate) subscribers: Mutex<Vec<mpsc::UnboundedSender<Fossil>>>,
    pub(crate) metrics: Metrics,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("network", &self.anchor.network())
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

impl Context {
    pub(crate) fn new(config: Config, anchor: Arc<dyn Anchor>, metrics: Metrics) -> Self {
        let permits = Semaphore::new(config.max_concurrent_anchors);
        Self {
            config,
            anchor,
            permits,
            deadline: CancellationToken::new(),
            subscribers: Mutex::new(Vec::new()),
            metrics,
        }
    }

    fn broadcast(&self, fossils: &[Fossil]) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| fossils.iter().all(|fossil| tx.send(fossil.clone()).is_ok()));
    }
}

/// A batch that no longer accepts leaves.
#[derive(Debug)]
pub(crate) struct SealedBatch {
    pub(crate) number: u64,
    pub(crate) leaves: Vec<Id32>,
    /// One entry per leaf.
    pub(crate) meta: Vec<Vec<u8>>,
    /// Ascending by index. Recovered leaves have no waiter.
    pub(crate) waiters: Vec<Waiter>,
    /// `batch-<N>.pending`, removed when the batch is done.
    pub(crate) segment: Option<PathBuf>,
}

impl SealedBatch {
    /// Drive the batch to `Done` or `Failed`.
    pub(crate) async fn run(mut self, ctx: Arc<Context>) {
        let number = self.number;
        let started = Instant::now();

        transition(number, BatchState::Sealing);
        let tree = match StaticTree::new(&self.leaves) {
            Ok(tree) => tree,
            Err(err) => return self.fail(BatchErrorKind::Tree(err)),
        };
        let root = tree.root();
        let paths: Result<Vec<_>, _> = (0..self.leaves.len())
            .map(|i| tree.path(i).map(|path| (i, path)))
            .collect();
        let paths = match paths {
            Ok(paths) => paths,
            Err(err) => return self.fail(BatchErrorKind::Tree(err)),
        };

        transition(number, BatchState::Anchoring);
        let receipt = match anchor_root(&ctx, number, root).await {
            Ok(receipt) => receipt,
            Err(kind) => return self.fail(kind),
        };

        transition(number, BatchState::Publishing);
        let mut meta = mem::take(&mut self.meta).into_iter();
        let fossils: Vec<Fossil> = paths
            .into_iter()
            .map(|(i, path)| Fossil {
                evidence: Evidence {
                    leaf_hash: self.leaves[i],
                    batch_number: number,
                    root,
                    path,
                    receipt: receipt.clone(),
                },
                meta: meta.next().unwrap_or_default(),
            })
            .collect();
        for waiter in mem::take(&mut self.waiters) {
            if let Some(fossil) = fossils.get(waiter.index) {
                let _ = waiter.tx.send(Ok(fossil.clone()));
            }
        }
        ctx.broadcast(&fossils);

        self.persist(&ctx, root, receipt).await;

        transition(number, BatchState::Done);
        ctx.metrics.record_batch(fossils.len());
        info!(
            target: "fossilizer",
            batch = number,
            leaves = fossils.len(),
            root = %root,
            elapsed = ?started.elapsed(),
            "batch fossilized"
        );
    }

    fn fail(self, kind: BatchErrorKind) {
        let err = BatchError::new(self.number, kind);
        warn!(
            target: "fossilizer",
            batch = self.number,
            leaves = self.leaves.len(),
            error = %err,
            "batch failed"
        );
        transition(self.number, BatchState::Failed);
        for waiter in self.waiters {
            waiter.fail(err.clone());
        }
    }

    /// Archive the batch and drop its segment. Failures are logged: the
    /// segment stays on disk and the batch is fossilized again on restart.
    async fn persist(&mut self, ctx: &Context, root: Id32, receipt: AnchorReceipt) {
        let Some(dir) = ctx.config.persist_path.clone() else {
            return;
        };
        let archive = ctx.config.archive.then(|| BatchArchive {
            batch_number: self.number,
            root,
            leaves: mem::take(&mut self.leaves),
            receipt,
        });
        let segment = self.segment.take();
        let fsync = ctx.config.fsync;

        let task = tokio::task::spawn_blocking(move || -> Result<(), PersistenceError> {
            if let Some(archive) = archive {
                archive.write(&dir, fsync)?;
            }
            if let Some(segment) = segment {
                std::fs::remove_file(&segment).map_err(PersistenceError::io(&segment))?;
            }
            Ok(())
        });

        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!(
                    target: "fossilizer",
                    batch = self.number,
                    error = %err,
                    "failed to archive batch"
                );
            }
            Err(err) => {
                error!(
                    target: "fossilizer",
                    batch = self.number,
                    error = %err,
                    "archive task failed"
                );
            }
        }
    }
}

fn transition(batch: u64, state: BatchState) {
    debug!(target: "fossilizer", batch, %state, "batch state");
}

/// Anchor `root`, retrying retryable errors with exponential backoff.
///
/// Each call runs in its own task: a timeout or the shutdown deadline stops
/// waiting for it but does not interrupt it.
async fn anchor_root(
    ctx: &Context,
    batch: u64,
    root: Id32,
) -> Result<AnchorReceipt, BatchErrorKind> {
    const DEADLINE: BatchErrorKind = BatchErrorKind::Cancelled("shutdown deadline elapsed");

    let _permit = tokio::select! {
        permit = ctx.permits.acquire() => {
            permit.map_err(|_| BatchErrorKind::Cancelled("anchor pool closed"))?
        }
        () = ctx.deadline.cancelled() => return Err(DEADLINE),
    };

    let timeout = ctx.config.anchor_timeout;
    let mut attempt = 0u32;
    loop {
        attempt += 1;

        let anchor = Arc::clone(&ctx.anchor);
        let call = tokio::spawn(async move { anchor.anchor(&root).await });
        let outcome = tokio::select! {
            res = tokio::time::timeout(timeout, call) => res,
            () = ctx.deadline.cancelled() => return Err(DEADLINE),
        };

        let err = match outcome {
            Ok(Ok(Ok(receipt))) => {
                debug!(target: "fossilizer", batch, attempt, receipt = %receipt, "root anchored");
                return Ok(receipt);
            }
            Ok(Ok(Err(err))) => err,
            Ok(Err(join)) => AnchorError::fatal(format!("anchor task failed: {join}")),
            Err(_) => AnchorError::retryable(format!("anchor call timed out after {timeout:?}")),
        };

        if !err.is_retryable() || attempt >= ctx.config.max_anchor_attempts {
            return Err(BatchErrorKind::Anchor { attempts: attempt, source: err });
        }

        let delay = backoff(&ctx.config, attempt);
        warn!(
            target: "fossilizer",
            batch,
            attempt,
            ?delay,
            error = %err,
            "anchor attempt failed, retrying"
        );
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = ctx.deadline.cancelled() => return Err(DEADLINE),
        }
    }
}

/// `min(base * 2^(attempt - 1), max)`, jittered into `[d / 2, d]`.
fn backoff(config: &Config, attempt: u32) -> Duration {
    let factor = 1u32 << attempt.saturating_sub(1).min(20);
    let delay = config.retry_base_delay.saturating_mul(factor).min(config.retry_max_delay);
    rand::thread_rng().gen_range(delay / 2..=delay)
}
