//! Batch fossilizer
//!
//! Collects leaves into the current batch and seals it when the interval
//! ticks or the batch is full. Each sealed batch runs in its own task (see
//! [`batch`](crate::batch)); a semaphore bounds how many anchor at once.

use std::{
    fmt, io, mem,
    path::Path,
    sync::{Arc, Weak},
    time::Duration,
};

use fossil_types::Id32;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{runtime::Handle, sync::mpsc, time::MissedTickBehavior};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, warn};

use crate::{
    anchor::Anchor,
    batch::{BatchHandle, BatchState, Context, SealedBatch, Waiter},
    config::Config,
    error::{BatchError, BatchErrorKind, FossilizerError, PersistenceError},
    evidence::Fossil,
    metrics::Metrics,
    wal::{self, PendingLog, PENDING_LOG},
};

const NAME: &str = "batchfossilizer";
const DESCRIPTION: &str = "Batch Fossilizer";

/// Static description of a running fossilizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    /// Service name.
    pub name: String,
    /// Human readable description.
    pub description: String,
    /// Crate version.
    pub version: String,
    /// Network reported by the anchor.
    pub network: String,
}

/// Batch being filled.
#[derive(Debug, Default)]
struct Current {
    accepting: bool,
    /// Set by the first persistence failure; refuses every later submission.
    poisoned: Option<Arc<PersistenceError>>,
    batch_number: u64,
    leaves: Vec<Id32>,
    meta: Vec<Vec<u8>>,
    waiters: Vec<Waiter>,
    wal: Option<PendingLog>,
}

struct Inner {
    ctx: Arc<Context>,
    current: Mutex<Current>,
    tracker: TaskTracker,
    /// Stops the interval ticker.
    stop: CancellationToken,
    runtime: Handle,
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inner")
            .field("ctx", &self.ctx)
            .field("tasks", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

/// Batches submitted leaves, anchors each batch root and publishes evidence.
///
/// Cheap to clone; clones share the same batches. `submit` may be called from
/// any thread, including threads outside the runtime.
#[derive(Debug, Clone)]
pub struct Fossilizer {
    inner: Arc<Inner>,
}

impl Fossilizer {
    /// Validate `config`, recover persisted leaves and start the interval
    /// ticker on the current runtime.
    pub async fn start(config: Config, anchor: Arc<dyn Anchor>) -> Result<Self, FossilizerError> {
        Self::launch(config, anchor, None).await
    }

    /// Like [`start`](Self::start), with a subscriber registered before
    /// recovery so it also receives the results of recovered batches.
    pub async fn start_subscribed(
        config: Config,
        anchor: Arc<dyn Anchor>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Fossil>), FossilizerError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let fossilizer = Self::launch(config, anchor, Some(tx)).await?;
        Ok((fossilizer, rx))
    }

    async fn launch(
        config: Config,
        anchor: Arc<dyn Anchor>,
        subscriber: Option<mpsc::UnboundedSender<Fossil>>,
    ) -> Result<Self, FossilizerError> {
        config.validate()?;
        let metrics = Metrics::new()?;

        info!(
            target: "fossilizer",
            network = anchor.network(),
            interval = ?config.interval,
            max_leaves = config.max_leaves,
            persist_path = ?config.persist_path,
            "starting fossilizer"
        );

        let restored = match config.persist_path.clone() {
            Some(dir) => {
                let (max_leaves, fsync) = (config.max_leaves, config.fsync);
                let task_dir = dir.clone();
                let task =
                    tokio::task::spawn_blocking(move || restore(&task_dir, max_leaves, fsync));
                let restored = task
                    .await
                    .map_err(|err| PersistenceError::io(&dir)(io::Error::other(err)))??;
                Some((dir, restored))
            }
            None => None,
        };

        let mut current = Current { accepting: true, ..Current::default() };
        let mut sealed = Vec::new();
        if let Some((dir, restored)) = restored {
            current.batch_number = restored.next_batch;
            current.meta = vec![Vec::new(); restored.remainder.len()];
            current.leaves = restored.remainder;
            current.wal = Some(PendingLog::new(dir, config.fsync));
            sealed = restored.sealed;
        }

        let inner = Arc::new(Inner {
            ctx: Arc::new(Context::new(config, anchor, metrics)),
            current: Mutex::new(current),
            tracker: TaskTracker::new(),
            stop: CancellationToken::new(),
            runtime: Handle::current(),
        });
        inner.ctx.subscribers.lock().extend(subscriber);
        for batch in sealed {
            inner.spawn(batch);
        }

        let ticker = Arc::downgrade(&inner);
        let interval = inner.ctx.config.interval;
        let stop = inner.stop.clone();
        inner.tracker.spawn(run_ticker(ticker, interval, stop));

        Ok(Self { inner })
    }

    /// Add `leaf` to the current batch.
    ///
    /// The leaf is logged before this returns; the handle resolves once the
    /// batch is anchored. Never waits on the anchor.
    pub fn submit(&self, leaf: Id32) -> Result<BatchHandle, FossilizerError> {
        self.submit_with_meta(leaf, Vec::new())
    }

    /// Like [`submit`](Self::submit), attaching `meta` to the result.
    ///
    /// `meta` is handed back untouched in the [`Fossil`] delivered to the
    /// handle and to subscribers. It is kept in memory only: leaves recovered
    /// from the pending log come back with empty meta.
    pub fn submit_with_meta(
        &self,
        leaf: Id32,
        meta: Vec<u8>,
    ) -> Result<BatchHandle, FossilizerError> {
        let mut current = self.inner.current.lock();

        if let Some(err) = &current.poisoned {
            return Err(FossilizerError::Poisoned(Arc::clone(err)));
        }
        if !current.accepting {
            return Err(FossilizerError::Stopped);
        }

        if let Some(wal) = current.wal.as_mut()
            && let Err(err) = wal.append(&leaf)
        {
            let err = Arc::new(err);
            self.inner.poison(&mut current, &err);
            return Err(FossilizerError::Persistence(err));
        }

        let index = current.leaves.len();
        let (waiter, handle) = Waiter::new(current.batch_number, index);
        current.leaves.push(leaf);
        current.meta.push(meta);
        current.waiters.push(waiter);

        if current.leaves.len() >= self.inner.ctx.config.max_leaves {
            self.inner.seal(&mut current, "full");
        }

        Ok(handle)
    }

    /// Receive every result published from now on, in publication order.
    ///
    /// This includes leaves recovered from disk, which have no handle.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Fossil> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.ctx.subscribers.lock().push(tx);
        rx
    }

    /// Name, version and anchor network.
    pub fn info(&self) -> Info {
        Info {
            name: NAME.to_string(),
            description: DESCRIPTION.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            network: self.inner.ctx.anchor.network().to_string(),
        }
    }

    /// Counters of completed batches and fossilized leaves.
    pub fn metrics(&self) -> &Metrics {
        &self.inner.ctx.metrics
    }

    /// Configuration in use.
    pub fn config(&self) -> &Config {
        &self.inner.ctx.config
    }

    /// Number of the batch currently accepting leaves.
    pub fn batch_number(&self) -> u64 {
        self.inner.current.lock().batch_number
    }

    /// Leaves in the current batch.
    pub fn pending_len(&self) -> usize {
        self.inner.current.lock().leaves.len()
    }

    /// Seal the current batch now, if it has leaves.
    pub fn seal(&self) {
        let mut current = self.inner.current.lock();
        if current.accepting && current.poisoned.is_none() {
            self.inner.seal(&mut current, "manual");
        }
    }

    /// Stop accepting leaves and wait for in-flight batches.
    ///
    /// The current batch is sealed when `stop_batch_on_shutdown` is set;
    /// otherwise its leaves stay in the pending log for the next start and
    /// its handles resolve with a cancellation error. Batches still running
    /// after `shutdown_timeout` are failed.
    pub async fn shutdown(&self) -> Result<(), FossilizerError> {
        {
            let mut current = self.inner.current.lock();
            if current.accepting {
                current.accepting = false;
                if self.inner.ctx.config.stop_batch_on_shutdown && current.poisoned.is_none() {
                    self.inner.seal(&mut current, "shutdown");
                } else {
                    let number = current.batch_number;
                    for waiter in mem::take(&mut current.waiters) {
                        waiter.fail(BatchError::new(
                            number,
                            BatchErrorKind::Cancelled("shut down before the batch was sealed"),
                        ));
                    }
                    if !current.leaves.is_empty() {
                        info!(
                            target: "fossilizer",
                            batch = number,
                            leaves = current.leaves.len(),
                            "leaving unsealed batch in pending log"
                        );
                    }
                }
                if let Some(wal) = current.wal.as_mut() {
                    wal.close();
                }
                info!(target: "fossilizer", "fossilizer stopped accepting leaves");
            }
        }

        self.inner.stop.cancel();
        self.inner.tracker.close();

        let timeout = self.inner.ctx.config.shutdown_timeout;
        if tokio::time::timeout(timeout, self.inner.tracker.wait()).await.is_ok() {
            info!(target: "fossilizer", "fossilizer shut down");
            return Ok(());
        }

        let in_flight = self.inner.tracker.len();
        error!(
            target: "fossilizer",
            ?timeout,
            in_flight,
            "shutdown deadline elapsed, failing in-flight batches"
        );
        self.inner.ctx.deadline.cancel();
        self.inner.tracker.wait().await;
        Err(FossilizerError::ShutdownDeadline { timeout, in_flight })
    }
}

impl Inner {
    /// Seal the current batch and spawn its task. No-op when empty.
    fn seal(&self, current: &mut Current, reason: &'static str) {
        if current.leaves.is_empty() {
            return;
        }

        let number = current.batch_number;
        let segment = match current.wal.as_mut().map(|wal| wal.seal(number)).transpose() {
            Ok(segment) => segment.flatten(),
            Err(err) => {
                let err = Arc::new(err);
                self.poison(current, &err);
                return;
            }
        };

        current.batch_number += 1;
        let batch = SealedBatch {
            number,
            leaves: mem::take(&mut current.leaves),
            meta: mem::take(&mut current.meta),
            waiters: mem::take(&mut current.waiters),
            segment,
        };

        info!(
            target: "fossilizer",
            batch = number,
            leaves = batch.leaves.len(),
            reason,
            "sealed batch"
        );
        debug!(
            target: "fossilizer",
            batch = current.batch_number,
            state = %BatchState::Accepting,
            "batch state"
        );
        self.spawn(batch);
    }

    fn spawn(&self, batch: SealedBatch) {
        self.tracker.spawn_on(batch.run(Arc::clone(&self.ctx)), &self.runtime);
    }

    /// Fail the current batch and refuse further submissions.
    fn poison(&self, current: &mut Current, err: &Arc<PersistenceError>) {
        error!(
            target: "fossilizer",
            batch = current.batch_number,
            error = %err,
            "pending log failure, refusing new leaves"
        );
        let number = current.batch_number;
        for waiter in mem::take(&mut current.waiters) {
            waiter.fail(BatchError::new(number, BatchErrorKind::Persistence(Arc::clone(err))));
        }
        current.leaves.clear();
        current.meta.clear();
        current.wal = None;
        current.poisoned = Some(Arc::clone(err));
    }
}

/// Persisted leaves laid out as batches.
#[derive(Debug)]
struct Restored {
    next_batch: u64,
    /// Full batches, ready to run.
    sealed: Vec<SealedBatch>,
    /// Leaves of the next current batch, already in a fresh `pending.log`.
    remainder: Vec<Id32>,
}

/// Read back `dir`: full batches get their own segment, the rest goes to a
/// fresh `pending.log`. Blocking.
fn restore(dir: &Path, max_leaves: usize, fsync: bool) -> Result<Restored, PersistenceError> {
    let recovered = wal::recover(dir)?;
    if !recovered.leaves.is_empty() {
        info!(
            target: "fossilizer",
            leaves = recovered.leaves.len(),
            segments = recovered.segments.len(),
            next_batch = recovered.next_batch,
            "recovering pending leaves"
        );
    }

    let mut next_batch = recovered.next_batch;
    let full = recovered.leaves.len() / max_leaves * max_leaves;
    let (chunks, remainder) = recovered.leaves.split_at(full);
    let mut sealed = Vec::new();
    for chunk in chunks.chunks(max_leaves) {
        let name = wal::segment_file_name(next_batch);
        let segment = wal::write_leaves(dir, &name, chunk, fsync)?;
        sealed.push(SealedBatch {
            number: next_batch,
            leaves: chunk.to_vec(),
            meta: vec![Vec::new(); chunk.len()],
            waiters: Vec::new(),
            segment: Some(segment),
        });
        next_batch += 1;
    }

    // Rewritten before the old segments go, so a crash here loses nothing.
    wal::write_leaves(dir, PENDING_LOG, remainder, fsync)?;
    for segment in &recovered.segments {
        if let Err(err) = std::fs::remove_file(segment) {
            warn!(
                target: "fossilizer",
                ?segment,
                error = %err,
                "failed to remove recovered segment"
            );
        }
    }

    Ok(Restored { next_batch, sealed, remainder: remainder.to_vec() })
}

async fn run_ticker(inner: Weak<Inner>, period: Duration, stop: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    interval.tick().await;

    loop {
        tokio::select! {
            () = stop.cancelled() => break,
            _ = interval.tick() => {
                let Some(inner) = inner.upgrade() else { break };
                let mut current = inner.current.lock();
                if current.accepting && current.poisoned.is_none() {
                    inner.seal(&mut current, "interval");
                }
            }
        }
    }
    debug!(target: "fossilizer", "interval ticker stopped");
}
