//! Test anchors and helpers shared by the integration tests.

#![allow(dead_code, unreachable_pub)]

use std::{
    sync::{
        atomic::{AtomicU32, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use fossil_batch::{
    async_trait, Anchor, AnchorError, AnchorReceipt, BatchError, BatchHandle, Config, DummyAnchor,
    Evidence, Fossil,
};
use fossil_merkle::Sha256Hasher;
use fossil_types::Id32;

/// How a [`ScriptedAnchor`] answers.
#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    /// Fail with a retryable error this many times, then succeed.
    FailTimes(u32),
    /// Always fail with a retryable error.
    AlwaysRetryable,
    /// Always fail with a fatal error.
    Fatal,
    /// Sleep, then succeed.
    Slow(Duration),
}

/// Anchor whose answers follow a [`Behaviour`] and which counts its calls.
#[derive(Debug)]
pub struct ScriptedAnchor {
    behaviour: Behaviour,
    calls: AtomicU32,
}

impl ScriptedAnchor {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self { behaviour, calls: AtomicU32::new(0) })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Anchor for ScriptedAnchor {
    fn network(&self) -> &str {
        "scripted"
    }

    async fn anchor(&self, root: &Id32) -> Result<AnchorReceipt, AnchorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.behaviour {
            Behaviour::FailTimes(n) if call <= n => {
                Err(AnchorError::retryable("temporarily unavailable"))
            }
            Behaviour::AlwaysRetryable => Err(AnchorError::retryable("temporarily unavailable")),
            Behaviour::Fatal => Err(AnchorError::fatal("rejected")),
            Behaviour::Slow(delay) => {
                tokio::time::sleep(delay).await;
                Ok(DummyAnchor::receipt_for(root))
            }
            Behaviour::FailTimes(_) => Ok(DummyAnchor::receipt_for(root)),
        }
    }
}

/// Anchor that sleeps on every call and records the most calls it saw
/// running at once.
#[derive(Debug)]
pub struct GaugeAnchor {
    delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl GaugeAnchor {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self { delay, running: AtomicUsize::new(0), peak: AtomicUsize::new(0) })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Anchor for GaugeAnchor {
    fn network(&self) -> &str {
        "gauge"
    }

    async fn anchor(&self, root: &Id32) -> Result<AnchorReceipt, AnchorError> {
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(DummyAnchor::receipt_for(root))
    }
}

/// Config that only seals on size, manual seal or shutdown.
pub fn config(max_leaves: usize) -> Config {
    Config {
        interval: Duration::from_secs(3600),
        max_leaves,
        anchor_timeout: Duration::from_secs(5),
        retry_base_delay: Duration::from_millis(5),
        retry_max_delay: Duration::from_millis(20),
        shutdown_timeout: Duration::from_secs(10),
        ..Config::default()
    }
}

pub fn leaf(i: u32) -> Id32 {
    Sha256Hasher::hash(&i.to_be_bytes())
}

pub fn dummy() -> Arc<DummyAnchor> {
    Arc::new(DummyAnchor::new())
}

/// Await a handle, failing the test instead of hanging.
pub async fn resolve_fossil(handle: BatchHandle) -> Result<Fossil, BatchError> {
    match tokio::time::timeout(Duration::from_secs(10), handle).await {
        Ok(outcome) => outcome,
        Err(_) => panic!("batch handle did not resolve"),
    }
}

/// Like [`resolve_fossil`], keeping only the evidence.
pub async fn resolve(handle: BatchHandle) -> Result<Evidence, BatchError> {
    resolve_fossil(handle).await.map(|fossil| fossil.evidence)
}
