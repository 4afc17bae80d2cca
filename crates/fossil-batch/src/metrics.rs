//! Prometheus counters
//!
//! Each [`Fossilizer`](crate::Fossilizer) owns its own [`Registry`] so
//! several instances in one process keep separate counts. Export it with
//! [`Registry::gather`].

use prometheus::{IntCounter, Registry};

/// Counters of completed work, updated when a batch reaches `Done`.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    batch_count: IntCounter,
    fossilized_links_count: IntCounter,
}

impl Metrics {
    pub(crate) fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("fossilizer".to_string()), None)?;

        let batch_count = IntCounter::new("batch_count", "number of batches sent")?;
        registry.register(Box::new(batch_count.clone()))?;

        let fossilized_links_count =
            IntCounter::new("fossilized_links_count", "number of links fossilized")?;
        registry.register(Box::new(fossilized_links_count.clone()))?;

        Ok(Self { registry, batch_count, fossilized_links_count })
    }

    pub(crate) fn record_batch(&self, leaves: usize) {
        self.batch_count.inc();
        self.fossilized_links_count.inc_by(leaves as u64);
    }

    /// Registry holding both counters.
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Batches anchored and published.
    pub fn batch_count(&self) -> u64 {
        self.batch_count.get()
    }

    /// Leaves whose evidence was published.
    pub fn fossilized_links_count(&self) -> u64 {
        self.fossilized_links_count.get()
    }
}
