use std::sync::atomic::{AtomicU64, Ordering};

/// Internal pipeline counters.
///
/// Counters are monotonically increasing over the pipeline lifetime and
/// use relaxed ordering since they only feed logs and tests, never
/// control flow.
#[derive(Debug, Default)]
pub struct PipelineStats {
    samples_received: AtomicU64,
    samples_filtered: AtomicU64,
    points_written: AtomicU64,
    gauge_ticks: AtomicU64,
}

/// Point-in-time copy of the pipeline counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub samples_received: u64,
    pub samples_filtered: u64,
    pub points_written: u64,
    pub gauge_ticks: u64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self, n: u64) {
        self.samples_received.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_filtered(&self, n: u64) {
        self.samples_filtered.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_written(&self, n: u64) {
        self.points_written.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn record_gauge_tick(&self) {
        self.gauge_ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_received: self.samples_received.load(Ordering::Relaxed),
            samples_filtered: self.samples_filtered.load(Ordering::Relaxed),
            points_written: self.points_written.load(Ordering::Relaxed),
            gauge_ticks: self.gauge_ticks.load(Ordering::Relaxed),
        }
    }
}
