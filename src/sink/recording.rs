use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use parking_lot::Mutex;
use tracing::warn;

use crate::point::Point;
use crate::sink::MetricsSink;

/// In-memory sink that records every point in arrival order.
///
/// Backs dry runs (no InfluxDB configured) and the lifecycle tests,
/// which assert on the recorded sequence afterwards.
#[derive(Debug, Default)]
pub struct RecordingSink {
    points: Mutex<Vec<Point>>,
    flushes: AtomicUsize,
    closes: AtomicUsize,
    writes_after_close: AtomicUsize,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far, in write order.
    pub fn points(&self) -> Vec<Point> {
        self.points.lock().clone()
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::Acquire)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::Acquire)
    }

    pub fn writes_after_close(&self) -> usize {
        self.writes_after_close.load(Ordering::Acquire)
    }
}

impl MetricsSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    fn write(&self, point: Point) {
        if self.closes.load(Ordering::Acquire) > 0 {
            self.writes_after_close.fetch_add(1, Ordering::AcqRel);
            warn!(measurement = point.name(), "write after close dropped");
            return;
        }
        self.points.lock().push(point);
    }

    async fn flush(&self) -> Result<()> {
        self.flushes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
