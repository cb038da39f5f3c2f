use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Min/mean/max active virtual users observed over one sampling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadWindowStats {
    pub min: u64,
    pub mean: u64,
    pub max: u64,
}

/// Cumulative started/finished virtual-user counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThreadCounts {
    pub started: u64,
    pub finished: u64,
}

/// Read-only introspection into the hosting load engine.
///
/// The pipeline polls this once per sampler tick; both calls are
/// point-in-time snapshots and must never block on test traffic.
pub trait TestRuntime: Send + Sync + 'static {
    /// Activity stats over the window since the previous call. Draining
    /// resets the window.
    fn active_thread_stats(&self) -> ThreadWindowStats;

    /// Cumulative counters, monotonic for the life of the test.
    fn thread_counts(&self) -> ThreadCounts;
}

#[derive(Debug, Default)]
struct Window {
    min: u64,
    max: u64,
    sum: u64,
    count: u64,
}

impl Window {
    fn observe(&mut self, level: u64) {
        if self.count == 0 {
            self.min = level;
            self.max = level;
        } else {
            self.min = self.min.min(level);
            self.max = self.max.max(level);
        }
        self.sum = self.sum.saturating_add(level);
        self.count += 1;
    }
}

/// Reference `TestRuntime` fed by the bundled workload driver.
///
/// Counters are relaxed atomics; the min/mean/max window sits behind a
/// short-lived mutex because it is only touched on user start/finish and
/// once per sampler tick. An empty window reports the instantaneous
/// activity level so idle seconds chart the plateau instead of zero.
#[derive(Debug, Default)]
pub struct TrackedRuntime {
    started: AtomicU64,
    finished: AtomicU64,
    active: AtomicU64,
    window: Mutex<Window>,
}

impl TrackedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks one virtual user as started and records the new level.
    pub fn user_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
        let level = self.active.fetch_add(1, Ordering::Relaxed) + 1;
        self.window.lock().observe(level);
    }

    /// Marks one virtual user as finished and records the new level.
    pub fn user_finished(&self) {
        self.finished.fetch_add(1, Ordering::Relaxed);
        let level = self.active.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        self.window.lock().observe(level);
    }

    /// Records the current activity level into the sampling window.
    pub fn observe_active(&self) {
        let level = self.active.load(Ordering::Relaxed);
        self.window.lock().observe(level);
    }

    /// Currently active virtual users.
    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }
}

impl TestRuntime for TrackedRuntime {
    fn active_thread_stats(&self) -> ThreadWindowStats {
        let mut window = self.window.lock();
        let stats = if window.count == 0 {
            let level = self.active.load(Ordering::Relaxed);
            ThreadWindowStats {
                min: level,
                mean: level,
                max: level,
            }
        } else {
            ThreadWindowStats {
                min: window.min,
                mean: window.sum / window.count,
                max: window.max,
            }
        };
        *window = Window::default();
        stats
    }

    fn thread_counts(&self) -> ThreadCounts {
        ThreadCounts {
            started: self.started.load(Ordering::Relaxed),
            finished: self.finished.load(Ordering::Relaxed),
        }
    }
}
