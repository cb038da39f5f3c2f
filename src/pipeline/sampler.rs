use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::pipeline::builder::{self, RunIdentity};
use crate::pipeline::stats::PipelineStats;
use crate::pipeline::timeshift::TimeShift;
use crate::point::Point;
use crate::runtime::{TestRuntime, ThreadCounts, ThreadWindowStats};
use crate::sink::MetricsSink;

/// Periodic virtual-user gauge emitter.
///
/// Each tick drains the runtime's observation window and writes one
/// `virtualUsers` point through the shared sink.
pub(crate) struct ConcurrencySampler<S, R> {
    pub(crate) sink: Arc<S>,
    pub(crate) runtime: Arc<R>,
    pub(crate) identity: RunIdentity,
    pub(crate) time_shift: TimeShift,
    pub(crate) stats: Arc<PipelineStats>,
}

impl<S, R> ConcurrencySampler<S, R>
where
    S: MetricsSink,
    R: TestRuntime,
{
    /// Spawns the gauge loop. The first point lands one full interval
    /// after start; cancellation exits without a tick, the pipeline
    /// writes the terminal gauge itself.
    pub(crate) fn spawn(self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let first = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(first, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => self.tick(),
                }
            }
        })
    }

    fn tick(&self) {
        let window = self.runtime.active_thread_stats();
        let counts = self.runtime.thread_counts();
        let ts_ms = self.time_shift.apply_ms(Utc::now().timestamp_millis());

        self.sink.write(builder::virtual_users_point(
            window,
            counts,
            &self.identity,
            ts_ms,
        ));
        self.stats.record_gauge_tick();

        trace!(
            min = window.min,
            mean = window.mean,
            max = window.max,
            started = counts.started,
            finished = counts.finished,
            "virtual user gauge tick",
        );
    }
}

/// Terminal gauge written during shutdown: min/mean/max are forced to
/// zero and started mirrors the finished count.
pub(crate) fn final_tick_point<R: TestRuntime>(
    runtime: &R,
    identity: &RunIdentity,
    time_shift: TimeShift,
) -> Point {
    let counts = runtime.thread_counts();
    let ts_ms = time_shift.apply_ms(Utc::now().timestamp_millis());

    builder::virtual_users_point(
        ThreadWindowStats {
            min: 0,
            mean: 0,
            max: 0,
        },
        ThreadCounts {
            started: counts.finished,
            finished: counts.finished,
        },
        identity,
        ts_ms,
    )
}
