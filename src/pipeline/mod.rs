//! Sample collection pipeline.
//!
//! Owns the run lifecycle: start/finish markers, per-request points,
//! the periodic virtual-user gauge, and the periodic sink flush. All
//! event handling is synchronous buffer admission; network delivery
//! happens in the sink's flush path.

pub mod builder;
pub mod filter;
mod flush;
mod sampler;
pub mod stats;
pub mod timeshift;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use arc_swap::ArcSwapOption;
use chrono::Utc;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::pipeline::builder::{PointContext, RunIdentity, TestPhase};
use crate::pipeline::filter::SamplerFilter;
use crate::pipeline::flush::FlushTimer;
use crate::pipeline::sampler::ConcurrencySampler;
use crate::pipeline::stats::{PipelineStats, StatsSnapshot};
use crate::pipeline::timeshift::TimeShift;
use crate::runtime::TestRuntime;
use crate::sample::SampleResult;
use crate::sink::MetricsSink;

/// Nanoseconds per millisecond, also the disambiguator range.
const ONE_MS_IN_NANOSECONDS: i64 = 1_000_000;

/// Pipeline lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PipelineState {
    Created = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

impl PipelineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        }
    }
}

/// Collects load-test sample results and ships them to a metrics sink.
///
/// `start` may only be called once, on the `Created` pipeline. After
/// that the pipeline is shared behind an `Arc`: `handle_samples` is
/// called from any number of worker tasks and `stop` from whichever
/// task tears the run down. A second `stop` is a logged no-op.
pub struct CollectionPipeline<S, R> {
    cfg: PipelineConfig,
    identity: RunIdentity,
    sink: Arc<S>,
    runtime: Arc<R>,
    /// `PipelineState` as its `u8` repr.
    state: AtomicU8,
    /// Written once in `start`, before the pipeline is shared.
    time_shift: TimeShift,
    /// Present only while running; cleared during stop.
    filter: ArcSwapOption<SamplerFilter>,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    flush_interval: Duration,
}

impl<S, R> CollectionPipeline<S, R>
where
    S: MetricsSink,
    R: TestRuntime,
{
    pub fn new(
        cfg: PipelineConfig,
        flush_interval: Duration,
        sink: Arc<S>,
        runtime: Arc<R>,
    ) -> Self {
        let identity = RunIdentity {
            run_id: Arc::from(cfg.run_id.as_str()),
            test_name: Arc::from(cfg.test_name.as_str()),
            node_name: Arc::from(cfg.node_name.as_str()),
        };

        Self {
            cfg,
            identity,
            sink,
            runtime,
            state: AtomicU8::new(PipelineState::Created as u8),
            time_shift: TimeShift::none(),
            filter: ArcSwapOption::empty(),
            stats: Arc::new(PipelineStats::new()),
            cancel: CancellationToken::new(),
            tasks: tokio::sync::Mutex::new(Vec::new()),
            flush_interval,
        }
    }

    pub fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Transition the pipeline from `Created` to `Running`.
    pub async fn start(&mut self) -> Result<()> {
        let state = self.state();
        if state != PipelineState::Created {
            bail!("pipeline already started (state: {})", state.as_str());
        }

        // 1. Resolve the time-shift anchor. A malformed anchor degrades
        //    to zero shift inside resolve and is logged there.
        self.time_shift =
            TimeShift::resolve(self.cfg.time_shift_target.as_deref(), Utc::now());

        // 2. Mark the run as started.
        let started_ms = self.time_shift.apply_ms(Utc::now().timestamp_millis());
        self.sink.write(builder::test_marker_point(
            TestPhase::Started,
            &self.identity,
            started_ms,
        ));

        // 3. Compile the sampler filter.
        self.filter.store(Some(Arc::new(SamplerFilter::from_config(
            &self.cfg.samplers_list,
            self.cfg.use_regex_for_sampler_list,
        ))));

        // 4. Spawn the gauge and flush tickers.
        let sampler = ConcurrencySampler {
            sink: Arc::clone(&self.sink),
            runtime: Arc::clone(&self.runtime),
            identity: self.identity.clone(),
            time_shift: self.time_shift,
            stats: Arc::clone(&self.stats),
        };
        let flusher = FlushTimer {
            sink: Arc::clone(&self.sink),
        };

        {
            let mut tasks = self.tasks.lock().await;
            tasks.push(sampler.spawn(self.cfg.sampler_interval, self.cancel.child_token()));
            tasks.push(flusher.spawn(self.flush_interval, self.cancel.child_token()));
        }

        self.state
            .store(PipelineState::Running as u8, Ordering::Release);

        info!(
            run_id = %self.identity.run_id,
            test = %self.identity.test_name,
            node = %self.identity.node_name,
            shift_ms = self.time_shift.millis(),
            "collection pipeline started",
        );

        Ok(())
    }

    /// Handle a batch of completed samples.
    ///
    /// Samples arriving outside the `Running` state are dropped with a
    /// warning. Sub-results are expanded one level when enabled; every
    /// expanded result passes through the same filter.
    pub fn handle_samples(&self, samples: &[SampleResult]) {
        let state = self.state();
        if state != PipelineState::Running {
            warn!(
                dropped = samples.len(),
                state = state.as_str(),
                "samples received outside running state",
            );
            return;
        }

        let Some(filter) = self.filter.load_full() else {
            warn!(dropped = samples.len(), "sampler filter not installed");
            return;
        };

        let now_ms = self.time_shift.apply_ms(Utc::now().timestamp_millis());

        for sample in samples {
            self.process_one(sample, &filter, now_ms);
            if self.cfg.record_sub_samples {
                for sub in &sample.sub_results {
                    self.process_one(sub, &filter, now_ms);
                }
            }
        }
    }

    fn process_one(&self, sample: &SampleResult, filter: &SamplerFilter, now_ms: i64) {
        self.stats.record_received(1);

        if !filter.accepts(&sample.label) {
            self.stats.record_filtered(1);
            return;
        }

        let ctx = PointContext {
            identity: self.identity.clone(),
            kind: sample.kind,
            timestamp_ns: unique_timestamp_ns(now_ms),
            capture_failure_body: self.cfg.save_response_body_of_failures,
            max_body_length: self.cfg.response_body_length,
        };

        self.sink.write(builder::request_point(sample, &ctx));
        self.stats.record_written(1);
    }

    /// Drain and stop the pipeline.
    ///
    /// Teardown order: cancel the tickers, write the terminal gauge and
    /// the finished marker, join the tickers bounded by the shutdown
    /// timeout, then close the sink. The sink close runs exactly once
    /// even if `stop` is called concurrently.
    pub async fn stop(&self) -> Result<()> {
        // Only the caller that wins Running -> Draining performs teardown.
        if self
            .state
            .compare_exchange(
                PipelineState::Running as u8,
                PipelineState::Draining as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            warn!(state = self.state().as_str(), "stop ignored");
            return Ok(());
        }

        // 1. Stop the gauge and flush tickers.
        self.cancel.cancel();

        // 2. Terminal gauge: zeroed window, started mirrors finished.
        self.sink.write(sampler::final_tick_point(
            self.runtime.as_ref(),
            &self.identity,
            self.time_shift,
        ));
        self.stats.record_gauge_tick();

        // 3. Mark the run as finished.
        let finished_ms = self.time_shift.apply_ms(Utc::now().timestamp_millis());
        self.sink.write(builder::test_marker_point(
            TestPhase::Finished,
            &self.identity,
            finished_ms,
        ));

        // 4. Join the tickers, bounded. On timeout the handles are
        //    dropped and the cancelled tasks finish on their own.
        let drained: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().await;
            tasks.drain(..).collect()
        };
        let join_all = async {
            for handle in drained {
                if let Err(e) = handle.await {
                    warn!(error = %e, "ticker task failed");
                }
            }
        };
        if tokio::time::timeout(self.cfg.shutdown_timeout, join_all)
            .await
            .is_err()
        {
            warn!(
                timeout = ?self.cfg.shutdown_timeout,
                "ticker shutdown timed out, closing sink anyway",
            );
        }

        // 5. Close the sink last so the final points are delivered.
        let close_result = self.sink.close().await.context("closing metrics sink");

        self.filter.store(None);
        self.state
            .store(PipelineState::Stopped as u8, Ordering::Release);

        let snap = self.stats.snapshot();
        info!(
            received = snap.samples_received,
            filtered = snap.samples_filtered,
            written = snap.points_written,
            gauge_ticks = snap.gauge_ticks,
            "collection pipeline stopped",
        );

        close_result
    }
}

/// Shifted wall-clock nanoseconds with a random sub-millisecond offset
/// so points sharing a millisecond stay distinct.
fn unique_timestamp_ns(now_ms: i64) -> i64 {
    let jitter = rand::thread_rng().gen_range(0..ONE_MS_IN_NANOSECONDS);
    fold_timestamp(now_ms, jitter)
}

fn fold_timestamp(now_ms: i64, jitter_ns: i64) -> i64 {
    now_ms
        .saturating_mul(ONE_MS_IN_NANOSECONDS)
        .saturating_add(jitter_ns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_u8_round_trip() {
        for state in [
            PipelineState::Created,
            PipelineState::Running,
            PipelineState::Draining,
            PipelineState::Stopped,
        ] {
            assert_eq!(PipelineState::from_u8(state as u8), state);
        }
        assert_eq!(PipelineState::from_u8(200), PipelineState::Stopped);
    }

    #[test]
    fn test_unique_timestamp_stays_within_source_millisecond() {
        let base_ms = 1_700_000_000_000_i64;
        for _ in 0..1_000 {
            let ts = unique_timestamp_ns(base_ms);
            assert!(ts >= base_ms * ONE_MS_IN_NANOSECONDS);
            assert!(ts < (base_ms + 1) * ONE_MS_IN_NANOSECONDS);
        }
    }

    #[test]
    fn test_fold_timestamp_preserves_millisecond_order() {
        let earlier = fold_timestamp(1_000, ONE_MS_IN_NANOSECONDS - 1);
        let later = fold_timestamp(1_001, 0);
        assert!(earlier < later);
    }

    #[test]
    fn test_fold_timestamp_saturates_instead_of_wrapping() {
        let ts = fold_timestamp(i64::MAX / 2, 999_999);
        assert_eq!(ts, i64::MAX);
    }
}
