use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::WorkloadConfig;
use crate::pipeline::CollectionPipeline;
use crate::runtime::TrackedRuntime;
use crate::sample::{SampleKind, SampleResult};
use crate::sink::MetricsSink;

/// Synthetic load driver.
///
/// Spawns one task per virtual user; each loops until the shared
/// deadline, synthesizing samples and feeding them to the pipeline.
/// Labels are drawn front-weighted from the configured list, failures
/// at the configured rate, and roughly a quarter of the iterations
/// produce a transaction wrapping two sub-requests.
pub struct Workload<S> {
    cfg: WorkloadConfig,
    pipeline: Arc<CollectionPipeline<S, TrackedRuntime>>,
    runtime: Arc<TrackedRuntime>,
}

impl<S: MetricsSink> Workload<S> {
    pub fn new(
        cfg: WorkloadConfig,
        pipeline: Arc<CollectionPipeline<S, TrackedRuntime>>,
        runtime: Arc<TrackedRuntime>,
    ) -> Self {
        Self {
            cfg,
            pipeline,
            runtime,
        }
    }

    /// Runs the workload to completion.
    pub async fn run(&self) {
        let deadline = Instant::now() + self.cfg.duration;
        let mut handles = Vec::with_capacity(self.cfg.users);

        for user_id in 0..self.cfg.users {
            let cfg = self.cfg.clone();
            let pipeline = Arc::clone(&self.pipeline);
            let runtime = Arc::clone(&self.runtime);

            handles.push(tokio::spawn(async move {
                virtual_user(user_id as u64, cfg, pipeline, runtime, deadline).await;
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        debug!(users = self.cfg.users, "workload finished");
    }
}

async fn virtual_user<S: MetricsSink>(
    id: u64,
    cfg: WorkloadConfig,
    pipeline: Arc<CollectionPipeline<S, TrackedRuntime>>,
    runtime: Arc<TrackedRuntime>,
    deadline: Instant,
) {
    // Each user gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(0x7e57_f10c ^ id);
    let pick = WeightedIndex::new(label_weights(cfg.labels.len()))
        .expect("labels are validated non-empty");
    let thread_name = format!("vu-{id:03}");

    runtime.user_started();

    while Instant::now() < deadline {
        let sample = synthesize_sample(&mut rng, &cfg, &pick, &thread_name);
        pipeline.handle_samples(std::slice::from_ref(&sample));
        runtime.observe_active();

        tokio::time::sleep(jittered(cfg.think_time, &mut rng)).await;
    }

    runtime.user_finished();
}

fn synthesize_sample(
    rng: &mut StdRng,
    cfg: &WorkloadConfig,
    pick: &WeightedIndex<usize>,
    thread_name: &str,
) -> SampleResult {
    if cfg.labels.len() >= 2 && rng.gen_bool(0.25) {
        transaction_sample(rng, cfg, pick, thread_name)
    } else {
        request_sample(rng, cfg, pick, thread_name)
    }
}

fn request_sample(
    rng: &mut StdRng,
    cfg: &WorkloadConfig,
    pick: &WeightedIndex<usize>,
    thread_name: &str,
) -> SampleResult {
    let label = cfg.labels[pick.sample(rng)].clone();
    let failed = rng.gen_bool(cfg.failure_rate);

    let elapsed_ms = rng.gen_range(5..250_u64);
    let latency_ms = rng.gen_range(1..=elapsed_ms);
    let connect_ms = rng.gen_range(0..=latency_ms.min(20));

    SampleResult {
        label,
        kind: SampleKind::Request,
        success: !failed,
        response_code: if failed { "500" } else { "200" }.to_string(),
        error_message: failed.then(|| "injected failure".to_string()),
        response_body: failed
            .then(|| format!("{{\"error\":\"synthetic fault\",\"source\":\"{thread_name}\"}}")),
        elapsed: Duration::from_millis(elapsed_ms),
        latency: Duration::from_millis(latency_ms),
        connect_time: Duration::from_millis(connect_ms),
        sent_bytes: rng.gen_range(200..2_000),
        received_bytes: rng.gen_range(500..50_000),
        thread_name: thread_name.to_string(),
        sub_results: Vec::new(),
    }
}

fn transaction_sample(
    rng: &mut StdRng,
    cfg: &WorkloadConfig,
    pick: &WeightedIndex<usize>,
    thread_name: &str,
) -> SampleResult {
    let label = format!("{} Flow", cfg.labels[pick.sample(rng)]);
    let first = request_sample(rng, cfg, pick, thread_name);
    let second = request_sample(rng, cfg, pick, thread_name);

    let success = first.success && second.success;
    let elapsed = first.elapsed + second.elapsed;
    let latency = first.latency;
    let connect_time = first.connect_time;
    let sent_bytes = first.sent_bytes + second.sent_bytes;
    let received_bytes = first.received_bytes + second.received_bytes;

    SampleResult {
        label,
        kind: SampleKind::Transaction,
        success,
        response_code: if success { "200" } else { "500" }.to_string(),
        error_message: (!success).then(|| "sub-request failed".to_string()),
        response_body: None,
        elapsed,
        latency,
        connect_time,
        sent_bytes,
        received_bytes,
        thread_name: thread_name.to_string(),
        sub_results: vec![first, second],
    }
}

/// Weights decreasing towards the back of the list, front label heaviest.
fn label_weights(count: usize) -> Vec<usize> {
    (1..=count).rev().collect()
}

fn jittered(base: Duration, rng: &mut StdRng) -> Duration {
    base.mul_f64(rng.gen_range(0.5..1.5))
}
