use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::InfluxConfig;
use crate::point::Point;
use crate::sink::{line, MetricsSink};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// InfluxDB v2 write API sink.
///
/// `write` is pure buffer admission; lines go over the wire only in
/// `flush`. Delivery failures never propagate: each failed batch is
/// counted and dropped, and once `threshold_error` batches have failed
/// the sink degrades to dropping everything so a dead backend cannot
/// stall the load test.
pub struct InfluxSink {
    cfg: InfluxConfig,
    client: reqwest::Client,
    write_url: String,
    buffer: Mutex<VecDeque<Point>>,
    closed: AtomicBool,
    /// Warn once per overflow episode; re-armed by the next flush.
    overflow_warned: AtomicBool,
    failed_batches: AtomicU32,
    delivered_points: AtomicU64,
    dropped_points: AtomicU64,
}

impl InfluxSink {
    pub fn new(cfg: InfluxConfig) -> Result<Self> {
        let timeout = if cfg.request_timeout.is_zero() {
            DEFAULT_REQUEST_TIMEOUT
        } else {
            cfg.request_timeout
        };

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building HTTP client")?;
        let write_url = write_endpoint(&cfg.url);

        Ok(Self {
            cfg,
            client,
            write_url,
            buffer: Mutex::new(VecDeque::new()),
            closed: AtomicBool::new(false),
            overflow_warned: AtomicBool::new(false),
            failed_batches: AtomicU32::new(0),
            delivered_points: AtomicU64::new(0),
            dropped_points: AtomicU64::new(0),
        })
    }

    async fn flush_inner(&self) -> Result<()> {
        let batch: Vec<Point> = {
            let mut buffer = self.buffer.lock();
            Vec::from(std::mem::take(&mut *buffer))
        };
        self.overflow_warned.store(false, Ordering::Release);
        if batch.is_empty() {
            return Ok(());
        }

        if self.failed_batches.load(Ordering::Acquire) >= self.cfg.threshold_error {
            self.dropped_points
                .fetch_add(batch.len() as u64, Ordering::Relaxed);
            debug!(dropped = batch.len(), "error threshold reached, batch dropped");
            return Ok(());
        }

        for chunk in batch.chunks(self.cfg.max_batch_size.max(1)) {
            let body = line::encode_batch(chunk);
            match self.post_lines(body).await {
                Ok(()) => {
                    self.delivered_points
                        .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                }
                Err(e) => {
                    let failures = self.failed_batches.fetch_add(1, Ordering::AcqRel) + 1;
                    self.dropped_points
                        .fetch_add(chunk.len() as u64, Ordering::Relaxed);

                    if failures == self.cfg.threshold_error {
                        error!(
                            error = %e,
                            failures,
                            "write failures reached threshold, dropping further batches",
                        );
                    } else {
                        warn!(error = %e, failures, "batch write failed");
                    }
                }
            }
        }

        Ok(())
    }

    async fn post_lines(&self, body: String) -> Result<()> {
        let response = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.cfg.org.as_str()),
                ("bucket", self.cfg.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header("Authorization", format!("Token {}", self.cfg.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .context("sending write request")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            bail!("unexpected status {status}: {}", detail.trim());
        }

        Ok(())
    }
}

impl MetricsSink for InfluxSink {
    fn name(&self) -> &str {
        "influxdb"
    }

    fn write(&self, point: Point) {
        if self.closed.load(Ordering::Acquire) {
            self.dropped_points.fetch_add(1, Ordering::Relaxed);
            warn!(measurement = point.name(), "write after close dropped");
            return;
        }

        let mut buffer = self.buffer.lock();
        if buffer.len() >= self.cfg.max_queue_size {
            buffer.pop_front();
            self.dropped_points.fetch_add(1, Ordering::Relaxed);
            if !self.overflow_warned.swap(true, Ordering::AcqRel) {
                warn!(
                    capacity = self.cfg.max_queue_size,
                    "write buffer full, dropping oldest points",
                );
            }
        }
        buffer.push_back(point);
    }

    async fn flush(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        self.flush_inner().await
    }

    async fn close(&self) -> Result<()> {
        // First close wins; later calls and concurrent writes see the flag.
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("sink already closed");
            return Ok(());
        }

        let result = self.flush_inner().await;

        info!(
            delivered = self.delivered_points.load(Ordering::Relaxed),
            dropped = self.dropped_points.load(Ordering::Relaxed),
            failed_batches = self.failed_batches.load(Ordering::Relaxed),
            "influxdb sink closed",
        );

        result
    }
}

fn write_endpoint(base: &str) -> String {
    format!("{}/api/v2/write", base.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Precision;

    fn test_cfg() -> InfluxConfig {
        InfluxConfig {
            url: "http://localhost:8086".to_string(),
            org: "org".to_string(),
            bucket: "bucket".to_string(),
            token: "token".to_string(),
            max_queue_size: 2,
            ..Default::default()
        }
    }

    fn point(name: &str) -> Point {
        Point::measurement(name)
            .field("v", 1_i64)
            .timestamp(1, Precision::Nanoseconds)
    }

    #[test]
    fn test_write_endpoint_normalizes_trailing_slash() {
        assert_eq!(
            write_endpoint("http://localhost:8086/"),
            "http://localhost:8086/api/v2/write"
        );
        assert_eq!(
            write_endpoint("https://influx.example.com"),
            "https://influx.example.com/api/v2/write"
        );
    }

    #[test]
    fn test_write_drops_oldest_when_buffer_full() {
        let sink = InfluxSink::new(test_cfg()).unwrap();
        sink.write(point("a"));
        sink.write(point("b"));
        sink.write(point("c"));

        let buffer = sink.buffer.lock();
        let names: Vec<&str> = buffer.iter().map(|p| p.name()).collect();
        assert_eq!(names, ["b", "c"]);
        drop(buffer);
        assert_eq!(sink.dropped_points.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_write_after_close_is_dropped() {
        let sink = InfluxSink::new(test_cfg()).unwrap();
        // Empty buffer, so close performs no network round trip.
        sink.close().await.unwrap();
        sink.write(point("a"));

        assert!(sink.buffer.lock().is_empty());
        assert_eq!(sink.dropped_points.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let sink = InfluxSink::new(test_cfg()).unwrap();
        sink.close().await.unwrap();
        sink.close().await.unwrap();
        assert!(sink.closed.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_flush_drops_batch_past_error_threshold() {
        let sink = InfluxSink::new(test_cfg()).unwrap();
        sink.failed_batches
            .store(sink.cfg.threshold_error, Ordering::Release);

        sink.write(point("a"));
        sink.flush().await.unwrap();

        assert!(sink.buffer.lock().is_empty());
        assert_eq!(sink.dropped_points.load(Ordering::Relaxed), 1);
    }
}
