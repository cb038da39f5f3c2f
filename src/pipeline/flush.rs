use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::sink::MetricsSink;

/// Periodic sink flusher.
pub(crate) struct FlushTimer<S> {
    pub(crate) sink: Arc<S>,
}

impl<S: MetricsSink> FlushTimer<S> {
    /// Spawns the flush loop. The first flush lands one full interval
    /// after start; a failed flush is logged and the cadence continues.
    pub(crate) fn spawn(self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let first = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(first, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => {
                        if let Err(e) = self.sink.flush().await {
                            warn!(error = %e, "periodic flush failed");
                        }
                    }
                }
            }
        })
    }
}
