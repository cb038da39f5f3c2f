pub mod influx;
pub mod line;
pub mod recording;

pub use influx::InfluxSink;
pub use recording::RecordingSink;

use anyhow::Result;

use crate::point::Point;

/// Sink consumes metric points and delivers them to a backend.
pub trait MetricsSink: Send + Sync + 'static {
    /// Returns the sink's name for logging.
    fn name(&self) -> &str;

    /// Admit one point into the sink's buffer. Never blocks or fails;
    /// delivery happens in `flush`.
    fn write(&self, point: Point);

    /// Deliver buffered points to the backend.
    fn flush(&self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Flush remaining points and release the sink. Writes arriving
    /// after close are dropped.
    fn close(&self) -> impl std::future::Future<Output = Result<()>> + Send;
}
