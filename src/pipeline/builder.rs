use std::sync::Arc;
use std::time::Duration;

use crate::point::{Point, Precision};
use crate::runtime::{ThreadCounts, ThreadWindowStats};
use crate::sample::{SampleKind, SampleResult};

// Measurement names and tag/field keys are the wire contract shared with
// the dashboards; renaming any of them breaks every existing query.
pub const REQUESTS_MEASUREMENT: &str = "requests";
pub const VIRTUAL_USERS_MEASUREMENT: &str = "virtualUsers";
pub const TEST_START_END_MEASUREMENT: &str = "testStartEnd";

pub const TAG_RUN_ID: &str = "runId";
pub const TAG_TEST_NAME: &str = "testName";
pub const TAG_NODE_NAME: &str = "nodeName";
pub const TAG_SAMPLER_TYPE: &str = "samplerType";
pub const TAG_REQUEST_NAME: &str = "requestName";
pub const TAG_TYPE: &str = "type";

pub const FIELD_PLACEHOLDER: &str = "placeholder";
pub const FIELD_RESPONSE_TIME: &str = "responseTime";
pub const FIELD_LATENCY: &str = "latency";
pub const FIELD_CONNECT_TIME: &str = "connectTime";
pub const FIELD_SENT_BYTES: &str = "sentBytes";
pub const FIELD_RECEIVED_BYTES: &str = "receivedBytes";
pub const FIELD_ERROR_COUNT: &str = "errorCount";
pub const FIELD_THREAD_NAME: &str = "threadName";
pub const FIELD_RESPONSE_CODE: &str = "responseCode";
pub const FIELD_ERROR_MSG: &str = "errorMsg";
pub const FIELD_ERROR_RESPONSE_BODY: &str = "errorResponseBody";
pub const FIELD_MIN_ACTIVE_THREADS: &str = "minActiveThreads";
pub const FIELD_MEAN_ACTIVE_THREADS: &str = "meanActiveThreads";
pub const FIELD_MAX_ACTIVE_THREADS: &str = "maxActiveThreads";
pub const FIELD_STARTED_THREADS: &str = "startedThreads";
pub const FIELD_FINISHED_THREADS: &str = "finishedThreads";

/// Run identity stamped onto every point.
#[derive(Debug, Clone)]
pub struct RunIdentity {
    pub run_id: Arc<str>,
    pub test_name: Arc<str>,
    pub node_name: Arc<str>,
}

/// Test lifecycle marker phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestPhase {
    Started,
    Finished,
}

impl TestPhase {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Finished => "finished",
        }
    }
}

/// Immutable per-event snapshot consumed once by `request_point`.
#[derive(Debug, Clone)]
pub struct PointContext {
    pub identity: RunIdentity,
    pub kind: SampleKind,
    /// Shifted wall-clock time with the disambiguator already folded in.
    pub timestamp_ns: i64,
    pub capture_failure_body: bool,
    pub max_body_length: usize,
}

/// Builds the per-request point. Total function: malformed input degrades
/// (unknown kinds were already mapped by `SampleKind::parse`), it never
/// fails.
pub fn request_point(sample: &SampleResult, ctx: &PointContext) -> Point {
    let mut point = Point::measurement(REQUESTS_MEASUREMENT)
        .tag(TAG_RUN_ID, ctx.identity.run_id.as_ref())
        .tag(TAG_TEST_NAME, ctx.identity.test_name.as_ref())
        .tag(TAG_NODE_NAME, ctx.identity.node_name.as_ref())
        .tag(TAG_SAMPLER_TYPE, ctx.kind.as_str())
        .tag(TAG_REQUEST_NAME, sample.label.as_str())
        .field(FIELD_RESPONSE_TIME, millis_i64(sample.elapsed))
        .field(FIELD_LATENCY, millis_i64(sample.latency))
        .field(FIELD_CONNECT_TIME, millis_i64(sample.connect_time))
        .field(FIELD_SENT_BYTES, to_i64(sample.sent_bytes))
        .field(FIELD_RECEIVED_BYTES, to_i64(sample.received_bytes))
        .field(FIELD_ERROR_COUNT, i64::from(!sample.success))
        .field(FIELD_THREAD_NAME, sample.thread_name.as_str())
        .field(FIELD_RESPONSE_CODE, sample.response_code.as_str())
        .timestamp(ctx.timestamp_ns, Precision::Nanoseconds);

    if !sample.success {
        if let Some(message) = &sample.error_message {
            point = point.field(FIELD_ERROR_MSG, message.as_str());
        }
        if ctx.capture_failure_body {
            if let Some(body) = &sample.response_body {
                point = point.field(
                    FIELD_ERROR_RESPONSE_BODY,
                    truncate_chars(body, ctx.max_body_length),
                );
            }
        }
    }

    point
}

/// Builds one `virtualUsers` gauge point.
pub fn virtual_users_point(
    stats: ThreadWindowStats,
    counts: ThreadCounts,
    identity: &RunIdentity,
    ts_ms: i64,
) -> Point {
    Point::measurement(VIRTUAL_USERS_MEASUREMENT)
        .tag(TAG_NODE_NAME, identity.node_name.as_ref())
        .tag(TAG_TEST_NAME, identity.test_name.as_ref())
        .tag(TAG_RUN_ID, identity.run_id.as_ref())
        .field(FIELD_MIN_ACTIVE_THREADS, to_i64(stats.min))
        .field(FIELD_MEAN_ACTIVE_THREADS, to_i64(stats.mean))
        .field(FIELD_MAX_ACTIVE_THREADS, to_i64(stats.max))
        .field(FIELD_STARTED_THREADS, to_i64(counts.started))
        .field(FIELD_FINISHED_THREADS, to_i64(counts.finished))
        .timestamp(ts_ms, Precision::Milliseconds)
}

/// Builds a test lifecycle marker point.
pub fn test_marker_point(phase: TestPhase, identity: &RunIdentity, ts_ms: i64) -> Point {
    Point::measurement(TEST_START_END_MEASUREMENT)
        .tag(TAG_TYPE, phase.as_str())
        .tag(TAG_NODE_NAME, identity.node_name.as_ref())
        .tag(TAG_RUN_ID, identity.run_id.as_ref())
        .tag(TAG_TEST_NAME, identity.test_name.as_ref())
        .field(FIELD_PLACEHOLDER, "1")
        .timestamp(ts_ms, Precision::Milliseconds)
}

fn millis_i64(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

/// Truncates to at most `max` characters, never splitting a char.
fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::FieldValue;

    fn identity() -> RunIdentity {
        RunIdentity {
            run_id: Arc::from("R001"),
            test_name: Arc::from("Test"),
            node_name: Arc::from("Test-Node"),
        }
    }

    fn context() -> PointContext {
        PointContext {
            identity: identity(),
            kind: SampleKind::Request,
            timestamp_ns: 1_700_000_000_000_123_456,
            capture_failure_body: true,
            max_body_length: 16,
        }
    }

    fn failed_sample(body: &str) -> SampleResult {
        SampleResult {
            label: "Login".to_string(),
            success: false,
            response_code: "500".to_string(),
            error_message: Some("server blew up".to_string()),
            response_body: Some(body.to_string()),
            elapsed: Duration::from_millis(120),
            latency: Duration::from_millis(45),
            connect_time: Duration::from_millis(3),
            sent_bytes: 512,
            received_bytes: 2048,
            thread_name: "vu-007".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_request_point_wire_layout() {
        let sample = failed_sample("short");
        let point = request_point(&sample, &context());

        assert_eq!(point.name(), "requests");
        assert_eq!(point.tag_value(TAG_RUN_ID), Some("R001"));
        assert_eq!(point.tag_value(TAG_TEST_NAME), Some("Test"));
        assert_eq!(point.tag_value(TAG_NODE_NAME), Some("Test-Node"));
        assert_eq!(point.tag_value(TAG_SAMPLER_TYPE), Some("request"));
        assert_eq!(point.tag_value(TAG_REQUEST_NAME), Some("Login"));
        assert_eq!(
            point.field_value(FIELD_RESPONSE_TIME),
            Some(&FieldValue::Integer(120))
        );
        assert_eq!(
            point.field_value(FIELD_LATENCY),
            Some(&FieldValue::Integer(45))
        );
        assert_eq!(
            point.field_value(FIELD_SENT_BYTES),
            Some(&FieldValue::Integer(512))
        );
        assert_eq!(
            point.field_value(FIELD_ERROR_COUNT),
            Some(&FieldValue::Integer(1))
        );
        assert_eq!(
            point.field_value(FIELD_RESPONSE_CODE),
            Some(&FieldValue::String("500".to_string()))
        );
        assert_eq!(point.timestamp_ns(), 1_700_000_000_000_123_456);
    }

    #[test]
    fn test_request_point_is_deterministic_given_frozen_context() {
        let sample = failed_sample("same body");
        let ctx = context();
        assert_eq!(request_point(&sample, &ctx), request_point(&sample, &ctx));
    }

    #[test]
    fn test_success_omits_error_fields_even_with_body() {
        let mut sample = failed_sample("irrelevant");
        sample.success = true;
        let point = request_point(&sample, &context());

        assert_eq!(
            point.field_value(FIELD_ERROR_COUNT),
            Some(&FieldValue::Integer(0))
        );
        assert!(point.field_value(FIELD_ERROR_MSG).is_none());
        assert!(point.field_value(FIELD_ERROR_RESPONSE_BODY).is_none());
    }

    #[test]
    fn test_failure_body_requires_capture_flag() {
        let sample = failed_sample("secret body");
        let mut ctx = context();
        ctx.capture_failure_body = false;

        let point = request_point(&sample, &ctx);
        assert!(point.field_value(FIELD_ERROR_MSG).is_some());
        assert!(point.field_value(FIELD_ERROR_RESPONSE_BODY).is_none());
    }

    #[test]
    fn test_failure_body_is_truncated_to_max_chars() {
        let sample = failed_sample("0123456789abcdefOVERFLOW");
        let point = request_point(&sample, &context());

        assert_eq!(
            point.field_value(FIELD_ERROR_RESPONSE_BODY),
            Some(&FieldValue::String("0123456789abcdef".to_string()))
        );
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        assert_eq!(truncate_chars("日本語テスト", 3), "日本語");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn test_virtual_users_point_layout() {
        let stats = ThreadWindowStats {
            min: 2,
            mean: 5,
            max: 9,
        };
        let counts = ThreadCounts {
            started: 10,
            finished: 1,
        };
        let point = virtual_users_point(stats, counts, &identity(), 1_700_000_000_000);

        assert_eq!(point.name(), "virtualUsers");
        assert_eq!(point.tag_value(TAG_RUN_ID), Some("R001"));
        assert_eq!(
            point.field_value(FIELD_MIN_ACTIVE_THREADS),
            Some(&FieldValue::Integer(2))
        );
        assert_eq!(
            point.field_value(FIELD_MEAN_ACTIVE_THREADS),
            Some(&FieldValue::Integer(5))
        );
        assert_eq!(
            point.field_value(FIELD_MAX_ACTIVE_THREADS),
            Some(&FieldValue::Integer(9))
        );
        assert_eq!(
            point.field_value(FIELD_STARTED_THREADS),
            Some(&FieldValue::Integer(10))
        );
        assert_eq!(
            point.field_value(FIELD_FINISHED_THREADS),
            Some(&FieldValue::Integer(1))
        );
        assert_eq!(point.precision(), Precision::Milliseconds);
    }

    #[test]
    fn test_marker_point_layout() {
        let point = test_marker_point(TestPhase::Started, &identity(), 42);
        assert_eq!(point.name(), "testStartEnd");
        assert_eq!(point.tag_value(TAG_TYPE), Some("started"));
        assert_eq!(point.tag_value(TAG_NODE_NAME), Some("Test-Node"));
        assert_eq!(
            point.field_value(FIELD_PLACEHOLDER),
            Some(&FieldValue::String("1".to_string()))
        );
        assert_eq!(point.timestamp_ns(), 42_000_000);

        let finished = test_marker_point(TestPhase::Finished, &identity(), 42);
        assert_eq!(finished.tag_value(TAG_TYPE), Some("finished"));
    }
}
