use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Kind of sampler a result came from.
///
/// The kind becomes the `samplerType` tag on per-request points so
/// transaction checkpoints can be charted separately from raw requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    Request,
    Transaction,
}

impl SampleKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Transaction => "transaction",
        }
    }

    /// Maps a category string onto a kind. Unknown categories degrade to
    /// `Transaction`, they never error.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("request") {
            Self::Request
        } else {
            Self::Transaction
        }
    }
}

impl std::fmt::Display for SampleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One load-test result handed to the pipeline by the host engine.
///
/// Sub-results hold the nested checkpoints of a transaction; the pipeline
/// expands one level of them when `recordSubSamples` is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleResult {
    /// Sampler label, the name the result is charted under.
    pub label: String,

    /// Request or transaction checkpoint.
    pub kind: SampleKind,

    /// Whether the sampler passed.
    pub success: bool,

    /// Protocol status, e.g. "200".
    pub response_code: String,

    /// Failure detail supplied by the engine, if any.
    #[serde(default)]
    pub error_message: Option<String>,

    /// Response body captured by the engine; only failures ever emit it.
    #[serde(default)]
    pub response_body: Option<String>,

    /// Total time from send to last byte.
    pub elapsed: Duration,

    /// Time to first byte.
    pub latency: Duration,

    /// Connection establishment time.
    pub connect_time: Duration,

    pub sent_bytes: u64,
    pub received_bytes: u64,

    /// Engine thread (virtual user) that produced the result.
    pub thread_name: String,

    /// Nested results of a transaction, one level deep.
    #[serde(default)]
    pub sub_results: Vec<SampleResult>,
}

impl Default for SampleResult {
    fn default() -> Self {
        Self {
            label: String::new(),
            kind: SampleKind::Request,
            success: true,
            response_code: "200".to_string(),
            error_message: None,
            response_body: None,
            elapsed: Duration::ZERO,
            latency: Duration::ZERO,
            connect_time: Duration::ZERO,
            sent_bytes: 0,
            received_bytes: 0,
            thread_name: String::new(),
            sub_results: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_known_values() {
        assert_eq!(SampleKind::parse("request"), SampleKind::Request);
        assert_eq!(SampleKind::parse("Request"), SampleKind::Request);
        assert_eq!(SampleKind::parse("transaction"), SampleKind::Transaction);
    }

    #[test]
    fn test_kind_parse_unknown_degrades_to_transaction() {
        assert_eq!(SampleKind::parse(""), SampleKind::Transaction);
        assert_eq!(SampleKind::parse("subresult"), SampleKind::Transaction);
        assert_eq!(SampleKind::parse("HTTP"), SampleKind::Transaction);
    }

    #[test]
    fn test_kind_display_matches_wire_value() {
        assert_eq!(SampleKind::Request.to_string(), "request");
        assert_eq!(SampleKind::Transaction.to_string(), "transaction");
    }
}
