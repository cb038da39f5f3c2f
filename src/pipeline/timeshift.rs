use chrono::{DateTime, FixedOffset, Utc};
use thiserror::Error;
use tracing::{info, warn};

/// Marks a `timeShiftTarget` value as commented out.
const DISABLE_PREFIX: char = '#';

/// Everything after this marker in the anchor value is ignored.
const INLINE_COMMENT: &str = "//";

/// Accepted anchor layout, e.g. `2023-04-01 00:00:00 +0200`.
const ANCHOR_FORMAT: &str = "%Y-%m-%d %H:%M:%S %#z";

/// A wall-clock anchor that did not parse.
#[derive(Debug, Error)]
#[error("invalid time anchor {value:?}: {source}")]
pub struct AnchorParseError {
    value: String,
    #[source]
    source: chrono::ParseError,
}

/// Signed offset subtracted from every emitted wall-clock timestamp.
///
/// Resolved once at pipeline start: shift = now - anchor, so a run started
/// now charts as if it had started at the anchor. Repeated runs anchored to
/// the same instant then overlay exactly in the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeShift {
    shift_ms: i64,
}

impl TimeShift {
    /// Zero shift: timestamps pass through unchanged.
    pub const fn none() -> Self {
        Self { shift_ms: 0 }
    }

    pub const fn from_millis(shift_ms: i64) -> Self {
        Self { shift_ms }
    }

    /// Resolves the optional anchor against `now`.
    ///
    /// Disabled anchors (absent, empty, `#`-prefixed) and unparsable ones
    /// produce a zero shift; the latter with a warning. Never fatal.
    pub fn resolve(target: Option<&str>, now: DateTime<Utc>) -> Self {
        let Some(raw) = target else {
            return Self::none();
        };
        match parse_anchor(raw) {
            Ok(None) => Self::none(),
            Ok(Some(anchor)) => {
                let shift_ms = now.timestamp_millis() - anchor.timestamp_millis();
                info!(anchor = %anchor, shift_ms, "time shift enabled");
                Self { shift_ms }
            }
            Err(e) => {
                warn!(error = %e, "ignoring unparsable time shift target");
                Self::none()
            }
        }
    }

    /// Applies the shift to a wall-clock millisecond timestamp.
    pub const fn apply_ms(&self, wall_ms: i64) -> i64 {
        wall_ms - self.shift_ms
    }

    pub const fn millis(&self) -> i64 {
        self.shift_ms
    }
}

/// Parses the anchor value. `Ok(None)` means the feature is disabled.
fn parse_anchor(raw: &str) -> Result<Option<DateTime<FixedOffset>>, AnchorParseError> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with(DISABLE_PREFIX) {
        return Ok(None);
    }
    let value = raw.split(INLINE_COMMENT).next().unwrap_or_default().trim();
    let normalized = normalize_zone(value);
    DateTime::parse_from_str(&normalized, ANCHOR_FORMAT)
        .map(Some)
        .map_err(|source| AnchorParseError {
            value: value.to_string(),
            source,
        })
}

/// chrono has no zone-abbreviation table; map the common UTC spellings onto
/// a numeric offset and let everything else fail the parse.
fn normalize_zone(value: &str) -> String {
    match value.rsplit_once(' ') {
        Some((head, "UTC" | "GMT" | "Z" | "utc" | "gmt" | "z")) => format!("{head} +0000"),
        _ => value.to_string(),
    }
}
