use std::collections::BTreeMap;

/// Timestamp resolution a point was stamped with.
///
/// Per-request points carry nanosecond stamps (wall-clock milliseconds plus
/// the sub-millisecond disambiguator); marker and gauge points carry plain
/// milliseconds. `timestamp_ns` normalizes both for the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Milliseconds,
    Nanoseconds,
}

/// A typed field value, covering the scalar types the backend can store.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// One time-series point: measurement name, tags, typed fields and a
/// timestamp. Tags and fields are kept in sorted maps so encoded output is
/// deterministic.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: BTreeMap<String, String>,
    fields: BTreeMap<String, FieldValue>,
    timestamp: i64,
    precision: Precision,
}

impl Point {
    /// Starts a point for the given measurement, timestamp zero until set.
    pub fn measurement(name: impl Into<String>) -> Self {
        Self {
            measurement: name.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: 0,
            precision: Precision::Nanoseconds,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn timestamp(mut self, timestamp: i64, precision: Precision) -> Self {
        self.timestamp = timestamp;
        self.precision = precision;
        self
    }

    pub fn name(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn field_value(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Timestamp normalized to nanoseconds regardless of stored precision.
    pub fn timestamp_ns(&self) -> i64 {
        match self.precision {
            Precision::Milliseconds => self.timestamp.saturating_mul(1_000_000),
            Precision::Nanoseconds => self.timestamp,
        }
    }
}
