//! InfluxDB line protocol encoding.
//!
//! One point becomes one line: `measurement,tags fields timestamp`.
//! Timestamps are always written in nanoseconds; millisecond-precision
//! points are scaled up during encoding so a batch can mix both.

use std::fmt::Write as _;

use crate::point::{FieldValue, Point};

/// Encode a batch, one line per point, newline terminated.
///
/// A point without fields is not a valid line and is skipped.
pub fn encode_batch(points: &[Point]) -> String {
    let mut out = String::with_capacity(points.len() * 128);
    for point in points {
        if point.fields().is_empty() {
            continue;
        }
        encode_point(point, &mut out);
        out.push('\n');
    }
    out
}

/// Append one point to `out` without the trailing newline.
pub fn encode_point(point: &Point, out: &mut String) {
    escape_measurement(point.name(), out);

    for (key, value) in point.tags() {
        out.push(',');
        escape_key(key, out);
        out.push('=');
        escape_key(value, out);
    }

    out.push(' ');
    let mut first = true;
    for (key, value) in point.fields() {
        if !first {
            out.push(',');
        }
        first = false;

        escape_key(key, out);
        out.push('=');
        match value {
            FieldValue::Integer(i) => {
                let _ = write!(out, "{i}i");
            }
            FieldValue::Float(f) => {
                let _ = write!(out, "{f}");
            }
            FieldValue::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
            FieldValue::String(s) => {
                out.push('"');
                escape_string_field(s, out);
                out.push('"');
            }
        }
    }

    out.push(' ');
    let _ = write!(out, "{}", point.timestamp_ns());
}

// Measurements escape commas and spaces but not equals signs.
fn escape_measurement(name: &str, out: &mut String) {
    escape(name, out, false);
}

// Tag keys, tag values, and field keys all share one escape set.
fn escape_key(key: &str, out: &mut String) {
    escape(key, out, true);
}

fn escape(input: &str, out: &mut String, escape_equals: bool) {
    for c in input.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ' ' | ',' => {
                out.push('\\');
                out.push(c);
            }
            '=' if escape_equals => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
}

// String field values only escape backslash and double quote; a raw
// newline would end the line early, so it degrades to a literal `\n`.
fn escape_string_field(value: &str, out: &mut String) {
    for c in value.chars() {
        match c {
            '\\' | '"' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
}
