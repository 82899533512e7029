//! JSON-lines event source.
//!
//! Each non-blank line is one normalized record (wrapped here):
//!
//! ```json
//! {"timestamp": 1489968000000, "location": "kitchen", "subject": "", "device": "pir",
//!  "sensor": "motion", "state": "ON"}
//! ```
//!
//! `timestamp` may be epoch milliseconds or a date string (RFC 3339, or
//! `YYYY-MM-DD HH:MM:SS[.fff]` read as UTC). Unparsable timestamps become the
//! configured sentinel. `subject` and `device` default to the empty string.
//! Lines that are not valid UTF-8, are not objects, or lack
//! `location`/`sensor` are skipped.

use crate::error::ReplayError;
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use serde_json::Value;
use std::io::BufRead;
use twinmon_core::SensorEvent;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Counters kept by an [`EventReader`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStats {
    /// Lines read, blank lines included.
    pub lines: u64,
    /// Events produced.
    pub events: u64,
    /// Lines skipped as malformed.
    pub skipped: u64,
    /// Events whose timestamp was replaced by the sentinel.
    pub sentinel_timestamps: u64,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(default)]
    timestamp: Value,
    location: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    device: Option<String>,
    sensor: String,
    #[serde(default)]
    state: Value,
}

/// Parses a timestamp value into epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ms) = s.parse::<i64>() {
                return Some(ms);
            }
            if let Ok(ms) = s.parse::<f64>() {
                return ms.is_finite().then_some(ms as i64);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.timestamp_millis());
            }
            NAIVE_FORMATS.iter().find_map(|fmt| {
                NaiveDateTime::parse_from_str(s, fmt)
                    .ok()
                    .map(|dt| dt.and_utc().timestamp_millis())
            })
        }
        _ => None,
    }
}

/// Streaming reader producing [`SensorEvent`]s from JSON lines.
pub struct EventReader<R> {
    reader: R,
    sentinel: i64,
    stats: SourceStats,
    buf: Vec<u8>,
}

impl<R: BufRead> EventReader<R> {
    pub fn new(reader: R, sentinel: i64) -> Self {
        Self {
            reader,
            sentinel,
            stats: SourceStats::default(),
            buf: Vec::new(),
        }
    }

    pub fn stats(&self) -> SourceStats {
        self.stats
    }

    fn parse_line(&mut self, line: &str) -> Option<SensorEvent> {
        let raw: RawEvent = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(e) => {
                self.stats.skipped += 1;
                tracing::warn!(line = self.stats.lines, error = %e, "skipping malformed record");
                return None;
            }
        };

        let timestamp = match parse_timestamp(&raw.timestamp) {
            Some(ts) => ts,
            None => {
                self.stats.sentinel_timestamps += 1;
                tracing::debug!(
                    line = self.stats.lines,
                    timestamp = %raw.timestamp,
                    sentinel = self.sentinel,
                    "unparsable timestamp"
                );
                self.sentinel
            }
        };

        Some(SensorEvent {
            timestamp,
            location: raw.location,
            subject: raw.subject.unwrap_or_default(),
            device: raw.device.unwrap_or_default(),
            sensor: raw.sensor,
            state: raw.state,
        })
    }
}

impl<R: BufRead> Iterator for EventReader<R> {
    type Item = Result<SensorEvent, ReplayError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
            self.stats.lines += 1;

            let line = std::mem::take(&mut self.buf);
            let parsed = match std::str::from_utf8(&line) {
                Ok(text) if text.trim().is_empty() => None,
                Ok(text) => self.parse_line(text.trim()),
                Err(e) => {
                    self.stats.skipped += 1;
                    tracing::warn!(
                        line = self.stats.lines,
                        error = %e,
                        "skipping non UTF-8 record"
                    );
                    None
                }
            };
            self.buf = line;

            if let Some(event) = parsed {
                self.stats.events += 1;
                return Some(Ok(event));
            }
        }
    }
}
