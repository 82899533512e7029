//! Verdict sinks.

use crate::error::ReplayError;
use std::io::Write;
use twinmon_core::SensorEvent;

/// Receives one verdict per monitor per event, in input order.
pub trait VerdictSink {
    fn record(&mut self, monitor: &str, event: &SensorEvent, verdict: bool)
        -> Result<(), ReplayError>;

    /// Flushes buffered output at end of input.
    fn finish(&mut self) -> Result<(), ReplayError> {
        Ok(())
    }
}

/// Writes `<monitor>\t<timestamp>\t<true|false>` lines.
pub struct LineSink<W: Write> {
    out: W,
}

impl<W: Write> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> VerdictSink for LineSink<W> {
    fn record(
        &mut self,
        monitor: &str,
        event: &SensorEvent,
        verdict: bool,
    ) -> Result<(), ReplayError> {
        writeln!(self.out, "{}\t{}\t{}", monitor, event.timestamp, verdict)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ReplayError> {
        self.out.flush()?;
        Ok(())
    }
}

/// Collects verdicts in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub verdicts: Vec<(String, i64, bool)>,
}

impl MemorySink {
    /// Verdicts of one monitor, in input order.
    pub fn of(&self, monitor: &str) -> Vec<bool> {
        self.verdicts
            .iter()
            .filter(|(name, _, _)| name == monitor)
            .map(|(_, _, v)| *v)
            .collect()
    }
}

impl VerdictSink for MemorySink {
    fn record(
        &mut self,
        monitor: &str,
        event: &SensorEvent,
        verdict: bool,
    ) -> Result<(), ReplayError> {
        self.verdicts
            .push((monitor.to_string(), event.timestamp, verdict));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_sink_format() {
        let mut sink = LineSink::new(Vec::new());
        let event = SensorEvent::new(42, "hall", "", "", "motion", "ON");

        sink.record("chain", &event, true).unwrap();
        sink.record("chain", &event, false).unwrap();
        sink.finish().unwrap();

        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out, "chain\t42\ttrue\nchain\t42\tfalse\n");
    }

    #[test]
    fn test_memory_sink_filters_by_monitor() {
        let mut sink = MemorySink::default();
        let event = SensorEvent::new(1, "hall", "", "", "motion", "ON");
        sink.record("a", &event, true).unwrap();
        sink.record("b", &event, false).unwrap();
        sink.record("a", &event, false).unwrap();

        assert_eq!(sink.of("a"), [true, false]);
        assert_eq!(sink.of("b"), [false]);
    }
}
