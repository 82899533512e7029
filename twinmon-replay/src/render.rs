//! House snapshot rendering.

use crate::error::ReplayError;
use colored::Colorize;
use serde_json::Value;
use std::fmt::Write;
use twinmon_core::{HouseState, SensorRecord, MAX_FRESHNESS};

/// Renders the snapshot as pretty-printed JSON.
pub fn render_json(house: &HouseState) -> Result<String, ReplayError> {
    Ok(serde_json::to_string_pretty(house)?)
}

/// Renders the snapshot as nested tables, one block per location.
///
/// An empty subject or device is shown as `-`. With `color` set, the
/// freshness bar is green for recent readings and fades towards stale ones.
pub fn render_table(house: &HouseState, color: bool) -> String {
    if house.is_empty() {
        return "(no sensors)\n".to_string();
    }

    let mut out = String::new();
    for (location, subjects) in house.locations() {
        let title = display_key(location);
        if color {
            let _ = writeln!(out, "{}", title.bold());
        } else {
            let _ = writeln!(out, "{}", title);
        }

        for (subject, devices) in subjects {
            let _ = writeln!(out, "  {}", display_key(subject));
            for (device, sensors) in devices {
                let _ = writeln!(out, "    {}", display_key(device));

                let width = sensors.keys().map(str::len).max().unwrap_or(0);
                for (sensor, record) in sensors {
                    let _ = writeln!(
                        out,
                        "      {:<width$}  {:<12}  t={:<15}  {}",
                        sensor,
                        display_value(record.value()),
                        record.time(),
                        freshness_bar(record, color),
                        width = width
                    );
                }
            }
        }
    }
    out
}

fn display_key(key: &str) -> &str {
    if key.is_empty() {
        "-"
    } else {
        key
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn freshness_bar(record: &SensorRecord, color: bool) -> String {
    let level = record.freshness();
    let bar = format!(
        "{}{}",
        "#".repeat(level as usize),
        ".".repeat((MAX_FRESHNESS - level) as usize)
    );
    if !color {
        return bar;
    }

    match level {
        MAX_FRESHNESS => bar.green().bold().to_string(),
        3..=4 => bar.green().to_string(),
        1..=2 => bar.yellow().to_string(),
        _ => bar.dimmed().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use twinmon_core::SensorEvent;

    fn sample_house() -> HouseState {
        let mut house = HouseState::new();
        house.apply(&SensorEvent::new(1, "hall", "", "lux", "level", 12));
        house.apply(&SensorEvent::new(2, "hall", "", "pir", "motion", "ON"));
        house
    }

    #[test]
    fn test_render_table_plain() {
        let out = render_table(&sample_house(), false);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[0], "hall");
        assert_eq!(lines[1], "  -");
        assert_eq!(lines[2], "    lux");
        assert!(lines[3].starts_with("      level  12"));
        assert!(lines[3].ends_with("####."));
        assert_eq!(lines[4], "    pir");
        assert!(lines[5].contains("ON"));
        assert!(lines[5].ends_with("#####"));
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render_table(&HouseState::new(), false), "(no sensors)\n");
    }

    #[test]
    fn test_render_json() {
        let json = render_json(&sample_house()).unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["hall"][""]["pir"]["motion"]["value"], "ON");
        assert_eq!(value["hall"][""]["lux"]["level"]["freshness"], 4);
    }
}
