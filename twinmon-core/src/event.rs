//! Normalized sensor events.

use crate::guard::{descend, Fields};
use crate::house::SensorPath;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single sensor reading, normalized by a dataset adapter.
///
/// `subject` and `device` may be empty; empty components are literal path
/// keys in the house model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorEvent {
    /// Epoch milliseconds, or the adapter's sentinel when unparsable.
    pub timestamp: i64,
    pub location: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub device: String,
    pub sensor: String,
    /// Reported state, a string or a number in practice.
    pub state: Value,
}

impl SensorEvent {
    pub fn new(
        timestamp: i64,
        location: impl Into<String>,
        subject: impl Into<String>,
        device: impl Into<String>,
        sensor: impl Into<String>,
        state: impl Into<Value>,
    ) -> Self {
        Self {
            timestamp,
            location: location.into(),
            subject: subject.into(),
            device: device.into(),
            sensor: sensor.into(),
            state: state.into(),
        }
    }

    /// Returns the full house path addressed by this event.
    pub fn path(&self) -> SensorPath<'_> {
        SensorPath {
            location: &self.location,
            subject: &self.subject,
            device: &self.device,
            sensor: &self.sensor,
        }
    }
}

impl Fields for SensorEvent {
    fn field(&self, path: &[String]) -> Option<Value> {
        if path.first().map(String::as_str) != Some("event") {
            return None;
        }
        let name = path.get(1)?;
        let rest = &path[2..];

        match name.as_str() {
            "state" => descend(&self.state, rest),
            _ if !rest.is_empty() => None,
            "timestamp" => Some(Value::from(self.timestamp)),
            "location" => Some(Value::from(self.location.as_str())),
            "subject" => Some(Value::from(self.subject.as_str())),
            "device" => Some(Value::from(self.device.as_str())),
            "sensor" => Some(Value::from(self.sensor.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::GuardExpr;
    use serde_json::json;

    #[test]
    fn test_deserialize_defaults_empty_subject_and_device() {
        let event: SensorEvent = serde_json::from_value(json!({
            "timestamp": 1000,
            "location": "kitchen",
            "sensor": "motion",
            "state": "ON"
        }))
        .unwrap();

        assert_eq!(event.subject, "");
        assert_eq!(event.device, "");
        assert_eq!(event.path().to_string(), "kitchen///motion");
    }

    #[test]
    fn test_event_fields() {
        let event = SensorEvent::new(42, "hall", "", "pir", "motion", "ON");

        assert_eq!(event.field(&["event".into(), "timestamp".into()]), Some(json!(42)));
        assert_eq!(event.field(&["event".into(), "subject".into()]), Some(json!("")));
        assert_eq!(event.field(&["event".into(), "nope".into()]), None);
        assert_eq!(event.field(&["house".into(), "sensor".into()]), None);
        assert_eq!(
            event.field(&["event".into(), "sensor".into(), "x".into()]),
            None
        );
    }

    #[test]
    fn test_guard_over_event() {
        let guard =
            GuardExpr::parse("event.sensor == \"luminosity\" && event.state < 30").unwrap();

        assert!(guard.evaluate(&SensorEvent::new(1, "hall", "", "", "luminosity", 12)));
        assert!(!guard.evaluate(&SensorEvent::new(1, "hall", "", "", "luminosity", 80)));
        assert!(!guard.evaluate(&SensorEvent::new(1, "hall", "", "", "motion", 12)));
    }
}
