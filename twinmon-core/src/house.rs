//! Digital-twin house state.
//!
//! A [`HouseState`] folds single-sensor [`SensorEvent`]s into a snapshot of
//! every sensor seen so far, addressed by a fixed four-level path:
//!
//! ```text
//! location -> subject -> device -> sensor -> SensorRecord { value, time, freshness }
//! ```
//!
//! Keys are kept in lexicographic order at every level so traversal is
//! deterministic. Containers are created lazily on first reference and never
//! removed. Each applied event rewrites exactly one record and ages the
//! freshness marker of every other record by one step.

use crate::error::CoreError;
use crate::event::SensorEvent;
use crate::guard::Fields;
use serde::Serialize;
use serde_json::Value;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

/// Freshness of a record that was just written.
pub const MAX_FRESHNESS: u8 = 5;

/// Latest reading of one sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorRecord {
    value: Value,
    time: i64,
    freshness: u8,
}

impl SensorRecord {
    fn fresh(value: Value, time: i64) -> Self {
        Self {
            value,
            time,
            freshness: MAX_FRESHNESS,
        }
    }

    /// Last reported state.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Timestamp of the last report.
    pub fn time(&self) -> i64 {
        self.time
    }

    /// Recency marker, `MAX_FRESHNESS` when just updated down to 0 when stale.
    pub fn freshness(&self) -> u8 {
        self.freshness
    }

    fn age(&mut self) {
        self.freshness = self.freshness.saturating_sub(1);
    }
}

/// One nesting level of the house tree, keyed by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Level<T>(BTreeMap<String, T>);

/// Sensor name to latest reading.
pub type SensorMap = Level<SensorRecord>;
/// Device (model) name to its sensors.
pub type DeviceState = Level<SensorMap>;
/// Subject name to its devices. The subject may be the empty string.
pub type LocationState = Level<DeviceState>;

impl<T> Default for Level<T> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<T> Level<T> {
    pub fn get(&self, key: &str) -> Option<&T> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterates children in lexicographic key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, T> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T: Default> Level<T> {
    fn child_mut(&mut self, key: &str) -> &mut T {
        self.0.entry(key.to_string()).or_default()
    }
}

impl<'a, T> IntoIterator for &'a Level<T> {
    type Item = (&'a String, &'a T);
    type IntoIter = btree_map::Iter<'a, String, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Borrowed address of one sensor in the house tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SensorPath<'a> {
    pub location: &'a str,
    pub subject: &'a str,
    pub device: &'a str,
    pub sensor: &'a str,
}

impl fmt::Display for SensorPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.location, self.subject, self.device, self.sensor
        )
    }
}

/// Full-house snapshot, location name to [`LocationState`].
///
/// Deliberately not `Clone`: see [`HouseState::duplicate`] and
/// [`HouseState::duplicate_with_readings`].
#[derive(Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HouseState {
    locations: Level<LocationState>,
}

impl HouseState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one event into the snapshot.
    ///
    /// Ages every existing record, then writes the record addressed by the
    /// event's full path with `freshness = MAX_FRESHNESS`. Never fails and
    /// never removes a path; empty path components are ordinary keys.
    pub fn apply(&mut self, event: &SensorEvent) -> &mut Self {
        self.age_all();

        let sensors = self
            .locations
            .child_mut(&event.location)
            .child_mut(&event.subject)
            .child_mut(&event.device);
        sensors.0.insert(
            event.sensor.clone(),
            SensorRecord::fresh(event.state.clone(), event.timestamp),
        );

        self
    }

    /// Decrements the freshness of every record, floored at zero.
    fn age_all(&mut self) {
        self.locations
            .0
            .values_mut()
            .flat_map(|subjects| subjects.0.values_mut())
            .flat_map(|devices| devices.0.values_mut())
            .flat_map(|sensors| sensors.0.values_mut())
            .for_each(SensorRecord::age);
    }

    /// Looks up the record at a full path.
    pub fn get(
        &self,
        location: &str,
        subject: &str,
        device: &str,
        sensor: &str,
    ) -> Option<&SensorRecord> {
        self.locations
            .get(location)?
            .get(subject)?
            .get(device)?
            .get(sensor)
    }

    /// Shorthand for the last reported value at a full path.
    pub fn value(
        &self,
        location: &str,
        subject: &str,
        device: &str,
        sensor: &str,
    ) -> Option<&Value> {
        self.get(location, subject, device, sensor)
            .map(SensorRecord::value)
    }

    pub fn location(&self, name: &str) -> Option<&LocationState> {
        self.locations.get(name)
    }

    /// Iterates locations in lexicographic order.
    pub fn locations(&self) -> btree_map::Iter<'_, String, LocationState> {
        self.locations.iter()
    }

    /// Iterates every record with its path, in lexicographic path order.
    pub fn iter(&self) -> impl Iterator<Item = (SensorPath<'_>, &SensorRecord)> {
        self.locations.iter().flat_map(|(location, subjects)| {
            subjects.iter().flat_map(move |(subject, devices)| {
                devices.iter().flat_map(move |(device, sensors)| {
                    sensors.iter().map(move |(sensor, record)| {
                        let path = SensorPath {
                            location: location.as_str(),
                            subject: subject.as_str(),
                            device: device.as_str(),
                            sensor: sensor.as_str(),
                        };
                        (path, record)
                    })
                })
            })
        })
    }

    /// Every sensor path, in lexicographic order.
    pub fn paths(&self) -> impl Iterator<Item = SensorPath<'_>> {
        self.iter().map(|(path, _)| path)
    }

    /// Number of sensor records.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Structural copy: an independent container tree holding the same leaf
    /// values and freshness markers.
    pub fn duplicate(&self) -> HouseState {
        HouseState {
            locations: self.locations.clone(),
        }
    }

    /// Duplicating a live twin together with its readings is not supported.
    pub fn duplicate_with_readings(&self) -> Result<HouseState, CoreError> {
        Err(CoreError::UnsupportedOperation {
            operation: "duplicate house state with readings".to_string(),
        })
    }
}

/// Resolves `house.<location>.<subject>.<device>.<sensor>` to the record value,
/// and `...<sensor>.value|time|freshness` to the named attribute.
impl Fields for HouseState {
    fn field(&self, path: &[String]) -> Option<Value> {
        match path {
            [root, location, subject, device, sensor, rest @ ..] if root == "house" => {
                let record = self.get(location, subject, device, sensor)?;
                match rest {
                    [] => Some(record.value.clone()),
                    [attr] if attr == "value" => Some(record.value.clone()),
                    [attr] if attr == "time" => Some(Value::from(record.time)),
                    [attr] if attr == "freshness" => Some(Value::from(record.freshness)),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::GuardExpr;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn ev(t: i64, location: &str, subject: &str, sensor: &str, state: Value) -> SensorEvent {
        SensorEvent::new(t, location, subject, "dev", sensor, state)
    }

    fn path_set(house: &HouseState) -> BTreeSet<(String, String, String, String)> {
        house
            .paths()
            .map(|p| {
                (
                    p.location.to_string(),
                    p.subject.to_string(),
                    p.device.to_string(),
                    p.sensor.to_string(),
                )
            })
            .collect()
    }

    #[test]
    fn test_apply_creates_path_lazily() {
        let mut house = HouseState::new();
        assert!(house.is_empty());

        house.apply(&ev(10, "kitchen", "", "motion", json!("ON")));

        let record = house.get("kitchen", "", "dev", "motion").unwrap();
        assert_eq!(record.value(), &json!("ON"));
        assert_eq!(record.time(), 10);
        assert_eq!(record.freshness(), MAX_FRESHNESS);
        assert_eq!(house.len(), 1);
        assert!(house.location("kitchen").unwrap().contains(""));
    }

    #[test]
    fn test_apply_is_chainable() {
        let mut house = HouseState::new();
        house
            .apply(&ev(1, "a", "", "s1", json!(1)))
            .apply(&ev(2, "a", "", "s2", json!(2)));
        assert_eq!(house.len(), 2);
    }

    #[test]
    fn test_freshness_decays_and_resets() {
        let mut house = HouseState::new();
        house.apply(&ev(1, "hall", "", "lux", json!(12)));
        house.apply(&ev(2, "hall", "", "motion", json!("ON")));
        house.apply(&ev(3, "hall", "", "motion", json!("OFF")));

        assert_eq!(house.get("hall", "", "dev", "lux").unwrap().freshness(), 3);
        assert_eq!(
            house.get("hall", "", "dev", "motion").unwrap().freshness(),
            MAX_FRESHNESS
        );

        for t in 4..20 {
            house.apply(&ev(t, "hall", "", "motion", json!("ON")));
        }
        assert_eq!(house.get("hall", "", "dev", "lux").unwrap().freshness(), 0);
    }

    #[test]
    fn test_overwrite_keeps_single_record() {
        let mut house = HouseState::new();
        house.apply(&ev(1, "bath", "alice", "humidity", json!(40)));
        house.apply(&ev(5, "bath", "alice", "humidity", json!(55)));

        assert_eq!(house.len(), 1);
        let record = house.get("bath", "alice", "dev", "humidity").unwrap();
        assert_eq!(record.value(), &json!(55));
        assert_eq!(record.time(), 5);
    }

    #[test]
    fn test_sentinel_timestamp_is_stored() {
        let mut house = HouseState::new();
        house.apply(&ev(-1, "office", "", "door", json!("OPEN")));
        assert_eq!(house.get("office", "", "dev", "door").unwrap().time(), -1);
    }

    #[test]
    fn test_iteration_is_lexicographic() {
        let mut house = HouseState::new();
        house.apply(&ev(1, "living", "", "b", json!(1)));
        house.apply(&ev(2, "bedroom", "", "z", json!(1)));
        house.apply(&ev(3, "living", "", "a", json!(1)));

        let paths: Vec<String> = house.iter().map(|(p, _)| p.to_string()).collect();
        assert_eq!(paths, ["bedroom//dev/z", "living//dev/a", "living//dev/b"]);

        let locations: Vec<&String> = house.locations().map(|(name, _)| name).collect();
        assert_eq!(locations, ["bedroom", "living"]);
    }

    #[test]
    fn test_duplicate_is_independent() {
        let mut house = HouseState::new();
        house.apply(&ev(1, "hall", "", "lux", json!(12)));

        let copy = house.duplicate();
        house.apply(&ev(2, "hall", "", "motion", json!("ON")));

        assert_eq!(copy.len(), 1);
        assert_eq!(copy.get("hall", "", "dev", "lux").unwrap().freshness(), MAX_FRESHNESS);
        assert_eq!(house.len(), 2);
    }

    #[test]
    fn test_duplicate_with_readings_is_unsupported() {
        let mut house = HouseState::new();
        house.apply(&ev(1, "hall", "", "lux", json!(12)));

        let err = house.duplicate_with_readings().unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedOperation { .. }));
        assert_eq!(err.error_code(), "UNSUPPORTED");
    }

    #[test]
    fn test_serializes_as_nested_maps() {
        let mut house = HouseState::new();
        house.apply(&ev(7, "hall", "", "lux", json!(12)));

        let value = serde_json::to_value(&house).unwrap();
        assert_eq!(
            value,
            json!({"hall": {"": {"dev": {"lux": {"value": 12, "time": 7, "freshness": 5}}}}})
        );
    }

    #[test]
    fn test_house_fields_in_guards() {
        let mut house = HouseState::new();
        house.apply(&SensorEvent::new(1, "hall", "", "pir", "motion", "ON"));
        house.apply(&SensorEvent::new(1, "hall", "", "lux", "level", 4));

        let dark_motion = GuardExpr::parse(concat!(
            r#"house.hall."".pir.motion == "ON" && "#,
            r#"house.hall."".lux.level < 10"#
        ))
        .unwrap();
        assert!(dark_motion.evaluate(&house));

        let fresh = GuardExpr::parse("house.hall.\"\".pir.motion.freshness == 4").unwrap();
        assert!(fresh.evaluate(&house));

        let time = GuardExpr::parse("house.hall.\"\".lux.level.time == 1").unwrap();
        assert!(time.evaluate(&house));

        let missing = GuardExpr::parse("house.garage.\"\".pir.motion == \"ON\"").unwrap();
        assert!(!missing.evaluate(&house));
    }

    fn arb_event() -> impl Strategy<Value = SensorEvent> {
        (
            0i64..50,
            prop::sample::select(vec!["hall", "kitchen", ""]),
            prop::sample::select(vec!["", "alice"]),
            prop::sample::select(vec!["pir", "lux"]),
            prop::sample::select(vec!["motion", "level", "door"]),
            0i64..100,
        )
            .prop_map(|(t, l, s, d, n, v)| SensorEvent::new(t, l, s, d, n, v))
    }

    proptest! {
        #[test]
        fn prop_apply_sets_target_and_ages_others(
            events in prop::collection::vec(arb_event(), 0..30),
            last in arb_event(),
        ) {
            let mut house = HouseState::new();
            for e in &events {
                house.apply(e);
            }

            let before: BTreeMap<(String, String, String, String), u8> = house
                .iter()
                .map(|(p, r)| {
                    (
                        (
                            p.location.to_string(),
                            p.subject.to_string(),
                            p.device.to_string(),
                            p.sensor.to_string(),
                        ),
                        r.freshness(),
                    )
                })
                .collect();

            house.apply(&last);

            let target = (
                last.location.clone(),
                last.subject.clone(),
                last.device.clone(),
                last.sensor.clone(),
            );
            let record = house
                .get(&last.location, &last.subject, &last.device, &last.sensor)
                .unwrap();
            prop_assert_eq!(record.value(), &last.state);
            prop_assert_eq!(record.time(), last.timestamp);
            prop_assert_eq!(record.freshness(), MAX_FRESHNESS);

            for ((l, s, d, n), freshness) in before {
                if (l.clone(), s.clone(), d.clone(), n.clone()) == target {
                    continue;
                }
                let after = house.get(&l, &s, &d, &n).unwrap().freshness();
                prop_assert_eq!(after, freshness.saturating_sub(1));
            }
        }

        #[test]
        fn prop_paths_never_removed(events in prop::collection::vec(arb_event(), 1..40)) {
            let mut house = HouseState::new();
            let mut seen = BTreeSet::new();
            for e in &events {
                house.apply(e);
                let paths = path_set(&house);
                prop_assert!(seen.is_subset(&paths));
                seen = paths;
            }
        }

        #[test]
        fn prop_replay_is_deterministic(events in prop::collection::vec(arb_event(), 0..40)) {
            let mut a = HouseState::new();
            let mut b = HouseState::new();
            for e in &events {
                a.apply(e);
                b.apply(e);
            }
            prop_assert_eq!(a, b);
        }
    }
}
