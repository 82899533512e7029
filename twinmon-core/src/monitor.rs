//! Uniform per-event interface over both verification branches.

use crate::event::SensorEvent;
use crate::integrator::Integrator;
use crate::verifier::ChainVerifier;

/// Consumes events in arrival order and emits one verdict per event.
pub trait Monitor {
    fn observe(&mut self, event: &SensorEvent) -> bool;

    /// Feeds a sequence of events, returning one verdict per event.
    fn observe_all<'a, I>(&mut self, events: I) -> Vec<bool>
    where
        I: IntoIterator<Item = &'a SensorEvent>,
        Self: Sized,
    {
        events.into_iter().map(|e| self.observe(e)).collect()
    }
}

impl Monitor for ChainVerifier {
    fn observe(&mut self, event: &SensorEvent) -> bool {
        self.step(event)
    }
}

/// The verdict is the conjunction of every registered predicate; with none
/// registered the integrator only folds state and always reports `true`.
impl Monitor for Integrator {
    fn observe(&mut self, event: &SensorEvent) -> bool {
        self.push(event).into_iter().all(|holds| holds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::house::HouseState;

    fn ev(
        t: i64,
        device: &str,
        sensor: &str,
        state: impl Into<serde_json::Value>,
    ) -> SensorEvent {
        SensorEvent::new(t, "hall", "", device, sensor, state)
    }

    #[test]
    fn test_monitors_drive_uniformly() {
        let chain = ChainVerifier::builder("a-then-b")
            .step(|e: &SensorEvent| e.sensor == "A")
            .step(|e: &SensorEvent| e.sensor == "B")
            .build()
            .unwrap();
        let integrator =
            Integrator::new().with_predicate("few-sensors", |h: &HouseState| h.len() < 2);

        let mut monitors: Vec<Box<dyn Monitor>> = vec![Box::new(chain), Box::new(integrator)];
        let events = [ev(1, "", "A", 1), ev(2, "", "B", 1)];

        let verdicts: Vec<Vec<bool>> = events
            .iter()
            .map(|e| monitors.iter_mut().map(|m| m.observe(e)).collect())
            .collect();

        assert_eq!(verdicts, [[true, true], [false, false]]);
    }

    #[test]
    fn test_integrator_without_predicates_always_holds() {
        let mut integrator = Integrator::new();
        let events = [ev(1, "pir", "motion", "ON"), ev(2, "lux", "level", 3)];
        assert_eq!(integrator.observe_all(&events), [true, true]);
        assert_eq!(integrator.house().len(), 2);
    }

    #[test]
    fn test_chain_observe_all_matches_run() {
        let build = || {
            ChainVerifier::builder("ab")
                .step(|e: &SensorEvent| e.sensor == "A")
                .step(|e: &SensorEvent| e.sensor == "B")
                .build()
                .unwrap()
        };
        let events = [ev(1, "", "A", 1), ev(1, "", "B", 1), ev(2, "", "C", 1)];

        let mut a = build();
        let mut b = build();
        assert_eq!(a.observe_all(&events), b.run(&events));
    }
}
