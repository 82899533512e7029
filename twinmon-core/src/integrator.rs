//! House integrator - folds events into one [`HouseState`] and evaluates
//! state predicates after every application.

use crate::error::CoreError;
use crate::event::SensorEvent;
use crate::guard::GuardExpr;
use crate::house::HouseState;

/// Predicate over the current house snapshot.
pub trait StatePredicate {
    fn holds(&self, house: &HouseState) -> bool;
}

impl StatePredicate for GuardExpr {
    fn holds(&self, house: &HouseState) -> bool {
        self.evaluate(house)
    }
}

impl<F> StatePredicate for F
where
    F: Fn(&HouseState) -> bool,
{
    fn holds(&self, house: &HouseState) -> bool {
        self(house)
    }
}

struct NamedPredicate {
    name: String,
    predicate: Box<dyn StatePredicate>,
}

/// Owns the run's house state and the invariants checked against it.
#[derive(Default)]
pub struct Integrator {
    house: HouseState,
    predicates: Vec<NamedPredicate>,
    applied: u64,
}

impl Integrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a predicate evaluated after every event.
    pub fn with_predicate(
        mut self,
        name: impl Into<String>,
        predicate: impl StatePredicate + 'static,
    ) -> Self {
        self.add_predicate(name, predicate);
        self
    }

    pub fn add_predicate(
        &mut self,
        name: impl Into<String>,
        predicate: impl StatePredicate + 'static,
    ) {
        self.predicates.push(NamedPredicate {
            name: name.into(),
            predicate: Box::new(predicate),
        });
    }

    /// Registers a guard expression over `house.*` fields.
    pub fn add_invariant(
        &mut self,
        name: impl Into<String>,
        guard: &str,
    ) -> Result<(), CoreError> {
        let expr = GuardExpr::parse_rooted(guard, "house")?;
        self.add_predicate(name, expr);
        Ok(())
    }

    /// Predicate names, in registration order.
    pub fn predicate_names(&self) -> impl Iterator<Item = &str> {
        self.predicates.iter().map(|p| p.name.as_str())
    }

    /// Applies one event and returns each predicate's verdict, in
    /// registration order.
    pub fn push(&mut self, event: &SensorEvent) -> Vec<bool> {
        self.house.apply(event);
        self.applied += 1;

        self.predicates
            .iter()
            .map(|p| {
                let holds = p.predicate.holds(&self.house);
                if !holds {
                    tracing::debug!(
                        predicate = %p.name,
                        timestamp = event.timestamp,
                        path = %event.path(),
                        "state predicate violated"
                    );
                }
                holds
            })
            .collect()
    }

    /// Current snapshot.
    pub fn house(&self) -> &HouseState {
        &self.house
    }

    /// Number of events applied so far.
    pub fn applied(&self) -> u64 {
        self.applied
    }

    /// Ends the run, handing the final snapshot to the caller.
    pub fn into_house(self) -> HouseState {
        self.house
    }
}
