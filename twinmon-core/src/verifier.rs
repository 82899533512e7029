//! Ordered-sequence verifier.
//!
//! A [`ChainVerifier`] checks, one event at a time, that a declared chain of
//! K step shapes occurs within a single logical tick. Step 0 starts a chain
//! and binds the correlation timestamp `t`; every later step must match its
//! guard *and* carry exactly that timestamp, otherwise the machine enters the
//! violation state.
//!
//! ```text
//!            g0 / t := ts                 g_i && ts == t
//!   Idle ----------------> Awaiting(1) ---- ... ----> next(i)
//!    ^                          |
//!    |        (any event)       | otherwise
//!    +------- Violation <-------+
//! ```
//!
//! Outputs follow Moore semantics: the verdict for an event is the symbol of
//! the state reached after it, `false` for [`VerifierState::Violation`] and
//! `true` everywhere else.

use crate::error::CoreError;
use crate::event::SensorEvent;
use crate::guard::GuardExpr;
use std::fmt;

/// Predicate deciding whether an event is an instance of a chain step.
///
/// Implementations must not panic on incomplete events; a guard that cannot
/// be evaluated reports `false`.
pub trait EventGuard {
    fn matches(&self, event: &SensorEvent) -> bool;
}

impl EventGuard for GuardExpr {
    fn matches(&self, event: &SensorEvent) -> bool {
        self.evaluate(event)
    }
}

impl<F> EventGuard for F
where
    F: Fn(&SensorEvent) -> bool,
{
    fn matches(&self, event: &SensorEvent) -> bool {
        self(event)
    }
}

/// Verifier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerifierState {
    /// Scanning for a chain start (state 0).
    Idle,
    /// Waiting for step `i` of the chain, `1 <= i < K`.
    Awaiting(usize),
    /// The previous event broke the chain.
    Violation,
}

impl VerifierState {
    /// Moore output symbol of the state.
    pub fn output(self) -> bool {
        !matches!(self, VerifierState::Violation)
    }
}

impl fmt::Display for VerifierState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerifierState::Idle => f.write_str("0"),
            VerifierState::Awaiting(i) => write!(f, "{}", i),
            VerifierState::Violation => f.write_str("V"),
        }
    }
}

/// Correlation context carried between transitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    t: Option<i64>,
}

impl Context {
    /// Timestamp bound by the most recent chain start.
    pub fn t(&self) -> Option<i64> {
        self.t
    }
}

struct Step {
    guard: Box<dyn EventGuard>,
    next: VerifierState,
}

/// Resolves per-step `next` indices into target states.
///
/// `None` means "the following step", or back to idle after the last step.
/// Index 0 names [`VerifierState::Idle`]. Step 0 always leads to step 1.
pub(crate) fn resolve_topology(
    next: &[Option<usize>],
) -> Result<Vec<VerifierState>, CoreError> {
    let k = next.len();
    if k < 2 {
        return Err(CoreError::InvalidDefinition {
            reason: format!("a chain needs at least 2 steps, got {}", k),
        });
    }

    next.iter()
        .enumerate()
        .map(|(i, target)| match (i, *target) {
            (0, None) | (0, Some(1)) => Ok(VerifierState::Awaiting(1)),
            (0, Some(j)) => Err(CoreError::InvalidDefinition {
                reason: format!("step 0 must lead to step 1, not {}", j),
            }),
            (i, None) if i + 1 < k => Ok(VerifierState::Awaiting(i + 1)),
            (_, None) | (_, Some(0)) => Ok(VerifierState::Idle),
            (_, Some(j)) if j < k => Ok(VerifierState::Awaiting(j)),
            (i, Some(j)) => Err(CoreError::InvalidDefinition {
                reason: format!("step {} leads to unknown step {} (chain has {})", i, j, k),
            }),
        })
        .collect()
}

/// Builder for a [`ChainVerifier`].
pub struct ChainBuilder {
    name: String,
    guards: Vec<Box<dyn EventGuard>>,
    next: Vec<Option<usize>>,
}

impl ChainBuilder {
    /// Appends a step that continues with the following step.
    pub fn step(mut self, guard: impl EventGuard + 'static) -> Self {
        self.guards.push(Box::new(guard));
        self.next.push(None);
        self
    }

    /// Appends a step that continues with step `next` (0 = back to idle).
    pub fn step_then(mut self, guard: impl EventGuard + 'static, next: usize) -> Self {
        self.guards.push(Box::new(guard));
        self.next.push(Some(next));
        self
    }

    pub fn build(self) -> Result<ChainVerifier, CoreError> {
        let targets = resolve_topology(&self.next)?;
        let steps = self
            .guards
            .into_iter()
            .zip(targets)
            .map(|(guard, next)| Step { guard, next })
            .collect();
        Ok(ChainVerifier::from_steps(self.name, steps))
    }
}

/// Deterministic chain verifier over an ordered event stream.
pub struct ChainVerifier {
    name: String,
    steps: Vec<Step>,
    state: VerifierState,
    context: Context,
}

impl ChainVerifier {
    pub fn builder(name: impl Into<String>) -> ChainBuilder {
        ChainBuilder {
            name: name.into(),
            guards: Vec::new(),
            next: Vec::new(),
        }
    }

    pub(crate) fn from_parts(
        name: String,
        parts: impl IntoIterator<Item = (Box<dyn EventGuard>, VerifierState)>,
    ) -> Self {
        let steps = parts
            .into_iter()
            .map(|(guard, next)| Step { guard, next })
            .collect();
        Self::from_steps(name, steps)
    }

    fn from_steps(name: String, steps: Vec<Step>) -> Self {
        Self {
            name,
            steps,
            state: VerifierState::Idle,
            context: Context::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of steps in the chain.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn state(&self) -> VerifierState {
        self.state
    }

    pub fn context(&self) -> Context {
        self.context
    }

    /// Computes the transition for `event` without applying it.
    ///
    /// Returns the target state and the timestamp to bind, if any.
    fn transition(&self, event: &SensorEvent) -> (VerifierState, Option<i64>) {
        match self.state {
            VerifierState::Idle => {
                if self.steps[0].guard.matches(event) {
                    (VerifierState::Awaiting(1), Some(event.timestamp))
                } else {
                    (VerifierState::Idle, None)
                }
            }
            VerifierState::Awaiting(i) => {
                let step = &self.steps[i];
                if self.context.t == Some(event.timestamp) && step.guard.matches(event) {
                    (step.next, None)
                } else {
                    (VerifierState::Violation, None)
                }
            }
            VerifierState::Violation => (VerifierState::Idle, None),
        }
    }

    /// Consumes one event and returns the verdict of the state reached.
    pub fn step(&mut self, event: &SensorEvent) -> bool {
        let (next, bind) = self.transition(event);

        if let Some(t) = bind {
            tracing::debug!(verifier = %self.name, t, "chain started");
            self.context.t = Some(t);
        }
        if next == VerifierState::Violation {
            tracing::debug!(
                verifier = %self.name,
                from = %self.state,
                timestamp = event.timestamp,
                sensor = %event.sensor,
                "chain violated"
            );
        }

        self.state = next;
        next.output()
    }

    /// Feeds a sequence of events, returning one verdict per event.
    pub fn run<'a, I>(&mut self, events: I) -> Vec<bool>
    where
        I: IntoIterator<Item = &'a SensorEvent>,
    {
        events.into_iter().map(|e| self.step(e)).collect()
    }

    /// Returns to the initial state with an unset context.
    pub fn reset(&mut self) {
        self.state = VerifierState::Idle;
        self.context = Context::default();
    }
}

impl fmt::Debug for ChainVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainVerifier")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .field("state", &self.state)
            .field("context", &self.context)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(t: i64, sensor: &str, state: impl Into<serde_json::Value>) -> SensorEvent {
        SensorEvent::new(t, "house", "", "", sensor, state)
    }

    fn a_on(e: &SensorEvent) -> bool {
        e.sensor == "A" && e.state == "ON"
    }

    fn b_nonneg(e: &SensorEvent) -> bool {
        e.sensor == "B" && e.state.as_f64().map(|v| v >= 0.0).unwrap_or(false)
    }

    /// Steps: A(ON) -> B(>=0) -> B(>=0) looping back to step 1.
    fn looping_chain() -> ChainVerifier {
        ChainVerifier::builder("ab-loop")
            .step(a_on)
            .step(b_nonneg)
            .step_then(b_nonneg, 1)
            .build()
            .unwrap()
    }

    #[test]
    fn test_chain_success() {
        let mut verifier = looping_chain();
        let events = [ev(1, "A", "ON"), ev(1, "B", 5), ev(1, "B", 7)];

        assert_eq!(verifier.run(&events), [true, true, true]);
        assert_eq!(verifier.state(), VerifierState::Awaiting(1));
        assert_eq!(verifier.context().t(), Some(1));
    }

    #[test]
    fn test_chain_violation_and_reset() {
        let mut verifier = looping_chain();

        assert!(verifier.step(&ev(1, "A", "ON")));
        assert!(!verifier.step(&ev(2, "C", "irrelevant")));
        assert_eq!(verifier.state(), VerifierState::Violation);

        // The reset event is consumed, even if it looks like a chain start.
        assert!(verifier.step(&ev(3, "A", "ON")));
        assert_eq!(verifier.state(), VerifierState::Idle);
    }

    #[test]
    fn test_timestamp_mismatch_is_violation() {
        let mut verifier = looping_chain();
        assert!(verifier.step(&ev(1, "A", "ON")));
        assert!(!verifier.step(&ev(2, "B", 5)));
    }

    #[test]
    fn test_idle_ignores_non_start_events() {
        let mut verifier = looping_chain();
        assert_eq!(
            verifier.run(&[ev(1, "B", 5), ev(2, "C", 0), ev(3, "A", "OFF")]),
            [true, true, true]
        );
        assert_eq!(verifier.state(), VerifierState::Idle);
        assert_eq!(verifier.context().t(), None);
    }

    #[test]
    fn test_order_sensitivity() {
        let start = ev(1, "A", "ON");
        let follow = ev(2, "B", 5);

        let mut forward = looping_chain();
        let mut swapped = looping_chain();

        let a = forward.run([&start, &follow]);
        let b = swapped.run([&follow, &start]);

        assert_eq!(a, [true, false]);
        assert_eq!(b, [true, true]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_last_step_returns_to_idle_by_default() {
        let mut verifier = ChainVerifier::builder("pair")
            .step(a_on)
            .step(b_nonneg)
            .build()
            .unwrap();

        assert_eq!(verifier.run(&[ev(4, "A", "ON"), ev(4, "B", 1)]), [true, true]);
        assert_eq!(verifier.state(), VerifierState::Idle);

        // A new chain rebinds the correlation timestamp.
        assert!(verifier.step(&ev(9, "A", "ON")));
        assert_eq!(verifier.context().t(), Some(9));
    }

    #[test]
    fn test_unevaluable_guard_routes_to_violation() {
        let mut verifier = ChainVerifier::builder("expr")
            .step(GuardExpr::parse("event.sensor == \"A\"").unwrap())
            .step(GuardExpr::parse("event.state.level > 3").unwrap())
            .build()
            .unwrap();

        assert!(verifier.step(&ev(1, "A", "ON")));
        // `state` is a string here, so `state.level` does not resolve.
        assert!(!verifier.step(&ev(1, "B", "flat")));
    }

    #[test]
    fn test_reset() {
        let mut verifier = looping_chain();
        verifier.step(&ev(1, "A", "ON"));
        verifier.reset();
        assert_eq!(verifier.state(), VerifierState::Idle);
        assert_eq!(verifier.context(), Context::default());
    }

    #[test]
    fn test_topology_validation() {
        assert!(matches!(
            resolve_topology(&[None]),
            Err(CoreError::InvalidDefinition { .. })
        ));
        assert!(resolve_topology(&[Some(2), None, None]).is_err());
        assert!(resolve_topology(&[None, Some(5)]).is_err());

        assert_eq!(
            resolve_topology(&[None, None, Some(1)]).unwrap(),
            [
                VerifierState::Awaiting(1),
                VerifierState::Awaiting(2),
                VerifierState::Awaiting(1)
            ]
        );
        assert_eq!(
            resolve_topology(&[None, Some(0)]).unwrap(),
            [VerifierState::Awaiting(1), VerifierState::Idle]
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(VerifierState::Idle.to_string(), "0");
        assert_eq!(VerifierState::Awaiting(2).to_string(), "2");
        assert_eq!(VerifierState::Violation.to_string(), "V");
    }
}
