//! Chain definition types.
//!
//! Chains are declared with a JSON DSL, one guard per step:
//!
//! ```json
//! {
//!   "steps": [
//!     {"guard": "event.sensor == \"door\" && event.state == \"OPEN\""},
//!     {"guard": "event.sensor == \"motion\" && event.state == \"ON\""},
//!     {"guard": "event.sensor == \"lux\" && event.state >= 0", "next": 1}
//!   ]
//! }
//! ```
//!
//! `next` selects the step awaited after a match (`0` returns to idle). When
//! omitted a step continues with the following one, and the last step
//! completes the chain.

use crate::error::CoreError;
use crate::guard::GuardExpr;
use crate::verifier::{resolve_topology, ChainVerifier, EventGuard, VerifierState};
use serde::{Deserialize, Serialize};

/// One step as declared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRaw {
    /// Guard over `event.*` fields.
    pub guard: String,

    /// Step awaited after a match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<usize>,
}

/// Raw chain definition as stored/transmitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainDefinitionRaw {
    pub steps: Vec<StepRaw>,

    /// Optional metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

/// Validated chain definition.
#[derive(Debug, Clone)]
pub struct ChainDefinition {
    /// Property name.
    pub name: String,

    /// Parsed guards with their resolved targets.
    steps: Vec<(GuardExpr, VerifierState)>,

    /// Original raw definition.
    pub raw: ChainDefinitionRaw,

    /// Checksum of the canonical raw definition.
    pub checksum: String,
}

impl ChainDefinition {
    /// Parses and validates a chain definition from JSON.
    pub fn from_json(name: impl Into<String>, json: &serde_json::Value) -> Result<Self, CoreError> {
        let raw: ChainDefinitionRaw = serde_json::from_value(json.clone())?;
        Self::from_raw(name, raw)
    }

    /// Creates a chain definition from raw parts.
    pub fn from_raw(name: impl Into<String>, raw: ChainDefinitionRaw) -> Result<Self, CoreError> {
        let name = name.into();

        let next: Vec<Option<usize>> = raw.steps.iter().map(|s| s.next).collect();
        let targets = resolve_topology(&next)?;

        let mut steps = Vec::with_capacity(raw.steps.len());
        for (i, (step, target)) in raw.steps.iter().zip(targets).enumerate() {
            let guard =
                GuardExpr::parse_rooted(&step.guard, "event").map_err(|e| match e {
                    CoreError::InvalidGuard { reason } => CoreError::InvalidGuard {
                        reason: format!("step {}: {}", i, reason),
                    },
                    other => other,
                })?;
            steps.push((guard, target));
        }

        let json_bytes = serde_json::to_vec(&raw)?;
        let checksum = format!("{:08x}", crc32c::crc32c(&json_bytes));

        Ok(Self {
            name,
            steps,
            raw,
            checksum,
        })
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Target state after step `i` matches.
    pub fn target(&self, step: usize) -> Option<VerifierState> {
        self.steps.get(step).map(|(_, target)| *target)
    }

    /// Creates a fresh verifier in its initial state.
    pub fn verifier(&self) -> ChainVerifier {
        ChainVerifier::from_parts(
            self.name.clone(),
            self.steps
                .iter()
                .map(|(guard, next)| (Box::new(guard.clone()) as Box<dyn EventGuard>, *next)),
        )
    }

    /// Returns the raw definition as JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        Ok(serde_json::to_value(&self.raw)?)
    }
}
