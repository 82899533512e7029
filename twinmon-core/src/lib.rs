//! # twinmon-core
//!
//! Runtime-verification core for smart-home sensor replays.
//!
//! This crate provides:
//! - Normalized sensor events
//! - A digital-twin house state with freshness bookkeeping
//! - Guard expressions over events and house snapshots
//! - A reusable ordered-sequence (chain) verifier and its definition DSL
//! - An integrator that checks state predicates after every event
//! - A [`Monitor`] trait driving both kinds of verifier uniformly

pub mod definition;
pub mod error;
pub mod event;
pub mod guard;
pub mod house;
pub mod integrator;
pub mod monitor;
pub mod verifier;

pub use definition::{ChainDefinition, ChainDefinitionRaw, StepRaw};
pub use error::CoreError;
pub use event::SensorEvent;
pub use guard::{FieldPath, Fields, GuardExpr};
pub use house::{
    DeviceState, HouseState, Level, LocationState, SensorMap, SensorPath, SensorRecord,
    MAX_FRESHNESS,
};
pub use integrator::{Integrator, StatePredicate};
pub use monitor::Monitor;
pub use verifier::{ChainBuilder, ChainVerifier, Context, EventGuard, VerifierState};
