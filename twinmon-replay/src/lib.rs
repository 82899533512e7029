//! # twinmon-replay
//!
//! Replay harness for twinmon.
//!
//! This crate provides:
//! - YAML configuration with environment overrides
//! - A JSON-lines reader for normalized sensor events
//! - Verdict sinks (one literal per line)
//! - Nested-table and JSON rendering of the house snapshot
//! - The replay loop driving the integrator and chain verifiers

pub mod config;
pub mod error;
pub mod render;
pub mod runner;
pub mod sink;
pub mod source;

pub use config::{Config, MonitorConfig, ReplayConfig, StateFormat};
pub use error::{ConfigError, ReplayError};
pub use runner::{Replay, ReplayStats};
pub use sink::{LineSink, MemorySink, VerdictSink};
pub use source::{EventReader, SourceStats};
