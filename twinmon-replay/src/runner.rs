//! Replay loop.
//!
//! Feeds every event, in input order, through the house integrator and each
//! chain verifier, and hands one verdict per monitor to the sink before the
//! next event is read.

use crate::config::MonitorConfig;
use crate::error::ReplayError;
use crate::sink::VerdictSink;
use std::collections::BTreeMap;
use twinmon_core::{
    ChainDefinition, ChainDefinitionRaw, ChainVerifier, HouseState, Integrator, Monitor,
    SensorEvent,
};

/// Totals for a finished (or in-progress) replay.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Events processed.
    pub events: u64,
    /// Events whose timestamp was lower than the previous one.
    pub regressions: u64,
    /// `false` verdicts per monitor.
    pub violations: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Invariant(usize),
    Chain(usize),
}

/// Monitors for one run, with their shared house state.
pub struct Replay {
    integrator: Integrator,
    chains: Vec<ChainVerifier>,
    slots: Vec<(String, Slot)>,
    last_timestamp: Option<i64>,
    stats: ReplayStats,
}

impl Replay {
    /// Compiles the configured monitors.
    ///
    /// Any invalid definition or guard fails here, before input is read.
    pub fn from_config(monitors: &[MonitorConfig]) -> Result<Self, ReplayError> {
        let mut integrator = Integrator::new();
        let mut chains = Vec::new();
        let mut slots = Vec::with_capacity(monitors.len());
        let mut invariants = 0;

        for monitor in monitors {
            let name = monitor.name().to_string();
            match monitor {
                MonitorConfig::Chain { steps, meta, .. } => {
                    let raw = ChainDefinitionRaw {
                        steps: steps.clone(),
                        meta: meta.clone(),
                    };
                    let definition = ChainDefinition::from_raw(&name, raw)?;
                    tracing::info!(
                        monitor = %name,
                        steps = definition.len(),
                        checksum = %definition.checksum,
                        "chain monitor loaded"
                    );
                    slots.push((name, Slot::Chain(chains.len())));
                    chains.push(definition.verifier());
                }
                MonitorConfig::Invariant { guard, .. } => {
                    integrator.add_invariant(&name, guard)?;
                    tracing::info!(monitor = %name, guard = %guard, "invariant monitor loaded");
                    slots.push((name, Slot::Invariant(invariants)));
                    invariants += 1;
                }
            }
        }

        let violations = slots.iter().map(|(name, _)| (name.clone(), 0)).collect();
        Ok(Self {
            integrator,
            chains,
            slots,
            last_timestamp: None,
            stats: ReplayStats {
                violations,
                ..ReplayStats::default()
            },
        })
    }

    /// Processes one event, emitting one verdict per monitor in config order.
    pub fn observe<S>(&mut self, event: &SensorEvent, sink: &mut S) -> Result<(), ReplayError>
    where
        S: VerdictSink + ?Sized,
    {
        if let Some(last) = self.last_timestamp {
            if event.timestamp < last {
                self.stats.regressions += 1;
                tracing::warn!(
                    previous = last,
                    timestamp = event.timestamp,
                    path = %event.path(),
                    "event out of timestamp order"
                );
            }
        }
        self.last_timestamp = Some(event.timestamp);
        self.stats.events += 1;

        let invariant_verdicts = self.integrator.push(event);
        let chain_verdicts: Vec<bool> = self.chains.iter_mut().map(|c| c.observe(event)).collect();

        for (name, slot) in &self.slots {
            let verdict = match *slot {
                Slot::Invariant(i) => invariant_verdicts[i],
                Slot::Chain(i) => chain_verdicts[i],
            };
            if !verdict {
                if let Some(count) = self.stats.violations.get_mut(name) {
                    *count += 1;
                }
            }
            sink.record(name, event, verdict)?;
        }

        Ok(())
    }

    /// Runs to end of input and flushes the sink.
    pub fn run<I, S>(&mut self, events: I, sink: &mut S) -> Result<&ReplayStats, ReplayError>
    where
        I: IntoIterator<Item = Result<SensorEvent, ReplayError>>,
        S: VerdictSink + ?Sized,
    {
        for event in events {
            self.observe(&event?, sink)?;
        }
        sink.finish()?;
        Ok(&self.stats)
    }

    pub fn stats(&self) -> &ReplayStats {
        &self.stats
    }

    /// Current house snapshot.
    pub fn house(&self) -> &HouseState {
        self.integrator.house()
    }

    /// Monitor names in output order.
    pub fn monitor_names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|(name, _)| name.as_str())
    }
}
