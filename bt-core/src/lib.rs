//! Embedded decision runtime: a compiled behaviour-tree engine, a
//! bounded-time MCTS planner, and an async capability scheduler, meant to
//! be ticked synchronously from a robot or simulator control loop.
//!
//! [`Runtime`] is the single explicit value threading through every entry
//! point — there are no process-wide singletons. An embedder builds one
//! `Runtime`, registers callbacks, compiles trees against it, and ticks
//! `TreeInstance`s it owns.

pub mod blackboard;
pub mod clock;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod log;
pub mod planner;
pub mod registry;
pub mod rng;
pub mod scheduler;
pub mod trace;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use clock::{Clock, SystemClock};
use config::RuntimeConfig;
use log::LogSink;
use planner::PlannerModelRegistry;
use registry::CallbackRegistry;
use scheduler::{Scheduler, VlaService};

/// The embedder-owned aggregate of every service a compiled tree can reach
/// from a leaf: clock, callback/model registries, log sink, scheduler, and
/// VLA service. Constructed once per process (or per simulation run).
pub struct Runtime {
    pub clock: Arc<dyn Clock>,
    pub config: RuntimeConfig,
    pub callbacks: CallbackRegistry,
    pub planner_models: PlannerModelRegistry,
    pub log: Arc<LogSink>,
    pub scheduler: Arc<Scheduler>,
    pub vla: VlaService,
    pub base_seed: u64,
    /// Identifies this process's run in emitted VLA job records.
    pub run_id: Uuid,
    seed_counter: AtomicU64,
}

impl Runtime {
    pub fn new(config: RuntimeConfig, clock: Arc<dyn Clock>, base_seed: u64) -> Self {
        let log = Arc::new(LogSink::new(config.log_sink_capacity, clock.clone()));
        let scheduler = Scheduler::new(config.scheduler_workers, clock.clone(), log.clone());
        let run_id = Uuid::new_v4();
        let vla = VlaService::new(scheduler.clone(), clock.clone(), log.clone(), run_id);
        Self {
            clock,
            config,
            callbacks: CallbackRegistry::new(),
            planner_models: PlannerModelRegistry::new(),
            log,
            scheduler,
            vla,
            base_seed,
            run_id,
            seed_counter: AtomicU64::new(base_seed),
        }
    }

    pub fn from_config(config: RuntimeConfig) -> Self {
        Self::new(config, Arc::new(SystemClock::new()), 0x5EED_5EED_5EED_5EEDu64)
    }

    /// A fresh seed drawn from the runtime's own stream, for callers that
    /// need per-call randomness not tied to a particular node id.
    pub fn next_seed(&self) -> u64 {
        let prev = self.seed_counter.fetch_add(1, Ordering::SeqCst);
        rng::mix64(prev)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::from_config(RuntimeConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_runtime_constructs() {
        let rt = Runtime::default();
        assert!(rt.planner_models.get("toy-1d").is_some());
    }
}
