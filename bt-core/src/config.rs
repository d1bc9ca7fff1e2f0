//! Process-wide tunables, loadable from TOML or built with `Default`.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlannerDefaults {
    pub c_ucb: f64,
    pub pw_k: f64,
    pub pw_alpha: f64,
    pub gamma: f64,
}

impl Default for PlannerDefaults {
    fn default() -> Self {
        Self { c_ucb: 1.2, pw_k: 2.0, pw_alpha: 0.5, gamma: 0.95 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    pub default_tick_budget_ms: u32,
    pub trace_ring_capacity: usize,
    pub log_sink_capacity: usize,
    pub scheduler_workers: usize,
    pub planner_defaults: PlannerDefaults,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_tick_budget_ms: 10,
            trace_ring_capacity: 4096,
            log_sink_capacity: 8192,
            scheduler_workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).max(1),
            planner_defaults: PlannerDefaults::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let cfg: RuntimeConfig = toml::from_str(text)?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let cfg = RuntimeConfig::default();
        assert!(cfg.scheduler_workers >= 1);
        assert!(cfg.trace_ring_capacity > 0);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = RuntimeConfig::default();
        let text = toml::to_string(&cfg).unwrap();
        let back = RuntimeConfig::from_toml(&text).unwrap();
        assert_eq!(cfg, back);
    }
}
