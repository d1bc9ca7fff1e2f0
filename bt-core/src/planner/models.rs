//! Named planner models and the registry that looks them up.

use std::collections::HashMap;

use crate::rng::Prng;

/// A planner model: proposes candidate actions, rolls a state forward, and
/// scores rewards. States and actions are both `Vec<f64>` to keep the
/// planner domain-agnostic.
pub trait PlannerModel: Send + Sync {
    fn sample_action(&self, state: &[f64], rng: &mut Prng) -> Vec<f64>;
    fn step(&self, state: &[f64], action: &[f64]) -> Vec<f64>;
    fn reward(&self, state: &[f64], action: &[f64], next_state: &[f64]) -> f64;
    fn is_terminal(&self, state: &[f64]) -> bool;
    fn rollout_action(&self, state: &[f64], rng: &mut Prng) -> Vec<f64> {
        self.sample_action(state, rng)
    }
}

/// Reference model used by tests and as a runnable default: 1-D state,
/// goal at +1, reward is negative distance to goal, action is a bounded
/// step. Matches the scenario worked through in the testable-properties
/// section: action should point toward the goal.
pub struct ToyOneDModel {
    pub goal: f64,
}

impl Default for ToyOneDModel {
    fn default() -> Self {
        Self { goal: 1.0 }
    }
}

impl PlannerModel for ToyOneDModel {
    fn sample_action(&self, _state: &[f64], rng: &mut Prng) -> Vec<f64> {
        vec![rng.uniform(-1.0, 1.0)]
    }

    fn step(&self, state: &[f64], action: &[f64]) -> Vec<f64> {
        vec![(state[0] + action[0]).clamp(-2.0, 2.0)]
    }

    fn reward(&self, _state: &[f64], _action: &[f64], next_state: &[f64]) -> f64 {
        -(self.goal - next_state[0]).abs()
    }

    fn is_terminal(&self, state: &[f64]) -> bool {
        (self.goal - state[0]).abs() < 1e-3
    }
}

#[derive(Default)]
pub struct PlannerModelRegistry {
    models: HashMap<String, Box<dyn PlannerModel>>,
}

impl PlannerModelRegistry {
    pub fn new() -> Self {
        let mut reg = Self { models: HashMap::new() };
        reg.register("toy-1d", Box::new(ToyOneDModel::default()));
        reg
    }

    pub fn register(&mut self, name: impl Into<String>, model: Box<dyn PlannerModel>) {
        self.models.insert(name.into(), model);
    }

    pub fn get(&self, name: &str) -> Option<&dyn PlannerModel> {
        self.models.get(name).map(|b| b.as_ref())
    }
}
