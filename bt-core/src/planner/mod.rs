pub mod mcts;
pub mod models;

pub use mcts::{run, PlannerRequest, PlannerResult, PlannerStats, PlannerStatus, TopKEntry};
pub use models::{PlannerModel, PlannerModelRegistry, ToyOneDModel};
