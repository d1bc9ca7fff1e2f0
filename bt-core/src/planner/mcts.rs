//! Bounded-time deterministic MCTS: UCB1 selection, progressive
//! widening expansion, discounted rollout, wall-clock + iteration budget.

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::ValidationError;
use crate::log::{LogLevel, LogSink};
use crate::planner::models::PlannerModelRegistry;
use crate::rng::{derive_seed, Prng};

#[derive(Clone, Debug)]
pub struct PlannerRequest {
    pub model_service: String,
    pub state: Vec<f64>,
    pub seed: u64,
    pub budget_ms: u64,
    pub work_max: u32,
    pub max_depth: u32,
    pub gamma: f64,
    pub c_ucb: f64,
    pub pw_k: f64,
    pub pw_alpha: f64,
    pub action_prior: Option<Vec<f64>>,
}

impl PlannerRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.state.is_empty() {
            return Err(ValidationError("state must be non-empty".to_string()));
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            return Err(ValidationError("gamma must be in (0,1]".to_string()));
        }
        if self.c_ucb < 0.0 {
            return Err(ValidationError("c_ucb must be >= 0".to_string()));
        }
        if self.pw_k <= 0.0 {
            return Err(ValidationError("pw_k must be > 0".to_string()));
        }
        if !(self.pw_alpha > 0.0 && self.pw_alpha <= 1.0) {
            return Err(ValidationError("pw_alpha must be in (0,1]".to_string()));
        }
        if self.max_depth == 0 {
            return Err(ValidationError("max_depth must be > 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlannerStatus {
    Ok,
    Timeout,
    NoAction,
    Error,
}

#[derive(Clone, Debug)]
pub struct TopKEntry {
    pub action: Vec<f64>,
    pub visits: u32,
    pub q: f64,
}

#[derive(Clone, Debug, Default)]
pub struct PlannerStats {
    pub time_used_ms: u64,
    pub iters: u32,
    pub root_visits: u32,
    pub root_children: u32,
    pub widen_added: u32,
    pub depth_max: u32,
    pub depth_mean: f64,
    pub confidence: f64,
    pub value_est: f64,
    pub top_k: Vec<TopKEntry>,
}

#[derive(Clone, Debug)]
pub struct PlannerResult {
    pub status: PlannerStatus,
    pub action: Vec<f64>,
    pub stats: PlannerStats,
}

struct Node {
    state: Vec<f64>,
    action_from_parent: Vec<f64>,
    visits: u32,
    total_return: f64,
    children: Vec<usize>,
    depth: u32,
}

fn widen_limit(pw_k: f64, pw_alpha: f64, visits: u32) -> usize {
    (pw_k * (visits as f64).powf(pw_alpha)).ceil().max(1.0) as usize
}

fn ucb1_score(parent_visits: u32, child: &Node, c_ucb: f64) -> f64 {
    let q_bar = if child.visits > 0 { child.total_return / child.visits as f64 } else { 0.0 };
    let exploration = c_ucb * (((parent_visits as f64 + 1.0).ln()) / (child.visits as f64 + 1e-9)).sqrt();
    q_bar + exploration
}

/// Runs a bounded MCTS search rooted at `request.state`. The seed is
/// re-derived from `(request.seed, node_id, tick_index, model hash)` by the
/// caller before invoking this, so the same logical call at the same tick
/// is bit-identical; this function itself is a pure function of its seed.
pub fn run(
    request: &PlannerRequest,
    node_id: u32,
    tick_index: u64,
    models: &PlannerModelRegistry,
    clock: &Arc<dyn Clock>,
    log: &LogSink,
) -> PlannerResult {
    if let Err(e) = request.validate() {
        log.log(LogLevel::Error, tick_index, node_id, "planner", format!("invalid planner request: {e}"));
        return PlannerResult { status: PlannerStatus::Error, action: Vec::new(), stats: PlannerStats::default() };
    }

    let model = match models.get(&request.model_service) {
        Some(m) => m,
        None => {
            return PlannerResult {
                status: PlannerStatus::Error,
                action: Vec::new(),
                stats: PlannerStats::default(),
            }
        }
    };

    let model_hash = request.model_service.bytes().fold(0u64, |acc, b| acc.wrapping_mul(131).wrapping_add(b as u64));
    let seed = derive_seed(&[request.seed, node_id as u64, tick_index, model_hash]);
    let mut rng = Prng::new(seed);

    let mut arena: Vec<Node> = vec![Node {
        state: request.state.clone(),
        action_from_parent: Vec::new(),
        visits: 0,
        total_return: 0.0,
        children: Vec::new(),
        depth: 0,
    }];

    let start_ms = clock.now_ms();
    let mut iters = 0u32;
    let mut widen_added = 0u32;
    let mut depth_sum = 0u64;
    let mut depth_max = 0u32;

    loop {
        let elapsed = (clock.now_ms() - start_ms) as u64;
        if elapsed >= request.budget_ms || iters >= request.work_max {
            break;
        }

        // Selection.
        let mut path = vec![0usize];
        let mut cur = 0usize;
        loop {
            let node_depth = arena[cur].depth;
            if node_depth >= request.max_depth || model.is_terminal(&arena[cur].state) {
                break;
            }
            let limit = widen_limit(request.pw_k, request.pw_alpha, arena[cur].visits);
            if arena[cur].children.len() < limit {
                break; // widen here
            }
            if arena[cur].children.is_empty() {
                break;
            }
            let parent_visits = arena[cur].visits;
            let mut best_idx = arena[cur].children[0];
            let mut best_score = f64::NEG_INFINITY;
            for &child_idx in &arena[cur].children {
                let score = ucb1_score(parent_visits, &arena[child_idx], request.c_ucb);
                if score > best_score {
                    best_score = score;
                    best_idx = child_idx;
                }
            }
            path.push(best_idx);
            cur = best_idx;
        }

        // Expansion.
        let mut leaf_state = arena[cur].state.clone();
        let leaf_depth = arena[cur].depth;
        if leaf_depth < request.max_depth && !model.is_terminal(&leaf_state) {
            let action = if arena[cur].children.is_empty() {
                if let Some(prior) = &request.action_prior {
                    prior.clone()
                } else {
                    model.sample_action(&leaf_state, &mut rng)
                }
            } else {
                model.sample_action(&leaf_state, &mut rng)
            };
            let next_state = model.step(&leaf_state, &action);
            let child = Node {
                state: next_state.clone(),
                action_from_parent: action,
                visits: 0,
                total_return: 0.0,
                children: Vec::new(),
                depth: leaf_depth + 1,
            };
            let child_idx = arena.len();
            arena.push(child);
            arena[cur].children.push(child_idx);
            widen_added += 1;
            path.push(child_idx);
            cur = child_idx;
            leaf_state = next_state;
        }

        // Rollout from `cur`.
        let mut rollout_state = leaf_state;
        let mut discounted_return = 0.0;
        let mut discount = 1.0;
        let mut rollout_depth = arena[cur].depth;
        while rollout_depth < request.max_depth && !model.is_terminal(&rollout_state) {
            let action = model.rollout_action(&rollout_state, &mut rng);
            let next_state = model.step(&rollout_state, &action);
            let r = model.reward(&rollout_state, &action, &next_state);
            discounted_return += discount * r;
            discount *= request.gamma;
            rollout_state = next_state;
            rollout_depth += 1;
        }

        depth_sum += rollout_depth as u64;
        depth_max = depth_max.max(rollout_depth);

        // Backpropagation.
        for &idx in &path {
            arena[idx].visits += 1;
            arena[idx].total_return += discounted_return;
        }

        iters += 1;
    }

    let time_used_ms = (clock.now_ms() - start_ms) as u64;
    let root = &arena[0];

    if root.children.is_empty() {
        let status = if iters == 0 { PlannerStatus::Timeout } else { PlannerStatus::NoAction };
        return PlannerResult {
            status,
            action: Vec::new(),
            stats: PlannerStats {
                time_used_ms,
                iters,
                root_visits: root.visits,
                root_children: 0,
                widen_added,
                depth_max,
                depth_mean: if iters > 0 { depth_sum as f64 / iters as f64 } else { 0.0 },
                confidence: 0.0,
                value_est: 0.0,
                top_k: Vec::new(),
            },
        };
    }

    let mut best_idx = root.children[0];
    let mut best_visits = 0u32;
    for &idx in &root.children {
        if arena[idx].visits > best_visits {
            best_visits = arena[idx].visits;
            best_idx = idx;
        }
    }

    if best_visits == 0 {
        return PlannerResult {
            status: PlannerStatus::Timeout,
            action: Vec::new(),
            stats: PlannerStats {
                time_used_ms,
                iters,
                root_visits: root.visits,
                root_children: root.children.len() as u32,
                widen_added,
                depth_max,
                depth_mean: if iters > 0 { depth_sum as f64 / iters as f64 } else { 0.0 },
                confidence: 0.0,
                value_est: 0.0,
                top_k: Vec::new(),
            },
        };
    }

    let mut ranked: Vec<TopKEntry> = root
        .children
        .iter()
        .map(|&idx| TopKEntry {
            action: arena[idx].action_from_parent.clone(),
            visits: arena[idx].visits,
            q: if arena[idx].visits > 0 { arena[idx].total_return / arena[idx].visits as f64 } else { 0.0 },
        })
        .collect();
    ranked.sort_by(|a, b| b.visits.cmp(&a.visits));
    ranked.truncate(5);

    let value_est = arena[best_idx].total_return / arena[best_idx].visits as f64;

    PlannerResult {
        status: PlannerStatus::Ok,
        action: arena[best_idx].action_from_parent.clone(),
        stats: PlannerStats {
            time_used_ms,
            iters,
            root_visits: root.visits,
            root_children: root.children.len() as u32,
            widen_added,
            depth_max,
            depth_mean: if iters > 0 { depth_sum as f64 / iters as f64 } else { 0.0 },
            confidence: best_visits as f64 / root.visits.max(1) as f64,
            value_est,
            top_k: ranked,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{FakeClock, SystemClock};

    fn log() -> LogSink {
        LogSink::new(64, Arc::new(FakeClock::new()))
    }

    fn default_request() -> PlannerRequest {
        PlannerRequest {
            model_service: "toy-1d".to_string(),
            state: vec![0.0],
            seed: 42,
            budget_ms: u64::MAX / 2,
            work_max: 400,
            max_depth: 6,
            gamma: 0.95,
            c_ucb: 1.2,
            pw_k: 2.0,
            pw_alpha: 0.5,
            action_prior: None,
        }
    }

    #[test]
    fn deterministic_given_same_seed() {
        let models = PlannerModelRegistry::new();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let req = default_request();
        let log = log();
        let r1 = run(&req, 0, 0, &models, &clock, &log);
        let r2 = run(&req, 0, 0, &models, &clock, &log);
        assert_eq!(r1.action, r2.action);
        assert_eq!(r1.stats.root_visits, r2.stats.root_visits);
        assert_eq!(r1.stats.root_children, r2.stats.root_children);
    }

    #[test]
    fn action_points_toward_goal() {
        let models = PlannerModelRegistry::new();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let req = default_request();
        let result = run(&req, 0, 0, &models, &clock, &log());
        assert_eq!(result.status, PlannerStatus::Ok);
        assert!(result.action[0] > 0.0, "action {:?} should move toward goal at +1", result.action);
    }

    #[test]
    fn tiny_budget_times_out() {
        let models = PlannerModelRegistry::new();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let mut req = default_request();
        req.budget_ms = 0;
        req.work_max = 0;
        let result = run(&req, 0, 0, &models, &clock, &log());
        assert_eq!(result.status, PlannerStatus::Timeout);
    }

    #[test]
    fn invalid_request_logs_the_validation_error() {
        let models = PlannerModelRegistry::new();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let mut req = default_request();
        req.state = Vec::new();
        let log = log();
        let result = run(&req, 0, 0, &models, &clock, &log);
        assert_eq!(result.status, PlannerStatus::Error);
        assert!(log.snapshot().iter().any(|r| r.message.contains("state must be non-empty")));
    }
}
