//! The tick driver: synchronous, deterministic pre-order evaluation of a
//! compiled tree against one instance's mutable state.
//!
//! Nothing here may block. Anything that would block is routed through
//! the scheduler and observed as `Status::Running`.

use std::time::Instant;

use crate::blackboard::BbValue;
use crate::engine::instance::TreeInstance;
use crate::engine::tree::{KeyedArgs, LeafArg, NodeKind, Status};
use crate::log::LogLevel;
use crate::planner::{self, PlannerRequest, PlannerStatus};
use crate::scheduler::VlaPollStatus;
use crate::trace::TracePayload;
use crate::Runtime;

/// Borrowed view handed to registered callbacks and leaf dispatch: the
/// instance being ticked plus the runtime services available to leaves.
pub struct TickContext<'a> {
    pub instance: &'a mut TreeInstance,
    pub runtime: &'a Runtime,
    pub node_id: u32,
}

impl<'a> TickContext<'a> {
    fn log(&self, level: LogLevel, category: &str, message: impl Into<String>) {
        self.runtime.log.log(level, self.instance.tick_index, self.node_id, category, message);
    }
}

/// Seeds the blackboard with host-supplied inputs before evaluating the
/// root, recorded as a synthetic write attributed to node id 0.
pub fn tick(runtime: &Runtime, instance: &mut TreeInstance, inputs: Option<&[(String, BbValue)]>) -> Status {
    if let Some(inputs) = inputs {
        let tick = instance.tick_index;
        let ts_ns = runtime.clock.now_ns();
        for (key, value) in inputs {
            let trace = if instance.trace_enabled { Some(&mut instance.trace) } else { None };
            instance.blackboard.put(key.as_str(), value.clone(), tick, ts_ns, 0, "__input__", trace, tick);
        }
    }

    instance.tick_index += 1;
    let tick = instance.tick_index;
    let root_id = instance.tree.root_id;
    if instance.trace_enabled {
        instance.trace.push(tick, root_id, TracePayload::TickBegin { root_id });
    }

    let started = Instant::now();
    let status = {
        let mut ctx = TickContext { instance, runtime, node_id: root_id };
        eval_node(&mut ctx, root_id)
    };
    let duration_us = started.elapsed().as_micros() as u64;

    instance.profile.ticks += 1;
    let budget_us = instance.tick_budget_ms as u64 * 1000;
    if duration_us > budget_us {
        instance.profile.budget_overruns += 1;
        let msg = format!("tick {tick} took {}us, budget {}us", duration_us, budget_us);
        if instance.trace_enabled {
            instance.trace.push(tick, root_id, TracePayload::Warning { message: msg.clone() });
        }
        runtime.log.log(LogLevel::Warn, tick, root_id, "bt", msg);
    }

    if instance.trace_enabled {
        instance.trace.push(tick, root_id, TracePayload::TickEnd { status, duration_us });
    }

    status
}

fn eval_node(ctx: &mut TickContext, node_id: u32) -> Status {
    let tick = ctx.instance.tick_index;
    if ctx.instance.trace_enabled {
        ctx.instance.trace.push(tick, node_id, TracePayload::NodeEnter);
    }
    let started = Instant::now();

    let kind = ctx.instance.tree.node(node_id).kind.clone();
    let children = ctx.instance.tree.node(node_id).children.clone();

    let status = match &kind {
        NodeKind::Seq => eval_seq(ctx, &children),
        NodeKind::Sel => eval_sel(ctx, &children),
        NodeKind::MemSeq | NodeKind::AsyncSeq => eval_mem_seq(ctx, node_id, &children),
        NodeKind::MemSel => eval_mem_sel(ctx, node_id, &children),
        NodeKind::ReactiveSeq => eval_reactive_seq(ctx, node_id, &children),
        NodeKind::ReactiveSel => eval_reactive_sel(ctx, node_id, &children),
        NodeKind::Invert => eval_invert(ctx, &children),
        NodeKind::Repeat(n) => eval_repeat(ctx, node_id, *n, &children),
        NodeKind::Retry(n) => eval_retry(ctx, node_id, *n, &children),
        NodeKind::Cond { name, args } => eval_cond(ctx, name, args),
        NodeKind::Act { name, args } => eval_act(ctx, name, args),
        NodeKind::PlanAction { args } => eval_plan_action(ctx, args),
        NodeKind::VlaRequest { args } => eval_vla_request(ctx, node_id, args),
        NodeKind::VlaWait { args } => eval_vla_wait(ctx, node_id, args),
        NodeKind::VlaCancel { args } => eval_vla_cancel(ctx, node_id, args),
        NodeKind::Succeed => Status::Success,
        NodeKind::Fail => Status::Failure,
        NodeKind::Running => Status::Running,
    };

    let duration_us = started.elapsed().as_micros() as u64;
    if ctx.instance.trace_enabled {
        ctx.instance.trace.push(tick, node_id, TracePayload::NodeExit { status, duration_us });
    }
    status
}

fn eval_seq(ctx: &mut TickContext, children: &[u32]) -> Status {
    for &child in children {
        match eval_node(ctx, child) {
            Status::Failure => return Status::Failure,
            Status::Running => return Status::Running,
            Status::Success => continue,
        }
    }
    Status::Success
}

fn eval_sel(ctx: &mut TickContext, children: &[u32]) -> Status {
    for &child in children {
        match eval_node(ctx, child) {
            Status::Success => return Status::Success,
            Status::Running => return Status::Running,
            Status::Failure => continue,
        }
    }
    Status::Failure
}

fn eval_mem_seq(ctx: &mut TickContext, node_id: u32, children: &[u32]) -> Status {
    let start = ctx.instance.memory(node_id).cursor.unwrap_or(0);
    for idx in start..children.len() {
        match eval_node(ctx, children[idx]) {
            Status::Failure => {
                ctx.instance.memory_mut(node_id).cursor = None;
                return Status::Failure;
            }
            Status::Running => {
                ctx.instance.memory_mut(node_id).cursor = Some(idx);
                return Status::Running;
            }
            Status::Success => continue,
        }
    }
    ctx.instance.memory_mut(node_id).cursor = None;
    Status::Success
}

fn eval_mem_sel(ctx: &mut TickContext, node_id: u32, children: &[u32]) -> Status {
    let start = ctx.instance.memory(node_id).cursor.unwrap_or(0);
    for idx in start..children.len() {
        match eval_node(ctx, children[idx]) {
            Status::Success => {
                ctx.instance.memory_mut(node_id).cursor = None;
                return Status::Success;
            }
            Status::Running => {
                ctx.instance.memory_mut(node_id).cursor = Some(idx);
                return Status::Running;
            }
            Status::Failure => continue,
        }
    }
    ctx.instance.memory_mut(node_id).cursor = None;
    Status::Failure
}

/// Reactive composites re-check from child 0 every tick. If evaluation
/// stops (on `Running` or on the terminal status) at an index earlier than
/// a previously-running child's index, the children in between held stale
/// `running` state from a prior tick that this tick's replay never reached
/// — those are halted.
fn eval_reactive_seq(ctx: &mut TickContext, node_id: u32, children: &[u32]) -> Status {
    let prev_cursor = ctx.instance.memory(node_id).cursor;
    for (idx, &child) in children.iter().enumerate() {
        match eval_node(ctx, child) {
            Status::Failure => {
                halt_stale(ctx, children, idx, prev_cursor);
                ctx.instance.memory_mut(node_id).cursor = None;
                return Status::Failure;
            }
            Status::Running => {
                halt_stale(ctx, children, idx, prev_cursor);
                ctx.instance.memory_mut(node_id).cursor = Some(idx);
                return Status::Running;
            }
            Status::Success => continue,
        }
    }
    ctx.instance.memory_mut(node_id).cursor = None;
    Status::Success
}

fn eval_reactive_sel(ctx: &mut TickContext, node_id: u32, children: &[u32]) -> Status {
    let prev_cursor = ctx.instance.memory(node_id).cursor;
    for (idx, &child) in children.iter().enumerate() {
        match eval_node(ctx, child) {
            Status::Success => {
                halt_stale(ctx, children, idx, prev_cursor);
                ctx.instance.memory_mut(node_id).cursor = None;
                return Status::Success;
            }
            Status::Running => {
                halt_stale(ctx, children, idx, prev_cursor);
                ctx.instance.memory_mut(node_id).cursor = Some(idx);
                return Status::Running;
            }
            Status::Failure => continue,
        }
    }
    ctx.instance.memory_mut(node_id).cursor = None;
    Status::Failure
}

fn halt_stale(ctx: &mut TickContext, children: &[u32], stop_idx: usize, prev_cursor: Option<usize>) {
    if let Some(prev) = prev_cursor {
        if prev > stop_idx {
            for &child in &children[stop_idx..=prev.min(children.len() - 1)] {
                crate::engine::halt::halt_subtree(ctx, child);
            }
        }
    }
}

fn eval_invert(ctx: &mut TickContext, children: &[u32]) -> Status {
    match eval_node(ctx, children[0]) {
        Status::Success => Status::Failure,
        Status::Failure => Status::Success,
        Status::Running => Status::Running,
    }
}

fn eval_repeat(ctx: &mut TickContext, node_id: u32, n: u32, children: &[u32]) -> Status {
    if n == 0 {
        return Status::Success;
    }
    match eval_node(ctx, children[0]) {
        Status::Failure => {
            ctx.instance.memory_mut(node_id).counter = None;
            Status::Failure
        }
        Status::Running => Status::Running,
        Status::Success => {
            let count = ctx.instance.memory(node_id).counter.unwrap_or(0) + 1;
            if count < n {
                ctx.instance.memory_mut(node_id).counter = Some(count);
                Status::Running
            } else {
                ctx.instance.memory_mut(node_id).counter = None;
                Status::Success
            }
        }
    }
}

fn eval_retry(ctx: &mut TickContext, node_id: u32, n: u32, children: &[u32]) -> Status {
    match eval_node(ctx, children[0]) {
        Status::Success => {
            ctx.instance.memory_mut(node_id).counter = None;
            Status::Success
        }
        Status::Running => Status::Running,
        Status::Failure => {
            let attempts = ctx.instance.memory(node_id).counter.unwrap_or(0) + 1;
            if attempts < n {
                ctx.instance.memory_mut(node_id).counter = Some(attempts);
                Status::Running
            } else {
                ctx.instance.memory_mut(node_id).counter = None;
                Status::Failure
            }
        }
    }
}

fn eval_cond(ctx: &mut TickContext, name: &str, args: &[LeafArg]) -> Status {
    let callback = match ctx.runtime.callbacks.condition(name) {
        Some(f) => f,
        None => {
            ctx.log(LogLevel::Error, "bt", format!("condition '{name}' not registered"));
            return Status::Failure;
        }
    };
    match callback(ctx, args) {
        Ok(true) => Status::Success,
        Ok(false) => Status::Failure,
        Err(message) => {
            ctx.log(LogLevel::Error, "bt", format!("condition '{name}' error: {message}"));
            Status::Failure
        }
    }
}

fn eval_act(ctx: &mut TickContext, name: &str, args: &[LeafArg]) -> Status {
    let callback = match ctx.runtime.callbacks.action(name) {
        Some(f) => f,
        None => {
            ctx.log(LogLevel::Error, "bt", format!("action '{name}' not registered"));
            return Status::Failure;
        }
    };
    match callback(ctx, args) {
        Ok(status) => status,
        Err(message) => {
            ctx.log(LogLevel::Error, "bt", format!("action '{name}' error: {message}"));
            Status::Failure
        }
    }
}

fn keyed_str<'a>(args: &'a KeyedArgs, key: &str) -> Option<&'a str> {
    args.iter().find(|(k, _)| k == key).and_then(|(_, v)| match v {
        LeafArg::Text(s) | LeafArg::Symbol(s) => Some(s.as_str()),
        _ => None,
    })
}

fn keyed_f64(args: &KeyedArgs, key: &str) -> Option<f64> {
    args.iter().find(|(k, _)| k == key).and_then(|(_, v)| match v {
        LeafArg::Float(f) => Some(*f),
        LeafArg::Int(i) => Some(*i as f64),
        _ => None,
    })
}

fn keyed_u32(args: &KeyedArgs, key: &str) -> Option<u32> {
    keyed_f64(args, key).map(|f| f as u32)
}

fn eval_plan_action(ctx: &mut TickContext, args: &KeyedArgs) -> Status {
    let model_service = match keyed_str(args, "model_service") {
        Some(s) => s.to_string(),
        None => {
            ctx.log(LogLevel::Error, "planner", "plan-action missing :model_service");
            return Status::Failure;
        }
    };
    let state_key = keyed_str(args, "state_key").unwrap_or("state").to_string();
    let action_key = keyed_str(args, "action_key").unwrap_or("action").to_string();
    let tick = ctx.instance.tick_index;
    let read_trace = if ctx.instance.read_trace_enabled { Some(&mut ctx.instance.trace) } else { None };
    let state_entry = ctx.instance.blackboard.get(state_key.as_str(), read_trace, tick, ctx.node_id);
    let state = match state_entry {
        Some(entry) => match &entry.value {
            BbValue::FloatVector(v) => v.clone(),
            BbValue::Float64(f) => vec![*f],
            _ => {
                ctx.log(LogLevel::Error, "planner", format!("blackboard key '{state_key}' is not numeric"));
                return Status::Failure;
            }
        },
        None => {
            ctx.log(LogLevel::Error, "planner", format!("blackboard key '{state_key}' missing"));
            return Status::Failure;
        }
    };

    let defaults = &ctx.runtime.config.planner_defaults;
    let request = PlannerRequest {
        model_service,
        state,
        seed: keyed_u32(args, "seed").map(|s| s as u64).unwrap_or(ctx.runtime.base_seed),
        budget_ms: keyed_u32(args, "budget_ms").unwrap_or(ctx.runtime.config.default_tick_budget_ms) as u64,
        work_max: keyed_u32(args, "work_max").unwrap_or(200),
        max_depth: keyed_u32(args, "max_depth").unwrap_or(8),
        gamma: keyed_f64(args, "gamma").unwrap_or(defaults.gamma),
        c_ucb: keyed_f64(args, "c_ucb").unwrap_or(defaults.c_ucb),
        pw_k: keyed_f64(args, "pw_k").unwrap_or(defaults.pw_k),
        pw_alpha: keyed_f64(args, "pw_alpha").unwrap_or(defaults.pw_alpha),
        action_prior: None,
    };

    let result =
        planner::run(&request, ctx.node_id, ctx.instance.tick_index, &ctx.runtime.planner_models, &ctx.runtime.clock, &ctx.runtime.log);
    match result.status {
        PlannerStatus::Ok => {
            let tick = ctx.instance.tick_index;
            let ts_ns = ctx.runtime.clock.now_ns();
            let trace = if ctx.instance.trace_enabled { Some(&mut ctx.instance.trace) } else { None };
            ctx.instance.blackboard.put(
                action_key.as_str(),
                BbValue::FloatVector(result.action),
                tick,
                ts_ns,
                ctx.node_id,
                "plan-action",
                trace,
                tick,
            );
            Status::Success
        }
        PlannerStatus::Timeout => {
            ctx.log(LogLevel::Warn, "planner", "planner budget exhausted before any child visited");
            Status::Failure
        }
        PlannerStatus::NoAction | PlannerStatus::Error => {
            ctx.log(LogLevel::Error, "planner", "planner produced no action");
            Status::Failure
        }
    }
}

fn eval_vla_request(ctx: &mut TickContext, node_id: u32, args: &KeyedArgs) -> Status {
    let job_key = keyed_str(args, "job_key").unwrap_or("job").to_string();
    let instruction = keyed_str(args, "instruction").unwrap_or("").to_string();
    let task_id = keyed_str(args, "task_id").unwrap_or("task").to_string();
    let dims = keyed_u32(args, "dims").unwrap_or(1) as usize;
    let deadline_ms = keyed_u32(args, "deadline_ms").unwrap_or(2000) as u64;

    let request = crate::scheduler::VlaRequest {
        task_id,
        instruction,
        observation: crate::scheduler::vla::Observation {
            state: vec![0.0; dims],
            timestamp_ms: ctx.runtime.clock.now_ms(),
            frame_id: "bt".to_string(),
        },
        action_space: crate::scheduler::vla::ActionSpace {
            kind: crate::scheduler::vla::ActionSpaceKind::Continuous,
            dims,
            bounds: vec![(-1.0, 1.0); dims],
        },
        constraints: crate::scheduler::vla::Constraints { max_abs_value: 1.0, max_delta: 1.0 },
        model: crate::scheduler::vla::ModelRef { name: "default".to_string(), version: "1".to_string() },
        deadline_ms,
        seed: ctx.runtime.base_seed,
    };

    let tick = ctx.instance.tick_index;
    let job_id = ctx.runtime.vla.submit(request, &job_key, tick);
    ctx.instance.memory_mut(node_id).job_id = Some(job_id);
    let ts_ns = ctx.runtime.clock.now_ns();
    let trace = if ctx.instance.trace_enabled { Some(&mut ctx.instance.trace) } else { None };
    ctx.instance.blackboard.put(job_key.as_str(), BbValue::JobRef(job_id), tick, ts_ns, node_id, "vla-request", trace, tick);
    if ctx.instance.trace_enabled {
        ctx.instance.trace.push(tick, node_id, TracePayload::SchedulerSubmit { job_id });
    }
    Status::Success
}

fn eval_vla_wait(ctx: &mut TickContext, node_id: u32, args: &KeyedArgs) -> Status {
    let job_key = keyed_str(args, "job_key").unwrap_or("job").to_string();
    let action_key = keyed_str(args, "action_key").unwrap_or("action").to_string();

    let job_id_from_memory = ctx.instance.memory(node_id).job_id;
    let job_id_from_bb = if job_id_from_memory.is_none() {
        let tick = ctx.instance.tick_index;
        let read_trace = if ctx.instance.read_trace_enabled { Some(&mut ctx.instance.trace) } else { None };
        match ctx.instance.blackboard.get(job_key.as_str(), read_trace, tick, node_id) {
            Some(entry) => match entry.value {
                BbValue::JobRef(id) => Some(id),
                _ => None,
            },
            None => None,
        }
    } else {
        None
    };
    let job_id = match job_id_from_memory.or(job_id_from_bb) {
        Some(id) => id,
        None => {
            ctx.log(LogLevel::Error, "vla", "vla-wait with no pending job");
            return Status::Failure;
        }
    };

    let tick = ctx.instance.tick_index;
    let poll = ctx.runtime.vla.poll(job_id, tick);
    match poll.status {
        VlaPollStatus::Queued | VlaPollStatus::Running => Status::Running,
        VlaPollStatus::Done => {
            if ctx.instance.trace_enabled {
                ctx.instance.trace.push(tick, node_id, TracePayload::SchedulerFinish { job_id });
            }
            if let Some(action) = poll.action {
                let ts_ns = ctx.runtime.clock.now_ns();
                let trace = if ctx.instance.trace_enabled { Some(&mut ctx.instance.trace) } else { None };
                ctx.instance.blackboard.put(
                    action_key.as_str(),
                    BbValue::FloatVector(action),
                    tick,
                    ts_ns,
                    node_id,
                    "vla-wait",
                    trace,
                    tick,
                );
            }
            ctx.instance.memory_mut(node_id).job_id = None;
            Status::Success
        }
        VlaPollStatus::Error | VlaPollStatus::Timeout | VlaPollStatus::Cancelled => {
            ctx.instance.memory_mut(node_id).job_id = None;
            Status::Failure
        }
    }
}

fn eval_vla_cancel(ctx: &mut TickContext, node_id: u32, args: &KeyedArgs) -> Status {
    let job_key = keyed_str(args, "job_key").unwrap_or("job").to_string();
    let job_id_from_memory = ctx.instance.memory(node_id).job_id;
    let job_id = if job_id_from_memory.is_some() {
        job_id_from_memory
    } else {
        let tick = ctx.instance.tick_index;
        let read_trace = if ctx.instance.read_trace_enabled { Some(&mut ctx.instance.trace) } else { None };
        match ctx.instance.blackboard.get(job_key.as_str(), read_trace, tick, node_id) {
            Some(entry) => match entry.value {
                BbValue::JobRef(id) => Some(id),
                _ => None,
            },
            None => None,
        }
    };
    if let Some(id) = job_id {
        ctx.runtime.vla.cancel(id);
        let tick = ctx.instance.tick_index;
        if ctx.instance.trace_enabled {
            ctx.instance.trace.push(tick, node_id, TracePayload::SchedulerCancel { job_id: id });
        }
        ctx.instance.memory_mut(node_id).job_id = None;
    }
    Status::Success
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::engine::tree::{CompiledNode, CompiledTree, NodeKind};
    use std::sync::Arc;

    fn runtime() -> Runtime {
        Runtime::from_config(RuntimeConfig::default())
    }

    fn instance(runtime: &Runtime, tree: CompiledTree) -> TreeInstance {
        TreeInstance::new(Arc::new(tree), runtime.clock.clone(), 256, runtime.config.default_tick_budget_ms)
    }

    /// Scenario 1: seq running→success.
    #[test]
    fn scenario_seq_running_then_success() {
        let mut rt = runtime();
        rt.callbacks.register_condition("always-true", Box::new(|_c, _a| Ok(true)));
        rt.callbacks.register_action(
            "running-then-success",
            Box::new(|ctx, _args| {
                let mem = ctx.instance.memory_mut(ctx.node_id);
                let calls = match mem.scratch.get("calls") {
                    Some(LeafArg::Int(n)) => *n,
                    _ => 0,
                };
                mem.scratch.insert("calls".to_string(), LeafArg::Int(calls + 1));
                if calls + 1 >= 2 {
                    Ok(Status::Success)
                } else {
                    Ok(Status::Running)
                }
            }),
        );

        let tree = CompiledTree {
            root_id: 0,
            nodes: vec![
                CompiledNode { node_id: 0, kind: NodeKind::Seq, children: vec![1, 2] },
                CompiledNode { node_id: 1, kind: NodeKind::Cond { name: "always-true".into(), args: vec![] }, children: vec![] },
                CompiledNode { node_id: 2, kind: NodeKind::Act { name: "running-then-success".into(), args: vec![] }, children: vec![] },
            ],
        };
        let mut inst = instance(&rt, tree);
        assert_eq!(tick(&rt, &mut inst, None), Status::Running);
        assert_eq!(tick(&rt, &mut inst, None), Status::Success);
    }

    /// Scenario 3: repeat counter.
    #[test]
    fn scenario_repeat_counter() {
        let mut rt = runtime();
        rt.callbacks.register_action("always-success", Box::new(|_c, _a| Ok(Status::Success)));
        let tree = CompiledTree {
            root_id: 0,
            nodes: vec![
                CompiledNode { node_id: 0, kind: NodeKind::Repeat(3), children: vec![1] },
                CompiledNode { node_id: 1, kind: NodeKind::Act { name: "always-success".into(), args: vec![] }, children: vec![] },
            ],
        };
        let mut inst = instance(&rt, tree);
        assert_eq!(tick(&rt, &mut inst, None), Status::Running);
        assert_eq!(tick(&rt, &mut inst, None), Status::Running);
        assert_eq!(tick(&rt, &mut inst, None), Status::Success);
    }

    /// retry(n, always-fail) is symmetric with repeat(n, always-success):
    /// exactly n evaluations total, running through n-1 and terminal on the nth.
    #[test]
    fn scenario_retry_counter() {
        let mut rt = runtime();
        rt.callbacks.register_action("always-fail", Box::new(|_c, _a| Ok(Status::Failure)));
        let tree = CompiledTree {
            root_id: 0,
            nodes: vec![
                CompiledNode { node_id: 0, kind: NodeKind::Retry(3), children: vec![1] },
                CompiledNode { node_id: 1, kind: NodeKind::Act { name: "always-fail".into(), args: vec![] }, children: vec![] },
            ],
        };
        let mut inst = instance(&rt, tree);
        assert_eq!(tick(&rt, &mut inst, None), Status::Running);
        assert_eq!(tick(&rt, &mut inst, None), Status::Running);
        assert_eq!(tick(&rt, &mut inst, None), Status::Failure);
    }

    #[test]
    fn repeat_zero_succeeds_immediately() {
        let rt = runtime();
        let tree = CompiledTree {
            root_id: 0,
            nodes: vec![
                CompiledNode { node_id: 0, kind: NodeKind::Repeat(0), children: vec![1] },
                CompiledNode { node_id: 1, kind: NodeKind::Fail, children: vec![] },
            ],
        };
        let mut inst = instance(&rt, tree);
        assert_eq!(tick(&rt, &mut inst, None), Status::Success);
    }

    #[test]
    fn invert_passes_running_through() {
        let rt = runtime();
        let tree = CompiledTree {
            root_id: 0,
            nodes: vec![
                CompiledNode { node_id: 0, kind: NodeKind::Invert, children: vec![1] },
                CompiledNode { node_id: 1, kind: NodeKind::Running, children: vec![] },
            ],
        };
        let mut inst = instance(&rt, tree);
        assert_eq!(tick(&rt, &mut inst, None), Status::Running);
    }

    #[test]
    fn sel_falls_back_to_second_child() {
        let rt = runtime();
        let tree = CompiledTree {
            root_id: 0,
            nodes: vec![
                CompiledNode { node_id: 0, kind: NodeKind::Sel, children: vec![1, 2] },
                CompiledNode { node_id: 1, kind: NodeKind::Fail, children: vec![] },
                CompiledNode { node_id: 2, kind: NodeKind::Succeed, children: vec![] },
            ],
        };
        let mut inst = instance(&rt, tree);
        assert_eq!(tick(&rt, &mut inst, None), Status::Success);
    }

    #[test]
    fn mem_seq_resumes_at_cursor() {
        let mut rt = runtime();
        rt.callbacks.register_action(
            "running-then-success-at-3",
            Box::new(|ctx, _args| {
                let mem = ctx.instance.memory_mut(ctx.node_id);
                let calls = match mem.scratch.get("calls") {
                    Some(LeafArg::Int(n)) => *n,
                    _ => 0,
                };
                mem.scratch.insert("calls".to_string(), LeafArg::Int(calls + 1));
                if calls + 1 >= 3 { Ok(Status::Success) } else { Ok(Status::Running) }
            }),
        );
        rt.callbacks.register_action("always-success", Box::new(|_c, _a| Ok(Status::Success)));
        let tree = CompiledTree {
            root_id: 0,
            nodes: vec![
                CompiledNode { node_id: 0, kind: NodeKind::MemSeq, children: vec![1, 2] },
                CompiledNode { node_id: 1, kind: NodeKind::Act { name: "running-then-success-at-3".into(), args: vec![] }, children: vec![] },
                CompiledNode { node_id: 2, kind: NodeKind::Act { name: "always-success".into(), args: vec![] }, children: vec![] },
            ],
        };
        let mut inst = instance(&rt, tree);
        assert_eq!(tick(&rt, &mut inst, None), Status::Running);
        assert_eq!(inst.memory(0).cursor, Some(0));
        assert_eq!(tick(&rt, &mut inst, None), Status::Running);
        assert_eq!(tick(&rt, &mut inst, None), Status::Success);
        assert_eq!(inst.memory(0).cursor, None);
    }
}
