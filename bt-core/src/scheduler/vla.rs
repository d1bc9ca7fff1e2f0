//! VLA capability service: validates requests, dispatches to the
//! scheduler, and reports poll-able lifecycle status.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::ValidationError;
use crate::log::{LogLevel, LogSink};
use crate::scheduler::pool::{JobStatus, Scheduler};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionSpaceKind {
    Continuous,
    Discrete,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionSpace {
    pub kind: ActionSpaceKind,
    pub dims: usize,
    pub bounds: Vec<(f64, f64)>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Observation {
    pub state: Vec<f64>,
    pub timestamp_ms: i64,
    pub frame_id: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Constraints {
    pub max_abs_value: f64,
    pub max_delta: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelRef {
    pub name: String,
    pub version: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VlaRequest {
    pub task_id: String,
    pub instruction: String,
    pub observation: Observation,
    pub action_space: ActionSpace,
    pub constraints: Constraints,
    pub model: ModelRef,
    pub deadline_ms: u64,
    pub seed: u64,
}

impl VlaRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.action_space.dims == 0 {
            return Err(ValidationError("action_space.dims must be > 0".to_string()));
        }
        if self.action_space.bounds.len() != self.action_space.dims {
            return Err(ValidationError("bounds length must equal dims".to_string()));
        }
        for (lo, hi) in &self.action_space.bounds {
            if lo >= hi {
                return Err(ValidationError("bound lo must be < hi".to_string()));
            }
        }
        if self.constraints.max_abs_value <= 0.0 {
            return Err(ValidationError("max_abs_value must be positive".to_string()));
        }
        Ok(())
    }

    /// Hex-encoded SHA-256 over the request's canonical JSON encoding, used
    /// for job-record dedup/replay keys.
    pub fn request_hash(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VlaPollStatus {
    Queued,
    Running,
    Done,
    Error,
    Timeout,
    Cancelled,
}

impl VlaPollStatus {
    fn as_str(&self) -> &'static str {
        match self {
            VlaPollStatus::Queued => "queued",
            VlaPollStatus::Running => "running",
            VlaPollStatus::Done => "done",
            VlaPollStatus::Error => "error",
            VlaPollStatus::Timeout => "timeout",
            VlaPollStatus::Cancelled => "cancelled",
        }
    }

    fn is_terminal(&self) -> bool {
        !matches!(self, VlaPollStatus::Queued | VlaPollStatus::Running)
    }
}

#[derive(Clone, Debug)]
pub struct VlaPoll {
    pub status: VlaPollStatus,
    pub action: Option<Vec<f64>>,
    pub error: Option<String>,
}

/// Bookkeeping captured at submit time, needed later to emit a job record
/// without re-threading engine context through every poll call.
struct JobMeta {
    task_id: String,
    node_name: String,
    submitted_tick: u64,
    model_name: String,
    model_version: String,
    request_hash: String,
    cache_hit: bool,
}

/// A single JSON-Lines job record, named per the VLA wire schema.
#[derive(Serialize)]
struct VlaJobRecord {
    ts_ms: i64,
    run_id: String,
    tick_index: u64,
    node_name: String,
    task_id: String,
    capability: String,
    model_name: String,
    model_version: String,
    request_hash: String,
    status: String,
    latency_ms: i64,
    cache_hit: bool,
    replay_hit: bool,
    superseded: bool,
    response: serde_json::Value,
}

pub struct VlaService {
    scheduler: Arc<Scheduler>,
    clock: Arc<dyn Clock>,
    log: Arc<LogSink>,
    run_id: Uuid,
    /// Last emitted action per `task_id`, used to bound the next action's
    /// per-dimension delta relative to it.
    sessions: Mutex<HashMap<String, Vec<f64>>>,
    /// Most recently submitted job id per `task_id`, used to detect
    /// supersession when an older job's record is emitted.
    latest_job_for_task: Mutex<HashMap<String, u64>>,
    /// Request hashes seen before, for the `cache_hit` record field.
    seen_hashes: Mutex<HashSet<String>>,
    jobs: Mutex<HashMap<u64, JobMeta>>,
    emitted: Mutex<HashSet<u64>>,
}

impl VlaService {
    pub fn new(scheduler: Arc<Scheduler>, clock: Arc<dyn Clock>, log: Arc<LogSink>, run_id: Uuid) -> Self {
        Self {
            scheduler,
            clock,
            log,
            run_id,
            sessions: Mutex::new(HashMap::new()),
            latest_job_for_task: Mutex::new(HashMap::new()),
            seen_hashes: Mutex::new(HashSet::new()),
            jobs: Mutex::new(HashMap::new()),
            emitted: Mutex::new(HashSet::new()),
        }
    }

    /// Returns a job id. If validation fails, the job is never enqueued and
    /// `poll` on the returned id yields `:error` immediately.
    pub fn submit(&self, request: VlaRequest, node_name: &str, tick_index: u64) -> u64 {
        if let Err(e) = request.validate() {
            let id = self.scheduler.submit("vla_invalid", None, Box::new(move |_h| Err(e.0)));
            self.jobs.lock().expect("vla jobs mutex poisoned").insert(
                id,
                JobMeta {
                    task_id: request.task_id.clone(),
                    node_name: node_name.to_string(),
                    submitted_tick: tick_index,
                    model_name: request.model.name.clone(),
                    model_version: request.model.version.clone(),
                    request_hash: request.request_hash(),
                    cache_hit: false,
                },
            );
            return id;
        }

        let request_hash = request.request_hash();
        let cache_hit = {
            let mut seen = self.seen_hashes.lock().expect("vla hash set poisoned");
            !seen.insert(request_hash.clone())
        };

        let dims = request.action_space.dims;
        let bounds = request.action_space.bounds.clone();
        let max_delta = request.constraints.max_delta;
        let max_abs = request.constraints.max_abs_value;
        let seed = request.seed;
        let deadline_ms = request.deadline_ms;
        let task_id = request.task_id.clone();
        let prev_action = self
            .sessions
            .lock()
            .expect("vla sessions mutex poisoned")
            .get(&task_id)
            .cloned();

        let job_id = self.scheduler.submit(
            "vla_request",
            Some(deadline_ms),
            Box::new(move |handle| {
                let mut rng = crate::rng::Prng::new(seed);
                if handle.is_cancelled() {
                    return Err("cancelled".to_string());
                }
                let mut action = Vec::with_capacity(dims);
                for (idx, (lo, hi)) in bounds.iter().enumerate() {
                    let raw = rng.uniform(*lo, *hi);
                    let mut clamped = raw.clamp(-max_abs, max_abs).clamp(*lo, *hi);
                    if let Some(prev) = prev_action.as_ref().and_then(|p| p.get(idx)) {
                        clamped = clamped.clamp(prev - max_delta, prev + max_delta);
                    }
                    action.push(clamped);
                }
                Ok(json!({ "u": action }))
            }),
        );

        self.latest_job_for_task.lock().expect("vla task map poisoned").insert(task_id.clone(), job_id);
        self.jobs.lock().expect("vla jobs mutex poisoned").insert(
            job_id,
            JobMeta {
                task_id,
                node_name: node_name.to_string(),
                submitted_tick: tick_index,
                model_name: request.model.name.clone(),
                model_version: request.model.version.clone(),
                request_hash,
                cache_hit,
            },
        );
        job_id
    }

    pub fn poll(&self, job_id: u64, tick_index: u64) -> VlaPoll {
        let info = match self.scheduler.info(job_id) {
            Some(i) => i,
            None => return VlaPoll { status: VlaPollStatus::Error, action: None, error: Some("unknown job".into()) },
        };
        let poll = match info.status {
            JobStatus::Queued => VlaPoll { status: VlaPollStatus::Queued, action: None, error: None },
            JobStatus::Running => VlaPoll { status: VlaPollStatus::Running, action: None, error: None },
            JobStatus::Cancelled => VlaPoll { status: VlaPollStatus::Cancelled, action: None, error: None },
            JobStatus::Failed => {
                let timeout = info.error_text.as_deref() == Some("timeout");
                VlaPoll {
                    status: if timeout { VlaPollStatus::Timeout } else { VlaPollStatus::Error },
                    action: None,
                    error: info.error_text.clone(),
                }
            }
            JobStatus::Done => match self.scheduler.try_get_result(job_id) {
                Some(Ok(payload)) => {
                    let action = payload.get("u").and_then(|v| v.as_array()).map(|arr| {
                        arr.iter().filter_map(|x| x.as_f64()).collect::<Vec<_>>()
                    });
                    if let Some(action) = &action {
                        if let Some(meta) = self.jobs.lock().expect("vla jobs mutex poisoned").get(&job_id) {
                            self.sessions
                                .lock()
                                .expect("vla sessions mutex poisoned")
                                .insert(meta.task_id.clone(), action.clone());
                        }
                    }
                    VlaPoll { status: VlaPollStatus::Done, action, error: None }
                }
                Some(Err(e)) => VlaPoll { status: VlaPollStatus::Error, action: None, error: Some(e) },
                None => VlaPoll { status: VlaPollStatus::Done, action: None, error: None },
            },
        };

        if poll.status.is_terminal() {
            self.emit_record_once(job_id, tick_index, &poll, &info);
        }
        poll
    }

    fn emit_record_once(
        &self,
        job_id: u64,
        tick_index: u64,
        poll: &VlaPoll,
        info: &crate::scheduler::pool::JobInfo,
    ) {
        let already_emitted = !self.emitted.lock().expect("vla emitted set poisoned").insert(job_id);
        if already_emitted {
            return;
        }
        let meta = match self.jobs.lock().expect("vla jobs mutex poisoned").remove(&job_id) {
            Some(m) => m,
            None => return,
        };
        let superseded = self
            .latest_job_for_task
            .lock()
            .expect("vla task map poisoned")
            .get(&meta.task_id)
            .map(|&latest| latest != job_id)
            .unwrap_or(false);
        let latency_ms = match (info.started_at_ms, info.finished_at_ms) {
            (Some(start), Some(end)) => end - start,
            _ => 0,
        };
        let response = match (&poll.action, &poll.error) {
            (Some(action), _) => json!({ "u": action }),
            (None, Some(err)) => json!({ "error": err }),
            (None, None) => serde_json::Value::Null,
        };
        let record = VlaJobRecord {
            ts_ms: self.clock.now_ms(),
            run_id: self.run_id.to_string(),
            tick_index,
            node_name: meta.node_name,
            task_id: meta.task_id,
            capability: "vla-action".to_string(),
            model_name: meta.model_name,
            model_version: meta.model_version,
            request_hash: meta.request_hash,
            status: poll.status.as_str().to_string(),
            latency_ms,
            cache_hit: meta.cache_hit,
            replay_hit: false,
            superseded,
            response,
        };
        let line = serde_json::to_string(&record).unwrap_or_default();
        self.log.log(LogLevel::Info, tick_index, 0, "vla_job", line);
    }

    pub fn cancel(&self, job_id: u64) -> bool {
        self.scheduler.cancel(job_id)
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::log::LogSink;

    fn service() -> VlaService {
        let clock = Arc::new(SystemClock::new());
        let log = Arc::new(LogSink::new(64, clock.clone()));
        let sched = Scheduler::new(2, clock.clone(), log.clone());
        VlaService::new(sched, clock, log, Uuid::new_v4())
    }

    fn sample_request() -> VlaRequest {
        VlaRequest {
            task_id: "t1".into(),
            instruction: "pick up the cup".into(),
            observation: Observation { state: vec![0.0], timestamp_ms: 0, frame_id: "base".into() },
            action_space: ActionSpace { kind: ActionSpaceKind::Continuous, dims: 2, bounds: vec![(-1.0, 1.0), (-1.0, 1.0)] },
            constraints: Constraints { max_abs_value: 1.0, max_delta: 1.0 },
            model: ModelRef { name: "demo".into(), version: "1".into() },
            deadline_ms: 2000,
            seed: 1,
        }
    }

    fn poll_until_terminal(svc: &VlaService, id: u64) -> VlaPoll {
        for _ in 0..400 {
            let poll = svc.poll(id, 0);
            if poll.status.is_terminal() {
                return poll;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        svc.poll(id, 0)
    }

    #[test]
    fn lifecycle_reaches_done() {
        let svc = service();
        let id = svc.submit(sample_request(), "vla-request", 1);
        let poll = poll_until_terminal(&svc, id);
        assert_eq!(poll.status, VlaPollStatus::Done);
    }

    #[test]
    fn invalid_request_errors_immediately() {
        let svc = service();
        let mut req = sample_request();
        req.action_space.dims = 0;
        let id = svc.submit(req, "vla-request", 1);
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(svc.poll(id, 1).status, VlaPollStatus::Error);
    }

    #[test]
    fn cancel_then_poll_eventually_cancelled() {
        let svc = service();
        let id = svc.submit(sample_request(), "vla-request", 1);
        svc.cancel(id);
        std::thread::sleep(std::time::Duration::from_millis(20));
        let status = svc.poll(id, 1).status;
        assert!(matches!(status, VlaPollStatus::Cancelled | VlaPollStatus::Done));
    }

    #[test]
    fn second_action_is_clamped_to_delta_of_first() {
        let svc = service();
        let mut req = sample_request();
        req.constraints.max_delta = 0.05;
        let id1 = svc.submit(req.clone(), "vla-request", 1);
        let first = poll_until_terminal(&svc, id1).action.expect("first action");

        let id2 = svc.submit(req, "vla-request", 2);
        let second = poll_until_terminal(&svc, id2).action.expect("second action");

        for (a, b) in first.iter().zip(second.iter()) {
            assert!((a - b).abs() <= 0.05 + 1e-9, "delta exceeded: {a} -> {b}");
        }
    }
}
