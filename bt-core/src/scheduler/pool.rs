//! Fixed-size worker pool guarded by an internal mutex/condvar.
//!
//! Native-threaded rather than tokio-async: the scheduler is the one
//! place in this crate that owns a thread pool, since the tick thread
//! itself must never block or await.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use serde_json::Value as JsonValue;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Failed,
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct JobInfo {
    pub id: u64,
    pub task_name: String,
    pub status: JobStatus,
    pub submitted_at_ms: i64,
    pub started_at_ms: Option<i64>,
    pub finished_at_ms: Option<i64>,
    pub error_text: Option<String>,
}

/// Handle given to a running task so it can observe best-effort cancellation.
#[derive(Clone)]
pub struct JobHandle {
    cancelled: Arc<AtomicBool>,
}

impl JobHandle {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub type TaskFn = Box<dyn FnOnce(&JobHandle) -> Result<JsonValue, String> + Send>;

struct QueuedJob {
    id: u64,
    task_name: String,
    task: TaskFn,
    cancel_flag: Arc<AtomicBool>,
    timeout_ms: Option<u64>,
}

struct Inner {
    queue: VecDeque<QueuedJob>,
    jobs: HashMap<u64, JobInfo>,
    results: HashMap<u64, Result<JsonValue, String>>,
    cancel_flags: HashMap<u64, Arc<AtomicBool>>,
    shutdown: bool,
}

#[derive(Default, Clone, Copy, Debug)]
pub struct SchedulerStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

pub struct Scheduler {
    next_id: AtomicU64,
    state: Arc<Mutex<Inner>>,
    not_empty: Arc<Condvar>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    clock: Arc<dyn crate::clock::Clock>,
    log: Arc<crate::log::LogSink>,
    stats: Mutex<SchedulerStats>,
}

impl Scheduler {
    pub fn new(worker_count: usize, clock: Arc<dyn crate::clock::Clock>, log: Arc<crate::log::LogSink>) -> Arc<Self> {
        let scheduler = Arc::new(Self {
            next_id: AtomicU64::new(1),
            state: Arc::new(Mutex::new(Inner {
                queue: VecDeque::new(),
                jobs: HashMap::new(),
                results: HashMap::new(),
                cancel_flags: HashMap::new(),
                shutdown: false,
            })),
            not_empty: Arc::new(Condvar::new()),
            workers: Mutex::new(Vec::new()),
            clock,
            log,
            stats: Mutex::new(SchedulerStats::default()),
        });

        let mut handles = Vec::with_capacity(worker_count.max(1));
        for _ in 0..worker_count.max(1) {
            let state = scheduler.state.clone();
            let not_empty = scheduler.not_empty.clone();
            let clock = scheduler.clock.clone();
            handles.push(std::thread::spawn(move || worker_loop(state, not_empty, clock)));
        }
        *scheduler.workers.lock().expect("worker list mutex poisoned") = handles;
        scheduler
    }

    pub fn submit(&self, task_name: impl Into<String>, timeout_ms: Option<u64>, task: TaskFn) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cancel_flag = Arc::new(AtomicBool::new(false));
        let mut state = self.state.lock().expect("scheduler mutex poisoned");
        let task_name = task_name.into();
        state.jobs.insert(
            id,
            JobInfo {
                id,
                task_name: task_name.clone(),
                status: JobStatus::Queued,
                submitted_at_ms: self.clock.now_ms(),
                started_at_ms: None,
                finished_at_ms: None,
                error_text: None,
            },
        );
        state.cancel_flags.insert(id, cancel_flag.clone());
        state.queue.push_back(QueuedJob { id, task_name, task, cancel_flag, timeout_ms });
        drop(state);
        self.stats.lock().expect("stats mutex poisoned").submitted += 1;
        self.not_empty.notify_one();
        id
    }

    pub fn info(&self, job_id: u64) -> Option<JobInfo> {
        self.state.lock().expect("scheduler mutex poisoned").jobs.get(&job_id).cloned()
    }

    pub fn try_get_result(&self, job_id: u64) -> Option<Result<JsonValue, String>> {
        self.state.lock().expect("scheduler mutex poisoned").results.remove(&job_id)
    }

    /// Returns true if the job transitioned from Queued/Running to Cancelled.
    pub fn cancel(&self, job_id: u64) -> bool {
        let mut state = self.state.lock().expect("scheduler mutex poisoned");
        if let Some(flag) = state.cancel_flags.get(&job_id) {
            flag.store(true, Ordering::SeqCst);
        }
        match state.jobs.get_mut(&job_id) {
            Some(job) if matches!(job.status, JobStatus::Queued | JobStatus::Running) => {
                job.status = JobStatus::Cancelled;
                job.finished_at_ms = Some(self.clock.now_ms());
                state.queue.retain(|q| q.id != job_id);
                true
            }
            _ => false,
        }
    }

    pub fn stats(&self) -> SchedulerStats {
        *self.stats.lock().expect("stats mutex poisoned")
    }

    pub fn log(&self) -> &Arc<crate::log::LogSink> {
        &self.log
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.state.lock().expect("scheduler mutex poisoned").shutdown = true;
        self.not_empty.notify_all();
        for handle in self.workers.lock().expect("worker list mutex poisoned").drain(..) {
            let _ = handle.join();
        }
    }
}

fn worker_loop(state: Arc<Mutex<Inner>>, not_empty: Arc<Condvar>, clock: Arc<dyn crate::clock::Clock>) {
    loop {
        let job = {
            let mut guard = state.lock().expect("scheduler mutex poisoned");
            loop {
                if guard.shutdown {
                    return;
                }
                if let Some(job) = guard.queue.pop_front() {
                    break job;
                }
                guard = not_empty.wait(guard).expect("scheduler condvar wait poisoned");
            }
        };

        {
            let mut guard = state.lock().expect("scheduler mutex poisoned");
            if job.cancel_flag.load(Ordering::SeqCst) {
                continue;
            }
            if let Some(info) = guard.jobs.get_mut(&job.id) {
                info.status = JobStatus::Running;
                info.started_at_ms = Some(clock.now_ms());
            }
        }

        let handle = JobHandle { cancelled: job.cancel_flag.clone() };
        let started_at = clock.now_ms();
        let result = (job.task)(&handle);
        let timed_out = job
            .timeout_ms
            .map(|t| (clock.now_ms() - started_at) as u64 >= t)
            .unwrap_or(false);

        let mut guard = state.lock().expect("scheduler mutex poisoned");
        if job.cancel_flag.load(Ordering::SeqCst) {
            continue;
        }
        if let Some(info) = guard.jobs.get_mut(&job.id) {
            if timed_out {
                info.status = JobStatus::Failed;
                info.error_text = Some("timeout".to_string());
            } else {
                match &result {
                    Ok(_) => info.status = JobStatus::Done,
                    Err(e) => {
                        info.status = JobStatus::Failed;
                        info.error_text = Some(e.clone());
                    }
                }
            }
            info.finished_at_ms = Some(clock.now_ms());
        }
        let stored = if timed_out { Err("timeout".to_string()) } else { result };
        guard.results.insert(job.id, stored);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;

    fn scheduler() -> Arc<Scheduler> {
        let clock = Arc::new(SystemClock::new());
        let log = Arc::new(crate::log::LogSink::new(64, clock.clone()));
        Scheduler::new(2, clock, log)
    }

    #[test]
    fn submit_and_complete() {
        let sched = scheduler();
        let id = sched.submit("echo", None, Box::new(|_h| Ok(JsonValue::from(42))));
        let mut result = None;
        for _ in 0..200 {
            if let Some(info) = sched.info(id) {
                if info.status == JobStatus::Done {
                    result = sched.try_get_result(id);
                    break;
                }
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(result, Some(Ok(JsonValue::from(42))));
    }

    #[test]
    fn cancel_before_start_marks_cancelled() {
        let sched = scheduler();
        let id = sched.submit(
            "slow",
            None,
            Box::new(|h| {
                while !h.is_cancelled() {
                    std::thread::sleep(std::time::Duration::from_millis(1));
                }
                Err("cancelled".to_string())
            }),
        );
        let cancelled = sched.cancel(id);
        assert!(cancelled || sched.info(id).unwrap().status != JobStatus::Queued);
    }
}
