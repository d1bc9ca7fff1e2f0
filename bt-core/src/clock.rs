//! Monotonic time source, injectable so tests can control elapsed time.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
    fn now_ns(&self) -> i64;
}

/// Wall-clock implementation backed by `std::time::Instant`.
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        self.epoch.elapsed().as_millis() as i64
    }

    fn now_ns(&self) -> i64 {
        self.epoch.elapsed().as_nanos() as i64
    }
}

/// Manually advanced clock for deterministic tests.
pub struct FakeClock {
    ns: AtomicI64,
}

impl FakeClock {
    pub fn new() -> Self {
        Self { ns: AtomicI64::new(0) }
    }

    pub fn advance_ms(&self, ms: i64) {
        self.ns.fetch_add(ms * 1_000_000, Ordering::SeqCst);
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now_ms(&self) -> i64 {
        self.ns.load(Ordering::SeqCst) / 1_000_000
    }

    fn now_ns(&self) -> i64 {
        self.ns.load(Ordering::SeqCst)
    }
}
