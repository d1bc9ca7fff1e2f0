//! Per-instance bounded trace ring.

use std::collections::VecDeque;

#[derive(Clone, Debug, PartialEq)]
pub enum TracePayload {
    TickBegin { root_id: u32 },
    TickEnd { status: crate::engine::tree::Status, duration_us: u64 },
    NodeEnter,
    NodeExit { status: crate::engine::tree::Status, duration_us: u64 },
    BbRead { key: String },
    BbWrite { key: String, type_name: &'static str },
    SchedulerSubmit { job_id: u64 },
    SchedulerStart { job_id: u64 },
    SchedulerFinish { job_id: u64 },
    SchedulerCancel { job_id: u64 },
    Warning { message: String },
    Error { message: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct TraceEvent {
    pub sequence: u64,
    pub ts_ns: i64,
    pub tick: u64,
    pub node_id: u32,
    pub payload: TracePayload,
}

/// Single-producer bounded ring. Oldest events are evicted first; `sequence`
/// is never reused even as entries are evicted, so gaps in the snapshot
/// reveal exactly how much history was dropped.
pub struct TraceRing {
    capacity: usize,
    events: VecDeque<TraceEvent>,
    next_sequence: u64,
    clock: std::sync::Arc<dyn crate::clock::Clock>,
}

impl TraceRing {
    pub fn new(capacity: usize, clock: std::sync::Arc<dyn crate::clock::Clock>) -> Self {
        Self { capacity, events: VecDeque::with_capacity(capacity.min(1024)), next_sequence: 0, clock }
    }

    pub fn push(&mut self, tick: u64, node_id: u32, payload: TracePayload) {
        let event = TraceEvent {
            sequence: self.next_sequence,
            ts_ns: self.clock.now_ns(),
            tick,
            node_id,
            payload,
        };
        self.next_sequence += 1;
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    pub fn snapshot(&self) -> Vec<TraceEvent> {
        self.events.iter().cloned().collect()
    }

    pub fn reset(&mut self) {
        self.events.clear();
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;
    use std::sync::Arc;

    #[test]
    fn sequence_strictly_increases_and_never_reuses() {
        let mut ring = TraceRing::new(2, Arc::new(FakeClock::new()));
        ring.push(1, 0, TracePayload::NodeEnter);
        ring.push(1, 0, TracePayload::NodeEnter);
        ring.push(1, 0, TracePayload::NodeEnter);
        let snap = ring.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].sequence, 1);
        assert_eq!(snap[1].sequence, 2);
    }

    #[test]
    fn capacity_bounds_retained_events() {
        let mut ring = TraceRing::new(3, Arc::new(FakeClock::new()));
        for _ in 0..10 {
            ring.push(1, 0, TracePayload::NodeEnter);
        }
        assert_eq!(ring.len(), 3);
    }
}
