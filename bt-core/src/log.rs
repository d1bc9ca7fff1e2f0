//! Process-wide bounded log ring, mirrored to `tracing` for warn/error.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::clock::Clock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LogRecord {
    pub sequence: u64,
    pub ts_ns: i64,
    pub level: LogLevel,
    pub tick: u64,
    pub node_id: u32,
    pub category: String,
    pub message: String,
}

struct Inner {
    capacity: usize,
    records: VecDeque<LogRecord>,
    next_sequence: u64,
}

/// Shared across threads: the scheduler and the tick thread both log here.
pub struct LogSink {
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl LogSink {
    pub fn new(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(Inner { capacity, records: VecDeque::new(), next_sequence: 0 }),
        }
    }

    pub fn log(&self, level: LogLevel, tick: u64, node_id: u32, category: &str, message: impl Into<String>) {
        let message = message.into();
        if matches!(level, LogLevel::Warn) {
            tracing::warn!(category, tick, node_id, "{}", message);
        } else if matches!(level, LogLevel::Error) {
            tracing::error!(category, tick, node_id, "{}", message);
        } else {
            tracing::debug!(category, tick, node_id, "{}", message);
        }

        let mut inner = self.inner.lock().expect("log sink mutex poisoned");
        let record = LogRecord {
            sequence: inner.next_sequence,
            ts_ns: self.clock.now_ns(),
            level,
            tick,
            node_id,
            category: category.to_string(),
            message,
        };
        inner.next_sequence += 1;
        if inner.records.len() == inner.capacity {
            inner.records.pop_front();
        }
        inner.records.push_back(record);
    }

    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.inner.lock().expect("log sink mutex poisoned").records.iter().cloned().collect()
    }

    pub fn dump_text(&self) -> String {
        self.snapshot()
            .iter()
            .map(|r| format!("[{:?}] tick={} node={} {}: {}", r.level, r.tick, r.node_id, r.category, r.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    #[test]
    fn bounded_and_sequenced() {
        let sink = LogSink::new(2, Arc::new(FakeClock::new()));
        sink.log(LogLevel::Info, 1, 0, "bt", "a");
        sink.log(LogLevel::Info, 1, 0, "bt", "b");
        sink.log(LogLevel::Info, 1, 0, "bt", "c");
        let snap = sink.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].message, "b");
        assert_eq!(snap[1].message, "c");
    }
}
