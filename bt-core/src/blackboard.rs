//! Per-instance typed key-value store with write metadata.

use std::collections::BTreeMap;
use std::fmt;

use crate::trace::{TraceRing, TracePayload};

/// Blackboard keys are not limited to plain strings: script authors can key
/// by symbol, quoted text, an integer id, or a float (NaN rejected, same as
/// blackboard values).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum BbKey {
    Text(String),
    Symbol(String),
    Int(i64),
    /// Stored as its IEEE-754 bit pattern so the key is `Ord`/`Eq` without a
    /// partial-order footgun; NaN is rejected before a key ever reaches here.
    Float(u64),
}

impl BbKey {
    pub fn float(f: f64) -> Self {
        BbKey::Float(f.to_bits())
    }

    pub fn is_valid(&self) -> bool {
        match self {
            BbKey::Float(bits) => !f64::from_bits(*bits).is_nan(),
            _ => true,
        }
    }
}

impl fmt::Display for BbKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BbKey::Text(s) => write!(f, "{s}"),
            BbKey::Symbol(s) => write!(f, "{s}"),
            BbKey::Int(i) => write!(f, "{i}"),
            BbKey::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
        }
    }
}

/// Bare identifiers in tree scripts (`job`, `state`, `action`, ...) read as
/// symbols, matching how the parser tags unquoted tokens.
impl From<&str> for BbKey {
    fn from(s: &str) -> Self {
        BbKey::Symbol(s.to_string())
    }
}

impl From<String> for BbKey {
    fn from(s: String) -> Self {
        BbKey::Symbol(s)
    }
}

impl From<i64> for BbKey {
    fn from(i: i64) -> Self {
        BbKey::Int(i)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BbValue {
    Nil,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Text(String),
    FloatVector(Vec<f64>),
    JobRef(u64),
}

impl BbValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            BbValue::Nil => "nil",
            BbValue::Bool(_) => "bool",
            BbValue::Int64(_) => "int64",
            BbValue::Float64(_) => "float64",
            BbValue::Text(_) => "text",
            BbValue::FloatVector(_) => "float_vector",
            BbValue::JobRef(_) => "job_ref",
        }
    }

    /// Rejects NaN floats at construction, per the invariant that blackboard
    /// values are always well-ordered/comparable.
    pub fn is_valid(&self) -> bool {
        match self {
            BbValue::Float64(f) => !f.is_nan(),
            BbValue::FloatVector(v) => v.iter().all(|x| !x.is_nan()),
            _ => true,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BbEntry {
    pub value: BbValue,
    pub last_write_tick: u64,
    pub last_write_ts_ns: i64,
    pub last_writer_node_id: u32,
    pub last_writer_name: String,
}

/// Bound to one tree instance; never shared across threads.
pub struct Blackboard {
    entries: BTreeMap<BbKey, BbEntry>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self { entries: BTreeMap::new() }
    }

    /// Emits a `bb_read` trace event only when `trace` is `Some`; callers
    /// gate that on their instance's `read_trace_enabled` flag.
    pub fn get(
        &self,
        key: impl Into<BbKey>,
        trace: Option<&mut TraceRing>,
        tick_for_trace: u64,
        reader_node_id: u32,
    ) -> Option<&BbEntry> {
        let key = key.into();
        let entry = self.entries.get(&key);
        if let Some(trace) = trace {
            trace.push(tick_for_trace, reader_node_id, TracePayload::BbRead { key: key.to_string() });
        }
        entry
    }

    pub fn keys(&self) -> impl Iterator<Item = &BbKey> {
        self.entries.keys()
    }

    pub fn remove(&mut self, key: impl Into<BbKey>) {
        self.entries.remove(&key.into());
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Always overwrites; records the write unconditionally.
    pub fn put(
        &mut self,
        key: impl Into<BbKey>,
        value: BbValue,
        tick: u64,
        ts_ns: i64,
        writer_node_id: u32,
        writer_name: &str,
        trace: Option<&mut TraceRing>,
        tick_for_trace: u64,
    ) {
        let key = key.into();
        debug_assert!(key.is_valid(), "NaN float blackboard key");
        debug_assert!(value.is_valid(), "NaN float written to blackboard key {key}");
        self.entries.insert(
            key.clone(),
            BbEntry {
                value: value.clone(),
                last_write_tick: tick,
                last_write_ts_ns: ts_ns,
                last_writer_node_id: writer_node_id,
                last_writer_name: writer_name.to_string(),
            },
        );
        if let Some(trace) = trace {
            trace.push(
                tick_for_trace,
                writer_node_id,
                TracePayload::BbWrite { key: key.to_string(), type_name: value.type_name() },
            );
        }
    }
}

impl Default for Blackboard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_roundtrips() {
        let mut bb = Blackboard::new();
        bb.put("x", BbValue::Int64(7), 1, 100, 3, "cond_a", None, 1);
        let e = bb.get("x", None, 1, 0).unwrap();
        assert_eq!(e.value, BbValue::Int64(7));
        assert_eq!(e.last_write_tick, 1);
        assert_eq!(e.last_writer_node_id, 3);
    }

    #[test]
    fn metadata_monotonic_across_writes() {
        let mut bb = Blackboard::new();
        bb.put("x", BbValue::Int64(1), 1, 10, 0, "a", None, 1);
        bb.put("x", BbValue::Int64(2), 2, 20, 0, "a", None, 2);
        let e = bb.get("x", None, 2, 0).unwrap();
        assert_eq!(e.last_write_tick, 2);
        assert_eq!(e.value, BbValue::Int64(2));
    }

    #[test]
    fn reset_clears_all_entries() {
        let mut bb = Blackboard::new();
        bb.put("x", BbValue::Bool(true), 1, 1, 0, "a", None, 1);
        bb.reset();
        assert!(bb.get("x", None, 1, 0).is_none());
    }

    #[test]
    fn non_text_keys_are_independent_slots() {
        let mut bb = Blackboard::new();
        bb.put(BbKey::Int(1), BbValue::Int64(10), 1, 1, 0, "a", None, 1);
        bb.put("1", BbValue::Int64(20), 1, 1, 0, "a", None, 1);
        assert_eq!(bb.get(BbKey::Int(1), None, 1, 0).unwrap().value, BbValue::Int64(10));
        assert_eq!(bb.get("1", None, 1, 0).unwrap().value, BbValue::Int64(20));
    }

    #[test]
    fn read_trace_emits_bb_read_only_when_ring_supplied() {
        use crate::clock::FakeClock;
        use std::sync::Arc;
        let mut bb = Blackboard::new();
        bb.put("x", BbValue::Int64(1), 1, 1, 0, "a", None, 1);

        let mut ring = TraceRing::new(8, Arc::new(FakeClock::new()));
        bb.get("x", Some(&mut ring), 1, 0);
        assert_eq!(ring.len(), 1);
        assert!(matches!(ring.snapshot()[0].payload, TracePayload::BbRead { .. }));

        bb.get("x", None, 1, 0);
        assert_eq!(ring.len(), 1);
    }
}
