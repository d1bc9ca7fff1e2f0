//! Mutable per-instance state: node memory, profile counters, and the
//! owning `TreeInstance` that binds blackboard + trace + tree together.
//! Indexed by `node_id`, since one instance ticks one tree with many
//! independently stateful nodes.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::blackboard::Blackboard;
use crate::clock::Clock;
use crate::engine::tree::{CompiledTree, LeafArg};
use crate::trace::TraceRing;

/// Per-node mutable state, reset on `bt.reset`.
#[derive(Clone, Debug, Default)]
pub struct NodeMemory {
    /// Memoryful composite (`mem-seq`/`mem-sel`/`async-seq`) resume cursor.
    pub cursor: Option<usize>,
    /// Remaining iterations for `repeat`/`retry` decorators.
    pub counter: Option<u32>,
    /// In-flight scheduler job id, for `vla-request`/`vla-wait` leaves and
    /// for the Halt Protocol's best-effort cancel walk.
    pub job_id: Option<u64>,
    /// Free-form scratch values an `act` leaf stashes between ticks.
    pub scratch: HashMap<String, LeafArg>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ProfileCounters {
    pub ticks: u64,
    pub budget_overruns: u64,
}

pub struct TreeInstance {
    pub id: Uuid,
    pub tree: Arc<CompiledTree>,
    pub node_memory: Vec<NodeMemory>,
    pub blackboard: Blackboard,
    pub trace: TraceRing,
    pub profile: ProfileCounters,
    pub tick_index: u64,
    pub tick_budget_ms: u32,
    pub trace_enabled: bool,
    pub read_trace_enabled: bool,
}

impl TreeInstance {
    pub fn new(
        tree: Arc<CompiledTree>,
        clock: Arc<dyn Clock>,
        trace_capacity: usize,
        tick_budget_ms: u32,
    ) -> Self {
        let node_count = tree.node_count();
        Self {
            id: Uuid::new_v4(),
            tree,
            node_memory: vec![NodeMemory::default(); node_count],
            blackboard: Blackboard::new(),
            trace: TraceRing::new(trace_capacity, clock),
            profile: ProfileCounters::default(),
            tick_index: 0,
            tick_budget_ms,
            trace_enabled: true,
            read_trace_enabled: false,
        }
    }

    /// Clears node memory and blackboard but preserves the compiled tree,
    /// tick index continues to climb (fresh cycle semantics live in the
    /// decorators themselves, not in reset).
    pub fn reset(&mut self) {
        for mem in &mut self.node_memory {
            *mem = NodeMemory::default();
        }
        self.blackboard.reset();
        self.trace.reset();
        self.tick_index = 0;
        self.profile = ProfileCounters::default();
    }

    pub fn memory_mut(&mut self, node_id: u32) -> &mut NodeMemory {
        &mut self.node_memory[node_id as usize]
    }

    pub fn memory(&self, node_id: u32) -> &NodeMemory {
        &self.node_memory[node_id as usize]
    }
}
