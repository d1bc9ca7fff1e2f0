//! The compiled, immutable tree: node kinds, literal args, and the
//! dense-id node table.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Success,
    Failure,
    Running,
}

/// A literal leaf argument. Leaves declare expected arity/shape and
/// validate it at tick time; the compiler only checks arity and literal
/// well-formedness.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LeafArg {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Symbol(String),
}

/// Keyed parameters for `plan-action` / `vla-*` leaves, e.g. `:model_service "toy-1d"`.
pub type KeyedArgs = Vec<(String, LeafArg)>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    Seq,
    Sel,
    MemSeq,
    MemSel,
    AsyncSeq,
    ReactiveSeq,
    ReactiveSel,
    Invert,
    Repeat(u32),
    Retry(u32),
    Cond { name: String, args: Vec<LeafArg> },
    Act { name: String, args: Vec<LeafArg> },
    PlanAction { args: KeyedArgs },
    VlaRequest { args: KeyedArgs },
    VlaWait { args: KeyedArgs },
    VlaCancel { args: KeyedArgs },
    Succeed,
    Fail,
    Running,
}

impl NodeKind {
    pub fn is_composite(&self) -> bool {
        matches!(
            self,
            NodeKind::Seq
                | NodeKind::Sel
                | NodeKind::MemSeq
                | NodeKind::MemSel
                | NodeKind::AsyncSeq
                | NodeKind::ReactiveSeq
                | NodeKind::ReactiveSel
        )
    }

    pub fn is_decorator(&self) -> bool {
        matches!(self, NodeKind::Invert | NodeKind::Repeat(_) | NodeKind::Retry(_))
    }

    pub fn is_reactive(&self) -> bool {
        matches!(self, NodeKind::ReactiveSeq | NodeKind::ReactiveSel)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompiledNode {
    pub node_id: u32,
    pub kind: NodeKind,
    pub children: Vec<u32>,
}

/// Immutable after construction; shared (by reference) across every
/// instance ticking this behaviour.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompiledTree {
    pub nodes: Vec<CompiledNode>,
    pub root_id: u32,
}

impl CompiledTree {
    pub fn node(&self, id: u32) -> &CompiledNode {
        self.nodes.get(id as usize).unwrap_or_else(|| {
            crate::error::InternalInvariant::panic(format!("node id {id} out of range"))
        })
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}
