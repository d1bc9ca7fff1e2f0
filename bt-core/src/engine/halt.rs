//! Halt Protocol: when a reactive composite abandons a previously
//! running subtree, walk its descendants, best-effort cancel any in-flight
//! scheduler job, and clear their node memory. Never blocks on
//! cancellation completing.

use crate::engine::tick::TickContext;
use crate::trace::TracePayload;

pub fn halt_subtree(ctx: &mut TickContext, node_id: u32) {
    let children = ctx.instance.tree.node(node_id).children.clone();

    if let Some(job_id) = ctx.instance.memory(node_id).job_id {
        ctx.runtime.vla.cancel(job_id);
        let tick = ctx.instance.tick_index;
        if ctx.instance.trace_enabled {
            ctx.instance.trace.push(tick, node_id, TracePayload::SchedulerCancel { job_id });
        }
    }
    *ctx.instance.memory_mut(node_id) = Default::default();

    for child in children {
        halt_subtree(ctx, child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::engine::instance::TreeInstance;
    use crate::engine::tree::{CompiledNode, CompiledTree, NodeKind};
    use crate::Runtime;
    use std::sync::Arc;

    #[test]
    fn halt_clears_job_and_memory() {
        let rt = Runtime::from_config(RuntimeConfig::default());
        let tree = CompiledTree {
            root_id: 0,
            nodes: vec![CompiledNode { node_id: 0, kind: NodeKind::Running, children: vec![] }],
        };
        let mut inst = TreeInstance::new(Arc::new(tree), rt.clock.clone(), 64, 10);
        inst.memory_mut(0).job_id = Some(7);
        {
            let mut ctx = TickContext { instance: &mut inst, runtime: &rt, node_id: 0 };
            halt_subtree(&mut ctx, 0);
        }
        assert_eq!(inst.memory(0).job_id, None);
    }
}
