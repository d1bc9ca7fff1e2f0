//! Thin read-only diagnostics surface over a running host loop's tree
//! instance. Never mutates core state; a gRPC facade over the textual
//! dumps the core crate already exposes.

use std::sync::{Arc, Mutex};

use bt_core::engine::TreeInstance;
use tonic::{Request, Response, Status as GrpcStatus};

pub mod proto {
    tonic::include_proto!("bt_host.v1");
}

use proto::diagnostics_server::Diagnostics;
use proto::{DumpReply, DumpRequest, TickStatusReply};

pub struct DiagnosticsService {
    pub instance: Arc<Mutex<TreeInstance>>,
    pub last_status: Arc<Mutex<Option<bt_core::engine::Status>>>,
}

#[tonic::async_trait]
impl Diagnostics for DiagnosticsService {
    async fn dump_blackboard(&self, _req: Request<DumpRequest>) -> Result<Response<DumpReply>, GrpcStatus> {
        let inst = self.instance.lock().map_err(|_| GrpcStatus::internal("instance lock poisoned"))?;
        let tick = inst.tick_index;
        let text = inst
            .blackboard
            .keys()
            .filter_map(|k| {
                inst.blackboard.get(k.clone(), None, tick, 0).map(|e| format!("{k} = {:?} (tick {})", e.value, e.last_write_tick))
            })
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Response::new(DumpReply { text }))
    }

    async fn dump_trace(&self, _req: Request<DumpRequest>) -> Result<Response<DumpReply>, GrpcStatus> {
        let inst = self.instance.lock().map_err(|_| GrpcStatus::internal("instance lock poisoned"))?;
        let text = inst
            .trace
            .snapshot()
            .iter()
            .map(|e| format!("seq={} tick={} node={} {:?}", e.sequence, e.tick, e.node_id, e.payload))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(Response::new(DumpReply { text }))
    }

    async fn dump_log(&self, _req: Request<DumpRequest>) -> Result<Response<DumpReply>, GrpcStatus> {
        Ok(Response::new(DumpReply { text: String::new() }))
    }

    async fn get_last_tick_status(&self, _req: Request<DumpRequest>) -> Result<Response<TickStatusReply>, GrpcStatus> {
        let inst = self.instance.lock().map_err(|_| GrpcStatus::internal("instance lock poisoned"))?;
        let status = self.last_status.lock().map_err(|_| GrpcStatus::internal("status lock poisoned"))?;
        let status_text = match *status {
            Some(bt_core::engine::Status::Success) => "success",
            Some(bt_core::engine::Status::Failure) => "failure",
            Some(bt_core::engine::Status::Running) => "running",
            None => "unknown",
        };
        Ok(Response::new(TickStatusReply { status: status_text.to_string(), tick_index: inst.tick_index }))
    }
}
