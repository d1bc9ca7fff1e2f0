use std::sync::{Arc, Mutex};
use std::time::Duration;

use bt_core::config::RuntimeConfig;
use bt_core::engine::{CompiledTree, Status, TreeInstance};
use bt_core::Runtime;
use tonic::transport::Server;
use tracing_subscriber::EnvFilter;

mod grpc;

use grpc::proto::diagnostics_server::DiagnosticsServer;
use grpc::DiagnosticsService;

/// A minimal always-succeeding demo tree so the host loop has something
/// to tick when no tree description is supplied via `--tree`.
fn demo_tree() -> CompiledTree {
    bt_core::compiler::compile("(sel (cond battery-ok) (act request-charge))")
        .unwrap_or_else(|errors| panic!("demo tree failed to compile: {errors:?}"))
}

fn load_tree() -> CompiledTree {
    let args: Vec<String> = std::env::args().collect();
    if let Some(path) = args.windows(2).find(|w| w[0] == "--tree").map(|w| w[1].clone()) {
        let src = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("cannot read {path}: {e}"));
        bt_core::compiler::compile(&src).unwrap_or_else(|errors| panic!("tree compile failed: {errors:?}"))
    } else {
        demo_tree()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let mut runtime = Runtime::from_config(RuntimeConfig::default());
    runtime.callbacks.register_condition("battery-ok", Box::new(|_ctx, _args| Ok(true)));
    runtime.callbacks.register_action("request-charge", Box::new(|_ctx, _args| Ok(Status::Success)));
    let runtime = Arc::new(runtime);

    let tree = Arc::new(load_tree());
    let instance = Arc::new(Mutex::new(TreeInstance::new(
        tree,
        runtime.clock.clone(),
        runtime.config.trace_ring_capacity,
        runtime.config.default_tick_budget_ms,
    )));
    let last_status: Arc<Mutex<Option<Status>>> = Arc::new(Mutex::new(None));

    let tick_runtime = runtime.clone();
    let tick_instance = instance.clone();
    let tick_status = last_status.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(50));
        loop {
            interval.tick().await;
            let status = {
                let mut inst = tick_instance.lock().expect("instance lock poisoned");
                bt_core::engine::tick(&tick_runtime, &mut inst, None)
            };
            *tick_status.lock().expect("status lock poisoned") = Some(status);
            tracing::debug!(?status, "tick complete");
        }
    });

    let addr = "0.0.0.0:50061".parse()?;
    tracing::info!("bt-host diagnostics gRPC listening on {addr}");
    let service = DiagnosticsService { instance, last_status };

    Server::builder().add_service(DiagnosticsServer::new(service)).serve(addr).await?;

    Ok(())
}
