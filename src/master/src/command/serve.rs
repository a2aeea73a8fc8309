use axum_server::Server;
use clap::Parser;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use common::constants::DEFAULT_REPLICATION_FACTOR;
use common::rpc::RpcClient;
use common::url_utils::parse_socket_addr;

use crate::core::cluster::ClusterConfig;
use crate::core::health::liveness_monitor;
use crate::core::repair::replication_loop;
use crate::core::routes::router;
use crate::core::state::MasterState;

#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on for control RPCs
    #[arg(long, env = "MASTER_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Copies to keep of every file
    #[arg(long, env = "REPLICATION_FACTOR", default_value_t = DEFAULT_REPLICATION_FACTOR)]
    pub replication_factor: usize,

    /// Liveness monitor interval (milliseconds)
    #[arg(long, env = "MONITOR_INTERVAL_MS", default_value_t = 2000)]
    pub monitor_interval_ms: u64,

    /// Heartbeat-less ticks before a node is dead
    #[arg(long, env = "MISSED_TICKS", default_value_t = 1)]
    pub missed_ticks: u32,

    /// Replication repair interval (seconds)
    #[arg(long, env = "REPAIR_INTERVAL_SECS", default_value_t = 10)]
    pub repair_interval_secs: u64,

    /// Deadline for metadata RPCs (seconds)
    #[arg(long, env = "RPC_TIMEOUT_SECS", default_value_t = 5)]
    pub rpc_timeout_secs: u64,

    /// Deadline for RPCs that wait on a byte stream (seconds)
    #[arg(long, env = "TRANSFER_TIMEOUT_SECS", default_value_t = 300)]
    pub transfer_timeout_secs: u64,

    /// How long an upload callback stays pending (seconds)
    #[arg(long, env = "CALLBACK_TTL_SECS", default_value_t = 600)]
    pub callback_ttl_secs: u64,

    /// Concurrent existence probes per repair pass
    #[arg(long, env = "REPAIR_CONCURRENCY", default_value_t = 8)]
    pub repair_concurrency: usize,
}

impl ServeArgs {
    pub fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            replication_factor: self.replication_factor.max(1),
            missed_ticks_threshold: self.missed_ticks.max(1),
            callback_ttl: Duration::from_secs(self.callback_ttl_secs),
        }
    }
}

pub async fn serve(serve_args: ServeArgs) -> anyhow::Result<()> {
    let rpc = RpcClient::new(
        Duration::from_secs(serve_args.rpc_timeout_secs),
        Duration::from_secs(serve_args.transfer_timeout_secs),
    )?;
    let state = MasterState::new(
        rpc,
        serve_args.cluster_config(),
        serve_args.repair_concurrency,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel::<bool>(false);
    let monitor_handle = tokio::spawn(liveness_monitor(
        state.clone(),
        Duration::from_millis(serve_args.monitor_interval_ms),
        shutdown_rx.clone(),
    ));
    let repair_handle = tokio::spawn(replication_loop(
        state.clone(),
        Duration::from_secs(serve_args.repair_interval_secs),
        shutdown_rx,
    ));

    let app = router(state);

    let socket_addr = parse_socket_addr(&serve_args.listen)?;
    let server = Server::bind(socket_addr).serve(app.into_make_service());

    info!(
        replication_factor = serve_args.replication_factor,
        "master listening on {}", serve_args.listen
    );

    // Graceful shutdown: ctrl+c
    tokio::select! {
        res = server => { res?; }
        _ = tokio::signal::ctrl_c() => {}
    }

    let _ = shutdown_tx.send(true);
    let _ = monitor_handle.await;
    let _ = repair_handle.await;

    Ok(())
}
