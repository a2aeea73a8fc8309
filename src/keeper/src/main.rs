use axum_server::Server;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Duration;
use tracing::info;

use common::file_utils::init_dirs;
use common::rpc::RpcClient;
use common::schemas::NodeId;
use common::telemetry::init_telemetry;
use common::url_utils::{parse_socket_addr, sanitize_addr};

use keeper::health::heartbeat_loop;
use keeper::inbound::InboundSlot;
use keeper::membership::join_cluster;
use keeper::receiver::data_listener;
use keeper::routes::router;
use keeper::state::KeeperState;

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    /// Stable node id
    #[arg(long, env = "KEEPER_ID")]
    id: NodeId,
    /// Master control address
    #[arg(long, env = "MASTER_ADDR")]
    master: String,
    /// Control RPC listen address, as advertised to the master
    #[arg(long, env = "KEEPER_CONTROL_ADDR", default_value = "127.0.0.1:9001")]
    control_listen: String,
    /// Data-plane listen address, as advertised to the master
    #[arg(long, env = "KEEPER_DATA_ADDR", default_value = "127.0.0.1:9002")]
    data_listen: String,
    /// Data root; blobs/ and tmp/ are created inside
    #[arg(long, env = "KEEPER_DATA", default_value = "./data")]
    data: PathBuf,
    #[arg(long, env = "HEARTBEAT_INTERVAL_MS", default_value_t = 1000)]
    heartbeat_interval_ms: u64,
    /// How long a SaveFile reservation waits for its stream
    #[arg(long, env = "PRIME_TTL_SECS", default_value_t = 30)]
    prime_ttl_secs: u64,
    #[arg(long, env = "RPC_TIMEOUT_SECS", default_value_t = 5)]
    rpc_timeout_secs: u64,
    #[arg(long, env = "TRANSFER_TIMEOUT_SECS", default_value_t = 300)]
    transfer_timeout_secs: u64,
    /// How long to keep retrying the initial join
    #[arg(long, env = "JOIN_TIMEOUT_SECS", default_value_t = 60)]
    join_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry("keeper");

    let args = Args::parse();
    init_dirs(&args.data).await?;

    let control_address = sanitize_addr(&args.control_listen)?;
    let data_address = sanitize_addr(&args.data_listen)?;

    // Bind both listeners before joining so the master never routes to a closed port
    let data_listener_socket = TcpListener::bind(parse_socket_addr(&data_address)?).await?;
    let control_socket = parse_socket_addr(&control_address)?;

    let rpc = RpcClient::new(
        Duration::from_secs(args.rpc_timeout_secs),
        Duration::from_secs(args.transfer_timeout_secs),
    )?;

    let state = KeeperState {
        rpc,
        data_root: Arc::new(args.data.clone()),
        master: sanitize_addr(&args.master)?,
        node_id: args.id,
        data_address,
        control_address: control_address.clone(),
        inbound: Arc::new(InboundSlot::new(Duration::from_secs(args.prime_ttl_secs))),
        replicate_budget: Duration::from_secs(args.prime_ttl_secs),
    };

    let app = router(state.clone());
    let server = Server::bind(control_socket).serve(app.into_make_service());
    info!("control listening on {}", control_address);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel::<bool>(false);
    let data_handle = tokio::spawn(data_listener(
        state.clone(),
        data_listener_socket,
        shutdown_rx.clone(),
    ));

    let server_handle = tokio::spawn(server);

    join_cluster(&state, Duration::from_secs(args.join_timeout_secs)).await?;

    let hb_handle = tokio::spawn(heartbeat_loop(
        state.clone(),
        Duration::from_millis(args.heartbeat_interval_ms),
        shutdown_rx,
    ));

    // Graceful shutdown: ctrl+c
    tokio::select! {
        res = server_handle => { res??; }
        _ = tokio::signal::ctrl_c() => {}
    }

    let _ = shutdown_tx.send(true);
    let _ = hb_handle.await;
    let _ = data_handle.await;

    Ok(())
}
