#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum_server::Server;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use common::file_utils::init_dirs;
use common::rpc::RpcClient;
use common::schemas::NodeId;
use keeper::health::heartbeat_loop;
use keeper::inbound::InboundSlot;
use keeper::membership::join_cluster;
use keeper::receiver::data_listener;
use keeper::state::KeeperState;
use master::core::cluster::{Cluster, ClusterConfig};
use master::core::health::liveness_monitor;
use master::core::index::FileRecord;
use master::core::node::{NodeInfo, NodeStatus};
use master::core::routes::router;
use master::core::state::MasterState;

pub const MONITOR_MS: u64 = 500;
pub const HEARTBEAT_MS: u64 = 100;

pub fn test_rpc() -> Result<RpcClient> {
    RpcClient::new(Duration::from_secs(2), Duration::from_secs(10))
}

pub struct TestServer {
    pub handle: JoinHandle<Result<(), anyhow::Error>>,
    pub shutdown_tx: watch::Sender<bool>,
    pub addr: SocketAddr,
}

impl TestServer {
    async fn start(listener: TcpListener, app: axum::Router) -> Result<Self> {
        let addr = listener.local_addr()?;
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let server = Server::from_tcp(listener.into_std()?).serve(app.into_make_service());

            tokio::select! {
                res = server => res.map_err(anyhow::Error::from),
                _ = shutdown_rx.changed() => Ok(()),
            }
        });

        Ok(TestServer {
            handle,
            shutdown_tx,
            addr,
        })
    }

    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
        let _ = self.handle.await;
        Ok(())
    }
}

pub struct TestMaster {
    pub server: TestServer,
    pub state: MasterState,
    pub address: String,
    monitor_handle: JoinHandle<Result<(), anyhow::Error>>,
    monitor_shutdown: watch::Sender<bool>,
}

impl TestMaster {
    /// Master with the liveness monitor running. Repair passes are driven by
    /// the tests through `repair_tick`.
    pub async fn new(replication_factor: usize) -> Result<Self> {
        let config = ClusterConfig {
            replication_factor,
            ..ClusterConfig::default()
        };
        let state = MasterState::new(test_rpc()?, config, 4);

        let (monitor_shutdown, shutdown_rx) = watch::channel(false);
        let monitor_handle = tokio::spawn(liveness_monitor(
            state.clone(),
            Duration::from_millis(MONITOR_MS),
            shutdown_rx,
        ));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let server = TestServer::start(listener, router(state.clone())).await?;
        let address = server.addr.to_string();

        Ok(TestMaster {
            server,
            state,
            address,
            monitor_handle,
            monitor_shutdown,
        })
    }

    /// Drop all membership and index state, as a restarted master would.
    pub fn forget_everything(&self) {
        let mut cluster = self.state.lock().unwrap();
        let config = cluster.config().clone();
        *cluster = Cluster::new(config);
    }

    pub fn nodes(&self) -> Vec<NodeInfo> {
        self.state.lock().unwrap().nodes()
    }

    pub fn records_of(&self, file_name: &str) -> Vec<FileRecord> {
        self.state
            .lock()
            .unwrap()
            .records()
            .into_iter()
            .filter(|r| r.file_name == file_name)
            .collect()
    }

    pub fn status_of(&self, node_id: NodeId) -> Option<NodeStatus> {
        self.nodes()
            .into_iter()
            .find(|n| n.node_id == node_id)
            .map(|n| n.status)
    }

    pub async fn shutdown(self) -> Result<()> {
        let _ = self.monitor_shutdown.send(true);
        let _ = self.monitor_handle.await;
        self.server.shutdown().await
    }
}

pub struct TestKeeper {
    pub server: TestServer,
    pub state: KeeperState,
    pub data_dir: TempDir,
    data_handle: JoinHandle<Result<(), anyhow::Error>>,
    data_shutdown: watch::Sender<bool>,
    heartbeat: Option<(JoinHandle<Result<(), anyhow::Error>>, watch::Sender<bool>)>,
}

impl TestKeeper {
    /// Keeper with both listeners up, joined and heartbeating.
    pub async fn start(master: &str, node_id: NodeId) -> Result<Self> {
        let mut keeper = Self::unjoined(master, node_id).await?;
        join_cluster(&keeper.state, Duration::from_secs(5)).await?;
        keeper.start_heartbeat();
        Ok(keeper)
    }

    pub async fn unjoined(master: &str, node_id: NodeId) -> Result<Self> {
        let data_dir = TempDir::new()?;
        init_dirs(data_dir.path()).await?;

        let control = TcpListener::bind("127.0.0.1:0").await?;
        let data = TcpListener::bind("127.0.0.1:0").await?;

        let state = KeeperState {
            rpc: test_rpc()?,
            data_root: Arc::new(data_dir.path().to_path_buf()),
            master: master.to_string(),
            node_id,
            data_address: data.local_addr()?.to_string(),
            control_address: control.local_addr()?.to_string(),
            inbound: Arc::new(InboundSlot::new(Duration::from_secs(5))),
            replicate_budget: Duration::from_secs(5),
        };

        let server = TestServer::start(control, keeper::routes::router(state.clone())).await?;

        let (data_shutdown, shutdown_rx) = watch::channel(false);
        let data_handle = tokio::spawn(data_listener(state.clone(), data, shutdown_rx));

        Ok(TestKeeper {
            server,
            state,
            data_dir,
            data_handle,
            data_shutdown,
            heartbeat: None,
        })
    }

    pub fn start_heartbeat(&mut self) {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(heartbeat_loop(
            self.state.clone(),
            Duration::from_millis(HEARTBEAT_MS),
            rx,
        ));
        self.heartbeat = Some((handle, tx));
    }

    pub async fn stop_heartbeat(&mut self) {
        if let Some((handle, tx)) = self.heartbeat.take() {
            let _ = tx.send(true);
            let _ = handle.await;
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.state.node_id
    }

    pub fn data_root(&self) -> &Path {
        self.data_dir.path()
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.stop_heartbeat().await;
        let _ = self.data_shutdown.send(true);
        let _ = self.data_handle.await;
        self.server.shutdown().await
    }
}

pub async fn start_keepers(master: &str, n: usize) -> Result<Vec<TestKeeper>> {
    let mut keepers = Vec::with_capacity(n);
    for id in 1..=n as NodeId {
        keepers.push(TestKeeper::start(master, id).await?);
    }
    Ok(keepers)
}

pub async fn shutdown_all(master: TestMaster, keepers: Vec<TestKeeper>) -> Result<()> {
    for keeper in keepers {
        keeper.shutdown().await?;
    }
    master.shutdown().await
}

pub fn patterned_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub async fn write_source(dir: &Path, name: &str, bytes: &[u8]) -> Result<PathBuf> {
    let path = dir.join(name);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

// Utility functions
pub async fn wait_until<F, Fut>(timeout_ms: u64, mut check_fn: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    let start = Instant::now();
    let timeout_duration = Duration::from_millis(timeout_ms);

    loop {
        if check_fn().await? {
            return Ok(());
        }

        if start.elapsed() > timeout_duration {
            anyhow::bail!("wait_until timed out after {}ms", timeout_ms);
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
