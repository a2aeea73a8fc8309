#![allow(dead_code)]

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
use keeper::inbound::InboundSlot;
use keeper::receiver::data_listener;
use keeper::routes::router;
use keeper::state::KeeperState;

/// Nothing listens here; registrations fail after the bytes are committed.
pub const NO_MASTER: &str = "127.0.0.1:1";

pub struct StandaloneKeeper {
    pub state: KeeperState,
    pub data_dir: TempDir,
    pub url: String,
    server: JoinHandle<Result<(), anyhow::Error>>,
    data: JoinHandle<Result<(), anyhow::Error>>,
    shutdown_tx: watch::Sender<bool>,
}

impl StandaloneKeeper {
    pub async fn start() -> Result<Self> {
        let data_dir = TempDir::new()?;
        init_dirs(data_dir.path()).await?;

        let control = TcpListener::bind("127.0.0.1:0").await?;
        let data = TcpListener::bind("127.0.0.1:0").await?;
        let control_address = control.local_addr()?.to_string();

        let state = KeeperState {
            rpc: RpcClient::new(Duration::from_millis(500), Duration::from_secs(5))?,
            data_root: Arc::new(data_dir.path().to_path_buf()),
            master: NO_MASTER.to_string(),
            node_id: 1,
            data_address: data.local_addr()?.to_string(),
            control_address: control_address.clone(),
            inbound: Arc::new(InboundSlot::new(Duration::from_secs(5))),
            replicate_budget: Duration::from_secs(1),
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let app = router(state.clone());
        let mut server_shutdown = shutdown_rx.clone();
        let server = tokio::spawn(async move {
            let server = Server::from_tcp(control.into_std()?).serve(app.into_make_service());

            tokio::select! {
                res = server => res.map_err(anyhow::Error::from),
                _ = server_shutdown.changed() => Ok(()),
            }
        });
        let data = tokio::spawn(data_listener(state.clone(), data, shutdown_rx));

        Ok(StandaloneKeeper {
            url: format!("http://{}", control_address),
            state,
            data_dir,
            server,
            data,
            shutdown_tx,
        })
    }

    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        let _ = self.data.await;
        let _ = self.server.await;
        Ok(())
    }
}

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

pub fn blake3_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
