use anyhow::{Context, bail};
use std::net::SocketAddr;
use tokio::fs::{self, File};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use common::error::ApiError;
use common::file_utils::tmp_path;
use common::retry::{RetryClass, RetryConfig, retry_timeboxed};
use common::schemas::RegisterFileRequest;
use common::transfer::receive_to_file;

use crate::state::KeeperState;
use crate::store::commit_blob;

/// Accept data-plane connections until shutdown. Each connection is one
/// file, handled on its own task.
pub async fn data_listener(
    state: KeeperState,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    info!("data listener on {}", listener.local_addr()?);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let span = info_span!("keeper.inbound", node_id = state.node_id, %peer);
                    tokio::spawn(handle_connection(state.clone(), stream, peer).instrument(span));
                }
                Err(e) => warn!("accept error: {}", e),
            },
            res = shutdown.changed() => { if res.is_err() || *shutdown.borrow() { break; } }
        }
    }

    info!("data listener stopped");

    Ok(())
}

async fn handle_connection(state: KeeperState, stream: TcpStream, peer: SocketAddr) {
    match receive_inbound(&state, stream).await {
        Ok(req) => info!(file = %req.file_name, size = req.size, kind = ?req.kind, "stored"),
        Err(e) => warn!(%peer, "inbound stream dropped: {e:#}"),
    }
}

/// Receive one stream into the store and register it with the master.
pub async fn receive_inbound(
    state: &KeeperState,
    stream: TcpStream,
) -> anyhow::Result<RegisterFileRequest> {
    let lease = state.inbound.begin()?;
    let spec = lease.spec().clone();

    // partial bytes stay in tmp/ and are never registered
    let tmp = tmp_path(&state.data_root, &Uuid::new_v4().to_string());
    let mut file = File::create(&tmp)
        .await
        .with_context(|| format!("creating {}", tmp.display()))?;
    let (size, etag) = receive_to_file(stream, &mut file).await?;
    file.sync_all().await?;
    drop(file);

    if let Some(expected) = spec.expected_size
        && expected != size
    {
        let _ = fs::remove_file(&tmp).await;
        bail!(
            "{} arrived with {} bytes, expected {}",
            spec.name,
            size,
            expected
        );
    }

    let stored = commit_blob(&state.data_root, &tmp, &spec.name).await?;
    drop(lease);

    let req = RegisterFileRequest {
        file_name: spec.name.as_str().to_string(),
        node_id: state.node_id,
        local_path: stored.to_string_lossy().to_string(),
        size,
        etag,
        kind: spec.kind,
    };

    let cfg = RetryConfig::with_budget(state.rpc.rpc_timeout() * 3);
    retry_timeboxed(
        &cfg,
        || state.rpc.register_file(&state.master, &req),
        |e: &ApiError| {
            if e.is_transient() {
                RetryClass::Retryable
            } else {
                RetryClass::NonRetryable
            }
        },
    )
    .await
    .inspect_err(|e| error!(file = %req.file_name, "registration failed: {}", e))?;

    Ok(req)
}
