use std::time::Duration;
use tracing::{info, warn};

use common::error::ApiError;
use common::schemas::HeartbeatRequest;

use crate::membership::try_join;
use crate::state::KeeperState;
use crate::store::sample_disk_usage;

const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub async fn heartbeat_loop(
    state: KeeperState,
    interval: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut tick = tokio::time::interval(interval);
    let mut backoff = interval;

    loop {
        tokio::select! {
            _ = tick.tick() => {},
            res = shutdown.changed() => { if res.is_err() || *shutdown.borrow() { break; } }
        }

        let (used, cap) = sample_disk_usage(&state.data_root).await;

        let hb = HeartbeatRequest {
            id: state.node_id,
            used_bytes: used,
            capacity_bytes: cap,
        };

        match state.rpc.heartbeat(&state.master, &hb).await {
            Ok(()) => {
                backoff = interval; // reset backoff on success
            }
            Err(ApiError::UnknownNode) => {
                // master lost its membership (restart): join again
                match try_join(&state).await {
                    Ok(true) => info!(node_id = state.node_id, "rejoined master"),
                    Ok(false) => warn!(node_id = state.node_id, "master refused rejoin"),
                    Err(e) => warn!("rejoin error: {e}"),
                }
            }
            Err(e) => {
                warn!("heartbeat error: {e}");
                backoff = (backoff.mul_f32(1.5)).min(MAX_BACKOFF);
            }
        }

        // back off on repeated failures
        if backoff > interval {
            tokio::time::sleep(backoff).await;
        }
    }

    info!("heartbeat loop stopped");

    Ok(())
}
