use anyhow::bail;
use std::time::Duration;
use tracing::{info, warn};

use common::error::ApiError;
use common::retry::{RetryClass, RetryConfig, retry_timeboxed};
use common::schemas::JoinRequest;

use crate::state::KeeperState;
use crate::store::sample_disk_usage;

async fn join_request(state: &KeeperState) -> JoinRequest {
    let (used, cap) = sample_disk_usage(&state.data_root).await;

    JoinRequest {
        id: state.node_id,
        data_address: state.data_address.clone(),
        control_address: state.control_address.clone(),
        capacity_bytes: cap,
        used_bytes: used,
    }
}

/// Join once. `Ok(false)` when the master refuses this id or these addresses.
pub async fn try_join(state: &KeeperState) -> Result<bool, ApiError> {
    let req = join_request(state).await;
    state.rpc.join(&state.master, &req).await
}

/// Join at startup, retrying while the master is unreachable. A refusal is
/// final.
pub async fn join_cluster(state: &KeeperState, budget: Duration) -> anyhow::Result<()> {
    let cfg = RetryConfig::with_budget(budget);

    let accepted = retry_timeboxed(
        &cfg,
        || try_join(state),
        |e: &ApiError| {
            if e.is_transient() {
                warn!("master not reachable yet: {}", e);
                RetryClass::Retryable
            } else {
                RetryClass::NonRetryable
            }
        },
    )
    .await?;

    if !accepted {
        bail!(
            "master {} refused node {} (id alive or address taken)",
            state.master,
            state.node_id
        );
    }

    info!(node_id = state.node_id, master = %state.master, "joined cluster");

    Ok(())
}
