use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::core::node::NodeStatus;
use crate::core::state::MasterState;

/// Every `interval`, turn the heartbeat counters into alive/dead statuses.
pub async fn liveness_monitor(
    state: MasterState,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut tick = tokio::time::interval(interval);
    // a late tick must not be followed by catch-up ticks with an empty window
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick fires immediately; skip it so new joiners get a full interval
    tick.tick().await;

    loop {
        tokio::select! {
            _ = tick.tick() => {},
            res = shutdown.changed() => { if res.is_err() || *shutdown.borrow() { break; }}
        }

        let transitions = match state.lock() {
            Ok(mut cluster) => cluster.tick_liveness(),
            Err(e) => {
                error!("{}", e);
                continue;
            }
        };

        for (node_id, status) in transitions {
            match status {
                NodeStatus::Alive => info!(node_id, "node is alive again"),
                NodeStatus::Dead => warn!(node_id, "node missed its heartbeats, marked dead"),
            }
        }
    }

    info!("liveness monitor stopped");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::rpc::RpcClient;
    use common::schemas::{HeartbeatRequest, JoinRequest};

    use crate::core::cluster::ClusterConfig;

    const INTERVAL: Duration = Duration::from_secs(1);

    async fn settle() {
        for _ in 0..16 {
            tokio::task::yield_now().await;
        }
    }

    fn only_status(state: &MasterState) -> NodeStatus {
        state.lock().unwrap().nodes()[0].status
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_monitor_does_not_replay_missed_ticks() {
        let rpc = RpcClient::new(INTERVAL, INTERVAL).unwrap();
        let config = ClusterConfig {
            missed_ticks_threshold: 1,
            ..ClusterConfig::default()
        };
        let state = MasterState::new(rpc, config, 1);
        state
            .lock()
            .unwrap()
            .join(&JoinRequest {
                id: 1,
                data_address: "127.0.0.1:7001".into(),
                control_address: "127.0.0.1:8001".into(),
                capacity_bytes: None,
                used_bytes: None,
            })
            .unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(liveness_monitor(state.clone(), INTERVAL, rx));
        settle().await;

        let hb = HeartbeatRequest {
            id: 1,
            used_bytes: None,
            capacity_bytes: None,
        };
        state.lock().unwrap().heartbeat(&hb).unwrap();

        // three intervals pass while the monitor is not scheduled
        tokio::time::advance(INTERVAL * 3).await;
        settle().await;
        assert_eq!(only_status(&state), NodeStatus::Alive);

        // one quiet interval later the monitor runs again and sees no heartbeat
        tokio::time::advance(INTERVAL).await;
        settle().await;
        assert_eq!(only_status(&state), NodeStatus::Dead);

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
