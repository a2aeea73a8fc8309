use futures_util::{StreamExt, stream};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use common::error::ApiError;
use common::schemas::ReplicateFileRequest;

use crate::core::cluster::{ProbeOutcome, ProbeTarget, ReplicationOrder};
use crate::core::state::MasterState;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RepairReport {
    pub probed: usize,
    pub pruned: usize,
    pub unreachable: usize,
    pub orders_ok: usize,
    pub orders_failed: usize,
    pub unrecoverable: usize,
    pub no_target: usize,
}

impl RepairReport {
    /// Nothing was pruned, ordered or found wanting.
    pub fn is_quiet(&self) -> bool {
        self.pruned == 0
            && self.unreachable == 0
            && self.orders_ok == 0
            && self.orders_failed == 0
            && self.unrecoverable == 0
            && self.no_target == 0
    }
}

impl std::fmt::Display for RepairReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "probed={} pruned={} unreachable={} orders_ok={} orders_failed={} unrecoverable={} no_target={}",
            self.probed,
            self.pruned,
            self.unreachable,
            self.orders_ok,
            self.orders_failed,
            self.unrecoverable,
            self.no_target
        )
    }
}

pub async fn replication_loop(
    state: MasterState,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick.tick().await;

    loop {
        tokio::select! {
            _ = tick.tick() => {},
            res = shutdown.changed() => { if res.is_err() || *shutdown.borrow() { break; }}
        }

        match repair_tick(&state).await {
            Ok(report) if report.is_quiet() => debug!(%report, "repair pass"),
            Ok(report) => info!(%report, "repair pass"),
            Err(e) => error!("repair pass failed: {}", e),
        }
    }

    info!("replication loop stopped");

    Ok(())
}

/// One full pass: verify every copy on an alive node, prune the ones that
/// are gone, and order copies for files below the replication factor.
#[tracing::instrument(name = "master.repair", skip(state))]
pub async fn repair_tick(state: &MasterState) -> Result<RepairReport, ApiError> {
    let targets = state.lock()?.probe_targets();
    let mut report = RepairReport {
        probed: targets.len(),
        ..Default::default()
    };

    let rpc = &state.rpc;
    let results: Vec<(ProbeTarget, ProbeOutcome)> = stream::iter(targets)
        .map(|target| async move {
            let outcome = match rpc
                .check_file_exists(&target.control_address, &target.local_path)
                .await
            {
                Ok(true) => ProbeOutcome::Present,
                Ok(false) => ProbeOutcome::Missing,
                Err(e) => {
                    debug!(node_id = target.node_id, file = %target.file_name, "probe failed: {}", e);
                    ProbeOutcome::Unreachable
                }
            };
            (target, outcome)
        })
        .buffer_unordered(state.repair_concurrency)
        .collect()
        .await;

    report.unreachable = results
        .iter()
        .filter(|(_, o)| *o == ProbeOutcome::Unreachable)
        .count();

    let plan = state.lock()?.apply_probes(results);

    for (file, node_id) in &plan.pruned {
        warn!(%file, node_id, "copy is gone from keeper, dropped from index");
    }
    for file in &plan.unrecoverable {
        error!(%file, "no verified copy left on any alive node");
    }
    for file in &plan.no_target {
        warn!(%file, "under-replicated but no eligible target");
    }
    report.pruned = plan.pruned.len();
    report.unrecoverable = plan.unrecoverable.len();
    report.no_target = plan.no_target.len();

    let (ok, failed) = issue_orders(state, plan.orders).await;
    report.orders_ok = ok;
    report.orders_failed = failed;

    Ok(report)
}

/// Send each order to its source keeper, one after another. Every order is
/// cleared from the in-flight set once its call returns.
pub async fn issue_orders(state: &MasterState, orders: Vec<ReplicationOrder>) -> (usize, usize) {
    let (mut ok, mut failed) = (0, 0);

    for order in orders {
        let req = ReplicateFileRequest {
            file_name: order.file_name.clone(),
            dest_data_address: order.target_data.clone(),
            dest_control_address: order.target_control.clone(),
        };

        match state.rpc.replicate_file(&order.source_control, &req).await {
            Ok(()) => {
                info!(file = %order.file_name, source = order.source, target = order.target, "replicated");
                ok += 1;
            }
            Err(e) => {
                warn!(file = %order.file_name, source = order.source, target = order.target, "replication failed: {}", e);
                failed += 1;
            }
        }

        match state.lock() {
            Ok(mut cluster) => cluster.finish_order(&order),
            Err(e) => error!("{}", e),
        }
    }

    (ok, failed)
}
