//! The master's cluster state: membership, heartbeat counters, the file
//! index, pending upload callbacks and in-flight replications.
//!
//! Everything here is synchronous and lives behind one mutex in
//! [`MasterState`](crate::core::state::MasterState). Methods decide and return
//! plain values (orders, outcomes, plans); the async layer executes them
//! after the guard is released.

use rand::seq::IndexedRandom;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::time::{Duration, Instant};

use common::constants::DEFAULT_REPLICATION_FACTOR;
use common::error::ApiError;
use common::key_utils::FileName;
use common::schemas::{
    DownloadFileResponse, HeartbeatRequest, JoinRequest, NodeId, RegisterFileRequest,
    ReplicaLocation, TransferKind, UploadFileResponse,
};
use common::time_utils::utc_now_ms;
use common::url_utils::sanitize_addr;

use crate::core::index::{FileIndex, FileRecord};
use crate::core::node::{NodeInfo, NodeRuntime, NodeStatus};
use crate::core::placement::{choose_distinct, choose_one, eligible_nodes};

const DEFAULT_MISSED_TICKS: u32 = 1;
const DEFAULT_CALLBACK_TTL: Duration = Duration::from_secs(600);

#[derive(Clone, Debug)]
pub struct ClusterConfig {
    pub replication_factor: usize,
    /// Consecutive heartbeat-less ticks before a node is declared dead.
    pub missed_ticks_threshold: u32,
    /// How long an upload callback waits for its registration.
    pub callback_ttl: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            replication_factor: DEFAULT_REPLICATION_FACTOR,
            missed_ticks_threshold: DEFAULT_MISSED_TICKS,
            callback_ttl: DEFAULT_CALLBACK_TTL,
        }
    }
}

#[derive(Debug)]
struct PendingUpload {
    callback: String,
    issued: Instant,
}

/// Copy `file_name` from `source` to `target`. Sent to the source's control
/// address; the target registers itself once the bytes land.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicationOrder {
    pub file_name: String,
    pub source: NodeId,
    pub source_control: String,
    pub target: NodeId,
    pub target_data: String,
    pub target_control: String,
}

#[derive(Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    Rejoined,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// First copy of a freshly uploaded name.
    FirstCopy {
        callback: Option<String>,
        orders: Vec<ReplicationOrder>,
    },
    /// An original upload of a name that was already indexed.
    Duplicate,
    Replica,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeTarget {
    pub file_name: String,
    pub node_id: NodeId,
    pub control_address: String,
    pub local_path: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    Present,
    Missing,
    Unreachable,
}

#[derive(Debug, Default)]
pub struct RepairPlan {
    pub orders: Vec<ReplicationOrder>,
    pub pruned: Vec<(String, NodeId)>,
    pub unrecoverable: Vec<String>,
    pub no_target: Vec<String>,
}

#[derive(Debug)]
pub struct Cluster {
    config: ClusterConfig,
    nodes: BTreeMap<NodeId, NodeRuntime>,
    index: FileIndex,
    pending: HashMap<NodeId, VecDeque<PendingUpload>>,
    /// (file, target) -> source of the copy being pushed.
    in_flight: HashMap<(String, NodeId), NodeId>,
}

impl Cluster {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            config,
            nodes: BTreeMap::new(),
            index: FileIndex::default(),
            pending: HashMap::new(),
            in_flight: HashMap::new(),
        }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn join(&mut self, req: &JoinRequest) -> Result<JoinOutcome, ApiError> {
        let data = sanitize_addr(&req.data_address)
            .map_err(|e| ApiError::InvalidAddress(e.to_string()))?;
        let control = sanitize_addr(&req.control_address)
            .map_err(|e| ApiError::InvalidAddress(e.to_string()))?;

        if data == control {
            return Err(ApiError::MembershipConflict(format!(
                "node {} uses {} for both data and control",
                req.id, data
            )));
        }

        // dead records keep their addresses reserved
        if let Some(other) = self
            .nodes
            .values()
            .find(|n| n.info.node_id != req.id && (n.owns_address(&data) || n.owns_address(&control)))
        {
            return Err(ApiError::MembershipConflict(format!(
                "address already registered by node {}",
                other.info.node_id
            )));
        }

        let now_ms = utc_now_ms();

        match self.nodes.get_mut(&req.id) {
            Some(node) if node.is_alive() => Err(ApiError::MembershipConflict(format!(
                "node {} is already alive",
                req.id
            ))),
            Some(node) => {
                node.info.data_address = data;
                node.info.control_address = control;
                node.info.status = NodeStatus::Alive;
                node.info.last_heartbeat_ms = now_ms;
                if req.capacity_bytes.is_some() {
                    node.info.capacity_bytes = req.capacity_bytes;
                }
                if req.used_bytes.is_some() {
                    node.info.used_bytes = req.used_bytes;
                }
                node.heartbeats = 0;
                node.missed_ticks = 0;
                Ok(JoinOutcome::Rejoined)
            }
            None => {
                let info = NodeInfo {
                    node_id: req.id,
                    data_address: data,
                    control_address: control,
                    last_heartbeat_ms: now_ms,
                    capacity_bytes: req.capacity_bytes,
                    used_bytes: req.used_bytes,
                    status: NodeStatus::Alive,
                };
                self.nodes.insert(req.id, NodeRuntime::new(info));
                Ok(JoinOutcome::Joined)
            }
        }
    }

    pub fn heartbeat(&mut self, req: &HeartbeatRequest) -> Result<(), ApiError> {
        let node = self.nodes.get_mut(&req.id).ok_or(ApiError::UnknownNode)?;

        node.heartbeats += 1;
        node.info.last_heartbeat_ms = utc_now_ms();
        if let Some(u) = req.used_bytes {
            node.info.used_bytes = Some(u);
        }
        if let Some(c) = req.capacity_bytes {
            node.info.capacity_bytes = Some(c);
        }

        Ok(())
    }

    /// One liveness tick. Returns the nodes whose status changed.
    pub fn tick_liveness(&mut self) -> Vec<(NodeId, NodeStatus)> {
        let threshold = self.config.missed_ticks_threshold.max(1);
        let mut transitions = Vec::new();

        for node in self.nodes.values_mut() {
            let before = node.info.status;
            if node.heartbeats > 0 {
                node.missed_ticks = 0;
                node.info.status = NodeStatus::Alive;
            } else {
                node.missed_ticks = node.missed_ticks.saturating_add(1);
                if node.missed_ticks >= threshold {
                    node.info.status = NodeStatus::Dead;
                }
            }
            node.heartbeats = 0;

            if node.info.status != before {
                transitions.push((node.info.node_id, node.info.status));
            }
        }

        transitions
    }

    /// Pick an alive keeper for a new upload and remember who to notify.
    pub fn upload_target(
        &mut self,
        client_callback_address: &str,
        now: Instant,
    ) -> Result<UploadFileResponse, ApiError> {
        let callback = sanitize_addr(client_callback_address)
            .map_err(|e| ApiError::InvalidAddress(e.to_string()))?;

        let alive = eligible_nodes(self.nodes.values(), |_| false);
        let chosen = choose_one(&alive).ok_or(ApiError::NoNodesAvailable)?;
        let resp = UploadFileResponse {
            node_id: chosen.node_id,
            data_address: chosen.data_address.clone(),
            control_address: chosen.control_address.clone(),
        };

        self.pending
            .entry(resp.node_id)
            .or_default()
            .push_back(PendingUpload {
                callback,
                issued: now,
            });

        Ok(resp)
    }

    fn take_callback(&mut self, node_id: NodeId, now: Instant) -> Option<String> {
        let queue = self.pending.get_mut(&node_id)?;
        while let Some(p) = queue.pop_front() {
            if now.saturating_duration_since(p.issued) <= self.config.callback_ttl {
                return Some(p.callback);
            }
        }
        None
    }

    /// Index a copy reported by a keeper. The "first copy" decision is made
    /// here, under the cluster lock, so concurrent registrations of one name
    /// yield exactly one notification and one placement.
    pub fn register(
        &mut self,
        req: &RegisterFileRequest,
        now: Instant,
    ) -> Result<RegisterOutcome, ApiError> {
        FileName::parse(&req.file_name)?;
        if !self.nodes.contains_key(&req.node_id) {
            return Err(ApiError::UnknownNode);
        }

        let expected = self.expected_etag(&req.file_name, req.node_id);
        if expected.is_some_and(|etag| etag != req.etag) {
            // this node's bytes no longer match what the cluster serves
            if let Some(stale) = self
                .index
                .holders(&req.file_name)
                .iter()
                .find(|r| r.node_id == req.node_id)
                .map(|r| r.local_path.clone())
            {
                self.index.remove(&req.file_name, req.node_id, &stale);
            }
            match req.kind {
                TransferKind::Original => {
                    self.take_callback(req.node_id, now);
                }
                TransferKind::Replica => {
                    self.in_flight.remove(&(req.file_name.clone(), req.node_id));
                }
            }
            return Err(ApiError::ChecksumMismatch);
        }

        let first = !self.index.contains(&req.file_name);
        self.index.upsert(FileRecord {
            file_name: req.file_name.clone(),
            node_id: req.node_id,
            local_path: req.local_path.clone(),
            size: req.size,
            etag: req.etag.clone(),
        });

        match req.kind {
            TransferKind::Original if first => {
                let callback = self.take_callback(req.node_id, now);
                let wanted = self.config.replication_factor.saturating_sub(1);
                let orders = self.plan_placement(&req.file_name, req.node_id, wanted);
                Ok(RegisterOutcome::FirstCopy { callback, orders })
            }
            TransferKind::Original => {
                self.take_callback(req.node_id, now);
                Ok(RegisterOutcome::Duplicate)
            }
            TransferKind::Replica => {
                self.in_flight.remove(&(req.file_name.clone(), req.node_id));
                Ok(RegisterOutcome::Replica)
            }
        }
    }

    /// Etag a new copy on `node_id` must carry: the source's when it was
    /// ordered by placement or repair, otherwise any other holder's.
    fn expected_etag(&self, file_name: &str, node_id: NodeId) -> Option<String> {
        let holders = self.index.holders(file_name);
        let source = self.in_flight.get(&(file_name.to_string(), node_id));
        source
            .and_then(|src| holders.iter().find(|r| r.node_id == *src))
            .or_else(|| holders.iter().find(|r| r.node_id != node_id))
            .map(|r| r.etag.clone())
    }

    /// Choose up to `wanted` new holders for `file_name`, copying from
    /// `source`. Chosen targets are marked in flight.
    pub fn plan_placement(
        &mut self,
        file_name: &str,
        source: NodeId,
        wanted: usize,
    ) -> Vec<ReplicationOrder> {
        let Some(src) = self.nodes.get(&source) else {
            return Vec::new();
        };
        let source_control = src.info.control_address.clone();

        let index = &self.index;
        let in_flight = &self.in_flight;
        let eligible = eligible_nodes(self.nodes.values(), |n| {
            n.node_id == source
                || index.holds(file_name, n.node_id)
                || in_flight.contains_key(&(file_name.to_string(), n.node_id))
        });

        let orders: Vec<ReplicationOrder> = choose_distinct(&eligible, wanted)
            .into_iter()
            .map(|t| ReplicationOrder {
                file_name: file_name.to_string(),
                source,
                source_control: source_control.clone(),
                target: t.node_id,
                target_data: t.data_address.clone(),
                target_control: t.control_address.clone(),
            })
            .collect();

        for o in &orders {
            self.in_flight.insert((o.file_name.clone(), o.target), o.source);
        }

        orders
    }

    pub fn finish_order(&mut self, order: &ReplicationOrder) {
        self.in_flight
            .remove(&(order.file_name.clone(), order.target));
    }

    pub fn in_flight_count(&self, file_name: &str) -> usize {
        self.in_flight.keys().filter(|(f, _)| f == file_name).count()
    }

    /// Where `file_name` can be read from right now. Empty when unknown or
    /// when no holder is alive.
    pub fn locate(&self, file_name: &str) -> DownloadFileResponse {
        let mut resp = DownloadFileResponse {
            addresses: Vec::new(),
            locations: Vec::new(),
            size: 0,
            etag: String::new(),
        };

        for record in self.index.holders(file_name) {
            let Some(node) = self.nodes.get(&record.node_id).filter(|n| n.is_alive()) else {
                continue;
            };
            if resp.locations.is_empty() {
                resp.size = record.size;
                resp.etag = record.etag.clone();
            }
            resp.addresses.push(node.info.data_address.clone());
            resp.locations.push(ReplicaLocation {
                node_id: node.info.node_id,
                data_address: node.info.data_address.clone(),
                control_address: node.info.control_address.clone(),
            });
        }

        resp
    }

    /// Every indexed copy sitting on an alive node.
    pub fn probe_targets(&self) -> Vec<ProbeTarget> {
        self.index
            .records()
            .filter_map(|r| {
                let node = self.nodes.get(&r.node_id).filter(|n| n.is_alive())?;
                Some(ProbeTarget {
                    file_name: r.file_name.clone(),
                    node_id: r.node_id,
                    control_address: node.info.control_address.clone(),
                    local_path: r.local_path.clone(),
                })
            })
            .collect()
    }

    /// Fold probe results into the index and plan the copies needed to bring
    /// every file back to the replication factor.
    pub fn apply_probes(&mut self, results: Vec<(ProbeTarget, ProbeOutcome)>) -> RepairPlan {
        let mut plan = RepairPlan::default();
        let mut verified: BTreeMap<String, Vec<NodeId>> = BTreeMap::new();

        for (target, outcome) in results {
            match outcome {
                ProbeOutcome::Missing => {
                    if self
                        .index
                        .remove(&target.file_name, target.node_id, &target.local_path)
                    {
                        plan.pruned.push((target.file_name, target.node_id));
                    }
                }
                ProbeOutcome::Present => {
                    let alive = self
                        .nodes
                        .get(&target.node_id)
                        .is_some_and(|n| n.is_alive());
                    if alive && self.index.holds(&target.file_name, target.node_id) {
                        verified
                            .entry(target.file_name)
                            .or_default()
                            .push(target.node_id);
                    }
                }
                ProbeOutcome::Unreachable => {}
            }
        }

        let r = self.config.replication_factor;
        // a file whose last copy was just pruned is still reported
        let mut names: BTreeSet<String> = self.index.file_names().cloned().collect();
        names.extend(plan.pruned.iter().map(|(name, _)| name.clone()));

        for name in names {
            let holders = verified.get(&name).map(Vec::as_slice).unwrap_or(&[]);
            let pending = self.in_flight_count(&name);
            if holders.len() + pending >= r {
                continue;
            }

            let Some(&source) = holders.choose(&mut rand::rng()) else {
                plan.unrecoverable.push(name);
                continue;
            };

            let wanted = r - holders.len() - pending;
            let orders = self.plan_placement(&name, source, wanted);
            if orders.is_empty() {
                plan.no_target.push(name);
            } else {
                plan.orders.extend(orders);
            }
        }

        plan
    }

    pub fn nodes(&self) -> Vec<NodeInfo> {
        self.nodes.values().map(|n| n.info.clone()).collect()
    }

    pub fn records(&self) -> Vec<FileRecord> {
        self.index.records().cloned().collect()
    }
}
