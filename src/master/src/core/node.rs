use serde::{Deserialize, Serialize};

use common::schemas::NodeId;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeInfo {
    pub node_id: NodeId,              // chosen by the keeper, stable across rejoins
    pub data_address: String,         // raw byte streams
    pub control_address: String,      // control RPCs
    pub last_heartbeat_ms: i128,      // wall-clock (UTC ms)
    pub capacity_bytes: Option<u64>,  // optional metrics
    pub used_bytes: Option<u64>,
    pub status: NodeStatus,
}

#[derive(Clone, Debug)]
pub struct NodeRuntime {
    pub info: NodeInfo,
    /// Heartbeats received since the last liveness tick.
    pub heartbeats: u64,
    /// Consecutive liveness ticks without a heartbeat.
    pub missed_ticks: u32,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    Alive,
    Dead,
}

impl NodeRuntime {
    pub fn new(info: NodeInfo) -> Self {
        Self {
            info,
            heartbeats: 0,
            missed_ticks: 0,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.info.status == NodeStatus::Alive
    }

    pub fn owns_address(&self, addr: &str) -> bool {
        self.info.data_address == addr || self.info.control_address == addr
    }
}
