use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::rpc::RpcClient;
use common::schemas::NodeId;

use crate::inbound::InboundSlot;

#[derive(Clone)]
pub struct KeeperState {
    pub rpc: RpcClient,
    pub data_root: Arc<PathBuf>,
    pub master: String,
    pub node_id: NodeId,
    pub data_address: String,
    pub control_address: String,
    pub inbound: Arc<InboundSlot>,
    /// Budget for priming a busy or unreachable peer before a replication.
    pub replicate_budget: Duration,
}
