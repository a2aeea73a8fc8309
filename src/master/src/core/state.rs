use anyhow::anyhow;
use std::sync::{Arc, Mutex, MutexGuard};

use common::error::ApiError;
use common::rpc::RpcClient;

use crate::core::cluster::{Cluster, ClusterConfig};

#[derive(Clone)]
pub struct MasterState {
    pub rpc: RpcClient,
    pub cluster: Arc<Mutex<Cluster>>,

    /// Concurrent CheckFileExists probes per repair pass.
    pub repair_concurrency: usize,
}

impl MasterState {
    pub fn new(rpc: RpcClient, config: ClusterConfig, repair_concurrency: usize) -> Self {
        Self {
            rpc,
            cluster: Arc::new(Mutex::new(Cluster::new(config))),
            repair_concurrency: repair_concurrency.max(1),
        }
    }

    /// Never hold the guard across an await.
    pub fn lock(&self) -> Result<MutexGuard<'_, Cluster>, ApiError> {
        self.cluster
            .lock()
            .map_err(|e| ApiError::Any(anyhow!("failed to acquire cluster lock: {}", e)))
    }
}
