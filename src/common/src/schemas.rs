use serde::{Deserialize, Serialize};

pub type NodeId = u32;

// Master tracker

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct JoinRequest {
    pub id: NodeId,
    pub data_address: String,
    pub control_address: String,
    pub capacity_bytes: Option<u64>,
    pub used_bytes: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HeartbeatRequest {
    pub id: NodeId,
    pub used_bytes: Option<u64>,
    pub capacity_bytes: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UploadFileRequest {
    pub client_callback_address: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UploadFileResponse {
    pub node_id: NodeId,
    pub data_address: String,
    pub control_address: String,
}

/// Whether an inbound stream is a fresh client upload or a replica copy.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    #[default]
    Original,
    Replica,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterFileRequest {
    pub file_name: String,
    pub node_id: NodeId,
    pub local_path: String,
    pub size: u64,
    pub etag: String,
    #[serde(default)]
    pub kind: TransferKind,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DownloadFileRequest {
    pub file_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ReplicaLocation {
    pub node_id: NodeId,
    pub data_address: String,
    pub control_address: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DownloadFileResponse {
    pub addresses: Vec<String>,
    pub locations: Vec<ReplicaLocation>,
    pub size: u64,
    pub etag: String,
}

// Data keeper

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SaveFileRequest {
    pub file_name: String,
    #[serde(default)]
    pub kind: TransferKind,
    pub expected_size: Option<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TransferFileRequest {
    pub file_name: String,
    pub dest_data_address: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReplicateFileRequest {
    pub file_name: String,
    pub dest_data_address: String,
    pub dest_control_address: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CheckFileExistsRequest {
    pub local_path: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ListResponse {
    pub files: Vec<String>,
}

// Client callback

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReportSuccessRequest {
    pub success: bool,
    pub file_name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
