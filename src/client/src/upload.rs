use anyhow::Context;
use std::path::Path;
use tokio::fs;
use tokio::time::Duration;
use tracing::info;

use common::error::ApiError;
use common::key_utils::FileName;
use common::retry::{RetryClass, RetryConfig, retry_timeboxed};
use common::rpc::RpcClient;
use common::schemas::{SaveFileRequest, TransferKind, UploadFileResponse};
use common::transfer::send_file;

use crate::callback::CallbackServer;

#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// How long to retry a keeper whose inbound slot is taken.
    pub busy_budget: Duration,
    /// How long to wait for the master's confirmation.
    pub confirm_wait: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            busy_budget: Duration::from_secs(30),
            confirm_wait: Duration::from_secs(60),
        }
    }
}

/// Upload `path` as `name`: ask the master for a keeper, announce the file,
/// stream it, then wait for the master to confirm registration.
pub async fn upload(
    rpc: &RpcClient,
    master: &str,
    callback: &mut CallbackServer,
    path: &Path,
    name: &FileName,
    opts: &UploadOptions,
) -> anyhow::Result<UploadFileResponse> {
    let size = fs::metadata(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?
        .len();

    let target = rpc.upload_file(master, callback.address()).await?;
    info!(node_id = target.node_id, data = %target.data_address, "keeper assigned");

    let save = SaveFileRequest {
        file_name: name.as_str().to_string(),
        kind: TransferKind::Original,
        expected_size: Some(size),
    };
    retry_timeboxed(
        &RetryConfig::with_budget(opts.busy_budget),
        || rpc.save_file(&target.control_address, &save),
        |e: &ApiError| {
            if matches!(e, ApiError::InboundBusy) || e.is_transient() {
                RetryClass::Retryable
            } else {
                RetryClass::NonRetryable
            }
        },
    )
    .await?;

    let sent = send_file(path, &target.data_address, rpc.rpc_timeout()).await?;
    info!(bytes = sent, "upload streamed, waiting for confirmation");

    callback.wait_for(name.as_str(), opts.confirm_wait).await?;
    info!(file = %name, "upload confirmed");

    Ok(target)
}
