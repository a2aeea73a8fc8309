use axum::{
    Router,
    extract::{Json, State},
    middleware,
    routing::{get, post},
};
use std::path::PathBuf;
use std::time::Instant;
use tokio::fs;
use tracing::{info, warn};

use common::error::ApiError;
use common::file_utils::{blob_path, file_exists, is_within};
use common::key_utils::FileName;
use common::retry::{RetryClass, RetryConfig, retry_timeboxed};
use common::schemas::{
    CheckFileExistsRequest, ListResponse, ReplicateFileRequest, SaveFileRequest,
    SuccessResponse, TransferFileRequest, TransferKind,
};
use common::trace_middleware::trace_context_middleware;
use common::transfer::send_file;
use common::url_utils::sanitize_addr;

use crate::inbound::InboundSpec;
use crate::state::KeeperState;
use crate::store::list_files;

pub fn router(state: KeeperState) -> Router {
    Router::new()
        .route("/internal/save", post(save_handler))
        .route("/internal/transfer", post(transfer_handler))
        .route("/internal/replicate", post(replicate_handler))
        .route("/internal/exists", post(exists_handler))
        // Admin endpoints
        .route("/admin/list", get(admin_list_handler))
        .layer(middleware::from_fn(trace_context_middleware))
        .with_state(state)
}

fn clean_addr(addr: &str) -> Result<String, ApiError> {
    sanitize_addr(addr).map_err(|e| ApiError::InvalidAddress(e.to_string()))
}

async fn stored_path(ctx: &KeeperState, name: &FileName) -> Result<PathBuf, ApiError> {
    let path = blob_path(&ctx.data_root, name.enc());
    if !file_exists(&path).await {
        return Err(ApiError::FileNotFound);
    }
    Ok(path)
}

// POST /internal/save
/// Prime the inbound slot: the next data connection is `file_name`.
#[tracing::instrument(name = "keeper.save", skip(ctx), fields(node_id = ctx.node_id, file = %req.file_name, kind = ?req.kind))]
pub async fn save_handler(
    State(ctx): State<KeeperState>,
    Json(req): Json<SaveFileRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let spec = InboundSpec {
        name: FileName::parse(&req.file_name)?,
        kind: req.kind,
        expected_size: req.expected_size,
    };

    ctx.inbound.prime(spec, Instant::now()).inspect_err(|e| {
        if matches!(e, ApiError::InboundBusy) {
            warn!(receiving = ?ctx.inbound.receiving(), "inbound slot busy");
        }
    })?;

    Ok(Json(SuccessResponse::ok()))
}

// POST /internal/transfer
/// Stream a stored file to `dest_data_address`. Returns once every byte is sent.
#[tracing::instrument(name = "keeper.transfer", skip(ctx), fields(node_id = ctx.node_id, file = %req.file_name, dest = %req.dest_data_address))]
pub async fn transfer_handler(
    State(ctx): State<KeeperState>,
    Json(req): Json<TransferFileRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let name = FileName::parse(&req.file_name)?;
    let path = stored_path(&ctx, &name).await?;
    let dest = clean_addr(&req.dest_data_address)?;

    let sent = send_file(&path, &dest, ctx.rpc.rpc_timeout()).await?;
    info!(bytes = sent, "transfer done");

    Ok(Json(SuccessResponse::ok()))
}

// POST /internal/replicate
/// Copy a stored file to another keeper: prime it as a replica, then push.
#[tracing::instrument(name = "keeper.replicate", skip(ctx), fields(node_id = ctx.node_id, file = %req.file_name, dest = %req.dest_data_address))]
pub async fn replicate_handler(
    State(ctx): State<KeeperState>,
    Json(req): Json<ReplicateFileRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let name = FileName::parse(&req.file_name)?;
    let path = stored_path(&ctx, &name).await?;
    let dest_data = clean_addr(&req.dest_data_address)?;
    let dest_control = clean_addr(&req.dest_control_address)?;
    let size = fs::metadata(&path).await?.len();

    let save = SaveFileRequest {
        file_name: name.as_str().to_string(),
        kind: TransferKind::Replica,
        expected_size: Some(size),
    };

    let cfg = RetryConfig::with_budget(ctx.replicate_budget);
    retry_timeboxed(
        &cfg,
        || ctx.rpc.save_file(&dest_control, &save),
        |e: &ApiError| {
            if matches!(e, ApiError::InboundBusy) || e.is_transient() {
                RetryClass::Retryable
            } else {
                RetryClass::NonRetryable
            }
        },
    )
    .await?;

    let sent = send_file(&path, &dest_data, ctx.rpc.rpc_timeout()).await?;
    info!(bytes = sent, "replica pushed");

    Ok(Json(SuccessResponse::ok()))
}

// POST /internal/exists
#[tracing::instrument(name = "keeper.exists", skip(ctx), fields(node_id = ctx.node_id), level = "debug")]
pub async fn exists_handler(
    State(ctx): State<KeeperState>,
    Json(req): Json<CheckFileExistsRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let path = PathBuf::from(&req.local_path);
    let success = is_within(&ctx.data_root, &path).await && file_exists(&path).await;

    Ok(Json(SuccessResponse { success }))
}

// GET /admin/list
#[tracing::instrument(name = "keeper.admin.list", skip(ctx))]
pub async fn admin_list_handler(
    State(ctx): State<KeeperState>,
) -> Result<Json<ListResponse>, ApiError> {
    let root = ctx.data_root.clone();
    let files = tokio::task::spawn_blocking(move || list_files(&root))
        .await
        .map_err(|e| ApiError::Any(e.into()))?;

    Ok(Json(ListResponse { files }))
}
