use axum::{
    Router,
    extract::{Json, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
};
use std::time::Instant;
use tracing::{Instrument, info, warn};

use common::error::ApiError;
use common::schemas::{
    DownloadFileRequest, DownloadFileResponse, HeartbeatRequest, JoinRequest,
    RegisterFileRequest, SuccessResponse, UploadFileRequest, UploadFileResponse,
};
use common::trace_middleware::trace_context_middleware;

use crate::core::cluster::{JoinOutcome, RegisterOutcome, ReplicationOrder};
use crate::core::index::FileRecord;
use crate::core::node::NodeInfo;
use crate::core::repair::issue_orders;
use crate::core::state::MasterState;

pub fn router(state: MasterState) -> Router {
    Router::new()
        .route("/admin/join", post(join_node))
        .route("/admin/heartbeat", post(heartbeat))
        .route("/admin/nodes", get(list_nodes))
        .route("/admin/files", get(list_files))
        .route("/files/upload", post(upload_file))
        .route("/files/register", post(register_file))
        .route("/files/download", post(download_file))
        .layer(middleware::from_fn(trace_context_middleware))
        .with_state(state)
}

// POST /admin/join
#[tracing::instrument(name = "master.admin.join", skip(ctx), fields(node_id = req.id, data = %req.data_address, control = %req.control_address))]
pub async fn join_node(
    State(ctx): State<MasterState>,
    Json(req): Json<JoinRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    let outcome = ctx.lock()?.join(&req);

    match &outcome {
        Ok(JoinOutcome::Joined) => info!("node joined"),
        Ok(JoinOutcome::Rejoined) => info!("dead node rejoined"),
        Err(e) => warn!("join rejected: {}", e),
    }
    outcome?;

    Ok(Json(SuccessResponse::ok()))
}

// POST /admin/heartbeat
#[tracing::instrument(name = "master.admin.heartbeat", skip(ctx), fields(node_id = req.id), level = "debug")]
pub async fn heartbeat(
    State(ctx): State<MasterState>,
    Json(req): Json<HeartbeatRequest>,
) -> Result<StatusCode, ApiError> {
    ctx.lock()?.heartbeat(&req)?;

    Ok(StatusCode::OK)
}

// GET /admin/nodes
#[tracing::instrument(name = "master.admin.list_nodes", skip(ctx))]
pub async fn list_nodes(State(ctx): State<MasterState>) -> Result<Json<Vec<NodeInfo>>, ApiError> {
    Ok(Json(ctx.lock()?.nodes()))
}

// GET /admin/files
#[tracing::instrument(name = "master.admin.list_files", skip(ctx))]
pub async fn list_files(
    State(ctx): State<MasterState>,
) -> Result<Json<Vec<FileRecord>>, ApiError> {
    Ok(Json(ctx.lock()?.records()))
}

// POST /files/upload
#[tracing::instrument(name = "master.upload", skip(ctx), fields(callback = %req.client_callback_address))]
pub async fn upload_file(
    State(ctx): State<MasterState>,
    Json(req): Json<UploadFileRequest>,
) -> Result<Json<UploadFileResponse>, ApiError> {
    let target = ctx
        .lock()?
        .upload_target(&req.client_callback_address, Instant::now())?;

    info!(node_id = target.node_id, "upload routed");

    Ok(Json(target))
}

// POST /files/register
/// Index a copy a keeper just stored. The first original copy of a name
/// notifies the uploading client and fans out to the other replicas.
#[tracing::instrument(name = "master.register", skip(ctx), fields(file = %req.file_name, node_id = req.node_id, kind = ?req.kind, size = req.size))]
pub async fn register_file(
    State(ctx): State<MasterState>,
    Json(req): Json<RegisterFileRequest>,
) -> Result<StatusCode, ApiError> {
    let outcome = ctx.lock()?.register(&req, Instant::now())?;

    match outcome {
        RegisterOutcome::FirstCopy { callback, orders } => {
            info!(orders = orders.len(), "first copy registered");
            tokio::spawn(
                after_first_copy(ctx.clone(), req.file_name, callback, orders).in_current_span(),
            );
        }
        RegisterOutcome::Duplicate => {
            warn!("name was already indexed, copy recorded without notification");
        }
        RegisterOutcome::Replica => info!("replica registered"),
    }

    Ok(StatusCode::OK)
}

async fn after_first_copy(
    ctx: MasterState,
    file_name: String,
    callback: Option<String>,
    orders: Vec<ReplicationOrder>,
) {
    match callback {
        Some(client) => match ctx.rpc.report_success(&client, &file_name).await {
            Ok(_) => info!(%file_name, %client, "client notified"),
            Err(e) => warn!(%file_name, %client, "client notification failed: {}", e),
        },
        None => warn!(%file_name, "no pending callback for this upload"),
    }

    if orders.is_empty() {
        warn!(%file_name, "no eligible replica targets");
        return;
    }

    let (ok, failed) = issue_orders(&ctx, orders).await;
    info!(%file_name, ok, failed, "initial replication done");
}

// POST /files/download
#[tracing::instrument(name = "master.download", skip(ctx), fields(file = %req.file_name))]
pub async fn download_file(
    State(ctx): State<MasterState>,
    Json(req): Json<DownloadFileRequest>,
) -> Result<Json<DownloadFileResponse>, ApiError> {
    let resp = ctx.lock()?.locate(&req.file_name);

    if resp.addresses.is_empty() {
        warn!("no alive holder");
    }

    Ok(Json(resp))
}
