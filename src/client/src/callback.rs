use anyhow::{anyhow, bail};
use axum::{
    Router,
    extract::{Json, State},
    middleware,
    routing::post,
};
use axum_server::Server;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, timeout_at};
use tracing::{debug, info};

use common::constants::REPORT_SUCCESS_PATH;
use common::schemas::{ReportSuccessRequest, SuccessResponse};
use common::trace_middleware::trace_context_middleware;
use common::url_utils::advertised_addr;

/// Listener for the master's ReportSuccess call.
pub struct CallbackServer {
    address: String,
    reports: mpsc::Receiver<ReportSuccessRequest>,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<anyhow::Result<()>>,
}

async fn report_success(
    State(tx): State<mpsc::Sender<ReportSuccessRequest>>,
    Json(req): Json<ReportSuccessRequest>,
) -> Json<SuccessResponse> {
    debug!(file = %req.file_name, success = req.success, "report received");
    let _ = tx.send(req).await;
    Json(SuccessResponse::ok())
}

impl CallbackServer {
    pub async fn start(bind: &str) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(bind).await?;
        let address = advertised_addr(listener.local_addr()?)?;

        let (tx, reports) = mpsc::channel(16);
        let app = Router::new()
            .route(REPORT_SUCCESS_PATH, post(report_success))
            .layer(middleware::from_fn(trace_context_middleware))
            .with_state(tx);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let server = Server::from_tcp(listener.into_std()?).serve(app.into_make_service());

            tokio::select! {
                res = server => res.map_err(anyhow::Error::from),
                _ = shutdown_rx.changed() => Ok(()),
            }
        });

        info!("callback listening on {}", address);

        Ok(Self {
            address,
            reports,
            shutdown_tx,
            handle,
        })
    }

    /// Address the master should call back.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Wait until the master confirms `file_name`. Reports for other names
    /// are skipped.
    pub async fn wait_for(&mut self, file_name: &str, wait: Duration) -> anyhow::Result<()> {
        let deadline = Instant::now() + wait;

        loop {
            let report = timeout_at(deadline, self.reports.recv())
                .await
                .map_err(|_| anyhow!("no confirmation for {} within {:?}", file_name, wait))?
                .ok_or_else(|| anyhow!("callback listener stopped"))?;

            if report.file_name != file_name {
                debug!(file = %report.file_name, "report for another upload");
                continue;
            }
            if !report.success {
                bail!("master reported failure for {}", file_name);
            }
            return Ok(());
        }
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}
