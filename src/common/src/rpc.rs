use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Serialize, de::DeserializeOwned};

use crate::constants::REPORT_SUCCESS_PATH;
use crate::error::ApiError;
use crate::schemas::{
    CheckFileExistsRequest, DownloadFileRequest, DownloadFileResponse, HeartbeatRequest,
    JoinRequest, RegisterFileRequest, ReplicateFileRequest, ReportSuccessRequest,
    SaveFileRequest, SuccessResponse, TransferFileRequest, UploadFileRequest,
    UploadFileResponse,
};
use crate::trace_middleware::inject_trace_context_reqwest;
use crate::url_utils::control_url;

/// Typed control-plane client shared by every role.
///
/// Every call carries a deadline: `rpc_timeout` for metadata calls and
/// `transfer_timeout` for calls that block until a byte stream completes.
#[derive(Clone)]
pub struct RpcClient {
    http: Client,
    rpc_timeout: Duration,
    transfer_timeout: Duration,
}

impl RpcClient {
    pub fn new(rpc_timeout: Duration, transfer_timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .connect_timeout(rpc_timeout)
            .build()?;

        Ok(Self {
            http,
            rpc_timeout,
            transfer_timeout,
        })
    }

    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    async fn send<Req>(
        &self,
        addr: &str,
        path: &str,
        req: &Req,
        deadline: Duration,
    ) -> Result<reqwest::Response, ApiError>
    where
        Req: Serialize + ?Sized,
    {
        let builder = self
            .http
            .post(control_url(addr, path))
            .json(req)
            .timeout(deadline);
        let builder = inject_trace_context_reqwest(builder);

        let resp = builder.send().await.map_err(ApiError::UpstreamReq)?;
        let st = resp.status();
        if !st.is_success() {
            return Err(ApiError::UpstreamStatus(st));
        }

        Ok(resp)
    }

    async fn call<Req, Resp>(
        &self,
        addr: &str,
        path: &str,
        req: &Req,
        deadline: Duration,
    ) -> Result<Resp, ApiError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let resp = self.send(addr, path, req, deadline).await?;
        resp.json::<Resp>().await.map_err(ApiError::UpstreamReq)
    }

    // Master tracker

    /// `Ok(false)` when the master rejects the identity or addresses.
    pub async fn join(&self, master: &str, req: &JoinRequest) -> Result<bool, ApiError> {
        match self
            .call::<_, SuccessResponse>(master, "/admin/join", req, self.rpc_timeout)
            .await
        {
            Ok(resp) => Ok(resp.success),
            Err(ApiError::UpstreamStatus(StatusCode::CONFLICT)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn heartbeat(&self, master: &str, req: &HeartbeatRequest) -> Result<(), ApiError> {
        match self
            .send(master, "/admin/heartbeat", req, self.rpc_timeout)
            .await
            .map(|_| ())
        {
            Err(ApiError::UpstreamStatus(StatusCode::NOT_FOUND)) => Err(ApiError::UnknownNode),
            other => other,
        }
    }

    pub async fn upload_file(
        &self,
        master: &str,
        client_callback_address: &str,
    ) -> Result<UploadFileResponse, ApiError> {
        let req = UploadFileRequest {
            client_callback_address: client_callback_address.to_string(),
        };
        match self
            .call(master, "/files/upload", &req, self.rpc_timeout)
            .await
        {
            Err(ApiError::UpstreamStatus(StatusCode::SERVICE_UNAVAILABLE)) => {
                Err(ApiError::NoNodesAvailable)
            }
            other => other,
        }
    }

    pub async fn register_file(
        &self,
        master: &str,
        req: &RegisterFileRequest,
    ) -> Result<(), ApiError> {
        self.send(master, "/files/register", req, self.rpc_timeout)
            .await
            .map(|_| ())
    }

    pub async fn download_file(
        &self,
        master: &str,
        file_name: &str,
    ) -> Result<DownloadFileResponse, ApiError> {
        let req = DownloadFileRequest {
            file_name: file_name.to_string(),
        };
        self.call(master, "/files/download", &req, self.rpc_timeout)
            .await
    }

    // Data keeper

    pub async fn save_file(&self, keeper: &str, req: &SaveFileRequest) -> Result<(), ApiError> {
        match self
            .call::<_, SuccessResponse>(keeper, "/internal/save", req, self.rpc_timeout)
            .await
        {
            Ok(_) => Ok(()),
            Err(ApiError::UpstreamStatus(StatusCode::CONFLICT)) => Err(ApiError::InboundBusy),
            Err(e) => Err(e),
        }
    }

    pub async fn transfer_file(
        &self,
        keeper: &str,
        req: &TransferFileRequest,
    ) -> Result<(), ApiError> {
        match self
            .call::<_, SuccessResponse>(keeper, "/internal/transfer", req, self.transfer_timeout)
            .await
        {
            Ok(_) => Ok(()),
            Err(ApiError::UpstreamStatus(StatusCode::NOT_FOUND)) => Err(ApiError::FileNotFound),
            Err(e) => Err(e),
        }
    }

    pub async fn replicate_file(
        &self,
        keeper: &str,
        req: &ReplicateFileRequest,
    ) -> Result<(), ApiError> {
        self.call::<_, SuccessResponse>(keeper, "/internal/replicate", req, self.transfer_timeout)
            .await
            .map(|_| ())
    }

    pub async fn check_file_exists(&self, keeper: &str, local_path: &str) -> Result<bool, ApiError> {
        let req = CheckFileExistsRequest {
            local_path: local_path.to_string(),
        };
        let resp: SuccessResponse = self
            .call(keeper, "/internal/exists", &req, self.rpc_timeout)
            .await?;
        Ok(resp.success)
    }

    // Client

    pub async fn report_success(&self, client: &str, file_name: &str) -> Result<bool, ApiError> {
        let req = ReportSuccessRequest {
            success: true,
            file_name: file_name.to_string(),
        };
        let resp: SuccessResponse = self
            .call(client, REPORT_SUCCESS_PATH, &req, self.rpc_timeout)
            .await?;
        Ok(resp.success)
    }
}
