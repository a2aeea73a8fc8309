use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::io;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum FileNameError {
    #[error("file name is empty or too long")]
    Length,
    #[error("file name contains a forbidden character")]
    Forbidden,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("membership conflict: {0}")]
    MembershipConflict(String),
    #[error("unknown node")]
    UnknownNode,
    #[error("no alive nodes available")]
    NoNodesAvailable,
    #[error("not found")]
    FileNotFound,
    #[error("invalid file name: {0}")]
    InvalidFileName(#[from] FileNameError),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("conflict: inbound stream already primed")]
    InboundBusy,
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error("upstream request failed: {0}")]
    UpstreamReq(reqwest::Error),
    #[error("upstream status {0}")]
    UpstreamStatus(reqwest::StatusCode),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MembershipConflict(_) => StatusCode::CONFLICT,
            ApiError::UnknownNode => StatusCode::NOT_FOUND,
            ApiError::NoNodesAvailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::FileNotFound => StatusCode::NOT_FOUND,
            ApiError::InvalidFileName(_) => StatusCode::BAD_REQUEST,
            ApiError::InvalidAddress(_) => StatusCode::BAD_REQUEST,
            ApiError::InboundBusy => StatusCode::CONFLICT,
            ApiError::ChecksumMismatch => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::UpstreamReq(_) => StatusCode::BAD_GATEWAY,
            ApiError::UpstreamStatus(_) => StatusCode::BAD_GATEWAY,
            ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Any(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Transport failures and 5xx answers are worth another attempt; logic errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::UpstreamReq(e) => {
                e.is_timeout() || e.is_connect() || e.is_request() || e.is_body()
            }
            ApiError::UpstreamStatus(st) => {
                st.is_server_error() || *st == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), self.to_string()).into_response()
    }
}
