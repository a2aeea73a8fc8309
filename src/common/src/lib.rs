pub mod constants;
pub mod error;
pub mod file_utils;
pub mod key_utils;
pub mod retry;
pub mod rpc;
pub mod schemas;
pub mod telemetry;
pub mod time_utils;
pub mod trace_middleware;
pub mod transfer;
pub mod url_utils;
