pub mod callback;
pub mod download;
pub mod upload;
