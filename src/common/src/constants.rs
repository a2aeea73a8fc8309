pub const MAX_FILE_NAME_LEN: usize = 4096;
pub const MAX_ENCODED_NAME_LEN: usize = 255;

pub const BLOB_DIR_NAME: &str = "blobs";
pub const TMP_DIR_NAME: &str = "tmp";

/// Name an inbound stream is stored under when no SaveFile primed it.
pub const DEFAULT_INBOUND_NAME: &str = "received";

pub const DEFAULT_REPLICATION_FACTOR: usize = 3;

pub const REPORT_SUCCESS_PATH: &str = "/report-success";
