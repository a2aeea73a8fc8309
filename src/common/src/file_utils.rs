use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::fs;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::constants::{BLOB_DIR_NAME, TMP_DIR_NAME};

fn shard_dirs(name_enc: &str) -> (String, String) {
    let hash = blake3::hash(name_enc.as_bytes());
    let bytes = hash.as_bytes();
    (format!("{:02x}", bytes[0]), format!("{:02x}", bytes[1]))
}

/// `<root>/blobs/<aa>/<bb>/<encoded name>`
pub fn blob_path(root: &Path, name_enc: &str) -> PathBuf {
    let (a, b) = shard_dirs(name_enc);
    root.join(BLOB_DIR_NAME).join(a).join(b).join(name_enc)
}

pub fn tmp_path(root: &Path, transfer_id: &str) -> PathBuf {
    root.join(TMP_DIR_NAME).join(transfer_id)
}

pub async fn init_dirs(root: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(root.join(BLOB_DIR_NAME)).await?;
    fs::create_dir_all(root.join(TMP_DIR_NAME)).await?;

    Ok(())
}

pub async fn file_exists(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// True when `path` resolves to a location under `root`. Both must exist.
pub async fn is_within(root: &Path, path: &Path) -> bool {
    let (Ok(root), Ok(path)) = (fs::canonicalize(root).await, fs::canonicalize(path).await) else {
        return false;
    };
    path.starts_with(root)
}

pub async fn fsync_dir(dir: &Path) -> io::Result<()> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || std::fs::File::open(dir)?.sync_all())
        .await
        .map_err(io::Error::other)?
}

pub async fn file_hash(path: &Path) -> io::Result<String> {
    let mut f = File::open(path).await?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = f.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}
