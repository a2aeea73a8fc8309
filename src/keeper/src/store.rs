use anyhow::Context;
use nix::sys::statvfs::statvfs;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;
use walkdir::WalkDir;

use common::constants::BLOB_DIR_NAME;
use common::file_utils::{blob_path, fsync_dir};
use common::key_utils::FileName;

pub fn disk_usage(root: &Path) -> anyhow::Result<(Option<u64>, Option<u64>)> {
    let v = statvfs(root)?;
    let cap = v.blocks() as u64 * v.fragment_size() as u64;
    let free = v.blocks_available() as u64 * v.fragment_size() as u64;
    let used = cap.saturating_sub(free);
    Ok((Some(used), Some(cap)))
}

/// [`disk_usage`] on the blocking pool. Unknown figures when it fails.
pub async fn sample_disk_usage(root: &Path) -> (Option<u64>, Option<u64>) {
    let root = root.to_path_buf();
    match tokio::task::spawn_blocking(move || disk_usage(&root)).await {
        Ok(Ok(v)) => v,
        Ok(Err(e)) => {
            warn!("disk_usage error: {e:#}");
            (None, None)
        }
        Err(e) => {
            warn!("disk_usage task failed: {e}");
            (None, None)
        }
    }
}

/// Move a fully received temp file to its place in the store and return the
/// canonical path it now lives at. An existing copy is replaced.
pub async fn commit_blob(root: &Path, tmp: &Path, name: &FileName) -> anyhow::Result<PathBuf> {
    let dest = blob_path(root, name.enc());
    let parent = dest
        .parent()
        .with_context(|| format!("blob path {} has no parent", dest.display()))?;

    fs::create_dir_all(parent).await?;
    fs::rename(tmp, &dest)
        .await
        .with_context(|| format!("moving {} into the store", tmp.display()))?;
    fsync_dir(parent).await?;

    Ok(fs::canonicalize(&dest).await?)
}

/// Decoded names of every stored file, sorted.
pub fn list_files(root: &Path) -> Vec<String> {
    // blobs/aa/bb/<name>
    let mut names: Vec<String> = WalkDir::new(root.join(BLOB_DIR_NAME))
        .min_depth(3)
        .max_depth(3)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| FileName::from_encoded(&entry.file_name().to_string_lossy()).ok())
        .map(|name| name.as_str().to_string())
        .collect();

    names.sort();
    names
}
