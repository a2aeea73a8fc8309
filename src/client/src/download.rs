use anyhow::{Context, bail};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use common::key_utils::FileName;
use common::rpc::RpcClient;
use common::schemas::{ReplicaLocation, TransferFileRequest};
use common::transfer::receive_to_file;
use common::url_utils::advertised_addr;

async fn receive_one(listener: &TcpListener, part: &Path) -> anyhow::Result<(u64, String)> {
    let (stream, _) = listener.accept().await?;
    let mut file = File::create(part).await?;
    let received = receive_to_file(stream, &mut file).await?;
    file.sync_all().await?;
    Ok(received)
}

/// Ask one keeper to stream the file to `listener`. TransferFile only returns
/// once the keeper has sent everything, so the accept runs alongside it.
async fn fetch_from(
    rpc: &RpcClient,
    listener: &TcpListener,
    location: &ReplicaLocation,
    req: &TransferFileRequest,
    part: &Path,
) -> anyhow::Result<(u64, String)> {
    let transfer = rpc.transfer_file(&location.control_address, req);
    let receive = receive_one(listener, part);
    tokio::pin!(transfer, receive);

    tokio::select! {
        sent = &mut transfer => {
            sent?;
            // remaining bytes are already buffered on our side
            timeout(rpc.rpc_timeout(), &mut receive)
                .await
                .context("stream did not arrive")?
        }
        received = &mut receive => {
            let received = received?;
            transfer.await?;
            Ok(received)
        }
    }
}

/// Download `name` into `out_dir`, trying each live holder in turn. The
/// result is checked against the size and etag the master recorded.
pub async fn download(
    rpc: &RpcClient,
    master: &str,
    name: &FileName,
    out_dir: &Path,
    data_bind: &str,
) -> anyhow::Result<PathBuf> {
    // listen before asking, so the address we hand out is already open
    let listener = TcpListener::bind(data_bind).await?;
    let my_addr = advertised_addr(listener.local_addr()?)?;

    let found = rpc.download_file(master, name.as_str()).await?;
    if found.locations.is_empty() {
        bail!("{} is not stored on any alive keeper", name);
    }

    fs::create_dir_all(out_dir).await?;
    let part = out_dir.join(format!(".{}.{}.part", name.enc(), Uuid::new_v4()));
    let req = TransferFileRequest {
        file_name: name.as_str().to_string(),
        dest_data_address: my_addr,
    };

    for location in &found.locations {
        match fetch_from(rpc, &listener, location, &req, &part).await {
            Ok((size, etag)) if size == found.size && etag == found.etag => {
                let dest = out_dir.join(name.as_str());
                fs::rename(&part, &dest).await?;
                info!(node_id = location.node_id, bytes = size, "download complete");
                return Ok(dest);
            }
            Ok((size, etag)) => {
                warn!(
                    node_id = location.node_id,
                    size, %etag, expected_size = found.size, expected_etag = %found.etag,
                    "copy does not match the index, trying next holder"
                );
            }
            Err(e) => warn!(node_id = location.node_id, "fetch failed: {e:#}"),
        }
        let _ = fs::remove_file(&part).await;
    }

    bail!("no holder of {} could serve a valid copy", name)
}
