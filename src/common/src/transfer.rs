//! Data plane: raw, unframed byte streams over TCP.
//!
//! The sender writes the whole file and closes its write half; the receiver
//! copies everything up to EOF into a local file. Nothing else travels on the
//! wire, so the receiver learns what it is receiving from the control plane.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, anyhow};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

const BUFFER_SIZE: usize = 1024 * 1024; // 1MB

/// Stream every byte of `path` to `addr`. Returns the number of bytes sent.
pub async fn send_file(path: &Path, addr: &str, connect_timeout: Duration) -> anyhow::Result<u64> {
    let file = File::open(path)
        .await
        .with_context(|| format!("opening {} for transfer", path.display()))?;

    let mut stream = timeout(connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| anyhow!("connect to {} timed out", addr))?
        .with_context(|| format!("connecting to {}", addr))?;

    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let sent = tokio::io::copy_buf(&mut reader, &mut stream).await?;
    stream.shutdown().await?;

    debug!(bytes = sent, %addr, "stream sent");

    Ok(sent)
}

/// Copy `stream` into `file` until the peer closes. Returns the byte count and
/// the blake3 hex digest of what was written.
pub async fn receive_to_file<R>(mut stream: R, file: &mut File) -> anyhow::Result<(u64, String)>
where
    R: AsyncRead + Unpin,
{
    let mut hasher = blake3::Hasher::new();
    let mut total: u64 = 0;
    let mut buf = vec![0u8; BUFFER_SIZE];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        file.write_all(&buf[..n]).await?;
        total += n as u64;
    }

    file.flush().await?;

    Ok((total, hasher.finalize().to_hex().to_string()))
}
