use std::time::Duration;

use ::common::error::ApiError;
use ::common::file_utils::{blob_path, file_hash};
use ::common::key_utils::FileName;
use ::common::schemas::{
    ListResponse, ReplicateFileRequest, SaveFileRequest, TransferFileRequest, TransferKind,
};
use ::common::transfer::{receive_to_file, send_file};
use reqwest::{Client, StatusCode};
use tempfile::TempDir;
use tokio::net::TcpListener;

mod common;
use crate::common::*;

fn save_req(name: &str, expected_size: Option<u64>) -> SaveFileRequest {
    SaveFileRequest {
        file_name: name.to_string(),
        kind: TransferKind::Original,
        expected_size,
    }
}

async fn stored_names(client: &Client, keeper: &StandaloneKeeper) -> anyhow::Result<Vec<String>> {
    let resp = client
        .get(format!("{}/admin/list", keeper.url))
        .send()
        .await?;
    let list: ListResponse = resp.json().await?;
    Ok(list.files)
}

/// Prime `name` and push `bytes` over the data plane.
async fn store(keeper: &StandaloneKeeper, name: &str, bytes: &[u8]) -> anyhow::Result<()> {
    let scratch = TempDir::new()?;
    let source = scratch.path().join("payload");
    tokio::fs::write(&source, bytes).await?;

    keeper
        .state
        .rpc
        .save_file(&keeper.state.control_address, &save_req(name, Some(bytes.len() as u64)))
        .await?;
    send_file(&source, &keeper.state.data_address, Duration::from_secs(2)).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn primed_stream_is_committed_under_its_name() -> anyhow::Result<()> {
    let keeper = StandaloneKeeper::start().await?;
    let client = Client::new();
    let payload = b"holiday footage".repeat(1000);

    store(&keeper, "holiday clip.mp4", &payload).await?;

    let (k, c) = (&keeper, &client);
    wait_until(5_000, || async move {
        Ok(stored_names(c, k).await? == vec!["holiday clip.mp4".to_string()])
    })
    .await?;

    let name = FileName::parse("holiday clip.mp4")?;
    let blob = blob_path(keeper.data_dir.path(), name.enc());
    assert_eq!(file_hash(&blob).await?, blake3_hex(&payload));

    keeper.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn transfer_streams_a_stored_file_and_404s_otherwise() -> anyhow::Result<()> {
    let keeper = StandaloneKeeper::start().await?;
    let client = Client::new();
    let payload = b"0123456789".repeat(4096);
    store(&keeper, "data.bin", &payload).await?;

    let (k, c) = (&keeper, &client);
    wait_until(5_000, || async move { Ok(!stored_names(c, k).await?.is_empty()) }).await?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let req = TransferFileRequest {
        file_name: "data.bin".to_string(),
        dest_data_address: listener.local_addr()?.to_string(),
    };

    let out_dir = TempDir::new()?;
    let out = out_dir.path().join("copy");
    let receive = async {
        let (stream, _) = listener.accept().await?;
        let mut file = tokio::fs::File::create(&out).await?;
        receive_to_file(stream, &mut file).await
    };
    let (sent, received) = tokio::join!(
        keeper
            .state
            .rpc
            .transfer_file(&keeper.state.control_address, &req),
        receive
    );
    sent?;
    let (size, etag) = received?;
    assert_eq!(size, payload.len() as u64);
    assert_eq!(etag, blake3_hex(&payload));

    let missing = TransferFileRequest {
        file_name: "nope".to_string(),
        ..req
    };
    let res = keeper
        .state
        .rpc
        .transfer_file(&keeper.state.control_address, &missing)
        .await;
    assert!(matches!(res, Err(ApiError::FileNotFound)));

    keeper.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replicate_primes_the_peer_and_pushes_the_bytes() -> anyhow::Result<()> {
    let source = StandaloneKeeper::start().await?;
    let dest = StandaloneKeeper::start().await?;
    let client = Client::new();
    let payload = b"replica bytes".repeat(500);
    store(&source, "shared.txt", &payload).await?;

    let (s, c) = (&source, &client);
    wait_until(5_000, || async move { Ok(!stored_names(c, s).await?.is_empty()) }).await?;

    let req = ReplicateFileRequest {
        file_name: "shared.txt".to_string(),
        dest_data_address: dest.state.data_address.clone(),
        dest_control_address: dest.state.control_address.clone(),
    };
    source
        .state
        .rpc
        .replicate_file(&source.state.control_address, &req)
        .await?;

    let d = &dest;
    wait_until(5_000, || async move {
        Ok(stored_names(c, d).await? == vec!["shared.txt".to_string()])
    })
    .await?;
    let blob = blob_path(dest.data_dir.path(), FileName::parse("shared.txt")?.enc());
    assert_eq!(file_hash(&blob).await?, blake3_hex(&payload));

    source.shutdown().await?;
    dest.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn save_rejects_bad_names_and_a_second_reservation() -> anyhow::Result<()> {
    let keeper = StandaloneKeeper::start().await?;
    let rpc = &keeper.state.rpc;
    let control = &keeper.state.control_address;

    let res = rpc.save_file(control, &save_req("a/b", None)).await;
    assert!(matches!(
        res,
        Err(ApiError::UpstreamStatus(StatusCode::BAD_REQUEST))
    ));

    rpc.save_file(control, &save_req("first", None)).await?;
    let res = rpc.save_file(control, &save_req("second", None)).await;
    assert!(matches!(res, Err(ApiError::InboundBusy)));

    keeper.shutdown().await
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn exists_is_false_outside_the_store_and_for_missing_files() -> anyhow::Result<()> {
    let keeper = StandaloneKeeper::start().await?;
    let rpc = &keeper.state.rpc;
    let control = &keeper.state.control_address;

    let outside = TempDir::new()?;
    let stray = outside.path().join("stray");
    tokio::fs::write(&stray, b"x").await?;
    assert!(!rpc.check_file_exists(control, &stray.to_string_lossy()).await?);

    let missing = blob_path(keeper.data_dir.path(), FileName::parse("ghost")?.enc());
    assert!(!rpc.check_file_exists(control, &missing.to_string_lossy()).await?);

    keeper.shutdown().await
}
