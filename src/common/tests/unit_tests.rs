use common::error::{ApiError, FileNameError};
use common::file_utils::{blob_path, file_hash, init_dirs, tmp_path};
use common::key_utils::FileName;
use std::path::Path;

#[test]
fn test_file_name_maps_to_sharded_blob_path() {
    let name = FileName::parse("lecture 01.mp4").unwrap();
    let path = blob_path(Path::new("/data"), name.enc());

    let components: Vec<_> = path
        .components()
        .map(|c| c.as_os_str().to_str().unwrap().to_string())
        .skip_while(|c| c == "/")
        .collect();
    assert_eq!(components[0], "data");
    assert_eq!(components[1], "blobs");
    assert_eq!(components.last().unwrap(), name.enc());

    // Shard directories are 2-char hex
    for shard in &components[2..4] {
        assert_eq!(shard.len(), 2);
        assert!(shard.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

#[test]
fn test_names_differing_in_case_do_not_collide() {
    let a = FileName::parse("Video.mp4").unwrap();
    let b = FileName::parse("video.mp4").unwrap();
    assert_ne!(a.enc(), b.enc());
    assert_ne!(
        blob_path(Path::new("/data"), a.enc()),
        blob_path(Path::new("/data"), b.enc())
    );
}

#[test]
fn test_tmp_path_lives_under_tmp() {
    let p = tmp_path(Path::new("/data"), "abc");
    assert_eq!(p, Path::new("/data/tmp/abc"));
}

#[test]
fn test_invalid_names_map_to_bad_request() {
    let err: ApiError = FileName::parse("../etc/passwd").unwrap_err().into();
    assert!(matches!(err, ApiError::InvalidFileName(FileNameError::Forbidden)));
    assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
}

#[test]
fn test_busy_and_membership_errors_are_conflicts() {
    assert_eq!(ApiError::InboundBusy.status_code(), axum::http::StatusCode::CONFLICT);
    assert_eq!(
        ApiError::MembershipConflict("id 1 is alive".into()).status_code(),
        axum::http::StatusCode::CONFLICT
    );
    assert_eq!(
        ApiError::NoNodesAvailable.status_code(),
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    );
    assert!(!ApiError::InboundBusy.is_transient());
    assert!(ApiError::UpstreamStatus(reqwest::StatusCode::BAD_GATEWAY).is_transient());
}

#[tokio::test]
async fn test_file_hash_matches_blake3() {
    let dir = tempfile::TempDir::new().unwrap();
    init_dirs(dir.path()).await.unwrap();
    let path = dir.path().join("payload");
    let payload = vec![7u8; 3 * 1024 * 1024 + 5];
    tokio::fs::write(&path, &payload).await.unwrap();

    assert_eq!(
        file_hash(&path).await.unwrap(),
        blake3::hash(&payload).to_hex().to_string()
    );
}

#[test]
fn test_save_request_wire_format() {
    use common::schemas::{SaveFileRequest, TransferKind};

    // kind and size may be omitted by older callers
    let req: SaveFileRequest = serde_json::from_str(r#"{"file_name":"video"}"#).unwrap();
    assert_eq!(req.kind, TransferKind::Original);
    assert_eq!(req.expected_size, None);

    let req = SaveFileRequest {
        file_name: "video".to_string(),
        kind: TransferKind::Replica,
        expected_size: Some(7),
    };
    let json = serde_json::to_value(&req).unwrap();
    assert_eq!(json["kind"], "replica");
    assert_eq!(json["expected_size"], 7);
}
