//! Integration test: real libcurl transport against a local resumable upload server.
//!
//! Uploads a file from disk in several chunks and asserts the server
//! reassembled exactly the bytes on disk, then exercises the retry, token
//! refresh and cancellation paths over real HTTP.

mod common;

use std::io::Write;
use std::sync::Arc;

use tempfile::NamedTempFile;
use vidup_core::auth::{OAuthRefresher, StaticToken};
use vidup_core::quota::server::ServerQuota;
use vidup_core::quota::FixedUsage;
use vidup_core::transport::libcurl::{CurlOptions, CurlTransport};
use vidup_core::{
    HttpTransport, RetryPolicy, UploadController, UploadError, UploadFile, UploadMetadata,
    UploadState,
};

fn transport() -> Arc<dyn HttpTransport> {
    Arc::new(CurlTransport::new(CurlOptions::default()))
}

async fn video_on_disk(len: usize) -> (NamedTempFile, Vec<u8>, UploadFile) {
    let body: Vec<u8> = (0u8..251).cycle().take(len).collect();
    let mut tmp = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
    tmp.write_all(&body).unwrap();
    tmp.flush().unwrap();
    let file = UploadFile::open(tmp.path(), None).await.unwrap();
    (tmp, body, file)
}

#[tokio::test]
async fn chunked_upload_reassembles_file_on_server() {
    let server = common::upload_server::start();
    let (_tmp, body, file) = video_on_disk(100 * 1024).await;
    assert_eq!(file.mime_type(), "video/mp4");

    let ctl = UploadController::builder(
        transport(),
        Arc::new(StaticToken::new("t0")),
        Arc::new(FixedUsage::default()),
    )
    .server_url(&server.base_url)
    .unwrap()
    .chunk_size(40 * 1024)
    .retry_policy(RetryPolicy::immediate())
    .build()
    .unwrap();
    let mut rx = ctl.subscribe();

    let meta = UploadMetadata::new(file.name()).with("channelId", "3").with("name", "Trip");
    assert_eq!(ctl.start(file, meta).await.unwrap(), UploadState::Complete);

    let st = server.state.lock().unwrap();
    assert_eq!(st.received, body);
    assert!(st.metadata.contains("channelId=3"));
    assert_eq!(st.put_auth.len(), 3);
    assert!(st.put_auth.iter().all(|a| a.as_deref() == Some("Bearer t0")));
    drop(st);

    let result = ctl.result().unwrap();
    assert_eq!(result.id, Some(42));
    assert_eq!(result.short_uuid.as_deref(), Some("kBXd4rzR"));

    let mut offsets = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        offsets.push(ev.acknowledged_offset);
    }
    assert!(offsets.windows(2).all(|w| w[0] <= w[1]), "offsets never go back");
    assert_eq!(offsets.last(), Some(&(100 * 1024)));
}

#[tokio::test]
async fn transient_unavailability_is_retried() {
    let server = common::upload_server::start();
    server.fail_next_puts(503, 3);
    let (_tmp, body, file) = video_on_disk(10 * 1024).await;

    let ctl = UploadController::builder(
        transport(),
        Arc::new(StaticToken::anonymous()),
        Arc::new(FixedUsage::default()),
    )
    .server_url(&server.base_url)
    .unwrap()
    .chunk_size(4 * 1024)
    .retry_policy(RetryPolicy::immediate())
    .build()
    .unwrap();

    let meta = UploadMetadata::new(file.name());
    assert_eq!(ctl.start(file, meta).await.unwrap(), UploadState::Complete);
    let st = server.state.lock().unwrap();
    assert_eq!(st.received, body);
    assert!(st.put_auth.iter().all(Option::is_none));
}

#[tokio::test]
async fn expired_token_is_refreshed_through_token_endpoint() {
    let server = common::upload_server::start();
    server.fail_next_puts(401, 1);
    let (_tmp, _body, file) = video_on_disk(8 * 1024).await;

    let auth = OAuthRefresher::new(
        transport(),
        &server.base_url,
        "client",
        "secret",
        "old-access",
        "old-refresh",
    )
    .unwrap();
    let ctl = UploadController::builder(transport(), Arc::new(auth), Arc::new(FixedUsage::default()))
        .server_url(&server.base_url)
        .unwrap()
        .retry_policy(RetryPolicy::immediate())
        .build()
        .unwrap();

    let meta = UploadMetadata::new(file.name());
    assert_eq!(ctl.start(file, meta).await.unwrap(), UploadState::Complete);
    let st = server.state.lock().unwrap();
    assert_eq!(st.token_refreshes, 1);
    assert_eq!(st.put_auth[0].as_deref(), Some("Bearer old-access"));
    assert_eq!(st.put_auth[1].as_deref(), Some("Bearer new-access"));
}

#[tokio::test]
async fn rejected_format_deletes_remote_session() {
    let server = common::upload_server::start();
    server.fail_next_puts(415, 1);
    let (_tmp, _body, file) = video_on_disk(1024).await;

    let ctl = UploadController::builder(
        transport(),
        Arc::new(StaticToken::new("t")),
        Arc::new(FixedUsage::default()),
    )
    .server_url(&server.base_url)
    .unwrap()
    .build()
    .unwrap();

    let meta = UploadMetadata::new(file.name());
    assert_eq!(ctl.start(file, meta).await.unwrap(), UploadState::Cancelled);
    assert_eq!(ctl.last_error(), Some(UploadError::UnsupportedMediaType));
    assert!(server.state.lock().unwrap().deleted);
}

#[tokio::test]
async fn server_quota_blocks_oversized_upload() {
    let server = common::upload_server::start();
    let transport = transport();
    let auth = Arc::new(StaticToken::new("t"));
    let quota = ServerQuota::new(transport.clone(), auth.clone(), &server.base_url).unwrap();
    let limits = quota.fetch_limits().await.unwrap();
    assert_eq!(limits.limit, 50_000);

    let ctl = UploadController::builder(transport, auth, Arc::new(quota))
        .server_url(&server.base_url)
        .unwrap()
        .quota_limits(limits)
        .build()
        .unwrap();

    let (_tmp, _body, file) = video_on_disk(49_500).await;
    let err = ctl
        .start(file, UploadMetadata::new("big.mp4"))
        .await
        .unwrap_err();
    assert!(matches!(err, UploadError::QuotaExceeded(_)));
    assert!(server.state.lock().unwrap().put_auth.is_empty());
}
