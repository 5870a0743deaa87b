//! HTTP packet source tests against a local axum server.

mod common;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use mbmirror_packet::{HttpPacketSource, PacketError, PacketSource};
use std::collections::HashMap;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;

/// Serves packet 11 only, and packet 13 only with the right token.
async fn serve_packet(
    Path(filename): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match filename.as_str() {
        "replication-11.tar.bz2" => (StatusCode::OK, common::artist_packet()).into_response(),
        "replication-13.tar.bz2" => {
            if params.get("token").map(String::as_str) == Some("secret") {
                (StatusCode::OK, common::artist_packet()).into_response()
            } else {
                (StatusCode::UNAUTHORIZED, "bad token").into_response()
            }
        }
        "replication-14.tar.bz2" => (StatusCode::OK, "not an archive").into_response(),
        "replication-15.tar.bz2" => {
            (StatusCode::INTERNAL_SERVER_ERROR, "oops").into_response()
        }
        _ => (StatusCode::NOT_FOUND, "File not found").into_response(),
    }
}

async fn start_test_server() -> anyhow::Result<(String, tokio::task::JoinHandle<()>)> {
    let app = Router::new()
        .route("/replication/:filename", get(serve_packet))
        .layer(ServiceBuilder::new());

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let base_url = format!("http://{addr}/replication");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    tokio::time::sleep(Duration::from_millis(100)).await;

    Ok((base_url, server_handle))
}

#[tokio::test]
async fn test_http_fetch_packet() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .try_init();

    let (base_url, server_handle) = start_test_server().await.unwrap();
    let source = HttpPacketSource::new(&base_url, None, Duration::from_secs(5)).unwrap();

    let packet = source.fetch(11).await.unwrap().unwrap();
    assert_eq!(packet.sequence, 11);
    assert_eq!(packet.schema_sequence, Some(27));
    assert_eq!(packet.pending.operation_count(), 1);
    assert_eq!(packet.pending.values(1).value("name"), Some("Foo"));

    server_handle.abort();
}

#[tokio::test]
async fn test_http_not_found_is_exhausted() {
    let (base_url, server_handle) = start_test_server().await.unwrap();
    let source = HttpPacketSource::new(format!("{base_url}/"), None, Duration::from_secs(5)).unwrap();

    assert!(source.fetch(12).await.unwrap().is_none());
    assert!(source.describe(12).ends_with("/replication/replication-12.tar.bz2"));

    server_handle.abort();
}

#[tokio::test]
async fn test_http_token_is_sent() {
    let (base_url, server_handle) = start_test_server().await.unwrap();

    let without = HttpPacketSource::new(&base_url, None, Duration::from_secs(5)).unwrap();
    let err = without.fetch(13).await.unwrap_err();
    assert!(matches!(err, PacketError::Status { status: 401, .. }));

    let with = HttpPacketSource::new(&base_url, Some("secret".to_string()), Duration::from_secs(5)).unwrap();
    assert!(with.fetch(13).await.unwrap().is_some());

    server_handle.abort();
}

#[tokio::test]
async fn test_http_server_error_is_fatal() {
    let (base_url, server_handle) = start_test_server().await.unwrap();
    let source = HttpPacketSource::new(&base_url, None, Duration::from_secs(5)).unwrap();

    assert!(matches!(
        source.fetch(15).await.unwrap_err(),
        PacketError::Status { status: 500, .. }
    ));
    assert!(source.fetch(14).await.is_err());

    server_handle.abort();
}

#[tokio::test]
async fn test_http_unreachable_is_transport_error() {
    // Bind and drop to get a port nobody listens on.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let source = HttpPacketSource::new(format!("http://{addr}"), None, Duration::from_secs(2)).unwrap();
    assert!(matches!(
        source.fetch(1).await.unwrap_err(),
        PacketError::Transport { .. }
    ));
}
