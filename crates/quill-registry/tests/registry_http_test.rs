//! Registry HTTP surface tests: GET lists live servers in a header, POST
//! upserts from a header, everything else is rejected.

use std::net::SocketAddr;
use std::time::Duration;

use reqwest::{Method, StatusCode};
use tokio::net::TcpListener;

use quill_core::{DEFAULT_REGISTRY_PATH, REGISTRY_SERVERS_HEADER, REGISTRY_SERVER_HEADER};
use quill_registry::Registry;

async fn start_registry(timeout: Duration) -> SocketAddr {
    let registry = Registry::new(timeout);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = registry.serve(listener).await;
    });
    addr
}

/// One request against the registry; returns the status and the servers
/// header, if any.
async fn send(
    addr: SocketAddr,
    method: Method,
    server_header: Option<&str>,
) -> (StatusCode, Option<String>) {
    let url = format!("http://{addr}{DEFAULT_REGISTRY_PATH}");
    let mut request = reqwest::Client::new().request(method, &url);
    if let Some(value) = server_header {
        request = request.header(REGISTRY_SERVER_HEADER, value);
    }

    let response = request.send().await.unwrap();
    let servers = response
        .headers()
        .get(REGISTRY_SERVERS_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    (response.status(), servers)
}

#[tokio::test]
async fn test_post_then_get_lists_server() {
    let addr = start_registry(Duration::from_secs(60)).await;

    let (status, _) = send(addr, Method::POST, Some("tcp@127.0.0.1:9001")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, servers) = send(addr, Method::GET, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(servers.as_deref(), Some("tcp@127.0.0.1:9001"));
}

#[tokio::test]
async fn test_get_lists_sorted_and_comma_joined() {
    let addr = start_registry(Duration::from_secs(60)).await;

    send(addr, Method::POST, Some("tcp@127.0.0.1:9002")).await;
    send(addr, Method::POST, Some("tcp@127.0.0.1:9001")).await;

    let (_, servers) = send(addr, Method::GET, None).await;
    assert_eq!(
        servers.as_deref(),
        Some("tcp@127.0.0.1:9001,tcp@127.0.0.1:9002")
    );
}

#[tokio::test]
async fn test_post_without_header_is_500() {
    let addr = start_registry(Duration::from_secs(60)).await;
    let (status, _) = send(addr, Method::POST, None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_other_methods_are_405() {
    let addr = start_registry(Duration::from_secs(60)).await;
    let (status, _) = send(addr, Method::DELETE, None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_expired_server_disappears_from_get() {
    let addr = start_registry(Duration::from_millis(80)).await;

    send(addr, Method::POST, Some("tcp@127.0.0.1:9001")).await;
    let (_, servers) = send(addr, Method::GET, None).await;
    assert_eq!(servers.as_deref(), Some("tcp@127.0.0.1:9001"));

    tokio::time::sleep(Duration::from_millis(120)).await;
    let (status, servers) = send(addr, Method::GET, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(servers.as_deref(), Some(""));
}
