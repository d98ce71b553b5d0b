//! HTTP CONNECT acceptor.
//!
//! Clients may reach the server over an HTTP hop: they send
//! `CONNECT /_rpc_ HTTP/1.0` and, on the `200 Connected to RPC` status,
//! switch to the normal handshake on the same stream. The exchange is
//! parsed on the raw stream because the success status line is fixed down
//! to its bytes and predates any HTTP library's idea of a response.
//!
//! `GET /debug/rpc` on the same acceptor serves the plain-text service
//! listing; everything else is answered with 405.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, warn};

use quill_core::{QuillError, Result, CONNECTED_STATUS, DEFAULT_DEBUG_PATH, DEFAULT_RPC_PATH};

use crate::server::Server;

const MAX_HEAD_SIZE: usize = 8 * 1024;

/// Accepts connections in a loop and serves each as an HTTP upgrade
/// endpoint. The HTTP counterpart of [`Server::accept`].
pub async fn accept_http(server: Arc<Server>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "http connection established");
                let server = Arc::clone(&server);
                tokio::spawn(async move { serve_http(server, stream).await });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
                return;
            }
        }
    }
}

/// Handles one HTTP exchange on an already-accepted stream. A CONNECT on
/// the RPC path upgrades into [`Server::serve_conn`]; the stream is closed
/// on return in every other case.
pub async fn serve_http<S>(server: Arc<Server>, mut stream: S)
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let head = match read_head(&mut stream).await {
        Ok(head) => head,
        Err(e) => {
            debug!(error = %e, "http head read failed");
            return;
        }
    };

    let request_line = head.lines().next().unwrap_or("");
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or("");
    let path = parts.next().unwrap_or("");

    match (method, path) {
        ("CONNECT", DEFAULT_RPC_PATH) => {
            let status = format!("HTTP/1.0 {CONNECTED_STATUS}\n\n");
            if let Err(e) = stream.write_all(status.as_bytes()).await {
                debug!(error = %e, "connect response write failed");
                return;
            }
            server.serve_conn(stream).await;
        }
        ("GET", DEFAULT_DEBUG_PATH) => {
            let body = server.debug_summary();
            let response = format!(
                "HTTP/1.0 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
        }
        _ => {
            debug!(method, path, "rejecting non-CONNECT request");
            let _ = stream
                .write_all(
                    b"HTTP/1.0 405 Method Not Allowed\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n405 must CONNECT\n",
                )
                .await;
        }
    }
}

/// Reads the request head byte by byte up to the blank line, so not one
/// byte of the RPC stream that follows is consumed.
async fn read_head<S: AsyncRead + Unpin>(stream: &mut S) -> Result<String> {
    let mut head = Vec::with_capacity(256);
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(QuillError::Connection(
                "stream closed during HTTP head".to_string(),
            ));
        }
        head.push(byte[0]);
        if head.ends_with(b"\r\n\r\n") || head.ends_with(b"\n\n") {
            break;
        }
        if head.len() > MAX_HEAD_SIZE {
            return Err(QuillError::Connection(
                "HTTP request head too large".to_string(),
            ));
        }
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_head_stops_at_blank_line() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client
            .write_all(b"CONNECT /_rpc_ HTTP/1.0\r\n\r\nEXTRA")
            .await
            .unwrap();

        let head = read_head(&mut server).await.unwrap();
        assert!(head.starts_with("CONNECT /_rpc_ HTTP/1.0"));

        // the bytes after the head are untouched
        let mut rest = [0u8; 5];
        server.read_exact(&mut rest).await.unwrap();
        assert_eq!(&rest, b"EXTRA");
    }

    #[tokio::test]
    async fn test_read_head_accepts_bare_newlines() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(b"CONNECT /_rpc_ HTTP/1.0\n\n").await.unwrap();
        let head = read_head(&mut server).await.unwrap();
        assert!(head.contains("/_rpc_"));
    }

    #[tokio::test]
    async fn test_non_connect_gets_405() {
        let server = Arc::new(Server::new());
        let (mut client, stream) = tokio::io::duplex(1024);

        let task = tokio::spawn(serve_http(server, stream));
        client.write_all(b"POST /_rpc_ HTTP/1.0\r\n\r\n").await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8_lossy(&response);
        assert!(response.starts_with("HTTP/1.0 405"));
        assert!(response.contains("must CONNECT"));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_debug_path_lists_services() {
        let server = Arc::new(Server::new());
        server
            .register(crate::Service::new("Echo").method("Say", |s: String| async move { Ok(s) }))
            .unwrap();
        let (mut client, stream) = tokio::io::duplex(1024);

        let task = tokio::spawn(serve_http(server, stream));
        client.write_all(b"GET /debug/rpc HTTP/1.0\r\n\r\n").await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        let response = String::from_utf8_lossy(&response);
        assert!(response.starts_with("HTTP/1.0 200 OK"));
        assert!(response.contains("Echo.Say: 0 calls"));
        task.await.unwrap();
    }
}
