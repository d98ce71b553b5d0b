//! Dial helpers.
//!
//! [`dial`] for raw TCP, [`dial_http`] for the CONNECT upgrade,
//! [`dial_unix`] for Unix sockets, and [`x_dial`] for `protocol@address`
//! endpoint strings that pick between them.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use quill_core::{Options, QuillError, Result, CONNECTED_STATUS, DEFAULT_RPC_PATH};

use crate::client::Client;

/// Connects over TCP and performs the handshake, bounded by the options'
/// connect timeout (zero means unbounded).
pub async fn dial(addr: &str, opts: Options) -> Result<Client> {
    let connect_timeout = opts.connect_timeout;
    with_connect_timeout(connect_timeout, async move {
        let stream = TcpStream::connect(addr).await?;
        Client::new(stream, opts).await
    })
    .await
}

/// Connects to a server behind an HTTP hop: sends a CONNECT for the RPC
/// path and, on the expected status line, runs the normal handshake on the
/// now-raw stream. Anything but the exact status is a fatal connect error.
pub async fn dial_http(addr: &str, opts: Options) -> Result<Client> {
    let connect_timeout = opts.connect_timeout;
    with_connect_timeout(connect_timeout, async move {
        let mut stream = TcpStream::connect(addr).await?;
        let request = format!("CONNECT {DEFAULT_RPC_PATH} HTTP/1.0\r\n\r\n");
        stream.write_all(request.as_bytes()).await?;

        let head = read_response_head(&mut stream).await?;
        let status_line = head.lines().next().unwrap_or("").trim();
        let expected = format!("HTTP/1.0 {CONNECTED_STATUS}");
        if status_line != expected {
            return Err(QuillError::Connection(format!(
                "unexpected HTTP response: {status_line}"
            )));
        }

        Client::new(stream, opts).await
    })
    .await
}

/// Connects over a Unix domain socket.
#[cfg(unix)]
pub async fn dial_unix(path: &str, opts: Options) -> Result<Client> {
    let connect_timeout = opts.connect_timeout;
    let path = path.to_string();
    with_connect_timeout(connect_timeout, async move {
        let stream = tokio::net::UnixStream::connect(&path).await?;
        Client::new(stream, opts).await
    })
    .await
}

/// Dials a `protocol@address` endpoint: `http@host:port` upgrades through
/// CONNECT, `tcp@host:port` dials directly, `unix@/path` uses a domain
/// socket.
pub async fn x_dial(endpoint: &str, opts: Options) -> Result<Client> {
    let (protocol, addr) = endpoint
        .split_once('@')
        .ok_or_else(|| QuillError::InvalidEndpoint(endpoint.to_string()))?;
    match protocol {
        "http" => dial_http(addr, opts).await,
        "tcp" => dial(addr, opts).await,
        #[cfg(unix)]
        "unix" => dial_unix(addr, opts).await,
        other => Err(QuillError::UnsupportedProtocol(other.to_string())),
    }
}

async fn with_connect_timeout<F>(timeout: Duration, fut: F) -> Result<Client>
where
    F: Future<Output = Result<Client>>,
{
    if timeout.is_zero() {
        return fut.await;
    }
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(QuillError::ConnectTimeout(timeout)),
    }
}

/// Reads the HTTP response head byte by byte up to the blank line, leaving
/// the RPC stream that follows untouched.
async fn read_response_head(stream: &mut TcpStream) -> Result<String> {
    let mut head = Vec::with_capacity(128);
    let mut byte = [0u8; 1];
    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(QuillError::Connection(
                "stream closed during HTTP response".to_string(),
            ));
        }
        head.push(byte[0]);
        if head.ends_with(b"\r\n\r\n") || head.ends_with(b"\n\n") {
            break;
        }
        if head.len() > 8 * 1024 {
            return Err(QuillError::Connection(
                "HTTP response head too large".to_string(),
            ));
        }
    }
    Ok(String::from_utf8_lossy(&head).into_owned())
}
