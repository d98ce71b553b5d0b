//! Client integration tests against a real server.
//!
//! Covers the multiplexer invariants: sequence numbers, exactly-once call
//! completion on every terminal path, cancellation that leaves the client
//! usable, and close semantics.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use quill_client::{dial, dial_http, x_dial, Client};
use quill_core::{CodecKind, Options, QuillError};
use quill_server::{accept_http, Server, Service};

#[derive(Serialize, Deserialize, Clone, Copy)]
struct AddArgs {
    num1: i64,
    num2: i64,
}

fn arith_server() -> Arc<Server> {
    let server = Arc::new(Server::new());
    server
        .register(
            Service::new("Arith")
                .method("Add", |args: AddArgs| async move { Ok(args.num1 + args.num2) })
                .method("Fail", |_: AddArgs| async move {
                    Err::<i64, _>(QuillError::Handler("no dice".to_string()))
                })
                .method("Sleep", |ms: u64| async move {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(ms)
                }),
        )
        .unwrap();
    server
}

async fn start_tcp_server() -> SocketAddr {
    let server = arith_server();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { server.accept(listener).await });
    addr
}

async fn connect(addr: SocketAddr) -> Client {
    dial(&addr.to_string(), Options::default()).await.unwrap()
}

#[tokio::test]
async fn test_single_unary_call() {
    let addr = start_tcp_server().await;
    let client = connect(addr).await;

    let sum: i64 = client
        .call("Arith.Add", &AddArgs { num1: 1, num2: 2 })
        .await
        .unwrap();
    assert_eq!(sum, 3);
}

#[tokio::test]
async fn test_seq_starts_at_one_and_increases() {
    let addr = start_tcp_server().await;
    let client = connect(addr).await;

    let first = client
        .go("Arith.Add", &AddArgs { num1: 0, num2: 0 })
        .await
        .unwrap();
    let second = client
        .go("Arith.Add", &AddArgs { num1: 0, num2: 0 })
        .await
        .unwrap();

    assert_eq!(first.seq(), 1);
    assert_eq!(second.seq(), 2);
    let _: i64 = first.done().await.unwrap();
    let _: i64 = second.done().await.unwrap();
}

#[tokio::test]
async fn test_hundred_concurrent_calls() {
    let addr = start_tcp_server().await;
    let client = connect(addr).await;

    let mut tasks = Vec::new();
    for i in 0..100i64 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let args = AddArgs {
                num1: i,
                num2: i * i,
            };
            let sum: i64 = client.call("Arith.Add", &args).await.unwrap();
            assert_eq!(sum, i + i * i);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn test_handler_error_surfaces() {
    let addr = start_tcp_server().await;
    let client = connect(addr).await;

    match client
        .call::<_, i64>("Arith.Fail", &AddArgs { num1: 0, num2: 0 })
        .await
    {
        Err(QuillError::Handler(msg)) => assert_eq!(msg, "no dice"),
        other => panic!("expected handler error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cancellation_leaves_client_usable() {
    let addr = start_tcp_server().await;
    let client = connect(addr).await;

    let started = Instant::now();
    match client
        .call_timeout::<_, u64>("Arith.Sleep", &600u64, Duration::from_millis(100))
        .await
    {
        Err(QuillError::CallTimeout(_)) => {}
        other => panic!("expected call timeout, got {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_millis(400));
    assert!(client.is_available());

    // the server finishes the abandoned handler at ~600 ms; its response
    // must be drained without disturbing later calls
    tokio::time::sleep(Duration::from_millis(700)).await;
    let sum: i64 = client
        .call("Arith.Add", &AddArgs { num1: 20, num2: 22 })
        .await
        .unwrap();
    assert_eq!(sum, 42);
}

#[tokio::test]
async fn test_dropped_handle_cancels_call() {
    let addr = start_tcp_server().await;
    let client = connect(addr).await;

    let handle = client.go("Arith.Sleep", &300u64).await.unwrap();
    drop(handle);

    tokio::time::sleep(Duration::from_millis(400)).await;
    let sum: i64 = client
        .call("Arith.Add", &AddArgs { num1: 1, num2: 1 })
        .await
        .unwrap();
    assert_eq!(sum, 2);
}

#[tokio::test]
async fn test_close_is_terminal_and_reported_once() {
    let addr = start_tcp_server().await;
    let client = connect(addr).await;

    client.close().await.unwrap();
    assert!(!client.is_available());

    match client.close().await {
        Err(QuillError::Shutdown) => {}
        other => panic!("expected shutdown error, got {:?}", other),
    }

    match client
        .call::<_, i64>("Arith.Add", &AddArgs { num1: 1, num2: 1 })
        .await
    {
        Err(QuillError::Shutdown) => {}
        other => panic!("expected shutdown error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_pending_calls_fail_when_server_vanishes() {
    // a "server" that accepts the connection and hangs up shortly after
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(stream);
    });

    let client = connect(addr).await;
    let handle = client.go("Arith.Sleep", &1u64).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), handle.done::<u64>())
        .await
        .expect("pending call should terminate when the connection dies");
    match result {
        Err(QuillError::Connection(_)) => {}
        other => panic!("expected connection error, got {:?}", other),
    }
    assert!(!client.is_available());
}

#[tokio::test]
async fn test_dial_http_upgrade() {
    let server = arith_server();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { accept_http(server, listener).await });

    let client = dial_http(&addr.to_string(), Options::default()).await.unwrap();
    let sum: i64 = client
        .call("Arith.Add", &AddArgs { num1: 4, num2: 5 })
        .await
        .unwrap();
    assert_eq!(sum, 9);
}

#[tokio::test]
async fn test_x_dial_picks_transport() {
    let tcp_addr = start_tcp_server().await;
    let client = x_dial(&format!("tcp@{tcp_addr}"), Options::default())
        .await
        .unwrap();
    let sum: i64 = client
        .call("Arith.Add", &AddArgs { num1: 2, num2: 2 })
        .await
        .unwrap();
    assert_eq!(sum, 4);

    let server = arith_server();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_addr = listener.local_addr().unwrap();
    tokio::spawn(async move { accept_http(server, listener).await });

    let client = x_dial(&format!("http@{http_addr}"), Options::default())
        .await
        .unwrap();
    let sum: i64 = client
        .call("Arith.Add", &AddArgs { num1: 3, num2: 3 })
        .await
        .unwrap();
    assert_eq!(sum, 6);
}

#[tokio::test]
async fn test_json_codec_end_to_end() {
    let addr = start_tcp_server().await;
    let opts = Options::default().with_codec(CodecKind::Json);
    let client = dial(&addr.to_string(), opts).await.unwrap();

    let sum: i64 = client
        .call("Arith.Add", &AddArgs { num1: 6, num2: 7 })
        .await
        .unwrap();
    assert_eq!(sum, 13);
}

#[cfg(unix)]
#[tokio::test]
async fn test_unix_transport() {
    use quill_client::dial_unix;

    let server = arith_server();
    let dir = std::env::temp_dir().join(format!("quill-test-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("rpc.sock");
    let _ = std::fs::remove_file(&path);

    let listener = tokio::net::UnixListener::bind(&path).unwrap();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let server = Arc::clone(&server);
                    tokio::spawn(async move { server.serve_conn(stream).await });
                }
                Err(_) => return,
            }
        }
    });

    let client = dial_unix(path.to_str().unwrap(), Options::default())
        .await
        .unwrap();
    let sum: i64 = client
        .call("Arith.Add", &AddArgs { num1: 8, num2: 9 })
        .await
        .unwrap();
    assert_eq!(sum, 17);
}
