//! End-to-end demo: a registry, two heartbeating servers, and a
//! load-balanced client doing unicast and broadcast calls.
//!
//! Run with `RUST_LOG=debug` to watch the traffic.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use quill_cluster::{BalancedClient, RegistryDiscovery, SelectMode};
use quill_core::{Options, DEFAULT_REGISTRY_PATH};
use quill_registry::{heartbeat, Registry};
use quill_server::{Server, Service};

#[derive(Serialize, Deserialize)]
struct AddArgs {
    num1: i64,
    num2: i64,
}

async fn start_server(registry_url: String) -> quill_core::Result<String> {
    let server = Arc::new(Server::new());
    server.register(Service::new("Arith").method("Add", |args: AddArgs| async move {
        Ok(args.num1 + args.num2)
    }))?;

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let endpoint = format!("tcp@{}", listener.local_addr()?);
    tokio::spawn(async move { server.accept(listener).await });
    heartbeat(registry_url, endpoint.clone(), Duration::from_secs(1));
    Ok(endpoint)
}

#[tokio::main]
async fn main() -> quill_core::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let registry = Registry::new(Duration::from_secs(5));
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let registry_url = format!("http://{}{}", listener.local_addr()?, DEFAULT_REGISTRY_PATH);
    let registry_task = registry.clone();
    tokio::spawn(async move {
        let _ = registry_task.serve(listener).await;
    });

    start_server(registry_url.clone()).await?;
    start_server(registry_url.clone()).await?;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let discovery = RegistryDiscovery::new(registry_url, Duration::ZERO);
    let balanced = BalancedClient::new(discovery, SelectMode::RoundRobin, Options::default());

    for i in 0..5 {
        let sum: i64 = balanced
            .call("Arith.Add", &AddArgs { num1: i, num2: i * i })
            .await?;
        tracing::info!(i, sum, "unicast reply");
    }

    let sum: i64 = balanced
        .broadcast("Arith.Add", AddArgs { num1: 20, num2: 22 })
        .await?;
    tracing::info!(sum, "broadcast reply");

    balanced.close().await
}
