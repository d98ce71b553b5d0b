use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, info};

use quill_core::{
    QuillError, Result, DEFAULT_REGISTRY_PATH, REGISTRY_SERVERS_HEADER, REGISTRY_SERVER_HEADER,
};

/// A server whose last heartbeat is older than this is considered dead.
pub const DEFAULT_SERVER_TIMEOUT: Duration = Duration::from_secs(5 * 60);

struct ServerItem {
    addr: String,
    last_heartbeat: Instant,
}

/// In-memory membership with heartbeat-based liveness. Cheap to clone;
/// clones share the same state.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    timeout: Duration,
    servers: Mutex<HashMap<String, ServerItem>>,
}

impl Registry {
    /// `timeout` is the liveness bound; zero means entries never expire.
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                timeout,
                servers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Upserts an endpoint: a new entry, or a fresh heartbeat stamp on an
    /// existing one.
    pub fn put_server(&self, addr: &str) {
        let mut servers = self.inner.servers.lock().unwrap();
        let now = Instant::now();
        servers
            .entry(addr.to_string())
            .and_modify(|item| item.last_heartbeat = now)
            .or_insert_with(|| {
                debug!(%addr, "registering server");
                ServerItem {
                    addr: addr.to_string(),
                    last_heartbeat: now,
                }
            });
    }

    /// The sorted live endpoint list. Expired entries are evicted as a
    /// side effect, so the map never accumulates the dead.
    pub fn alive_servers(&self) -> Vec<String> {
        let mut servers = self.inner.servers.lock().unwrap();
        let timeout = self.inner.timeout;
        servers.retain(|addr, item| {
            let alive = timeout.is_zero() || item.last_heartbeat.elapsed() < timeout;
            if !alive {
                debug!(%addr, "evicting dead server");
            }
            alive
        });

        let mut alive: Vec<String> = servers.values().map(|item| item.addr.clone()).collect();
        alive.sort();
        alive
    }

    /// The registry's HTTP surface, mounted on the default registry path.
    pub fn router(&self) -> Router {
        Router::new()
            .route(
                DEFAULT_REGISTRY_PATH,
                get(list_servers).post(register_server),
            )
            .with_state(self.clone())
    }

    /// Serves the registry until the listener fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, path = DEFAULT_REGISTRY_PATH, "registry listening");
        }
        axum::serve(listener, self.router())
            .await
            .map_err(|e| QuillError::Connection(e.to_string()))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER_TIMEOUT)
    }
}

async fn list_servers(State(registry): State<Registry>) -> Response {
    let alive = registry.alive_servers().join(",");
    match HeaderValue::from_str(&alive) {
        Ok(value) => {
            let mut response = StatusCode::OK.into_response();
            response
                .headers_mut()
                .insert(HeaderName::from_static(REGISTRY_SERVERS_HEADER), value);
            response
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn register_server(State(registry): State<Registry>, headers: HeaderMap) -> StatusCode {
    match headers
        .get(REGISTRY_SERVER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
    {
        Some(addr) if !addr.is_empty() => {
            registry.put_server(addr);
            StatusCode::OK
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
