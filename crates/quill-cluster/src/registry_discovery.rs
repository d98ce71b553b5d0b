use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;

use quill_core::{QuillError, Result, REGISTRY_SERVERS_HEADER};

use crate::discovery::{Discovery, SelectMode, StaticDiscovery};

/// A list older than this is re-fetched on the next `get`/`get_all`.
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Discovery backed by a registry service.
///
/// Wraps [`StaticDiscovery`] with a staleness bound: every selection
/// implicitly refreshes, and a refresh is a no-op while the cached list is
/// fresh. A failed refresh reports the error and keeps the previous list.
pub struct RegistryDiscovery {
    servers: StaticDiscovery,
    /// Full URL of the registry endpoint.
    registry: String,
    /// Staleness bound for the cached list.
    timeout: Duration,
    /// When the list was last fetched. The mutex is held across the whole
    /// fetch, deliberately, so concurrent callers cannot stampede the
    /// registry.
    last_update: Mutex<Option<Instant>>,
}

impl RegistryDiscovery {
    /// `timeout` is the staleness bound; zero selects the 10 s default.
    pub fn new(registry: impl Into<String>, timeout: Duration) -> Self {
        let timeout = if timeout.is_zero() {
            DEFAULT_UPDATE_TIMEOUT
        } else {
            timeout
        };
        Self {
            servers: StaticDiscovery::new(Vec::new()),
            registry: registry.into(),
            timeout,
            last_update: Mutex::new(None),
        }
    }

    async fn refresh_if_stale(&self) -> Result<()> {
        let mut last_update = self.last_update.lock().await;
        if let Some(at) = *last_update {
            if at.elapsed() < self.timeout {
                return Ok(());
            }
        }
        debug!(registry = %self.registry, "refreshing server list from registry");
        let servers = fetch_servers(&self.registry).await?;
        self.servers.set_servers(servers);
        *last_update = Some(Instant::now());
        Ok(())
    }
}

impl Discovery for RegistryDiscovery {
    async fn refresh(&self) -> Result<()> {
        self.refresh_if_stale().await
    }

    async fn update(&self, servers: Vec<String>) -> Result<()> {
        self.servers.set_servers(servers);
        *self.last_update.lock().await = Some(Instant::now());
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String> {
        self.refresh_if_stale().await?;
        self.servers.pick(mode)
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        self.refresh_if_stale().await?;
        Ok(self.servers.snapshot())
    }
}

/// One GET against the registry; the live endpoints come back
/// comma-joined in a response header.
async fn fetch_servers(registry: &str) -> Result<Vec<String>> {
    let response = reqwest::Client::new()
        .get(registry)
        .send()
        .await
        .map_err(|e| QuillError::Refresh(e.to_string()))?;
    if !response.status().is_success() {
        return Err(QuillError::Refresh(format!(
            "registry answered {}",
            response.status()
        )));
    }

    let raw = response
        .headers()
        .get(REGISTRY_SERVERS_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_timeout_selects_default() {
        let discovery = RegistryDiscovery::new("http://127.0.0.1:1/_rpc_/registry", Duration::ZERO);
        assert_eq!(discovery.timeout, DEFAULT_UPDATE_TIMEOUT);
    }

    #[tokio::test]
    async fn test_manual_update_counts_as_fresh() {
        let discovery = RegistryDiscovery::new(
            "http://127.0.0.1:1/_rpc_/registry",
            Duration::from_secs(60),
        );
        // a fetch against port 1 would fail; update makes the list fresh
        // so get never attempts one
        discovery
            .update(vec!["tcp@127.0.0.1:9001".to_string()])
            .await
            .unwrap();
        let picked = discovery.get(SelectMode::RoundRobin).await.unwrap();
        assert_eq!(picked, "tcp@127.0.0.1:9001");
    }

    #[tokio::test]
    async fn test_refresh_failure_surfaces() {
        let discovery = RegistryDiscovery::new(
            "http://127.0.0.1:1/_rpc_/registry",
            Duration::from_millis(1),
        );
        match discovery.get_all().await {
            Err(QuillError::Refresh(_)) => {}
            other => panic!("expected refresh error, got {:?}", other),
        }
    }
}
