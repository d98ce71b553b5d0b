use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use quill_core::{QuillError, Result, REGISTRY_SERVER_HEADER};

use crate::registry::DEFAULT_SERVER_TIMEOUT;

/// Keeps `addr` registered by POSTing to the registry every `period`.
///
/// One beat is sent immediately so a fresh server is listed without
/// waiting a full period; the task then beats until the first failure and
/// stops. A zero period selects the default: the registry's server
/// timeout minus a minute, leaving room for one late beat.
pub fn heartbeat(registry: String, addr: String, period: Duration) -> JoinHandle<()> {
    let period = if period.is_zero() {
        DEFAULT_SERVER_TIMEOUT - Duration::from_secs(60)
    } else {
        period
    };

    tokio::spawn(async move {
        if let Err(e) = send_heartbeat(&registry, &addr).await {
            warn!(%addr, error = %e, "heartbeat failed, stopping");
            return;
        }
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // the first tick completes immediately
        loop {
            ticker.tick().await;
            if let Err(e) = send_heartbeat(&registry, &addr).await {
                warn!(%addr, error = %e, "heartbeat failed, stopping");
                return;
            }
        }
    })
}

async fn send_heartbeat(registry: &str, addr: &str) -> Result<()> {
    debug!(%addr, %registry, "sending heartbeat");

    let response = reqwest::Client::new()
        .post(registry)
        .header(REGISTRY_SERVER_HEADER, addr)
        .send()
        .await
        .map_err(|e| QuillError::Connection(e.to_string()))?;
    if !response.status().is_success() {
        return Err(QuillError::Connection(format!(
            "registry rejected heartbeat: {}",
            response.status()
        )));
    }
    Ok(())
}
