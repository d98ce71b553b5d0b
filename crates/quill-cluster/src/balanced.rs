use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::debug;

use quill_client::{x_dial, Client};
use quill_core::{Options, QuillError, Result};

use crate::discovery::{Discovery, SelectMode};

/// A client over many servers.
///
/// Unicast calls pick one endpoint through the discovery policy;
/// [`BalancedClient::broadcast`] fans a call out to every endpoint at
/// once. Per-endpoint clients are dialed lazily and cached while they stay
/// available; an unavailable client is closed and evicted on the next use
/// of its endpoint.
pub struct BalancedClient<D: Discovery> {
    discovery: D,
    mode: SelectMode,
    opts: Options,
    clients: Mutex<HashMap<String, Client>>,
}

impl<D: Discovery> BalancedClient<D> {
    pub fn new(discovery: D, mode: SelectMode, opts: Options) -> Self {
        Self {
            discovery,
            mode,
            opts,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Calls `service_method` on one endpoint picked by the selection
    /// policy. No retry on a different endpoint; that is the caller's
    /// decision.
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let endpoint = self.discovery.get(self.mode).await?;
        self.call_endpoint(&endpoint, service_method, args).await
    }

    /// [`BalancedClient::call`] with a per-call deadline.
    pub async fn call_timeout<A, R>(
        &self,
        service_method: &str,
        args: &A,
        timeout: Duration,
    ) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let endpoint = self.discovery.get(self.mode).await?;
        let client = self.dial_cached(&endpoint).await?;
        client.call_timeout(service_method, args, timeout).await
    }

    /// Calls every known endpoint concurrently. The first failure becomes
    /// the result, but every branch still runs to completion before this
    /// returns. When every branch succeeds, one of the replies is
    /// returned.
    pub async fn broadcast<A, R>(&self, service_method: &str, args: A) -> Result<R>
    where
        A: Serialize + Send + Sync,
        R: DeserializeOwned + Send,
    {
        let servers = self.discovery.get_all().await?;
        let args = Arc::new(args);

        let mut branches = FuturesUnordered::new();
        for endpoint in servers {
            let args = Arc::clone(&args);
            branches.push(async move {
                let result: Result<R> = self
                    .call_endpoint(&endpoint, service_method, &*args)
                    .await;
                (endpoint, result)
            });
        }

        // drain the whole set; abandoning a branch mid-call could leave a
        // cached client's write half in an undefined state
        let mut reply: Option<R> = None;
        let mut first_err: Option<QuillError> = None;
        while let Some((endpoint, result)) = branches.next().await {
            match result {
                Ok(r) => {
                    if reply.is_none() {
                        reply = Some(r);
                    }
                }
                Err(e) => {
                    debug!(%endpoint, error = %e, "broadcast branch failed");
                    first_err.get_or_insert(e);
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => reply.ok_or(QuillError::NoAvailableServers),
        }
    }

    /// Closes and drops every cached client.
    pub async fn close(&self) -> Result<()> {
        let mut clients = self.clients.lock().await;
        for (endpoint, client) in clients.drain() {
            debug!(%endpoint, "closing cached client");
            let _ = client.close().await;
        }
        Ok(())
    }

    async fn call_endpoint<A, R>(&self, endpoint: &str, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let client = self.dial_cached(endpoint).await?;
        client.call(service_method, args).await
    }

    /// Returns the cached client for an endpoint, evicting it first if it
    /// went unavailable, and dialing a fresh one when none is cached.
    async fn dial_cached(&self, endpoint: &str) -> Result<Client> {
        let mut clients = self.clients.lock().await;

        if let Some(client) = clients.get(endpoint) {
            if client.is_available() {
                return Ok(client.clone());
            }
            debug!(%endpoint, "evicting unavailable client");
            if let Some(stale) = clients.remove(endpoint) {
                let _ = stale.close().await;
            }
        }

        let client = x_dial(endpoint, self.opts.clone()).await?;
        clients.insert(endpoint.to_string(), client.clone());
        Ok(client)
    }
}
