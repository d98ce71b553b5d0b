use std::future::Future;
use std::sync::Mutex;

use rand::Rng;

use quill_core::{QuillError, Result};

/// Load-balancing policy for picking one endpoint out of many.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectMode {
    /// Uniform random choice.
    Random,
    /// `servers[i % n]`, then advance `i`. Each discovery instance starts
    /// at a random position so a fleet of fresh clients does not hammer
    /// the same server first.
    RoundRobin,
}

/// How endpoints are found and picked. [`StaticDiscovery`] is the
/// hand-maintained flavor; [`RegistryDiscovery`](crate::RegistryDiscovery)
/// refreshes from a registry service.
pub trait Discovery: Send + Sync + 'static {
    /// Re-fetches the endpoint list from wherever it originates. A no-op
    /// for hand-maintained lists.
    fn refresh(&self) -> impl Future<Output = Result<()>> + Send;

    /// Replaces the endpoint list.
    fn update(&self, servers: Vec<String>) -> impl Future<Output = Result<()>> + Send;

    /// Picks one endpoint by policy.
    fn get(&self, mode: SelectMode) -> impl Future<Output = Result<String>> + Send;

    /// Returns every known endpoint.
    fn get_all(&self) -> impl Future<Output = Result<Vec<String>>> + Send;
}

struct ListState {
    servers: Vec<String>,
    /// Round-robin cursor.
    index: usize,
}

/// Discovery over a list the caller maintains; `refresh` has nothing to do.
pub struct StaticDiscovery {
    state: Mutex<ListState>,
}

impl StaticDiscovery {
    pub fn new(servers: Vec<String>) -> Self {
        let index = rand::thread_rng().gen_range(0..i32::MAX as usize - 1);
        Self {
            state: Mutex::new(ListState { servers, index }),
        }
    }

    pub(crate) fn pick(&self, mode: SelectMode) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let n = state.servers.len();
        if n == 0 {
            return Err(QuillError::NoAvailableServers);
        }
        match mode {
            SelectMode::Random => {
                let i = rand::thread_rng().gen_range(0..n);
                Ok(state.servers[i].clone())
            }
            SelectMode::RoundRobin => {
                let server = state.servers[state.index % n].clone();
                state.index = (state.index + 1) % n;
                Ok(server)
            }
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<String> {
        self.state.lock().unwrap().servers.clone()
    }

    pub(crate) fn set_servers(&self, servers: Vec<String>) {
        self.state.lock().unwrap().servers = servers;
    }
}

impl Discovery for StaticDiscovery {
    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    async fn update(&self, servers: Vec<String>) -> Result<()> {
        self.set_servers(servers);
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String> {
        self.pick(mode)
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        Ok(self.snapshot())
    }
}
