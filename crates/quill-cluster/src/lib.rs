//! Quill Cluster
//!
//! Discovery-aware, load-balanced access to a fleet of quill servers.
//!
//! # Components
//!
//! - [`StaticDiscovery`] - a hand-maintained endpoint list with random and
//!   round-robin selection
//! - [`RegistryDiscovery`] - the same selection policies over a list
//!   refreshed from a registry service
//! - [`BalancedClient`] - per-endpoint client cache with unicast by policy
//!   and fan-out broadcast
//!
//! Endpoints are `protocol@address` strings, e.g. `tcp@127.0.0.1:9001` or
//! `http@10.0.0.1:7001`.

pub mod balanced;
pub mod discovery;
pub mod registry_discovery;

pub use balanced::BalancedClient;
pub use discovery::{Discovery, SelectMode, StaticDiscovery};
pub use registry_discovery::RegistryDiscovery;
