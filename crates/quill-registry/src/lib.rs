//! Quill Registry
//!
//! An HTTP service that keeps the fleet's membership: servers POST
//! heartbeats to stay listed, discovery GETs the live list, and entries
//! whose heartbeat went stale are swept on every query.
//!
//! # Surface
//!
//! Mounted on `/_rpc_/registry`:
//!
//! - `GET` answers 200 with the sorted, comma-joined live endpoints in the
//!   `x-rpc-servers` response header
//! - `POST` with an `x-rpc-server: <endpoint>` header upserts that
//!   endpoint; a missing header is a 500
//! - any other method is a 405
//!
//! [`heartbeat`] is the sender side: a background task POSTing every
//! period until the first failure.

pub mod heartbeat;
pub mod registry;

pub use heartbeat::heartbeat;
pub use registry::{Registry, DEFAULT_SERVER_TIMEOUT};
