//! Quill Client
//!
//! The client half of the framework: one connection carries many
//! interleaved calls, correlated by sequence number. A background receiver
//! task demultiplexes responses back to their callers.
//!
//! # Usage
//!
//! ```no_run
//! use quill_client::dial;
//! use quill_core::Options;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct AddArgs { num1: i64, num2: i64 }
//!
//! # #[tokio::main]
//! # async fn main() -> quill_core::Result<()> {
//! let client = dial("127.0.0.1:9999", Options::default()).await?;
//! let sum: i64 = client.call("Arith.Add", &AddArgs { num1: 1, num2: 2 }).await?;
//! assert_eq!(sum, 3);
//! # Ok(())
//! # }
//! ```
//!
//! [`Client::go`] is the non-blocking primitive behind [`Client::call`];
//! it returns a [`CallHandle`] that resolves to the typed reply. Dropping
//! an unresolved handle cancels the call locally: the pending entry is
//! removed and the eventual response is drained off the wire and
//! discarded.

pub mod client;
pub mod dial;

pub use client::{CallHandle, Client};
#[cfg(unix)]
pub use dial::dial_unix;
pub use dial::{dial, dial_http, x_dial};
