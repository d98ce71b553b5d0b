//! Quill Server
//!
//! The server half of the framework: a registry of named services whose
//! methods are typed async handlers, and the per-connection engine that
//! reads requests, dispatches them concurrently and writes responses
//! without ever interleaving bytes on the wire.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use quill_server::{Server, Service};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct AddArgs { num1: i64, num2: i64 }
//!
//! # #[tokio::main]
//! # async fn main() -> quill_core::Result<()> {
//! let server = Arc::new(Server::new());
//! server.register(
//!     Service::new("Arith").method("Add", |args: AddArgs| async move {
//!         Ok(args.num1 + args.num2)
//!     }),
//! )?;
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:9999").await?;
//! server.accept(listener).await;
//! # Ok(())
//! # }
//! ```

pub mod http;
pub mod server;
pub mod service;

pub use http::{accept_http, serve_http};
pub use server::Server;
pub use service::{Method, Service};
