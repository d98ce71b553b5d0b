//! Quill Core Protocol and Transport
//!
//! This crate provides the shared protocol definitions and the frame
//! transport layer used by every other quill crate.
//!
//! # Wire Format
//!
//! A connection opens with a handshake frame and then carries any number of
//! interleaved header/body pairs:
//!
//! ```text
//! | Options (JSON) | Header 1 | Body 1 | Header 2 | Body 2 | ...
//! ```
//!
//! Every value travels as a frame: a 4-byte big-endian length prefix
//! followed by the payload. The `Options` frame is always JSON; everything
//! after it is encoded by the codec the handshake negotiated.
//!
//! # Components
//!
//! - [`protocol`] - `Options`, `Header`, protocol constants and [`QuillError`]
//! - [`transport`] - [`CodecKind`] plus the frame reader/writer pair
//!
//! # Example
//!
//! ```
//! use quill_core::{CodecKind, Header, Options};
//!
//! let opts = Options::default();
//! let kind = opts.validate().unwrap();
//! assert_eq!(kind, CodecKind::Binary);
//!
//! let header = Header { service_method: "Arith.Add".into(), seq: 1, error: String::new() };
//! let encoded = kind.encode(&header).unwrap();
//! let decoded: Header = kind.decode(&encoded).unwrap();
//! assert_eq!(header, decoded);
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::error::{QuillError, Result};
pub use protocol::{
    Header, Options, CONNECTED_STATUS, DEFAULT_DEBUG_PATH, DEFAULT_REGISTRY_PATH,
    DEFAULT_RPC_PATH, MAGIC_NUMBER, REGISTRY_SERVERS_HEADER, REGISTRY_SERVER_HEADER,
};
pub use transport::codec::{CodecKind, BINARY_CONTENT_TYPE, JSON_CONTENT_TYPE};
pub use transport::frame::{
    BoxedReader, BoxedWriter, FrameReader, FrameWriter, MessageReader, MessageWriter,
    MAX_FRAME_SIZE,
};
