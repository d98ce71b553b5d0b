//! Transport Layer
//!
//! Everything that touches bytes on the stream: the negotiated
//! [`CodecKind`](codec::CodecKind) that encodes individual values, and the
//! length-prefixed frame reader/writer the connection is built from.
//!
//! Wire format for every value: `[4-byte length as u32 big-endian] + [data]`.

pub mod codec;
pub mod frame;

pub use codec::{CodecKind, BINARY_CONTENT_TYPE, JSON_CONTENT_TYPE};
pub use frame::{BoxedReader, BoxedWriter, FrameReader, FrameWriter, MessageReader, MessageWriter};
