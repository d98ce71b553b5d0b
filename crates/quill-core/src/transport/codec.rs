use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::protocol::error::Result;

/// Content type tag of the default binary codec.
pub const BINARY_CONTENT_TYPE: &str = "application/gob";

/// Content type tag of the JSON codec.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Codec negotiated by the handshake for everything after the Options frame.
///
/// The binary codec (postcard) is the default; JSON is available for
/// debuggability. The enum is the registry of known tags; adding a format
/// means adding a variant and its two match arms.
///
/// # Example
///
/// ```
/// use quill_core::CodecKind;
///
/// let kind = CodecKind::from_content_type("application/json").unwrap();
/// let encoded = kind.encode(&42u32).unwrap();
/// let decoded: u32 = kind.decode(&encoded).unwrap();
/// assert_eq!(decoded, 42);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CodecKind {
    #[default]
    Binary,
    Json,
}

impl CodecKind {
    /// Resolves a handshake tag; `None` for unknown tags, which is fatal to
    /// the connection.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            BINARY_CONTENT_TYPE => Some(CodecKind::Binary),
            JSON_CONTENT_TYPE => Some(CodecKind::Json),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            CodecKind::Binary => BINARY_CONTENT_TYPE,
            CodecKind::Json => JSON_CONTENT_TYPE,
        }
    }

    /// Encode one value to its frame payload.
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>> {
        match self {
            CodecKind::Binary => Ok(postcard::to_allocvec(value)?),
            CodecKind::Json => Ok(serde_json::to_vec(value)?),
        }
    }

    /// Decode one value from a frame payload.
    pub fn decode<T: DeserializeOwned>(self, data: &[u8]) -> Result<T> {
        match self {
            CodecKind::Binary => Ok(postcard::from_bytes(data)?),
            CodecKind::Json => Ok(serde_json::from_slice(data)?),
        }
    }
}
