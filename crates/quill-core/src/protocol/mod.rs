//! Protocol Definitions
//!
//! The handshake descriptor ([`Options`]), the per-message [`Header`], the
//! protocol constants shared by both sides of a connection, and the
//! [`QuillError`](error::QuillError) type everything in the workspace
//! reports failures with.

pub mod error;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::codec::{CodecKind, BINARY_CONTENT_TYPE};
use error::{QuillError, Result};

/// Marks the first frame of every quill connection.
pub const MAGIC_NUMBER: u64 = 0x7a736b;

/// HTTP path a client CONNECTs to when reaching the server over an HTTP hop.
pub const DEFAULT_RPC_PATH: &str = "/_rpc_";

/// HTTP path of the plain-text service listing.
pub const DEFAULT_DEBUG_PATH: &str = "/debug/rpc";

/// HTTP path the registry service is mounted on.
pub const DEFAULT_REGISTRY_PATH: &str = "/_rpc_/registry";

/// Status a server answers a successful CONNECT with. The full status line
/// on the wire is `HTTP/1.0 200 Connected to RPC` followed by a blank line.
pub const CONNECTED_STATUS: &str = "200 Connected to RPC";

/// Response header carrying the comma-joined live server list.
pub const REGISTRY_SERVERS_HEADER: &str = "x-rpc-servers";

/// Request header carrying the endpoint a heartbeat registers.
pub const REGISTRY_SERVER_HEADER: &str = "x-rpc-server";

/// Default time budget for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-connection handshake, exchanged once before any request.
///
/// Always encoded as JSON regardless of the codec it negotiates; the field
/// names below are part of the wire protocol. Timeouts travel as integer
/// nanoseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Options {
    #[serde(rename = "MagicNumber")]
    pub magic_number: u64,
    /// Content type of the codec used for the rest of the connection.
    #[serde(rename = "CodecType")]
    pub codec_type: String,
    /// Time budget for dialing; zero means unbounded. Used by clients.
    #[serde(rename = "ConnectTimeout", with = "duration_nanos")]
    pub connect_timeout: Duration,
    /// Per-request handler budget; zero means unbounded. Used by servers.
    #[serde(rename = "HandleTimeout", with = "duration_nanos")]
    pub handle_timeout: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            magic_number: MAGIC_NUMBER,
            codec_type: BINARY_CONTENT_TYPE.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            handle_timeout: Duration::ZERO,
        }
    }
}

impl Options {
    pub fn with_codec(mut self, kind: CodecKind) -> Self {
        self.codec_type = kind.content_type().to_string();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_handle_timeout(mut self, timeout: Duration) -> Self {
        self.handle_timeout = timeout;
        self
    }

    /// Checks the magic number and resolves the codec tag. Both ends run
    /// this before touching the rest of the stream; failure is fatal to the
    /// connection.
    pub fn validate(&self) -> Result<CodecKind> {
        if self.magic_number != MAGIC_NUMBER {
            return Err(QuillError::Handshake(format!(
                "invalid magic number {:#x}",
                self.magic_number
            )));
        }
        CodecKind::from_content_type(&self.codec_type).ok_or_else(|| {
            QuillError::Handshake(format!("invalid codec type {}", self.codec_type))
        })
    }
}

/// Per-message metadata preceding every body frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Header {
    /// Dotted `Service.Method` name the request addresses.
    pub service_method: String,
    /// Client-assigned sequence number, starting at 1. 0 means "no call".
    pub seq: u64,
    /// Empty on success; the failure message otherwise. A response with a
    /// non-empty error carries a zero-length body placeholder.
    pub error: String,
}

mod duration_nanos {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_nanos() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_nanos(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::codec::JSON_CONTENT_TYPE;

    #[test]
    fn test_default_options_validate() {
        let opts = Options::default();
        assert_eq!(opts.magic_number, MAGIC_NUMBER);
        assert_eq!(opts.validate().unwrap(), CodecKind::Binary);
        assert_eq!(opts.connect_timeout, Duration::from_secs(10));
        assert_eq!(opts.handle_timeout, Duration::ZERO);
    }

    #[test]
    fn test_options_wire_field_names() {
        let opts = Options::default().with_connect_timeout(Duration::from_secs(1));
        let json = serde_json::to_string(&opts).unwrap();
        assert!(json.contains("\"MagicNumber\":8024939"));
        assert!(json.contains("\"CodecType\":\"application/gob\""));
        assert!(json.contains("\"ConnectTimeout\":1000000000"));
        assert!(json.contains("\"HandleTimeout\":0"));

        let back: Options = serde_json::from_str(&json).unwrap();
        assert_eq!(back, opts);
    }

    #[test]
    fn test_options_bad_magic_rejected() {
        let opts = Options {
            magic_number: 0xdead,
            ..Options::default()
        };
        match opts.validate() {
            Err(QuillError::Handshake(msg)) => assert!(msg.contains("magic number")),
            other => panic!("expected handshake error, got {:?}", other),
        }
    }

    #[test]
    fn test_options_unknown_codec_rejected() {
        let opts = Options {
            codec_type: "application/xml".to_string(),
            ..Options::default()
        };
        match opts.validate() {
            Err(QuillError::Handshake(msg)) => assert!(msg.contains("codec type")),
            other => panic!("expected handshake error, got {:?}", other),
        }
    }

    #[test]
    fn test_options_builder() {
        let opts = Options::default()
            .with_codec(CodecKind::Json)
            .with_handle_timeout(Duration::from_secs(3));
        assert_eq!(opts.codec_type, JSON_CONTENT_TYPE);
        assert_eq!(opts.validate().unwrap(), CodecKind::Json);
        assert_eq!(opts.handle_timeout, Duration::from_secs(3));
    }
}
