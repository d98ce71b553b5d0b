use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuillError {
    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary encoding error: {0}")]
    Binary(#[from] postcard::Error),

    #[error("frame too large: {0} bytes (max {1} bytes)")]
    FrameTooLarge(usize, usize),

    #[error("service/method request ill-formed: {0}")]
    IllFormedServiceMethod(String),

    #[error("can't find service {0}")]
    ServiceNotFound(String),

    #[error("can't find method {0}")]
    MethodNotFound(String),

    #[error("service already defined: {0}")]
    DuplicateService(String),

    #[error("{0}")]
    Handler(String),

    #[error("request handle timeout: expect within {0:?}")]
    HandleTimeout(Duration),

    #[error("connect timeout: expect within {0:?}")]
    ConnectTimeout(Duration),

    #[error("call timed out after {0:?}")]
    CallTimeout(Duration),

    #[error("connection is shut down")]
    Shutdown,

    #[error("no available servers")]
    NoAvailableServers,

    #[error("unsupported select mode")]
    UnsupportedSelectMode,

    #[error("registry refresh failed: {0}")]
    Refresh(String),

    #[error("wrong endpoint format '{0}', expect protocol@addr")]
    InvalidEndpoint(String),

    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),
}

impl QuillError {
    /// True for errors that tear the whole connection down, as opposed to
    /// per-request failures the connection survives.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            QuillError::Handshake(_)
                | QuillError::Connection(_)
                | QuillError::Io(_)
                | QuillError::FrameTooLarge(_, _)
                | QuillError::Shutdown
        )
    }
}

pub type Result<T> = std::result::Result<T, QuillError>;
