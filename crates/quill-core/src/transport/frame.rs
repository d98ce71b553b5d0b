use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::error::{QuillError, Result};
use crate::protocol::Header;
use crate::transport::codec::CodecKind;

/// Frames larger than this are rejected outright.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Read half of a connection, type-erased so TCP and Unix streams share one
/// code path.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of a connection.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Reads length-prefixed frames off a byte stream.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads the next frame. `Ok(None)` marks a clean end of stream: EOF
    /// before the first length byte. EOF anywhere inside a frame is an
    /// error, since the peer quit mid-message.
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>> {
        let mut len_buf = [0u8; 4];
        let mut filled = 0;
        while filled < len_buf.len() {
            let n = self.inner.read(&mut len_buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(QuillError::Connection(
                    "stream closed mid-frame".to_string(),
                ));
            }
            filled += n;
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(QuillError::FrameTooLarge(len, MAX_FRAME_SIZE));
        }

        let mut buf = vec![0u8; len];
        self.inner.read_exact(&mut buf).await?;
        Ok(Some(Bytes::from(buf)))
    }
}

/// Writes length-prefixed frames onto a byte stream.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn write_frame(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > MAX_FRAME_SIZE {
            return Err(QuillError::FrameTooLarge(data.len(), MAX_FRAME_SIZE));
        }
        self.inner.write_all(&(data.len() as u32).to_be_bytes()).await?;
        self.inner.write_all(data).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.inner.flush().await?;
        Ok(())
    }

    /// Closes the write direction; the peer observes a clean end of stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}

/// Read side of a negotiated connection: frames decoded as header/body
/// pairs by the handshake's codec.
pub struct MessageReader {
    frames: FrameReader<BoxedReader>,
    kind: CodecKind,
}

impl MessageReader {
    pub fn new(frames: FrameReader<BoxedReader>, kind: CodecKind) -> Self {
        Self { frames, kind }
    }

    pub fn kind(&self) -> CodecKind {
        self.kind
    }

    /// Decodes the next header; `Ok(None)` at a clean end of stream.
    pub async fn read_header(&mut self) -> Result<Option<Header>> {
        match self.frames.read_frame().await? {
            None => Ok(None),
            Some(frame) => Ok(Some(self.kind.decode(&frame)?)),
        }
    }

    /// Returns the raw body frame that follows a header. Callers decode it
    /// with the codec, or drop it to discard the value. A body frame must
    /// be consumed even for error responses; the placeholder keeps the
    /// frame stream aligned.
    pub async fn read_body(&mut self) -> Result<Bytes> {
        self.frames
            .read_frame()
            .await?
            .ok_or_else(|| QuillError::Connection("stream closed before body".to_string()))
    }
}

/// Write side of a negotiated connection. A header/body pair leaves as one
/// unit; callers serialize access (the server's send lock, the client's
/// sending lock) so pairs never interleave on the wire.
pub struct MessageWriter {
    frames: FrameWriter<BoxedWriter>,
    kind: CodecKind,
}

impl MessageWriter {
    pub fn new(frames: FrameWriter<BoxedWriter>, kind: CodecKind) -> Self {
        Self { frames, kind }
    }

    pub fn kind(&self) -> CodecKind {
        self.kind
    }

    /// Encodes the header, writes header and body frames back to back and
    /// flushes. Any write failure also closes the write direction: a peer
    /// that saw half a message must not see another.
    pub async fn write_message(&mut self, header: &Header, body: &[u8]) -> Result<()> {
        let encoded = self.kind.encode(header)?;
        let result = self.write_pair(&encoded, body).await;
        if result.is_err() {
            let _ = self.frames.shutdown().await;
        }
        result
    }

    async fn write_pair(&mut self, header: &[u8], body: &[u8]) -> Result<()> {
        self.frames.write_frame(header).await?;
        self.frames.write_frame(body).await?;
        self.frames.flush().await
    }

    /// Closes the write direction. The peer's reader observes a clean end
    /// of stream at the next frame boundary.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.frames.shutdown().await
    }
}
