use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use quill_core::{
    BoxedReader, BoxedWriter, CodecKind, FrameReader, FrameWriter, Header, MessageReader,
    MessageWriter, Options, QuillError, Result,
};

/// What the receiver hands back for one call.
enum Outcome {
    Reply(Bytes),
    Error(QuillError),
}

struct State {
    /// Next sequence number. Starts at 1; 0 never appears on the wire.
    seq: u64,
    pending: HashMap<u64, oneshot::Sender<Outcome>>,
    /// The user called `close`.
    closing: bool,
    /// The receiver died; set by `terminate_calls`.
    shutdown: bool,
}

struct Shared {
    kind: CodecKind,
    /// The sending lock. Held for the whole register-and-write of a
    /// request so frames from concurrent calls never interleave.
    writer: Mutex<MessageWriter>,
    /// The state lock. Never held across an await; in `terminate_calls`
    /// it nests inside the sending lock, in that order.
    state: StdMutex<State>,
}

/// A connection to one server, usable from many tasks concurrently.
///
/// Cloning is cheap and shares the connection. The client owns a
/// background receiver task that correlates responses to pending calls by
/// sequence number; the receiver terminating (end of stream or protocol
/// error) fails every pending call and marks the client unavailable.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    /// Performs the handshake on an already-connected stream and spawns
    /// the receiver. The Options frame is always JSON; everything after it
    /// uses the codec the options select.
    pub async fn new<S>(stream: S, opts: Options) -> Result<Client>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let kind = opts.validate()?;
        let (rd, wr) = tokio::io::split(stream);

        let mut frames_out = FrameWriter::new(Box::new(wr) as BoxedWriter);
        let payload = serde_json::to_vec(&opts)?;
        frames_out.write_frame(&payload).await?;
        frames_out.flush().await?;

        let shared = Arc::new(Shared {
            kind,
            writer: Mutex::new(MessageWriter::new(frames_out, kind)),
            state: StdMutex::new(State {
                seq: 1,
                pending: HashMap::new(),
                closing: false,
                shutdown: false,
            }),
        });

        let reader = MessageReader::new(FrameReader::new(Box::new(rd) as BoxedReader), kind);
        tokio::spawn(receive(Arc::clone(&shared), reader));

        Ok(Client { shared })
    }

    /// Issues a call without waiting for the reply. The request is on the
    /// wire when this returns; the [`CallHandle`] resolves to the reply.
    pub async fn go<A>(&self, service_method: &str, args: &A) -> Result<CallHandle>
    where
        A: Serialize + ?Sized,
    {
        let body = self.shared.kind.encode(args)?;

        // sending lock first, then the registration, so a terminating
        // receiver can never slip between the two
        let mut writer = self.shared.writer.lock().await;
        let (seq, rx) = self.register_call()?;
        let header = Header {
            service_method: service_method.to_string(),
            seq,
            error: String::new(),
        };
        if let Err(e) = writer.write_message(&header, &body).await {
            self.remove_call(seq);
            return Err(e);
        }
        drop(writer);

        Ok(CallHandle {
            seq,
            kind: self.shared.kind,
            rx: Some(rx),
            shared: Arc::clone(&self.shared),
        })
    }

    /// Issues a call and waits for the reply.
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.go(service_method, args).await?.done().await
    }

    /// Like [`Client::call`] with a deadline. On expiry the call is
    /// forgotten locally and the server's eventual response is drained and
    /// discarded; the client stays usable.
    pub async fn call_timeout<A, R>(
        &self,
        service_method: &str,
        args: &A,
        timeout: Duration,
    ) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let handle = self.go(service_method, args).await?;
        match tokio::time::timeout(timeout, handle.done()).await {
            Ok(result) => result,
            Err(_) => Err(QuillError::CallTimeout(timeout)),
        }
    }

    /// True until `close` is called or the receiver terminates.
    pub fn is_available(&self) -> bool {
        let state = self.shared.state.lock().unwrap();
        !state.closing && !state.shutdown
    }

    /// Closes the connection. A second close reports [`QuillError::Shutdown`].
    /// The receiver observes the resulting end of stream and fails any
    /// calls still pending.
    pub async fn close(&self) -> Result<()> {
        {
            let mut state = self.shared.state.lock().unwrap();
            if state.closing {
                return Err(QuillError::Shutdown);
            }
            state.closing = true;
        }
        let mut writer = self.shared.writer.lock().await;
        writer.shutdown().await
    }

    fn register_call(&self) -> Result<(u64, oneshot::Receiver<Outcome>)> {
        let mut state = self.shared.state.lock().unwrap();
        if state.closing || state.shutdown {
            return Err(QuillError::Shutdown);
        }
        let seq = state.seq;
        state.seq += 1;
        let (tx, rx) = oneshot::channel();
        state.pending.insert(seq, tx);
        Ok((seq, rx))
    }

    fn remove_call(&self, seq: u64) {
        self.shared.state.lock().unwrap().pending.remove(&seq);
    }
}

/// One in-flight call. Resolve it with [`CallHandle::done`]; dropping it
/// unresolved cancels the call locally.
pub struct CallHandle {
    seq: u64,
    kind: CodecKind,
    rx: Option<oneshot::Receiver<Outcome>>,
    shared: Arc<Shared>,
}

impl CallHandle {
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Waits for the response and decodes the reply. Fires exactly once
    /// per call on every terminal path: reply, per-request error, or
    /// connection teardown.
    pub async fn done<R: DeserializeOwned>(mut self) -> Result<R> {
        let rx = match self.rx.take() {
            Some(rx) => rx,
            None => return Err(QuillError::Shutdown),
        };
        match rx.await {
            Ok(Outcome::Reply(body)) => self.kind.decode(&body),
            Ok(Outcome::Error(e)) => Err(e),
            Err(_) => Err(QuillError::Shutdown),
        }
    }
}

impl Drop for CallHandle {
    fn drop(&mut self) {
        // cancellation path: forget the call so the receiver discards a
        // late response for this seq
        if let Ok(mut state) = self.shared.state.lock() {
            state.pending.remove(&self.seq);
        }
    }
}

/// The receive loop. Owns the read half; removes each response's pending
/// entry under the state lock but reads the body outside it, so `go` and
/// `close` stay unblocked during body transfer.
async fn receive(shared: Arc<Shared>, mut reader: MessageReader) {
    let err = loop {
        let header = match reader.read_header().await {
            Ok(Some(header)) => header,
            Ok(None) => break QuillError::Connection("connection closed".to_string()),
            Err(e) => break e,
        };

        let pending = shared.state.lock().unwrap().pending.remove(&header.seq);

        let body = match reader.read_body().await {
            Ok(body) => body,
            Err(e) => {
                if let Some(tx) = pending {
                    let _ = tx.send(Outcome::Error(QuillError::Connection(format!(
                        "reading body: {e}"
                    ))));
                }
                break e;
            }
        };

        match pending {
            // cancelled locally, or the request never finished sending;
            // the server answered anyway, so drain and drop the body
            None => {}
            Some(tx) => {
                let outcome = if header.error.is_empty() {
                    Outcome::Reply(body)
                } else {
                    Outcome::Error(QuillError::Handler(header.error))
                };
                let _ = tx.send(outcome);
            }
        }
    };

    debug!(error = %err, "receiver exiting");
    terminate_calls(&shared, err).await;
}

/// Fails every pending call and marks the client shut down. Takes the
/// sending lock before the state lock so no half-sent request can race the
/// teardown.
async fn terminate_calls(shared: &Shared, err: QuillError) {
    let _writer = shared.writer.lock().await;
    let mut state = shared.state.lock().unwrap();
    state.shutdown = true;
    let msg = err.to_string();
    for (_, tx) in state.pending.drain() {
        let _ = tx.send(Outcome::Error(QuillError::Connection(msg.clone())));
    }
}
