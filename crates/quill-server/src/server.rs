use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use quill_core::{
    BoxedReader, BoxedWriter, CodecKind, FrameReader, FrameWriter, Header, MessageReader,
    MessageWriter, Options, QuillError, Result,
};

use crate::service::{Method, Service};

/// The RPC server: a unique-by-name map of services plus the engine that
/// runs one connection to completion.
///
/// Connections arrive as already-accepted byte streams; [`Server::accept`]
/// is the TCP front door and [`serve_http`](crate::http::serve_http) the
/// HTTP CONNECT one, but both end up in [`Server::serve_conn`].
pub struct Server {
    services: RwLock<HashMap<String, Arc<Service>>>,
}

impl Server {
    pub fn new() -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a service to the server. Registering two services under the
    /// same name is an error.
    pub fn register(&self, service: Service) -> Result<()> {
        let mut services = self.services.write().unwrap();
        let name = service.name().to_string();
        if services.contains_key(&name) {
            return Err(QuillError::DuplicateService(name));
        }
        services.insert(name, Arc::new(service));
        Ok(())
    }

    /// Resolves a dotted `Service.Method` name. The split is on the LAST
    /// dot, so service names may themselves be dotted paths. Ill-formed
    /// names, unknown services and unknown methods are three distinct
    /// errors, all reported per-request.
    fn find_method(&self, service_method: &str) -> Result<Arc<Method>> {
        let (service_name, method_name) = service_method
            .rsplit_once('.')
            .ok_or_else(|| QuillError::IllFormedServiceMethod(service_method.to_string()))?;

        let services = self.services.read().unwrap();
        let service = services
            .get(service_name)
            .ok_or_else(|| QuillError::ServiceNotFound(service_name.to_string()))?;
        service
            .methods
            .get(method_name)
            .cloned()
            .ok_or_else(|| QuillError::MethodNotFound(method_name.to_string()))
    }

    /// Plain-text listing of registered services, their methods and call
    /// counts, served on the debug path.
    pub fn debug_summary(&self) -> String {
        let services = self.services.read().unwrap();
        let mut names: Vec<&String> = services.keys().collect();
        names.sort();

        let mut out = String::from("quill rpc services\n");
        for name in names {
            let service = &services[name];
            for method_name in service.method_names() {
                let calls = service.methods[&method_name].num_calls();
                out.push_str(&format!("{name}.{method_name}: {calls} calls\n"));
            }
        }
        out
    }

    /// Accepts connections in a loop, spawning one task per connection.
    /// Returns when the listener fails.
    pub async fn accept(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(%peer, "connection established");
                    let server = Arc::clone(&self);
                    tokio::spawn(async move { server.serve_conn(stream).await });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    return;
                }
            }
        }
    }

    /// Runs one connection to completion and closes the stream.
    ///
    /// Reads the Options frame, validates magic number and codec, then
    /// loops over header/body pairs until end of stream. A handshake
    /// failure aborts the connection without a response.
    pub async fn serve_conn<S>(self: Arc<Self>, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (rd, wr) = tokio::io::split(stream);
        let mut frames = FrameReader::new(Box::new(rd) as BoxedReader);

        let opts_frame = match frames.read_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "options frame read failed");
                return;
            }
        };
        let opts: Options = match serde_json::from_slice(&opts_frame) {
            Ok(opts) => opts,
            Err(e) => {
                warn!(error = %e, "options decode failed");
                return;
            }
        };
        let kind = match opts.validate() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(error = %e, "rejecting connection");
                return;
            }
        };

        let reader = MessageReader::new(frames, kind);
        let writer = MessageWriter::new(FrameWriter::new(Box::new(wr) as BoxedWriter), kind);
        self.serve_codec(reader, writer, kind, opts.handle_timeout).await;
    }

    /// The dispatch loop. Requests within one connection run concurrently;
    /// responses are serialized by the send lock around the writer. The
    /// loop exits on end of stream or a read failure and then waits for
    /// every in-flight handler before the stream closes.
    async fn serve_codec(
        self: Arc<Self>,
        mut reader: MessageReader,
        writer: MessageWriter,
        kind: CodecKind,
        handle_timeout: Duration,
    ) {
        let writer = Arc::new(Mutex::new(writer));
        let mut handlers = JoinSet::new();

        loop {
            let mut header = match reader.read_header().await {
                Ok(Some(header)) => header,
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "read header failed");
                    break;
                }
            };

            match self.find_method(&header.service_method) {
                Ok(method) => {
                    let body = match reader.read_body().await {
                        Ok(body) => body,
                        Err(e) => {
                            debug!(error = %e, "read body failed");
                            break;
                        }
                    };
                    let writer = Arc::clone(&writer);
                    handlers.spawn(handle_request(
                        method,
                        header,
                        body,
                        kind,
                        writer,
                        handle_timeout,
                    ));
                }
                Err(e) => {
                    // The body frame still has to come off the wire before
                    // the next header can be read.
                    if reader.read_body().await.is_err() {
                        break;
                    }
                    debug!(service_method = %header.service_method, error = %e, "dispatch failed");
                    header.error = e.to_string();
                    send_response(&writer, &header, &[]).await;
                }
            }
        }

        while handlers.join_next().await.is_some() {}
        // dropping the writer closes the stream
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

/// One request from dispatch to response.
///
/// The handler runs in a detached task and reports through a oneshot
/// channel; this dispatcher alone writes the response. With a handle
/// timeout, whichever of the channel and the timer fires first decides the
/// response, and a late handler finds its channel gone: it keeps running
/// but can never produce a second response frame.
async fn handle_request(
    method: Arc<Method>,
    mut header: Header,
    body: Bytes,
    kind: CodecKind,
    writer: Arc<Mutex<MessageWriter>>,
    handle_timeout: Duration,
) {
    let (called_tx, called_rx) = oneshot::channel();
    tokio::spawn(async move {
        let result = method.call(body, kind).await;
        // the dispatcher may have timed out and gone away
        let _ = called_tx.send(result);
    });

    let result = if handle_timeout.is_zero() {
        called_rx.await
    } else {
        tokio::select! {
            result = called_rx => result,
            _ = tokio::time::sleep(handle_timeout) => {
                header.error = QuillError::HandleTimeout(handle_timeout).to_string();
                send_response(&writer, &header, &[]).await;
                return;
            }
        }
    };

    match result {
        Ok(Ok(reply)) => send_response(&writer, &header, &reply).await,
        Ok(Err(e)) => {
            header.error = e.to_string();
            send_response(&writer, &header, &[]).await;
        }
        Err(_) => {
            header.error = "handler aborted".to_string();
            send_response(&writer, &header, &[]).await;
        }
    }
}

async fn send_response(writer: &Mutex<MessageWriter>, header: &Header, body: &[u8]) {
    let mut writer = writer.lock().await;
    if let Err(e) = writer.write_message(header, body).await {
        debug!(seq = header.seq, error = %e, "write response failed");
    }
}
