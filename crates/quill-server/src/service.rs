use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use quill_core::{CodecKind, QuillError, Result};

type MethodFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send>>;
type MethodFn = Box<dyn Fn(Bytes, CodecKind) -> MethodFuture + Send + Sync>;

/// One callable unit of a service.
///
/// The registration closure hides the handler's concrete argument and reply
/// types behind a bytes-to-bytes interface: it decodes the argument with
/// the connection's codec, awaits the handler and encodes the reply. The
/// call counter is kept for the debug listing.
pub struct Method {
    handler: MethodFn,
    calls: AtomicU64,
}

impl Method {
    /// Runs the handler for one request. A panic inside the handler is
    /// caught and reported as a per-request error; it never crosses the
    /// dispatch boundary.
    pub async fn call(&self, body: Bytes, kind: CodecKind) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        match AssertUnwindSafe((self.handler)(body, kind)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(QuillError::Handler(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }

    pub fn num_calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// A named bundle of methods exposed over one `Service.Method` prefix.
///
/// Built with the builder pattern and handed to
/// [`Server::register`](crate::Server::register):
///
/// ```
/// use quill_server::Service;
///
/// let service = Service::new("Echo").method("Say", |text: String| async move {
///     Ok(text)
/// });
/// assert_eq!(service.name(), "Echo");
/// ```
pub struct Service {
    name: String,
    pub(crate) methods: HashMap<String, Arc<Method>>,
}

impl Service {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Registers a handler under `name`. The handler shape is the whole
    /// eligibility rule: one deserializable argument in, one serializable
    /// reply out, errors through [`QuillError`].
    pub fn method<A, R, F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let f = Arc::new(f);
        let handler = move |body: Bytes, kind: CodecKind| -> MethodFuture {
            let f = Arc::clone(&f);
            Box::pin(async move {
                let argv: A = kind.decode(&body)?;
                let reply = f(argv).await?;
                kind.encode(&reply)
            })
        };
        self.methods.insert(
            name.into(),
            Arc::new(Method {
                handler: Box::new(handler),
                calls: AtomicU64::new(0),
            }),
        );
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }
}
