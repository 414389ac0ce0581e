use crate::collab::network::{NetworkReply, PendingReply};
use crate::server::{HttpRequest, HttpResponse};
use crate::sse::SseReceiver;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

/// Signature every route handler implements.
pub type HandlerFn = dyn Fn(HttpRequest) -> anyhow::Result<HandlerResponse>;

/// A named, cheaply clonable route handler.
///
/// The name only exists for diagnostics: fault logs carry it so a 500 can be
/// traced back to the code that raised it.
#[derive(Clone)]
pub struct Handler {
    name: Rc<str>,
    func: Rc<HandlerFn>,
}

impl Handler {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: Fn(HttpRequest) -> anyhow::Result<HandlerResponse> + 'static,
    {
        Self {
            name: Rc::from(name),
            func: Rc::new(func),
        }
    }

    /// Bind a method of a shared handler group.
    ///
    /// ```rust,ignore
    /// Handler::bind("get_manga", &group, MangaHandler::get_manga)
    /// ```
    pub fn bind<T: 'static>(
        name: &str,
        target: &Rc<T>,
        method: fn(&T, HttpRequest) -> anyhow::Result<HandlerResponse>,
    ) -> Self {
        let target = Rc::clone(target);
        Self::new(name, move |req| method(&target, req))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run the handler. Errors and panics both come back as [`HandlerFault`].
    pub fn invoke(&self, request: HttpRequest) -> Result<HandlerResponse, HandlerFault> {
        catch_fault(|| (self.func)(request))
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler").field("name", &self.name).finish()
    }
}

/// What a handler hands back to the connection dispatcher.
pub enum HandlerResponse {
    /// Reply now.
    Ready(HttpResponse),
    /// Reply once an outstanding fetch completes.
    Deferred(DeferredResponse),
    /// Keep the socket open as an event stream.
    Stream(SseReceiver),
}

impl From<HttpResponse> for HandlerResponse {
    fn from(response: HttpResponse) -> Self {
        HandlerResponse::Ready(response)
    }
}

impl From<DeferredResponse> for HandlerResponse {
    fn from(deferred: DeferredResponse) -> Self {
        HandlerResponse::Deferred(deferred)
    }
}

impl fmt::Debug for HandlerResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerResponse::Ready(r) => f.debug_tuple("Ready").field(&r.status).finish(),
            HandlerResponse::Deferred(d) => f.debug_tuple("Deferred").field(d).finish(),
            HandlerResponse::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Continuation run on the reactor once the deferred fetch completes.
///
/// Anything the continuation needs beyond the request and the reply (the
/// source, the chapter, the page) is captured by the closure.
pub type Continuation = Box<dyn FnOnce(&HttpRequest, NetworkReply) -> anyhow::Result<HttpResponse>>;

/// A reply that waits on an external operation.
pub struct DeferredResponse {
    request: HttpRequest,
    pending: PendingReply,
    continuation: Continuation,
}

impl DeferredResponse {
    pub fn new<F>(request: HttpRequest, pending: PendingReply, continuation: F) -> Self
    where
        F: FnOnce(&HttpRequest, NetworkReply) -> anyhow::Result<HttpResponse> + 'static,
    {
        Self {
            request,
            pending,
            continuation: Box::new(continuation),
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub(crate) fn into_parts(self) -> (HttpRequest, PendingReply, Continuation) {
        (self.request, self.pending, self.continuation)
    }

    /// Wait for the operation and run the continuation.
    ///
    /// The dispatcher races this against disconnect and timeout itself; this
    /// is the plain form for callers that do not need that.
    pub async fn resolve(self) -> Result<HttpResponse, HandlerFault> {
        let (request, pending, continuation) = self.into_parts();
        let reply = pending.await;
        run_continuation(continuation, &request, reply)
    }
}

impl fmt::Debug for DeferredResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredResponse")
            .field("path", &self.request.path)
            .field("url", &self.pending.url().as_str())
            .finish()
    }
}

pub(crate) fn run_continuation(
    continuation: Continuation,
    request: &HttpRequest,
    reply: NetworkReply,
) -> Result<HttpResponse, HandlerFault> {
    catch_fault(move || continuation(request, reply))
}

/// A failure raised by application code, sync or deferred.
#[derive(Debug)]
pub enum HandlerFault {
    Error(anyhow::Error),
    Panic(String),
}

impl fmt::Display for HandlerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerFault::Error(e) => write!(f, "{e:#}"),
            HandlerFault::Panic(msg) => write!(f, "panicked: {msg}"),
        }
    }
}

impl std::error::Error for HandlerFault {}

fn catch_fault<T>(f: impl FnOnce() -> anyhow::Result<T>) -> Result<T, HandlerFault> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(HandlerFault::Error(e)),
        Err(payload) => Err(HandlerFault::Panic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
