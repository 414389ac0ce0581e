//! Per-connection state machine.
//!
//! ```text
//! AwaitingRequest --parse ok--> Dispatching --ready--------> Replied
//!        |                          |--deferred--> AwaitingCompletion --> Replied | Closed
//!        |                          '--stream----> Streaming
//!        '--parse fail--> Replied (400)
//! ```
//!
//! One request per connection: after a reply is written the socket is shut
//! down. Handler errors and panics, sync or inside a deferred continuation,
//! are answered with 500 and never reach the accept loop.

use super::handler::{run_continuation, DeferredResponse, Handler, HandlerFault, HandlerResponse};
use crate::ids::ConnectionId;
use crate::router::{Resolution, Router};
use crate::server::{HttpRequest, HttpResponse, ParseError, StatusCode};
use crate::sse;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Status line version for replies written before a request was parsed.
pub const FALLBACK_VERSION: &str = "HTTP/1.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingRequest,
    Dispatching,
    AwaitingCompletion,
    Streaming,
    Replied,
    Closed,
}

/// Tunables for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Answer 408 when a deferred reply takes longer than this. `None` waits forever.
    pub deferred_timeout: Option<Duration>,
    /// Size of the single read a request must fit in.
    pub max_request_bytes: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            deferred_timeout: Some(Duration::from_secs(30)),
            max_request_bytes: 64 * 1024,
        }
    }
}

/// How a deferred wait ended.
enum Completion {
    Reply(crate::collab::network::NetworkReply),
    PeerGone,
    TimedOut,
}

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    state: ConnectionState,
}

impl Connection {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            state: ConnectionState::AwaitingRequest,
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!(from = ?self.state, to = ?next, "Connection state");
        self.state = next;
    }

    async fn reply(&mut self, response: &HttpResponse, version: &str) {
        let bytes = response.encode(version);
        let written = async {
            self.stream.write_all(&bytes).await?;
            self.stream.flush().await?;
            self.stream.shutdown().await
        }
        .await;
        match written {
            Ok(()) => {
                debug!(status = response.status.code(), bytes = bytes.len(), "Reply written");
                self.transition(ConnectionState::Replied);
            }
            Err(e) => {
                debug!(error = %e, "Reply write failed; peer gone");
                self.transition(ConnectionState::Closed);
            }
        }
    }

    /// Resolves when the peer closes its side or the socket errors.
    async fn peer_closed(&mut self) {
        let mut scratch = [0u8; 256];
        loop {
            match self.stream.read(&mut scratch).await {
                Ok(0) | Err(_) => return,
                Ok(_) => continue,
            }
        }
    }
}

/// Drives accepted sockets through parse, route, invoke and reply.
pub struct Dispatcher {
    router: Router,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(router: Router, settings: DispatchSettings) -> Self {
        info!(
            routes = router.routes().len(),
            deferred_timeout = ?settings.deferred_timeout,
            max_request_bytes = settings.max_request_bytes,
            "Dispatcher ready"
        );
        Self { router, settings }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Serve one accepted connection to completion.
    pub async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let span = info_span!("connection", conn = %ConnectionId::new(), peer = %peer);
        self.drive(Connection::new(stream, peer)).instrument(span).await
    }

    async fn drive(&self, mut conn: Connection) {
        let mut buf = vec![0u8; self.settings.max_request_bytes.max(1)];
        let n = match conn.stream.read(&mut buf).await {
            Ok(0) => {
                debug!("Peer closed before sending a request");
                conn.transition(ConnectionState::Closed);
                return;
            }
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "Read failed");
                conn.transition(ConnectionState::Closed);
                return;
            }
        };

        let mut request = match HttpRequest::parse(&buf[..n]) {
            Ok(request) => request,
            Err(err) => {
                self.reject(&mut conn, &err).await;
                return;
            }
        };
        drop(buf);
        conn.transition(ConnectionState::Dispatching);

        let version = request.version_string();
        let (handler, params) = match self.router.resolve_method(request.method, &request.path) {
            Resolution::NotFound => {
                debug!(method = %request.method, path = %request.path, "No route matched");
                conn.reply(&HttpResponse::new(StatusCode::NotFound), &version).await;
                return;
            }
            Resolution::MethodNotAllowed { route } => {
                debug!(
                    method = %request.method,
                    path = %request.path,
                    template = %route.template(),
                    "Method not allowed"
                );
                conn.reply(&HttpResponse::new(StatusCode::MethodNotAllowed), &version)
                    .await;
                return;
            }
            Resolution::Matched { route, handler } => {
                let params = if route.has_path_params() {
                    route.get_params(&request.path).map(Some)
                } else {
                    Ok(None)
                };
                (handler.clone(), params)
            }
        };

        match params {
            Ok(Some(params)) => request.set_path_params(params),
            Ok(None) => {}
            Err(err) => {
                error!(handler = %handler.name(), peer = %conn.peer, error = %err, "Path parameter conversion failed");
                conn.reply(&HttpResponse::new(StatusCode::InternalServerError), &version)
                    .await;
                return;
            }
        }

        info!(method = %request.method, path = %request.path, handler = %handler.name(), "Dispatching");
        match handler.invoke(request) {
            Ok(HandlerResponse::Ready(response)) => conn.reply(&response, &version).await,
            Ok(HandlerResponse::Deferred(deferred)) => {
                self.await_deferred(&mut conn, &handler, deferred, &version).await
            }
            Ok(HandlerResponse::Stream(rx)) => {
                conn.transition(ConnectionState::Streaming);
                sse::serve_stream(conn.stream, &version, rx).await;
            }
            Err(fault) => self.fault(&mut conn, &handler, &fault, &version).await,
        }
    }

    async fn reject(&self, conn: &mut Connection, err: &ParseError) {
        warn!(peer = %conn.peer, error = %err, "Malformed request");
        conn.reply(&HttpResponse::new(StatusCode::BadRequest), FALLBACK_VERSION)
            .await;
    }

    async fn fault(&self, conn: &mut Connection, handler: &Handler, fault: &HandlerFault, version: &str) {
        error!(handler = %handler.name(), peer = %conn.peer, error = %fault, "Handler failed");
        conn.reply(&HttpResponse::new(StatusCode::InternalServerError), version)
            .await;
    }

    async fn await_deferred(
        &self,
        conn: &mut Connection,
        handler: &Handler,
        deferred: DeferredResponse,
        version: &str,
    ) {
        conn.transition(ConnectionState::AwaitingCompletion);
        let (request, pending, continuation) = deferred.into_parts();
        debug!(handler = %handler.name(), url = %pending.url(), "Awaiting deferred reply");

        let deadline = self.settings.deferred_timeout;
        let completion = tokio::select! {
            reply = pending => Completion::Reply(reply),
            _ = conn.peer_closed() => Completion::PeerGone,
            _ = sleep_or_forever(deadline) => Completion::TimedOut,
        };

        match completion {
            Completion::Reply(reply) => match run_continuation(continuation, &request, reply) {
                Ok(response) => conn.reply(&response, version).await,
                Err(fault) => self.fault(conn, handler, &fault, version).await,
            },
            Completion::PeerGone => {
                debug!(handler = %handler.name(), "Peer left while awaiting deferred reply; discarding");
                conn.transition(ConnectionState::Closed);
            }
            Completion::TimedOut => {
                warn!(
                    handler = %handler.name(),
                    peer = %conn.peer,
                    timeout = ?deadline,
                    "Deferred reply timed out"
                );
                conn.reply(&HttpResponse::new(StatusCode::RequestTimeout), version)
                    .await;
            }
        }
    }
}

async fn sleep_or_forever(duration: Option<Duration>) {
    match duration {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}
