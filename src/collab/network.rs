//! Outbound fetch seam.
//!
//! Handlers never perform I/O against remote sites themselves. They build a
//! [`NetworkRequest`], hand it to a [`Network`] and get back a
//! [`PendingReply`], a future that resolves on the reactor once the
//! collaborator (possibly on another thread) calls
//! [`ReplyCompleter::complete`].

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use url::Url;

/// Scheduling hint for the fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkRequest {
    pub url: Url,
    pub priority: Priority,
    pub headers: Vec<(String, String)>,
}

impl NetworkRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            priority: Priority::Normal,
            headers: Vec::new(),
        }
    }

    pub fn parse(url: &str) -> anyhow::Result<Self> {
        Ok(Self::new(Url::parse(url)?))
    }

    /// A `file://` request for a downloaded asset.
    pub fn local_file(path: &Path) -> anyhow::Result<Self> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        let url = Url::from_file_path(&absolute)
            .map_err(|_| anyhow::anyhow!("cannot build file url for {}", absolute.display()))?;
        Ok(Self::new(url))
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Outcome class of a finished fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyError {
    None,
    /// The operation was abandoned. Not a fault.
    Cancelled,
    Other(String),
}

impl fmt::Display for ReplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyError::None => f.write_str("no error"),
            ReplyError::Cancelled => f.write_str("operation cancelled"),
            ReplyError::Other(msg) => f.write_str(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkReply {
    url: Url,
    error: ReplyError,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl NetworkReply {
    pub fn ok(url: Url, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url,
            error: ReplyError::None,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn failed(url: Url, message: impl Into<String>) -> Self {
        Self {
            url,
            error: ReplyError::Other(message.into()),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn cancelled(url: Url) -> Self {
        Self {
            url,
            error: ReplyError::Cancelled,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn error(&self) -> &ReplyError {
        &self.error
    }

    pub fn is_ok(&self) -> bool {
        self.error == ReplyError::None
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn is_local_file(&self) -> bool {
        self.url.scheme() == "file"
    }
}

/// Producer half of a pending reply. `Send`, so it can cross threads.
#[derive(Debug)]
pub struct ReplyCompleter {
    url: Url,
    tx: oneshot::Sender<NetworkReply>,
}

impl ReplyCompleter {
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Deliver the reply. Silently discarded if the waiter is gone.
    pub fn complete(self, reply: NetworkReply) {
        drop(self.tx.send(reply));
    }

    /// True once the waiting connection has gone away.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Future resolving to the [`NetworkReply`].
///
/// If the completer is dropped without completing, the reply resolves as
/// [`ReplyError::Cancelled`].
#[derive(Debug)]
pub struct PendingReply {
    url: Url,
    state: PendingState,
}

#[derive(Debug)]
enum PendingState {
    Waiting(oneshot::Receiver<NetworkReply>),
    Ready(Option<NetworkReply>),
}

impl PendingReply {
    /// A reply that is already available.
    pub fn ready(reply: NetworkReply) -> Self {
        Self {
            url: reply.url.clone(),
            state: PendingState::Ready(Some(reply)),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Future for PendingReply {
    type Output = NetworkReply;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            PendingState::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(reply)) => Poll::Ready(reply),
                Poll::Ready(Err(_)) => Poll::Ready(NetworkReply::cancelled(this.url.clone())),
                Poll::Pending => Poll::Pending,
            },
            PendingState::Ready(reply) => Poll::Ready(
                reply
                    .take()
                    .unwrap_or_else(|| NetworkReply::cancelled(this.url.clone())),
            ),
        }
    }
}

/// Create a linked completer / pending pair for `url`.
pub fn pending(url: Url) -> (ReplyCompleter, PendingReply) {
    let (tx, rx) = oneshot::channel();
    (
        ReplyCompleter {
            url: url.clone(),
            tx,
        },
        PendingReply {
            url,
            state: PendingState::Waiting(rx),
        },
    )
}

/// The outbound fetch service.
pub trait Network: Send + Sync {
    fn handle_request(&self, request: NetworkRequest) -> PendingReply;
}
