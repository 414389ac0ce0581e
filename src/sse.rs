//! # Server-Sent Events (SSE) Module
//!
//! A handler that wants to push events returns
//! [`HandlerResponse::Stream`](crate::dispatcher::HandlerResponse::Stream)
//! with the receiving half of a [`channel()`]. The connection dispatcher then
//! hands the socket to [`serve_stream`], which writes the preamble right away
//! and keeps writing frames until the stream finishes or the client leaves.
//!
//! ## Architecture
//!
//! - **[`SseSender`]**: producer side. `Clone + Send`, so events can be emitted from any thread
//! - **[`SseReceiver`]**: consumer side, owned by the streaming connection
//! - **[`channel()`]**: creates a new pair
//!
//! ## Usage
//!
//! ```rust,ignore
//! use yomu_server::sse;
//! use yomu_server::dispatcher::HandlerResponse;
//!
//! fn stream_updates(_req: HttpRequest) -> anyhow::Result<HandlerResponse> {
//!     let (sender, receiver) = sse::channel();
//!     std::thread::spawn(move || {
//!         for i in 0..3 {
//!             if sender.emit("PROGRESS", format!("{{\"step\":{i}}}")).is_err() {
//!                 return; // client went away
//!             }
//!         }
//!         sender.finish();
//!     });
//!     Ok(HandlerResponse::Stream(receiver))
//! }
//! ```
//!
//! ## Wire Format
//!
//! ```text
//! HTTP/1.1 200 OK
//! Content-Type: text/event-stream
//! Cache-Control: no-cache
//! Connection: keep-alive
//! Access-Control-Allow-Origin: *
//! Access-Control-Allow-Credentials: false
//!
//! event: LIBRARY_ADD
//! data: {"id":7}
//!
//! event: done
//! data:{}
//!
//! ```
//!
//! Dropping every sender without calling `finish()` also ends the stream
//! with the `done` frame.
//!
//! ## Backpressure
//!
//! The channel is bounded ([`DEFAULT_STREAM_DEPTH`] events unless created
//! with [`channel_with_depth`]). When a client stops reading, the queue fills
//! and further events are dropped with a warning instead of piling up.

use std::fmt;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

/// Events queued per stream before new ones are dropped.
pub const DEFAULT_STREAM_DEPTH: usize = 64;

/// Terminal frame written by `finish()`.
pub const DONE_FRAME: &str = "event: done\ndata:{}\n\n";

/// Returned by [`SseSender`] once the stream is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamClosed;

impl fmt::Display for StreamClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("event stream is closed")
    }
}

impl std::error::Error for StreamClosed {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Message { event: String, data: String },
    Done,
}

/// Sender side of an SSE stream.
#[derive(Clone, Debug)]
pub struct SseSender {
    tx: mpsc::Sender<SseEvent>,
}

impl SseSender {
    /// Queue one `event:`/`data:` frame. `data` is pre-serialized.
    ///
    /// A full queue drops the event and still returns `Ok`; only a closed
    /// stream is an error.
    pub fn emit(&self, event: impl Into<String>, data: impl Into<String>) -> Result<(), StreamClosed> {
        match self.tx.try_send(SseEvent::Message {
            event: event.into(),
            data: data.into(),
        }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(SseEvent::Message { event, .. })) => {
                warn!(event = %event, "SSE client is not keeping up; event dropped");
                Ok(())
            }
            Err(TrySendError::Full(SseEvent::Done)) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(StreamClosed),
        }
    }

    /// Queue the `done` sentinel; the connection closes after writing it.
    ///
    /// Consumes the sender. If the queue is full the sentinel is not queued,
    /// and the `done` frame follows the backlog once the last sender is gone.
    pub fn finish(self) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(SseEvent::Done) {
            debug!("SSE queue full; done frame follows the backlog");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the stream has been torn down.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}

/// Receiver side, owned by the streaming connection.
#[derive(Debug)]
pub struct SseReceiver {
    rx: mpsc::Receiver<SseEvent>,
}

impl SseReceiver {
    pub async fn recv(&mut self) -> Option<SseEvent> {
        self.rx.recv().await
    }

    /// Mark the stream closed so further `emit` calls fail.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Create a new SSE channel returning the sender and receiver halves.
pub fn channel() -> (SseSender, SseReceiver) {
    channel_with_depth(DEFAULT_STREAM_DEPTH)
}

/// Like [`channel()`] with an explicit queue depth (at least one).
pub fn channel_with_depth(depth: usize) -> (SseSender, SseReceiver) {
    let (tx, rx) = mpsc::channel(depth.max(1));
    (SseSender { tx }, SseReceiver { rx })
}

/// Response head written before any event.
pub fn preamble(version: &str) -> String {
    format!(
        "{version} 200 OK\r\n\
         Content-Type: text/event-stream\r\n\
         Cache-Control: no-cache\r\n\
         Connection: keep-alive\r\n\
         Access-Control-Allow-Origin: *\r\n\
         Access-Control-Allow-Credentials: false\r\n\
         \r\n"
    )
}

pub fn format_event(event: &str, data: &str) -> String {
    format!("event: {event}\ndata: {data}\n\n")
}

/// Drive one stream until it finishes or the client disconnects.
pub async fn serve_stream(mut stream: TcpStream, version: &str, mut rx: SseReceiver) {
    if write_flush(&mut stream, preamble(version).as_bytes()).await.is_err() {
        debug!("SSE client gone before preamble");
        rx.close();
        return;
    }
    info!("SSE stream opened");

    let mut frames = 0usize;
    let mut scratch = [0u8; 256];
    let (mut reader, mut writer) = stream.split();
    loop {
        tokio::select! {
            event = rx.recv() => {
                let (frame, last) = match event {
                    Some(SseEvent::Message { event, data }) => (format_event(&event, &data), false),
                    Some(SseEvent::Done) | None => (DONE_FRAME.to_string(), true),
                };
                if write_flush(&mut writer, frame.as_bytes()).await.is_err() {
                    debug!("SSE write failed; client gone");
                    break;
                }
                if last {
                    break;
                }
                frames += 1;
            }
            read = reader.read(&mut scratch) => match read {
                Ok(0) | Err(_) => {
                    debug!("SSE client disconnected");
                    break;
                }
                // Clients have nothing to say on an event stream.
                Ok(_) => {}
            }
        }
    }

    rx.close();
    drop(writer.shutdown().await);
    info!(frames, "SSE stream closed");
}

async fn write_flush<W: AsyncWrite + Unpin>(w: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    w.write_all(bytes).await?;
    w.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preamble_has_fixed_headers() {
        let p = preamble("HTTP/1.1");
        assert!(p.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(p.contains("Content-Type: text/event-stream\r\n"));
        assert!(p.contains("Cache-Control: no-cache\r\n"));
        assert!(p.contains("Connection: keep-alive\r\n"));
        assert!(p.contains("Access-Control-Allow-Origin: *\r\n"));
        assert!(p.contains("Access-Control-Allow-Credentials: false\r\n"));
        assert!(p.ends_with("\r\n\r\n"));
    }

    #[test]
    fn frames_use_event_and_data_lines() {
        assert_eq!(
            format_event("LIBRARY_ADD", r#"{"id":7}"#),
            "event: LIBRARY_ADD\ndata: {\"id\":7}\n\n"
        );
    }

    #[tokio::test]
    async fn emit_fails_after_receiver_closes() {
        let (tx, mut rx) = channel();
        tx.emit("A", "{}").unwrap();
        assert_eq!(
            rx.recv().await,
            Some(SseEvent::Message {
                event: "A".into(),
                data: "{}".into()
            })
        );
        rx.close();
        assert_eq!(tx.emit("B", "{}"), Err(StreamClosed));
        assert!(tx.is_closed());
    }

    #[tokio::test]
    async fn dropping_receiver_wakes_closed() {
        let (tx, rx) = channel();
        drop(rx);
        tx.closed().await;
        assert_eq!(tx.emit("A", "{}"), Err(StreamClosed));
    }

    #[tokio::test]
    async fn full_queue_drops_events_instead_of_growing() {
        let (tx, mut rx) = channel_with_depth(4);
        for i in 0..1000 {
            assert_eq!(tx.emit("TICK", format!("{{\"i\":{i}}}")), Ok(()));
        }
        drop(tx);

        let mut received = Vec::new();
        while let Some(event) = rx.recv().await {
            received.push(event);
        }
        assert_eq!(received.len(), 4);
        assert_eq!(
            received[3],
            SseEvent::Message {
                event: "TICK".into(),
                data: r#"{"i":3}"#.into()
            }
        );
    }

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (server, client)
    }

    async fn read_all(mut client: TcpStream) -> String {
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn finish_after_emit_writes_done_and_closes() {
        let (server, client) = socket_pair().await;
        let (tx, rx) = channel();
        tx.emit("A", r#"{"x":1}"#).unwrap();
        tx.finish();

        let ((), body) = tokio::join!(serve_stream(server, "HTTP/1.1", rx), read_all(client));
        assert!(body.starts_with(&preamble("HTTP/1.1")));
        assert!(body.ends_with("event: A\ndata: {\"x\":1}\n\nevent: done\ndata:{}\n\n"));
    }

    #[tokio::test]
    async fn dropping_every_sender_writes_done_and_closes() {
        let (server, client) = socket_pair().await;
        let (tx, rx) = channel();
        let second = tx.clone();
        tx.emit("A", "{}").unwrap();
        second.emit("B", "{}").unwrap();
        drop(tx);
        drop(second);

        let ((), body) = tokio::join!(serve_stream(server, "HTTP/1.0", rx), read_all(client));
        assert!(body.starts_with("HTTP/1.0 200 OK\r\n"));
        assert!(body.ends_with("event: A\ndata: {}\n\nevent: B\ndata: {}\n\nevent: done\ndata:{}\n\n"));
    }

    #[tokio::test]
    async fn stalled_reader_does_not_accumulate_events() {
        let (server, _client) = socket_pair().await;
        let (tx, rx) = channel_with_depth(8);
        let stream = tokio::spawn(serve_stream(server, "HTTP/1.1", rx));

        // 64 MiB of frames outruns the loopback buffers; the client never reads.
        let chunk = "x".repeat(64 * 1024);
        for _ in 0..1000 {
            assert_eq!(tx.emit("BIG", chunk.clone()), Ok(()));
            tokio::task::yield_now().await;
        }
        assert_eq!(tx.tx.capacity(), 0);
        assert_eq!(tx.tx.max_capacity(), 8);
        assert!(!tx.is_closed());
        stream.abort();
    }
}
