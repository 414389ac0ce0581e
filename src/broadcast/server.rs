use super::message::{Envelope, MessageType};
use crate::events::{AppEvent, EventSubscription};
use crate::ids::ConnectionId;
use crate::server::reactor::Shutdown;
use crate::ws::{self, read_frame, write_frame, Frame, Opcode};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::rc::Rc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, info, warn};

/// Default per-peer outbound queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

struct Peer {
    tx: mpsc::Sender<Rc<str>>,
    addr: SocketAddr,
}

/// WebSocket endpoint fanning out application events.
///
/// The peer set lives on the reactor thread and is only touched there:
/// on handshake, on disconnect and in [`BroadcastServer::broadcast`].
pub struct BroadcastServer {
    peers: RefCell<HashMap<ConnectionId, Peer>>,
    queue_depth: usize,
}

/// Removes a peer from the set when its connection task ends.
struct PeerGuard {
    server: Rc<BroadcastServer>,
    id: ConnectionId,
}

impl Drop for PeerGuard {
    fn drop(&mut self) {
        let removed = self.server.peers.borrow_mut().remove(&self.id);
        if let Some(peer) = removed {
            info!(
                peer = %peer.addr,
                conn = %self.id,
                peers = self.server.peer_count(),
                "Broadcast peer left"
            );
        }
    }
}

impl BroadcastServer {
    pub fn new(queue_depth: usize) -> Self {
        Self {
            peers: RefCell::new(HashMap::new()),
            queue_depth: queue_depth.max(1),
        }
    }

    pub fn peer_count(&self) -> usize {
        self.peers.borrow().len()
    }

    /// Queue `{"type": .., "data": ..}` to every connected peer.
    ///
    /// Fire-and-forget: a peer whose queue is full misses this message.
    /// Returns the number of peers it was queued to.
    pub fn broadcast(&self, message_type: MessageType, data: &Value) -> usize {
        let peers = self.peers.borrow();
        if peers.is_empty() {
            debug!(message = %message_type, "No broadcast peers connected");
            return 0;
        }

        let text: Rc<str> = match Envelope::new(message_type, data.clone()).to_text() {
            Ok(text) => Rc::from(text),
            Err(e) => {
                error!(message = %message_type, error = %e, "Failed to encode broadcast");
                return 0;
            }
        };

        let mut queued = 0;
        for (id, peer) in peers.iter() {
            match peer.tx.try_send(Rc::clone(&text)) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(_)) => warn!(
                    peer = %peer.addr,
                    conn = %id,
                    message = %message_type,
                    "Broadcast peer is not keeping up; message dropped"
                ),
                Err(TrySendError::Closed(_)) => {
                    debug!(peer = %peer.addr, conn = %id, "Broadcast peer already closing")
                }
            }
        }
        debug!(message = %message_type, queued, peers = peers.len(), "Broadcast sent");
        queued
    }

    pub fn broadcast_event(&self, event: &AppEvent) -> usize {
        self.broadcast(event.message_type(), &event.broadcast_payload())
    }

    /// Accept peers and forward events until `shutdown` fires.
    ///
    /// Must be called inside a [`tokio::task::LocalSet`].
    pub async fn run(
        self: Rc<Self>,
        listener: TcpListener,
        mut events: Option<EventSubscription>,
        mut shutdown: Shutdown,
    ) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::from_std(listener)?;
        let addr = listener.local_addr()?;
        info!(addr = %addr, "Broadcast server listening");

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = Rc::clone(&self);
                        tokio::task::spawn_local(server.serve_peer(stream, peer));
                    }
                    Err(e) => {
                        warn!(error = %e, "Broadcast accept failed");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
                event = next_event(&mut events) => match event {
                    Some(event) => {
                        self.broadcast_event(&event);
                    }
                    None => {
                        debug!("Event bus closed; broadcast server keeps serving peers");
                        events = None;
                    }
                },
            }
        }

        info!(addr = %addr, "Broadcast server stopped");
        Ok(())
    }

    async fn serve_peer(self: Rc<Self>, mut stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = ws::accept(&mut stream).await {
            debug!(peer = %addr, error = %e, "WebSocket handshake failed");
            return;
        }

        let (tx, mut outbound) = mpsc::channel::<Rc<str>>(self.queue_depth);
        let id = ConnectionId::new();
        self.peers.borrow_mut().insert(id, Peer { tx, addr });
        info!(peer = %addr, conn = %id, peers = self.peer_count(), "Broadcast peer joined");
        let _guard = PeerGuard {
            server: Rc::clone(&self),
            id,
        };

        let (mut reader, mut writer) = stream.split();
        let (control_tx, mut control) = mpsc::unbounded_channel::<Frame>();

        // Client data frames are ignored; control frames are answered by the
        // write side so that reads are never cancelled mid-frame.
        let read_side = async move {
            loop {
                match read_frame(&mut reader).await {
                    Ok(frame) => match frame.opcode {
                        Opcode::Ping => {
                            if control_tx.send(Frame::pong(frame.payload)).is_err() {
                                return;
                            }
                        }
                        Opcode::Close => {
                            if control_tx.send(Frame::close(&frame.payload)).is_ok() {
                                std::future::pending::<()>().await;
                            }
                            return;
                        }
                        Opcode::Pong | Opcode::Text | Opcode::Binary | Opcode::Continuation => {}
                    },
                    Err(e) => {
                        debug!(peer = %addr, error = %e, "Broadcast peer read ended");
                        return;
                    }
                }
            }
        };

        let write_side = async {
            loop {
                tokio::select! {
                    frame = control.recv() => {
                        let Some(frame) = frame else { return };
                        let closing = frame.opcode == Opcode::Close;
                        if write_frame(&mut writer, &frame).await.is_err() || closing {
                            return;
                        }
                    }
                    text = outbound.recv() => {
                        let Some(text) = text else { return };
                        if let Err(e) = write_frame(&mut writer, &Frame::text(&text)).await {
                            debug!(peer = %addr, error = %e, "Broadcast write failed");
                            return;
                        }
                    }
                }
            }
        };

        tokio::select! {
            _ = read_side => {}
            _ = write_side => {}
        }
    }
}

async fn next_event(events: &mut Option<EventSubscription>) -> Option<AppEvent> {
    match events {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}
