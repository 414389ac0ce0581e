//! The WebSocket broadcast endpoint.
//!
//! A second listener, independent of the HTTP one, that pushes every
//! application event to all connected clients as a JSON text frame:
//!
//! ```text
//! {"type": "LIBRARY_ADD", "data": {"id": 7, ...}}
//! ```
//!
//! Delivery is fire-and-forget. There are no acknowledgements or retries,
//! and nothing is queued past each peer's bounded outbound queue.

mod message;
mod server;

pub use message::{Envelope, MessageType};
pub use server::{BroadcastServer, DEFAULT_QUEUE_DEPTH};
