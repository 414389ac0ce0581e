//! # Dispatcher Module
//!
//! Connection handling and handler invocation.
//!
//! ## Overview
//!
//! The dispatcher owns each accepted HTTP connection from the first read to
//! the final shutdown. It:
//! - Parses the request (one read, one request per connection)
//! - Resolves it against the [`Router`](crate::router::Router), answering 404/405 itself
//! - Converts typed path parameters and invokes the matched [`Handler`]
//! - Writes the reply, waits on a [`DeferredResponse`], or hands the socket to the SSE writer
//!
//! ## Handler Responses
//!
//! Handlers return a [`HandlerResponse`]:
//!
//! - `Ready` is written immediately.
//! - `Deferred` carries a pending network reply and a continuation. The
//!   connection stays open; the continuation runs on the reactor when the
//!   reply arrives. If the peer disconnects first the continuation is dropped
//!   without running. If the configured deadline passes first the client gets 408.
//! - `Stream` turns the connection into a Server-Sent Events stream.
//!
//! ## Error Handling
//!
//! - Malformed requests get 400 and are closed
//! - Handler errors and panics are caught, logged with the handler name and peer, and answered with 500
//! - A failing connection never affects the accept loop or other connections

mod core;
mod handler;

pub use core::{ConnectionState, DispatchSettings, Dispatcher, FALLBACK_VERSION};
pub use handler::{
    Continuation, DeferredResponse, Handler, HandlerFault, HandlerFn, HandlerResponse,
};
