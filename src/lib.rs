//! # yomu-server
//!
//! Embedded web surface for a manga reader: an HTTP API with deferred
//! replies and server-sent events, plus a push-only WebSocket endpoint that
//! fans application events out to every connected client.
//!
//! ## Architecture
//!
//! - **[`router`]** - Route template compilation and ordered matching
//! - **[`server`]** - Request parsing, response encoding, the reactor and the HTTP accept loop
//! - **[`dispatcher`]** - Per-connection state machine: parse, route, invoke, reply
//! - **[`sse`]** - Server-sent event streams
//! - **[`ws`]** / **[`broadcast`]** - RFC 6455 framing and the broadcast server
//! - **[`events`]** - Typed application events and the bus that carries them
//! - **[`handlers`]** - The HTTP API as handler groups
//! - **[`collab`]** - Seams to the store, the sources, the fetcher, the updater and the downloader
//! - **[`app`]** - Both endpoints on one reactor
//! - **[`config`]** / **[`logging`]** / **[`cli`]** - Settings, tracing setup and the binary's commands
//!
//! ## Runtime Model
//!
//! Everything that touches a socket runs on one reactor thread (a tokio
//! `current_thread` runtime inside a `LocalSet`). Handlers must not block:
//! work that leaves the process goes through [`collab::Network`], whose
//! completion comes back to the reactor as a [`collab::PendingReply`].
//!
//! ```text
//!  accept ─► read ─► parse ─► route ─► handler ─┬─ Ready ────────► write, close
//!                      │         │               ├─ Deferred ─► await reply ─► continuation ─► write, close
//!                      400     404/405           └─ Stream ───► SSE frames until done/disconnect
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use yomu_server::app::YomuServer;
//! use yomu_server::config::ServerConfig;
//! use yomu_server::handlers::Services;
//!
//! let config = ServerConfig::default();
//! let handle = YomuServer::start(&config, Services::reference(&config)?)?;
//! println!("http on {}, ws on {}", handle.http_addr(), handle.ws_addr());
//! handle.join()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod app;
pub mod broadcast;
pub mod cli;
pub mod collab;
pub mod config;
pub mod dispatcher;
pub mod events;
pub mod handlers;
pub mod ids;
pub mod logging;
pub mod models;
pub mod router;
pub mod server;
pub mod sse;
pub mod static_files;
pub mod ws;

pub use app::{AppHandle, YomuServer};
pub use config::ServerConfig;
pub use ids::ConnectionId;
