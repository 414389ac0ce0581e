//! Server lifecycle: both endpoints on one reactor.
//!
//! ```text
//!            EventBus ──► BroadcastServer (ws_port)
//!                 ▲
//! HttpServer (http_port) ──► handler groups ──► collaborators
//! ```
//!
//! The WebSocket listener is bound before the HTTP listener, and a bind
//! failure on either is returned before the reactor starts.

use crate::broadcast::BroadcastServer;
use crate::collab::{DirDownloader, HttpFetcher, MemoryLibrary, MemorySources, NullUpdater};
use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::events::EventBus;
use crate::handlers::{build_router, Services, WebContext};
use crate::server::{bind, spawn_reactor, HttpServer, ReactorHandle};
use std::io;
use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::Arc;
use tracing::info;

impl Services {
    /// Self-contained collaborators: an in-memory store with no sources, the
    /// reference fetcher, and downloads under `data_dir`.
    pub fn reference(config: &ServerConfig) -> io::Result<Self> {
        let bus = EventBus::default();
        Ok(Self {
            library: Arc::new(MemoryLibrary::new(bus.clone())),
            sources: Arc::new(MemorySources::new(bus.clone())),
            network: Arc::new(HttpFetcher::new(config.fetch_workers, config.fetch_timeout())?),
            updater: Arc::new(NullUpdater),
            downloader: Arc::new(DirDownloader::new(config.data_dir.clone())),
            bus,
        })
    }
}

pub struct YomuServer;

impl YomuServer {
    /// Bind both endpoints and start serving.
    ///
    /// # Errors
    ///
    /// Returns an error if either address is invalid or cannot be bound.
    pub fn start(config: &ServerConfig, services: Services) -> io::Result<AppHandle> {
        let ws_listener = bind(config.ws_addr())?;
        let http_listener = bind(config.http_addr())?;
        let ws_addr = ws_listener.local_addr()?;
        let http_addr = http_listener.local_addr()?;
        info!(http = %http_addr, ws = %ws_addr, "Listeners bound");

        let web = WebContext {
            static_dir: config.static_dir.clone(),
            http_port: http_addr.port(),
            ws_port: ws_addr.port(),
        };
        let settings = config.dispatch_settings();
        let queue_depth = config.broadcast_queue_depth;
        let events = services.bus.subscribe();

        let reactor = spawn_reactor("yomu-reactor", move |shutdown| async move {
            let router = build_router(&services, &web)?;
            let http = HttpServer::new(Dispatcher::new(router, settings));
            let broadcast = Rc::new(BroadcastServer::new(queue_depth));
            let (http_result, ws_result) = tokio::join!(
                http.serve(http_listener, shutdown.clone()),
                broadcast.run(ws_listener, Some(events), shutdown),
            );
            http_result.and(ws_result)
        })?;

        Ok(AppHandle {
            http_addr,
            ws_addr,
            reactor,
        })
    }
}

/// Handle to the running endpoints. Dropping it stops them.
pub struct AppHandle {
    http_addr: SocketAddr,
    ws_addr: SocketAddr,
    reactor: ReactorHandle,
}

impl AppHandle {
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn ws_addr(&self) -> SocketAddr {
        self.ws_addr
    }

    /// Wait until both endpoints accept connections.
    pub fn wait_ready(&self) -> io::Result<()> {
        crate::server::reactor::wait_ready(self.ws_addr)?;
        crate::server::reactor::wait_ready(self.http_addr)
    }

    /// Ask both endpoints to stop without waiting.
    pub fn request_stop(&self) {
        self.reactor.request_stop();
    }

    pub fn stop(self) -> anyhow::Result<()> {
        info!(http = %self.http_addr, ws = %self.ws_addr, "Stopping");
        self.reactor.stop()
    }

    pub fn join(self) -> anyhow::Result<()> {
        self.reactor.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> ServerConfig {
        ServerConfig {
            http_port: 0,
            ws_port: 0,
            bind_address: "127.0.0.1".into(),
            ..ServerConfig::default()
        }
    }

    #[test]
    fn starts_both_endpoints_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            data_dir: dir.path().to_path_buf(),
            fetch_workers: 1,
            ..local_config()
        };
        let handle = YomuServer::start(&config, Services::reference(&config).unwrap()).unwrap();
        assert_ne!(handle.http_addr().port(), 0);
        assert_ne!(handle.ws_addr().port(), handle.http_addr().port());
        handle.wait_ready().unwrap();
        handle.stop().unwrap();
    }

    #[test]
    fn ws_port_in_use_fails_before_start() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = ServerConfig {
            ws_port: taken.local_addr().unwrap().port(),
            fetch_workers: 1,
            ..local_config()
        };
        let result = YomuServer::start(&config, Services::reference(&config).unwrap());
        assert!(result.is_err());
    }
}
