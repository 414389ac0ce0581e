//! The single reactor thread.
//!
//! Every socket, the router, the handler groups and the broadcast peer set
//! live on one thread running a tokio `current_thread` runtime inside a
//! [`LocalSet`]. Shared state there is `Rc`/`RefCell`; nothing on this
//! thread takes a lock.
//!
//! Listeners are bound by the caller before the thread starts, so bind
//! errors come back synchronously and port `0` can be used in tests.

use std::future::Future;
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::LocalSet;
use tracing::{debug, error};

/// Shutdown signal observed by the servers on the reactor.
#[derive(Clone, Debug)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Resolves once stop was requested or the handle was dropped.
    pub async fn wait(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_requested(&self) -> bool {
        *self.rx.borrow()
    }
}

/// Handle to a running reactor thread.
///
/// Dropping the handle stops the reactor and joins its thread.
pub struct ReactorHandle {
    stop_tx: watch::Sender<bool>,
    thread: Option<JoinHandle<anyhow::Result<()>>>,
}

impl ReactorHandle {
    /// Ask the servers to stop accepting and exit.
    pub fn request_stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Request stop and wait for the reactor to finish.
    pub fn stop(mut self) -> anyhow::Result<()> {
        self.request_stop();
        self.join_inner()
    }

    /// Block until the reactor exits on its own (or after [`Self::request_stop`]).
    pub fn join(mut self) -> anyhow::Result<()> {
        self.join_inner()
    }

    fn join_inner(&mut self) -> anyhow::Result<()> {
        match self.thread.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow::anyhow!("reactor thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for ReactorHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.request_stop();
            if let Err(e) = self.join_inner() {
                error!(error = %e, "Reactor exited with error");
            }
        }
    }
}

/// Bind a listener ready to be moved onto the reactor.
pub fn bind<A: ToSocketAddrs>(addr: A) -> io::Result<TcpListener> {
    let addr = addr
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
    let listener = TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

/// Start a reactor thread running the future produced by `build`.
///
/// `build` runs on the reactor thread, so the future it returns may hold
/// `Rc` state and spawn with [`tokio::task::spawn_local`].
pub fn spawn_reactor<F, Fut>(name: &str, build: F) -> io::Result<ReactorHandle>
where
    F: FnOnce(Shutdown) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + 'static,
{
    let (stop_tx, stop_rx) = watch::channel(false);
    let thread = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || -> anyhow::Result<()> {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let local = LocalSet::new();
            let result = local.block_on(&runtime, build(Shutdown { rx: stop_rx }));
            debug!("Reactor finished");
            if let Err(e) = &result {
                error!(error = %e, "Reactor failed");
            }
            result
        })?;
    Ok(ReactorHandle {
        stop_tx,
        thread: Some(thread),
    })
}

/// Poll `addr` until it accepts connections.
///
/// # Errors
///
/// Returns `TimedOut` if nothing is listening after ~1s (200 attempts × 5ms).
pub fn wait_ready(addr: SocketAddr) -> io::Result<()> {
    for _ in 0..200 {
        if TcpStream::connect(addr).is_ok() {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(5));
    }
    Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
}
