use super::reactor::Shutdown;
use crate::dispatcher::Dispatcher;
use std::net::TcpListener;
use std::rc::Rc;
use std::time::Duration;
use tracing::{info, warn};

/// Accept loop for the HTTP surface.
///
/// Each accepted socket is handed to the [`Dispatcher`] on its own local
/// task, so a slow or deferred request never holds up the next accept.
pub struct HttpServer {
    dispatcher: Rc<Dispatcher>,
}

impl HttpServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher: Rc::new(dispatcher),
        }
    }

    /// Run the accept loop on the current reactor until `shutdown` fires.
    ///
    /// Must be called inside a [`tokio::task::LocalSet`].
    pub async fn serve(self, listener: TcpListener, mut shutdown: Shutdown) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::from_std(listener)?;
        let addr = listener.local_addr()?;
        info!(addr = %addr, "HTTP server listening");

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let dispatcher = Rc::clone(&self.dispatcher);
                        tokio::task::spawn_local(async move {
                            dispatcher.handle_connection(stream, peer).await;
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                },
            }
        }

        info!(addr = %addr, "HTTP server stopped");
        Ok(())
    }
}
