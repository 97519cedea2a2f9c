//! Control API server.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::routes::router;
use crate::state::AppState;

/// A running control endpoint.
///
/// Binding is left to the caller so the listener can be taken before the
/// database is opened; holding it is what marks a process as the engine host.
pub struct ApiServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<io::Result<()>>,
}

impl ApiServer {
    /// Serve the router on `listener` in a background task.
    pub fn start(listener: TcpListener, state: Arc<AppState>) -> io::Result<Self> {
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let app = router(state);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
        });
        info!(%addr, "Control API listening");
        Ok(Self {
            addr,
            shutdown,
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Base URL for an [`ApiClient`](crate::ApiClient) talking to this server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting connections and wait for open requests to finish.
    /// Event streams only end once the engine's bus is cleared, so shut the
    /// engine down first.
    pub async fn stop(self) {
        self.shutdown.cancel();
        match self.handle.await {
            Ok(Ok(())) => info!(addr = %self.addr, "Control API stopped"),
            Ok(Err(e)) => warn!(addr = %self.addr, error = %e, "Control API exited with an error"),
            Err(e) => warn!(addr = %self.addr, error = %e, "Control API task aborted"),
        }
    }
}
