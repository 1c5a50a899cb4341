//! Accept loop: one session per accepted connection.

use crate::connection;
use crate::server::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Listens for clients and spawns a connection driver for each.
pub struct Listener {
    listener: TcpListener,
    state: Arc<ServerState>,
}

impl Listener {
    /// Bind to `port` on all interfaces.  Pass port 0 to let the OS pick
    /// (useful in tests).
    pub async fn bind(port: u16, state: Arc<ServerState>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        info!(port = listener.local_addr()?.port(), "listening");
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop.  Never returns under normal operation.
    pub async fn serve(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!(%addr, "client connected");
                    tokio::spawn(connection::run(stream, addr, Arc::clone(&self.state)));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            }
        }
    }
}
