//! Broadcast server: everything the messenger does, plus named channels
//! with enter/leave/broadcast semantics.  The `Public` channel exists on
//! startup.

use courier_core::{Listener, ServerState};
use std::sync::Arc;

pub const DEFAULT_PORT: u16 = 7788;
pub const DEFAULT_GREETING: &str = "Welcome to the broadcast server!";

pub struct BroadcastConfig {
    pub bind_port: u16,
    pub greeting: String,
}

/// Fresh state with the channel engine and the seed channel.  Exposed for
/// the integration tests, which bind to an OS-assigned port.
pub async fn server_state(greeting: &str) -> Arc<ServerState> {
    Arc::new(ServerState::with_channels(greeting).await)
}

pub async fn run(config: BroadcastConfig) -> std::io::Result<()> {
    let state = server_state(&config.greeting).await;
    let listener = Listener::bind(config.bind_port, state).await?;
    listener.serve().await;
    Ok(())
}
