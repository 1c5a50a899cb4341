//! Direct-messaging server: registration, authentication with takeover,
//! contacts, one-to-one messages with offline queueing.

use courier_core::{Listener, ServerState};
use std::sync::Arc;

pub const DEFAULT_PORT: u16 = 7777;
pub const DEFAULT_GREETING: &str = "Welcome to the messenger server!";

pub struct MessengerConfig {
    pub bind_port: u16,
    pub greeting: String,
}

/// Fresh state for one server instance.  Exposed for the integration tests,
/// which bind to an OS-assigned port.
pub fn server_state(greeting: &str) -> Arc<ServerState> {
    Arc::new(ServerState::new(greeting))
}

pub async fn run(config: MessengerConfig) -> std::io::Result<()> {
    let state = server_state(&config.greeting);
    let listener = Listener::bind(config.bind_port, state).await?;
    listener.serve().await;
    Ok(())
}
