// courier-core: Session and dispatch engine for the messaging service.
//
// One accepted TCP connection = one Session with a reader task and a writer
// task cooperating over a bounded outbound mailbox.  Handlers mutate the
// process-wide Directory behind a single async mutex and hand frames to
// Delivery, which resolves recipients by login at send time.  The broadcast
// server additionally wires in the channel engine.

pub mod channels;
pub mod connection;
pub mod delivery;
pub mod directory;
pub mod dispatch;
pub mod listener;
pub mod server;
pub mod session;
pub mod util;

pub use listener::Listener;
pub use server::ServerState;
