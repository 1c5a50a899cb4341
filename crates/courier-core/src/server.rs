//! Process-wide server state handed to every connection.

use crate::channels::ChannelSet;
use crate::directory::Directory;
use tokio::sync::Mutex;

/// One instance per server process, created at startup and passed explicitly
/// to every handler.  No hidden globals.
pub struct ServerState {
    /// All registry mutations are serialized behind this lock.
    pub directory: Mutex<Directory>,
    /// Present only in the broadcast server; the direct-messaging server
    /// ignores channel actions entirely.
    pub channels: Option<ChannelSet>,
    /// Text of the welcome frame pushed on accept.
    pub greeting: String,
}

impl ServerState {
    /// State for the direct-messaging server.
    pub fn new(greeting: &str) -> Self {
        Self {
            directory: Mutex::new(Directory::new()),
            channels: None,
            greeting: greeting.to_owned(),
        }
    }

    /// State for the broadcast server, with the seed `Public` channel.
    pub async fn with_channels(greeting: &str) -> Self {
        Self {
            directory: Mutex::new(Directory::new()),
            channels: Some(ChannelSet::with_public().await),
            greeting: greeting.to_owned(),
        }
    }
}
