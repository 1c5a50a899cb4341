//! Named broadcast channels for the broadcast server.
//!
//! Each channel owns a fan-out task pulling from its own mailbox and
//! forwarding every frame to each member session's mailbox.  The order the
//! fan-out task applies is the channel's total order: every member observes
//! enter/leave events and messages in the same sequence.
//!
//! Channels are never destroyed.  A member that disconnects is removed by
//! the connection's leave-all pass; a member whose mailbox has gone away is
//! simply skipped by the fan-out.

use crate::session::{MAILBOX_CAPACITY, SessionHandle};
use courier_protocol::{
    ChannelEventData, ChannelInfo, ChannelMessageData, encode_frame, fingerprint, status,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("Empty field")]
    EmptyField,
    #[error("Channel already exists")]
    AlreadyExists,
    #[error("Channel not found")]
    NotFound,
    #[error("Not in channel")]
    NotMember,
}

impl ChannelError {
    pub fn status(&self) -> i32 {
        match self {
            Self::EmptyField => status::EMPTY_FIELD,
            Self::AlreadyExists => status::ALREADY_EXIST,
            Self::NotFound => status::CHANNEL_NOT_FOUND,
            Self::NotMember => status::INVALID_CHANNEL,
        }
    }
}

struct Channel {
    id: String,
    name: String,
    descr: String,
    members: Mutex<HashMap<String, SessionHandle>>,
    feed: mpsc::Sender<Vec<u8>>,
}

impl Channel {
    fn spawn(name: &str, descr: &str) -> Arc<Self> {
        let (feed, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let channel = Arc::new(Self {
            id: fingerprint(name),
            name: name.to_owned(),
            descr: descr.to_owned(),
            members: Mutex::new(HashMap::new()),
            feed,
        });
        tokio::spawn(fan_out(Arc::clone(&channel), rx));
        channel
    }

    /// Hand a frame to the fan-out task.  Drop-on-overflow, same policy as
    /// the session mailboxes.
    fn push(&self, frame: Vec<u8>) {
        if self.feed.try_send(frame).is_err() {
            warn!(channel = %self.name, "channel mailbox full, dropping frame");
        }
    }
}

/// Fan-out task: forward every queued frame to all current members.
async fn fan_out(channel: Arc<Channel>, mut rx: mpsc::Receiver<Vec<u8>>) {
    while let Some(frame) = rx.recv().await {
        let members = channel.members.lock().await;
        for member in members.values() {
            member.enqueue(frame.clone());
        }
    }
    debug!(channel = %channel.name, "fan-out task finished");
}

/// The set of named channels, keyed by channel id.
#[derive(Default)]
pub struct ChannelSet {
    channels: Mutex<HashMap<String, Arc<Channel>>>,
}

impl ChannelSet {
    /// Channel set pre-seeded with the public channel every client may join.
    pub async fn with_public() -> Self {
        let set = Self::default();
        set.create("Public", "Public channel")
            .await
            .expect("seeding an empty channel set cannot collide");
        set
    }

    /// Create a channel named `name`; its id is the name's fingerprint.
    pub async fn create(&self, name: &str, descr: &str) -> Result<String, ChannelError> {
        if name.is_empty() {
            return Err(ChannelError::EmptyField);
        }
        let id = fingerprint(name);
        let mut channels = self.channels.lock().await;
        if channels.contains_key(&id) {
            return Err(ChannelError::AlreadyExists);
        }
        channels.insert(id.clone(), Channel::spawn(name, descr));
        Ok(id)
    }

    pub async fn list(&self) -> Vec<ChannelInfo> {
        let channels = self.channels.lock().await;
        let mut infos = Vec::with_capacity(channels.len());
        for channel in channels.values() {
            infos.push(ChannelInfo {
                chid: channel.id.clone(),
                name: channel.name.clone(),
                descr: channel.descr.clone(),
                online: channel.members.lock().await.len(),
            });
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Join a channel.  The member is inserted before the `ev_enter` frame
    /// is enqueued, so the joiner sees their own entry event.  Re-entering
    /// is a success with no repeated broadcast.
    pub async fn enter(
        &self,
        chid: &str,
        login: &str,
        nick: &str,
        session: &SessionHandle,
    ) -> Result<(), ChannelError> {
        if chid.is_empty() {
            return Err(ChannelError::EmptyField);
        }
        let channel = self.get(chid).await.ok_or(ChannelError::NotFound)?;
        {
            let mut members = channel.members.lock().await;
            if members.contains_key(login) {
                return Ok(());
            }
            members.insert(login.to_owned(), session.clone());
        }
        if let Ok(frame) = encode_frame(
            "ev_enter",
            &ChannelEventData {
                chid: channel.id.clone(),
                uid: login.to_owned(),
                nick: nick.to_owned(),
            },
        ) {
            channel.push(frame);
        }
        Ok(())
    }

    /// Leave one channel, or every joined channel when `chid` is `"*"`.
    ///
    /// Removal is unconditional: leaving a channel that was never joined
    /// (or does not exist) is a success.  The `ev_leave` event goes to the
    /// remaining members only.
    pub async fn leave(&self, chid: &str, login: &str, nick: &str) -> Result<(), ChannelError> {
        if chid.is_empty() {
            return Err(ChannelError::EmptyField);
        }
        if chid == "*" {
            self.leave_all(login, nick).await;
            return Ok(());
        }
        if let Some(channel) = self.get(chid).await {
            Self::remove_member(&channel, login, nick).await;
        }
        Ok(())
    }

    /// Drop `login` from every channel, announcing each departure.  Used by
    /// wildcard leave and by the connection teardown.
    pub async fn leave_all(&self, login: &str, nick: &str) {
        let channels: Vec<Arc<Channel>> = self.channels.lock().await.values().cloned().collect();
        for channel in channels {
            Self::remove_member(&channel, login, nick).await;
        }
    }

    /// Broadcast a message to a channel the sender has joined.
    pub async fn send(
        &self,
        chid: &str,
        from: &str,
        nick: &str,
        body: &str,
    ) -> Result<(), ChannelError> {
        if chid.is_empty() {
            return Err(ChannelError::EmptyField);
        }
        let channel = self.get(chid).await.ok_or(ChannelError::NotFound)?;
        if !channel.members.lock().await.contains_key(from) {
            return Err(ChannelError::NotMember);
        }
        if let Ok(frame) = encode_frame(
            "ev_message",
            &ChannelMessageData {
                chid: channel.id.clone(),
                from: from.to_owned(),
                nick: nick.to_owned(),
                body: body.to_owned(),
            },
        ) {
            channel.push(frame);
        }
        Ok(())
    }

    async fn get(&self, chid: &str) -> Option<Arc<Channel>> {
        self.channels.lock().await.get(chid).cloned()
    }

    async fn remove_member(channel: &Arc<Channel>, login: &str, nick: &str) {
        let was_member = channel.members.lock().await.remove(login).is_some();
        if !was_member {
            return;
        }
        if let Ok(frame) = encode_frame(
            "ev_leave",
            &ChannelEventData {
                chid: channel.id.clone(),
                uid: login.to_owned(),
                nick: nick.to_owned(),
            },
        ) {
            channel.push(frame);
        }
    }
}
