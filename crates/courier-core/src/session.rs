//! Per-connection session state and the writer task.
//!
//! Every accepted connection gets a [`SessionHandle`] plus a writer task
//! draining the session's outbound mailbox.  While the session is connected
//! the writer writes and flushes each frame; once it is not, frames are
//! appended to the offline queue instead and replayed on the next successful
//! authentication.  The writer exits when the mailbox closes, which happens
//! naturally after the handle is dropped from the directory on takeover.
//!
//! Both queues are bounded.  The mailbox drops frames on overflow (with a
//! warning) rather than blocking a handler that may be holding the directory
//! lock; the offline queue drops the newest frame beyond its cap.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// Frames a writer task may buffer before enqueues start dropping.
pub const MAILBOX_CAPACITY: usize = 256;

/// Frames kept for a disconnected session before the newest are dropped.
pub const OFFLINE_CAPACITY: usize = 512;

/// What travels through the outbound mailbox.
#[derive(Debug)]
pub enum Outbound {
    /// Wire bytes of one complete frame.
    Frame(Vec<u8>),
    /// Flush everything enqueued so far, send FIN, and switch the writer to
    /// offline mode.  Enqueued by the reader on its way out so that a final
    /// error frame reaches the peer before the close.
    Disconnect,
}

type OfflineQueue = Arc<Mutex<VecDeque<Vec<u8>>>>;

/// Shared, cloneable reference to one session.  Stored in the directory
/// while the session is bound to a login; delivery resolves it there at
/// send time.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    outbound: mpsc::Sender<Outbound>,
    connected: Arc<AtomicBool>,
    offline: OfflineQueue,
    shutdown: Arc<watch::Sender<bool>>,
}

impl SessionHandle {
    /// Create the handle plus the receiving ends owned by the two tasks.
    pub fn new() -> (Self, mpsc::Receiver<Outbound>, watch::Receiver<bool>) {
        let (outbound, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = Self {
            outbound,
            connected: Arc::new(AtomicBool::new(true)),
            offline: Arc::new(Mutex::new(VecDeque::new())),
            shutdown: Arc::new(shutdown),
        };
        (handle, rx, shutdown_rx)
    }

    /// Non-blocking enqueue used by handlers, which may hold the directory
    /// lock.  On a full mailbox the frame is dropped.
    pub fn enqueue(&self, frame: Vec<u8>) {
        match self.outbound.try_send(Outbound::Frame(frame)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("outbound mailbox full, dropping frame");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("outbound mailbox closed, dropping frame");
            }
        }
    }

    /// Blocking enqueue for reader-task contexts that hold no locks.
    pub async fn send(&self, frame: Vec<u8>) {
        let _ = self.outbound.send(Outbound::Frame(frame)).await;
    }

    /// Flush pending frames, close the transport, and switch the writer to
    /// offline mode.
    pub async fn finish(&self) {
        let _ = self.outbound.send(Outbound::Disconnect).await;
    }

    /// Displace this session on takeover: stop queueing to the transport and
    /// tell its reader to exit.  The displaced reader makes no further state
    /// mutations; the writer drains into the offline queue until its mailbox
    /// closes.
    pub fn displace(&self) {
        self.connected.store(false, Ordering::Release);
        let _ = self.shutdown.send(true);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Whether two handles refer to the same session.
    pub fn same_session(&self, other: &SessionHandle) -> bool {
        self.outbound.same_channel(&other.outbound)
    }

    /// Take every queued offline frame, oldest first.
    pub fn take_offline(&self) -> Vec<Vec<u8>> {
        let mut queue = self.offline.lock().expect("offline queue poisoned");
        queue.drain(..).collect()
    }

    /// Adopt offline frames transferred from a displaced session.
    pub fn adopt_offline(&self, frames: Vec<Vec<u8>>) {
        let mut queue = self.offline.lock().expect("offline queue poisoned");
        for frame in frames {
            push_offline(&mut queue, frame);
        }
    }

    pub(crate) fn connected_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.connected)
    }

    pub(crate) fn offline_queue(&self) -> OfflineQueue {
        Arc::clone(&self.offline)
    }
}

fn push_offline(queue: &mut VecDeque<Vec<u8>>, frame: Vec<u8>) {
    if queue.len() >= OFFLINE_CAPACITY {
        warn!("offline queue full, dropping frame");
        return;
    }
    queue.push_back(frame);
}

/// Writer task: drain the mailbox for the life of the session.
///
/// A write failure flips the session to offline mode and the undelivered
/// frame is preserved in the offline queue.
pub async fn write_loop(
    half: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Outbound>,
    connected: Arc<AtomicBool>,
    offline: OfflineQueue,
) {
    let mut writer = BufWriter::new(half);
    while let Some(item) = rx.recv().await {
        match item {
            Outbound::Frame(frame) => {
                if connected.load(Ordering::Acquire) {
                    let written = async {
                        writer.write_all(&frame).await?;
                        writer.flush().await
                    }
                    .await;
                    if let Err(e) = written {
                        debug!(error = %e, "write failed, session now offline");
                        connected.store(false, Ordering::Release);
                        let mut queue = offline.lock().expect("offline queue poisoned");
                        push_offline(&mut queue, frame);
                    }
                } else {
                    let mut queue = offline.lock().expect("offline queue poisoned");
                    push_offline(&mut queue, frame);
                }
            }
            Outbound::Disconnect => {
                connected.store(false, Ordering::Release);
                let _ = writer.shutdown().await;
            }
        }
    }
}
