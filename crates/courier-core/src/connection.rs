//! Per-connection driver: wires one accepted socket to its two tasks.
//!
//! The write half goes to the writer task; this task becomes the reader.
//! The reader's first action is pushing the welcome frame, then it decodes
//! request envelopes in a loop and hands each to the dispatcher.  A
//! `tokio::select!` on the displacement signal lets a taken-over session
//! exit without touching shared state again.
//!
//! Leaving the read loop never abandons queued replies: the reader enqueues
//! a disconnect marker, so the writer flushes everything already in the
//! mailbox (a final error frame included) before sending FIN and switching
//! to offline mode.

use crate::dispatch::{self, Flow, SessionCtx};
use crate::server::ServerState;
use crate::session::{self, SessionHandle};
use crate::util::now_unix;
use courier_protocol::{FrameDecoder, encode_welcome, status};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::watch;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Drive one client connection to completion.
pub async fn run(stream: TcpStream, addr: SocketAddr, state: Arc<ServerState>) {
    let (read_half, write_half) = stream.into_split();
    let (handle, mailbox, shutdown) = SessionHandle::new();
    tokio::spawn(session::write_loop(
        write_half,
        mailbox,
        handle.connected_flag(),
        handle.offline_queue(),
    ));

    let mut ctx = SessionCtx::new(addr, handle.clone());
    if let Err(e) = read_loop(read_half, shutdown, &mut ctx, &state).await {
        debug!(%addr, error = %e, "session ended with error");
    }
    handle.finish().await;

    if let (Some(login), Some(channels)) = (&ctx.login, &state.channels) {
        channels.leave_all(login, &ctx.nick).await;
    }
    info!(%addr, login = ctx.login.as_deref().unwrap_or(""), "client disconnected");
}

async fn read_loop(
    mut read_half: OwnedReadHalf,
    mut shutdown: watch::Receiver<bool>,
    ctx: &mut SessionCtx,
    state: &ServerState,
) -> Result<(), ConnectionError> {
    let welcome = encode_welcome(&state.greeting, now_unix()).map_err(ConnectionError::Encode)?;
    ctx.handle.send(welcome).await;

    let mut decoder = FrameDecoder::new();
    let mut chunk = vec![0u8; 4096];
    loop {
        // Drain every complete envelope already buffered.
        loop {
            match decoder.next() {
                Ok(Some(envelope)) => {
                    match dispatch::dispatch(ctx, state, &envelope).await? {
                        Flow::Continue => {}
                        Flow::Close => return Ok(()),
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(addr = %ctx.addr, error = %e, "undecodable request stream");
                    ctx.push_err("unknown", status::INVALID_DATA, "Invalid request")?;
                    return Ok(());
                }
            }
        }

        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    debug!(addr = %ctx.addr, "session displaced");
                    return Ok(());
                }
            }
            read = read_half.read(&mut chunk) => {
                let n = read?;
                if n == 0 {
                    return Ok(());
                }
                decoder.extend(&chunk[..n]);
            }
        }
    }
}
