//! Message fan-out: direct sends, contact resolution, and address-book
//! import.
//!
//! Recipients are resolved by login through the directory at send time; a
//! session never holds a reference to another session.  The recipient's
//! writer decides between the transport and the offline queue, so delivery
//! here is a plain enqueue.

use crate::dispatch::SessionCtx;
use crate::server::ServerState;
use crate::util::now_unix;
use courier_protocol::{
    DirectMessageData, MessagePayload, ImportPayload, UserData, UserListData, encode_frame, status,
};

/// Route a `message` request: channel delivery when a channel id is present
/// and the channel engine exists, direct delivery otherwise.
pub async fn message(
    ctx: &SessionCtx,
    state: &ServerState,
    login: &str,
    payload: &MessagePayload,
) -> Result<(), serde_json::Error> {
    if let Some(channels) = &state.channels {
        if !payload.channel.is_empty() {
            if payload.body.is_empty() {
                return ctx.push_err("message", status::EMPTY_FIELD, "Body is empty");
            }
            return match channels.send(&payload.channel, login, &ctx.nick, &payload.body).await {
                Ok(()) => ctx.push_ok("message"),
                Err(e) => ctx.push_err("message", e.status(), &e.to_string()),
            };
        }
    }
    direct(ctx, state, login, payload).await
}

/// One-to-one send.  The sender gets an OK plus an echo of the exact frame
/// the recipient receives; a disconnected recipient accumulates the frame in
/// their offline queue.
async fn direct(
    ctx: &SessionCtx,
    state: &ServerState,
    login: &str,
    payload: &MessagePayload,
) -> Result<(), serde_json::Error> {
    if payload.body.is_empty() {
        return ctx.push_err("message", status::EMPTY_FIELD, "Body is empty");
    }
    let dir = state.directory.lock().await;
    if dir.user(&payload.uid).is_none() {
        drop(dir);
        return ctx.push_err("message", status::USER_NOT_FOUND, "Invalid user");
    }
    ctx.push_ok("message")?;
    let frame = encode_frame(
        "ev_message",
        &DirectMessageData {
            from: login.to_owned(),
            nick: ctx.nick.clone(),
            body: payload.body.clone(),
            time: now_unix(),
            attach: payload.attach.clone(),
        },
    )?;
    if let Some(target) = dir.session_of(&payload.uid) {
        target.enqueue(frame.clone());
    }
    ctx.handle.enqueue(frame);
    Ok(())
}

pub async fn contact_list(
    ctx: &SessionCtx,
    state: &ServerState,
    login: &str,
) -> Result<(), serde_json::Error> {
    let list = state.directory.lock().await.contact_list(login);
    ctx.push(
        "contactlist",
        &UserListData {
            list,
            status: status::OK,
            error: "OK".to_owned(),
        },
    )
}

/// Match each imported address-book entry against registered users: email
/// first, phone second.  Unmatched entries are skipped; matches carry the
/// caller-supplied `myid` back.
pub async fn import(
    ctx: &SessionCtx,
    state: &ServerState,
    payload: &ImportPayload,
) -> Result<(), serde_json::Error> {
    let list = {
        let dir = state.directory.lock().await;
        payload
            .contacts
            .iter()
            .filter_map(|contact| {
                dir.find_by_address(&contact.email, &contact.phone)
                    .map(|user| UserData {
                        uid: user.login.clone(),
                        nick: user.nick.clone(),
                        email: user.email.clone(),
                        phone: user.phone.clone(),
                        picture: user.avatar.clone(),
                        myid: (!contact.myid.is_empty()).then(|| contact.myid.clone()),
                    })
            })
            .collect()
    };
    ctx.push(
        "import",
        &UserListData {
            list,
            status: status::OK,
            error: "OK".to_owned(),
        },
    )
}
