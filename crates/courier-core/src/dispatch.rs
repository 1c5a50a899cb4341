//! Request dispatch: one decoded envelope in, zero or more frames out.
//!
//! The dispatcher enforces the auth gate, performs the second (typed) decode
//! stage, and routes each request to its handler.  Handlers classify their
//! failures as recoverable (error frame, session stays open) or fatal
//! (error frame, then [`Flow::Close`]); registration and authentication
//! failures close, everything after the gate does not.

use crate::delivery;
use crate::server::ServerState;
use crate::session::SessionHandle;
use courier_protocol::{
    AuthOkData, ChannelCreatedData, ChannelListData, Envelope, Request, StatusData, UserInfoData,
    encode_frame, status,
};
use serde::Serialize;
use std::net::SocketAddr;
use tracing::{debug, warn};

/// What the connection loop should do after a request was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// Per-connection view handed to every handler: the session identity and
/// its outbound mailbox.
pub struct SessionCtx {
    pub addr: SocketAddr,
    pub handle: SessionHandle,
    /// Bound login; `None` until authentication succeeds.
    pub login: Option<String>,
    pub nick: String,
}

impl SessionCtx {
    pub fn new(addr: SocketAddr, handle: SessionHandle) -> Self {
        Self {
            addr,
            handle,
            login: None,
            nick: String::new(),
        }
    }

    /// Serialize and enqueue one `{action, data}` frame.
    pub fn push<T: Serialize>(&self, action: &str, data: &T) -> Result<(), serde_json::Error> {
        self.handle.enqueue(encode_frame(action, data)?);
        Ok(())
    }

    pub fn push_ok(&self, action: &str) -> Result<(), serde_json::Error> {
        self.push(action, &StatusData::ok())
    }

    pub fn push_err(&self, action: &str, code: i32, text: &str) -> Result<(), serde_json::Error> {
        debug!(addr = %self.addr, action, code, text, "request failed");
        self.push(action, &StatusData::err(code, text))
    }
}

pub async fn dispatch(
    ctx: &mut SessionCtx,
    state: &ServerState,
    envelope: &Envelope,
) -> Result<Flow, serde_json::Error> {
    let action = envelope.action.as_str();

    // Before a login is bound only register and auth are admitted; anything
    // else gets an error frame and the session keeps reading.
    if ctx.login.is_none() && action != "register" && action != "auth" {
        ctx.push_err(action, status::NEED_AUTH, "Need auth")?;
        return Ok(Flow::Continue);
    }

    // The direct-messaging server has no channel engine: its dispatcher
    // treats channel actions like any other unknown action.
    if state.channels.is_none()
        && matches!(action, "channellist" | "createchannel" | "enter" | "leave")
    {
        return Ok(Flow::Continue);
    }

    let request = match envelope.decode() {
        Ok(request) => request,
        Err(e) => {
            warn!(addr = %ctx.addr, action, error = %e, "invalid request payload");
            ctx.push_err(action, status::INVALID_DATA, "Invalid data")?;
            return Ok(Flow::Close);
        }
    };

    match request {
        Request::Register(p) => register(ctx, state, &p.login, &p.pass, &p.nick).await,
        Request::Auth(p) => auth(ctx, state, &p.login, &p.pass).await,
        // Unknown actions are ignored without a reply; clients rely on it.
        Request::Unknown => Ok(Flow::Continue),
        authed => {
            let Some(login) = ctx.login.clone() else {
                // Unreachable past the gate; ignore rather than guess.
                return Ok(Flow::Continue);
            };
            authed_request(ctx, state, &login, authed).await
        }
    }
}

async fn register(
    ctx: &mut SessionCtx,
    state: &ServerState,
    login: &str,
    pass: &str,
    nick: &str,
) -> Result<Flow, serde_json::Error> {
    if ctx.login.is_some() {
        ctx.push_err("register", status::ALREADY_REGISTER, "Already register")?;
        return Ok(Flow::Close);
    }
    let registered = state.directory.lock().await.register(login, pass, nick);
    if let Err(e) = registered {
        ctx.push_err("register", e.status(), &e.to_string())?;
        return Ok(Flow::Close);
    }
    ctx.push_ok("register")?;
    // A fresh registration logs straight in with the same credentials.
    auth(ctx, state, login, pass).await
}

async fn auth(
    ctx: &mut SessionCtx,
    state: &ServerState,
    login: &str,
    pass: &str,
) -> Result<Flow, serde_json::Error> {
    let bound = {
        let mut dir = state.directory.lock().await;
        match dir.authenticate(&ctx.handle, login, pass) {
            Err(e) => Err(e),
            Ok(outcome) => {
                ctx.login = Some(login.to_owned());
                ctx.nick = outcome.nick.clone();
                let reply = encode_frame(
                    "auth",
                    &AuthOkData {
                        sid: outcome.sid,
                        cid: login.to_owned(),
                        nick: outcome.nick,
                        status: status::OK,
                        error: "OK".to_owned(),
                    },
                )?;
                ctx.handle.enqueue(reply);
                // Replay the offline queue while still holding the directory
                // lock: no concurrent delivery can interleave, so replayed
                // frames precede anything sent from now on.
                for frame in ctx.handle.take_offline() {
                    ctx.handle.enqueue(frame);
                }
                Ok(())
            }
        }
    };
    match bound {
        Ok(()) => Ok(Flow::Continue),
        Err(e) => {
            ctx.push_err("auth", e.status(), &e.to_string())?;
            Ok(Flow::Close)
        }
    }
}

async fn authed_request(
    ctx: &mut SessionCtx,
    state: &ServerState,
    login: &str,
    request: Request,
) -> Result<Flow, serde_json::Error> {
    match request {
        Request::SetUserInfo(p) => {
            state
                .directory
                .lock()
                .await
                .set_profile(login, &p.picture, &p.user_status, &p.email, &p.phone);
            ctx.push_ok("setuserinfo")?;
        }
        Request::UserInfo(p) => {
            let info = {
                let dir = state.directory.lock().await;
                dir.user(&p.user).map(|user| UserInfoData {
                    nick: user.nick.clone(),
                    user_status: user.status.clone(),
                    email: user.email.clone(),
                    phone: user.phone.clone(),
                    picture: user.avatar.clone(),
                    status: status::OK,
                    error: "OK".to_owned(),
                })
            };
            match info {
                Some(data) => ctx.push("userinfo", &data)?,
                None => ctx.push_err("userinfo", status::USER_NOT_FOUND, "User not found")?,
            }
        }
        Request::ContactList => delivery::contact_list(ctx, state, login).await?,
        Request::AddContact(p) => {
            let added = state.directory.lock().await.add_contact(login, &p.uid);
            match added {
                Ok(()) => ctx.push_ok("addcontact")?,
                Err(e) => ctx.push_err("addcontact", e.status(), &e.to_string())?,
            }
        }
        Request::DelContact(p) => {
            state.directory.lock().await.del_contact(login, &p.uid);
            ctx.push_ok("delcontact")?;
        }
        Request::Message(p) => delivery::message(ctx, state, login, &p).await?,
        Request::Import(p) => delivery::import(ctx, state, &p).await?,
        Request::ChannelList => {
            if let Some(channels) = &state.channels {
                let data = ChannelListData {
                    channels: channels.list().await,
                    status: status::OK,
                    error: "OK".to_owned(),
                };
                ctx.push("channellist", &data)?;
            }
        }
        Request::CreateChannel(p) => {
            if let Some(channels) = &state.channels {
                match channels.create(&p.name, &p.descr).await {
                    Ok(chid) => ctx.push(
                        "createchannel",
                        &ChannelCreatedData {
                            chid,
                            status: status::OK,
                            error: "OK".to_owned(),
                        },
                    )?,
                    Err(e) => ctx.push_err("createchannel", e.status(), &e.to_string())?,
                }
            }
        }
        Request::Enter(p) => {
            if let Some(channels) = &state.channels {
                match channels.enter(&p.channel, login, &ctx.nick, &ctx.handle).await {
                    Ok(()) => ctx.push_ok("enter")?,
                    Err(e) => ctx.push_err("enter", e.status(), &e.to_string())?,
                }
            }
        }
        Request::Leave(p) => {
            if let Some(channels) = &state.channels {
                match channels.leave(&p.channel, login, &ctx.nick).await {
                    Ok(()) => ctx.push_ok("leave")?,
                    Err(e) => ctx.push_err("leave", e.status(), &e.to_string())?,
                }
            }
        }
        // Handled before this point.
        Request::Register(_) | Request::Auth(_) | Request::Unknown => {}
    }
    Ok(Flow::Continue)
}
