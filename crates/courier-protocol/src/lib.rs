// courier-protocol: Messenger wire contract and serialization.
//
// Both directions of the protocol are a plain stream of JSON objects with no
// length prefix; objects are delimited only by JSON itself.  Every client
// request is an `{"action": ..., "data": ...}` envelope whose `data` is kept
// raw for a second, typed decode selected by the action.  Server frames pin
// their exact field order; several serializations are frozen contracts
// checked byte-for-byte by tests.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

// ---------------------------------------------------------------------------
// Status codes
// ---------------------------------------------------------------------------

/// Frozen wire status codes.  The integer values are a compatibility
/// contract with existing clients.
pub mod status {
    pub const OK: i32 = 0;
    pub const ALREADY_EXIST: i32 = 1;
    pub const INVALID_PASS: i32 = 2;
    pub const INVALID_DATA: i32 = 3;
    pub const EMPTY_FIELD: i32 = 4;
    pub const ALREADY_REGISTER: i32 = 5;
    pub const NEED_AUTH: i32 = 6;
    pub const NEED_REGISTER: i32 = 7;
    pub const USER_NOT_FOUND: i32 = 8;
    pub const CHANNEL_NOT_FOUND: i32 = 9;
    pub const INVALID_CHANNEL: i32 = 10;
}

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable identifier for a name: lowercase hex MD5 of the UTF-8 bytes.
///
/// Session ids are `fingerprint(login)` and channel ids are
/// `fingerprint(channel name)`.  Not security-sensitive; it is a wire
/// contract and the exact values are pinned by tests.
pub fn fingerprint(text: &str) -> String {
    hex::encode(Md5::digest(text.as_bytes()))
}

// ---------------------------------------------------------------------------
// Request envelope and two-stage decode
// ---------------------------------------------------------------------------

/// First decode stage: the action tag plus the untouched payload text.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub action: String,
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthPayload {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub pass: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterPayload {
    #[serde(default)]
    pub nick: String,
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub pass: String,
}

/// Session fields every authenticated request may carry.  The server keys
/// everything off the connection identity instead, so they are decoded only
/// to validate the payload shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BasePayload {
    #[serde(default)]
    pub cid: String,
    #[serde(default)]
    pub sid: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SetUserInfoPayload {
    #[serde(default)]
    pub user_status: String,
    #[serde(default)]
    pub picture: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserInfoPayload {
    #[serde(default)]
    pub user: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactPayload {
    #[serde(default)]
    pub uid: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePayload {
    #[serde(default)]
    pub uid: String,
    /// Channel id; only meaningful to the broadcast server.
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub attach: AttachData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportPayload {
    #[serde(default)]
    pub contacts: Vec<ImportedContact>,
}

/// One address-book entry supplied by the client for matching.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportedContact {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub myid: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelPayload {
    #[serde(default)]
    pub channel: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateChannelPayload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub descr: String,
}

/// Second decode stage: one variant per known action.
///
/// Unrecognized actions decode to `Unknown`, which the dispatcher ignores
/// without a reply.
#[derive(Debug)]
pub enum Request {
    Register(RegisterPayload),
    Auth(AuthPayload),
    SetUserInfo(SetUserInfoPayload),
    UserInfo(UserInfoPayload),
    ContactList,
    AddContact(ContactPayload),
    DelContact(ContactPayload),
    Message(MessagePayload),
    Import(ImportPayload),
    ChannelList,
    CreateChannel(CreateChannelPayload),
    Enter(ChannelPayload),
    Leave(ChannelPayload),
    Unknown,
}

impl Envelope {
    /// Decode the preserved payload according to the action tag.
    ///
    /// An absent `data` field is treated as an empty object; every payload
    /// field defaults, so validation of required values stays with the
    /// handlers (an empty login still decodes, then fails with EmptyField).
    pub fn decode(&self) -> Result<Request, serde_json::Error> {
        let raw = self.data.as_deref().map_or("{}", RawValue::get);
        Ok(match self.action.as_str() {
            "register" => Request::Register(serde_json::from_str(raw)?),
            "auth" => Request::Auth(serde_json::from_str(raw)?),
            "setuserinfo" => Request::SetUserInfo(serde_json::from_str(raw)?),
            "userinfo" => Request::UserInfo(serde_json::from_str(raw)?),
            "contactlist" => {
                let _: BasePayload = serde_json::from_str(raw)?;
                Request::ContactList
            }
            "addcontact" => Request::AddContact(serde_json::from_str(raw)?),
            "delcontact" => Request::DelContact(serde_json::from_str(raw)?),
            "message" => Request::Message(serde_json::from_str(raw)?),
            "import" => Request::Import(serde_json::from_str(raw)?),
            "channellist" => {
                let _: BasePayload = serde_json::from_str(raw)?;
                Request::ChannelList
            }
            "createchannel" => Request::CreateChannel(serde_json::from_str(raw)?),
            "enter" => Request::Enter(serde_json::from_str(raw)?),
            "leave" => Request::Leave(serde_json::from_str(raw)?),
            _ => Request::Unknown,
        })
    }
}

// ---------------------------------------------------------------------------
// Streaming frame decoder
// ---------------------------------------------------------------------------

/// Incremental decoder for a stream of concatenated JSON objects.
///
/// Feed raw socket bytes with [`FrameDecoder::extend`] and drain complete
/// values with [`FrameDecoder::next`].  A partial object at the tail of the
/// buffer yields `Ok(None)` until more bytes arrive; anything that can never
/// become valid JSON is an error and fatal to the session.
///
/// The server decodes request [`Envelope`]s; clients decode whole
/// `serde_json::Value`s the same way.
#[derive(Debug)]
pub struct FrameDecoder<T = Envelope> {
    buf: Vec<u8>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T> Default for FrameDecoder<T> {
    fn default() -> Self {
        Self {
            buf: Vec::new(),
            _marker: std::marker::PhantomData,
        }
    }
}

impl<T: serde::de::DeserializeOwned> FrameDecoder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn next(&mut self) -> Result<Option<T>, serde_json::Error> {
        let mut stream = serde_json::Deserializer::from_slice(&self.buf).into_iter::<T>();
        match stream.next() {
            None => {
                // Nothing but whitespace buffered.
                self.buf.clear();
                Ok(None)
            }
            Some(Ok(value)) => {
                let consumed = stream.byte_offset();
                self.buf.drain(..consumed);
                Ok(Some(value))
            }
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Server frames
// ---------------------------------------------------------------------------

/// Generic `{action, data}` push frame.
#[derive(Debug, Serialize)]
struct Push<'a, T: Serialize> {
    action: &'a str,
    data: &'a T,
}

/// Serialize a server frame to its wire bytes.
pub fn encode_frame<T: Serialize>(action: &str, data: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&Push { action, data })
}

/// The unsolicited greeting pushed on accept.  Unlike every other server
/// frame it carries `time` at the top level.
#[derive(Debug, Serialize)]
pub struct WelcomeFrame<'a> {
    pub message: &'a str,
    pub action: &'a str,
    pub time: i64,
}

pub fn encode_welcome(greeting: &str, time: i64) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&WelcomeFrame {
        message: greeting,
        action: "welcome",
        time,
    })
}

/// Plain status reply, used for both OK and error answers.
#[derive(Debug, Serialize)]
pub struct StatusData {
    pub status: i32,
    pub error: String,
}

impl StatusData {
    pub fn ok() -> Self {
        Self {
            status: status::OK,
            error: "OK".to_owned(),
        }
    }

    pub fn err(status: i32, text: &str) -> Self {
        Self {
            status,
            error: text.to_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthOkData {
    pub sid: String,
    pub cid: String,
    pub nick: String,
    pub status: i32,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct UserInfoData {
    pub nick: String,
    pub user_status: String,
    pub email: String,
    pub phone: String,
    pub picture: String,
    pub status: i32,
    pub error: String,
}

/// One resolved user in `contactlist` / `import` replies.  `myid` is echoed
/// back only for import matches.
#[derive(Debug, Clone, Serialize)]
pub struct UserData {
    pub uid: String,
    pub nick: String,
    pub email: String,
    pub phone: String,
    pub picture: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub myid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserListData {
    pub list: Vec<UserData>,
    pub status: i32,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttachData {
    #[serde(default)]
    pub mime: String,
    #[serde(default)]
    pub data: String,
}

/// Direct `ev_message` payload; the identical bytes go to the recipient and
/// back to the sender as an echo.
#[derive(Debug, Serialize)]
pub struct DirectMessageData {
    pub from: String,
    pub nick: String,
    pub body: String,
    pub time: i64,
    pub attach: AttachData,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelInfo {
    pub chid: String,
    pub name: String,
    pub descr: String,
    pub online: usize,
}

#[derive(Debug, Serialize)]
pub struct ChannelListData {
    pub channels: Vec<ChannelInfo>,
    pub status: i32,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ChannelCreatedData {
    pub chid: String,
    pub status: i32,
    pub error: String,
}

/// `ev_enter` / `ev_leave` payload.
#[derive(Debug, Serialize)]
pub struct ChannelEventData {
    pub chid: String,
    pub uid: String,
    pub nick: String,
}

/// Channel-scoped `ev_message` payload.
#[derive(Debug, Serialize)]
pub struct ChannelMessageData {
    pub chid: String,
    pub from: String,
    pub nick: String,
    pub body: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
