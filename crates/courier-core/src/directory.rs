//! Process-wide registries: users, nicks, emails, phones, active sessions.
//!
//! The directory is the arena for everything keyed by login.  Sessions never
//! reference each other directly; delivery resolves a recipient's handle
//! here at send time.  All access is serialized behind one async mutex owned
//! by [`crate::server::ServerState`], so no handler can observe a
//! half-finished takeover.

use crate::session::SessionHandle;
use courier_protocol::{UserData, status};
use std::collections::{HashMap, HashSet};

/// One registered user.  Created by register, never destroyed.
///
/// Empty strings mean "unset" for the optional profile fields, matching
/// what goes on the wire.
#[derive(Debug, Default)]
pub struct UserRecord {
    pub login: String,
    pub nick: String,
    password: String,
    pub email: String,
    pub phone: String,
    pub avatar: String,
    pub status: String,
    pub contacts: HashSet<String>,
}

/// Recoverable registry failures.  The display strings are the wire error
/// texts.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    #[error("Empty field")]
    EmptyField,
    #[error("Nick already was used")]
    NickTaken,
    #[error("Login already was used")]
    LoginTaken,
    #[error("Need to register")]
    NeedRegister,
    #[error("Invalid login or password!")]
    InvalidPassword,
    #[error("User already in list")]
    ContactExists,
    #[error("User not found")]
    UserNotFound,
}

impl DirectoryError {
    pub fn status(&self) -> i32 {
        match self {
            Self::EmptyField => status::EMPTY_FIELD,
            Self::NickTaken | Self::LoginTaken | Self::ContactExists => status::ALREADY_EXIST,
            Self::NeedRegister => status::NEED_REGISTER,
            Self::InvalidPassword => status::INVALID_PASS,
            Self::UserNotFound => status::USER_NOT_FOUND,
        }
    }
}

/// Result of a successful authentication.
#[derive(Debug)]
pub struct AuthOutcome {
    pub sid: String,
    pub nick: String,
}

#[derive(Debug, Default)]
pub struct Directory {
    users: HashMap<String, UserRecord>,
    nicks: HashMap<String, String>,
    emails: HashMap<String, String>,
    phones: HashMap<String, String>,
    active: HashMap<String, SessionHandle>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new user.  A failure leaves every index untouched.
    pub fn register(&mut self, login: &str, pass: &str, nick: &str) -> Result<(), DirectoryError> {
        if login.is_empty() || pass.is_empty() || nick.is_empty() {
            return Err(DirectoryError::EmptyField);
        }
        if self.nicks.contains_key(nick) {
            return Err(DirectoryError::NickTaken);
        }
        if self.users.contains_key(login) {
            return Err(DirectoryError::LoginTaken);
        }
        self.nicks.insert(nick.to_owned(), login.to_owned());
        self.users.insert(
            login.to_owned(),
            UserRecord {
                login: login.to_owned(),
                nick: nick.to_owned(),
                password: pass.to_owned(),
                ..UserRecord::default()
            },
        );
        Ok(())
    }

    /// Check credentials and bind `session` to `login`.
    ///
    /// When another session currently holds the login it is displaced: its
    /// transport is closed and its offline queue moves to the new session.
    /// Everything happens under the directory lock, so the takeover is
    /// atomic as observed by other handlers.
    pub fn authenticate(
        &mut self,
        session: &SessionHandle,
        login: &str,
        pass: &str,
    ) -> Result<AuthOutcome, DirectoryError> {
        if login.is_empty() || pass.is_empty() {
            return Err(DirectoryError::EmptyField);
        }
        let record = self.users.get(login).ok_or(DirectoryError::NeedRegister)?;
        if record.password != pass {
            return Err(DirectoryError::InvalidPassword);
        }

        if let Some(prior) = self.active.get(login) {
            if !prior.same_session(session) {
                prior.displace();
                session.adopt_offline(prior.take_offline());
            }
        }
        self.active.insert(login.to_owned(), session.clone());

        Ok(AuthOutcome {
            sid: courier_protocol::fingerprint(login),
            nick: record.nick.clone(),
        })
    }

    /// Update avatar and status unconditionally; swap the email/phone index
    /// entries for each non-empty input.
    ///
    /// Claiming an email or phone currently mapped to another user clears
    /// the prior owner's field, so the indices stay injective and consistent
    /// with the records.  Last claim wins.
    pub fn set_profile(
        &mut self,
        login: &str,
        avatar: &str,
        user_status: &str,
        email: &str,
        phone: &str,
    ) {
        if let Some(record) = self.users.get_mut(login) {
            record.avatar = avatar.to_owned();
            record.status = user_status.to_owned();
        } else {
            return;
        }

        if !email.is_empty() {
            if let Some(record) = self.users.get_mut(login) {
                let prior = std::mem::replace(&mut record.email, email.to_owned());
                if !prior.is_empty() && prior != email {
                    self.emails.remove(&prior);
                }
            }
            if let Some(owner) = self.emails.insert(email.to_owned(), login.to_owned()) {
                if owner != login {
                    if let Some(dispossessed) = self.users.get_mut(&owner) {
                        dispossessed.email.clear();
                    }
                }
            }
        }

        if !phone.is_empty() {
            if let Some(record) = self.users.get_mut(login) {
                let prior = std::mem::replace(&mut record.phone, phone.to_owned());
                if !prior.is_empty() && prior != phone {
                    self.phones.remove(&prior);
                }
            }
            if let Some(owner) = self.phones.insert(phone.to_owned(), login.to_owned()) {
                if owner != login {
                    if let Some(dispossessed) = self.users.get_mut(&owner) {
                        dispossessed.phone.clear();
                    }
                }
            }
        }
    }

    pub fn user(&self, login: &str) -> Option<&UserRecord> {
        self.users.get(login)
    }

    pub fn session_of(&self, login: &str) -> Option<&SessionHandle> {
        self.active.get(login)
    }

    pub fn add_contact(&mut self, login: &str, uid: &str) -> Result<(), DirectoryError> {
        let has = self
            .users
            .get(login)
            .is_some_and(|r| r.contacts.contains(uid));
        if has || uid == login {
            return Err(DirectoryError::ContactExists);
        }
        if !self.users.contains_key(uid) {
            return Err(DirectoryError::UserNotFound);
        }
        if let Some(record) = self.users.get_mut(login) {
            record.contacts.insert(uid.to_owned());
        }
        Ok(())
    }

    /// Unconditional removal; deleting an absent contact is a success.
    pub fn del_contact(&mut self, login: &str, uid: &str) {
        if let Some(record) = self.users.get_mut(login) {
            record.contacts.remove(uid);
        }
    }

    /// Resolve the caller's contact set.  Contacts that no longer resolve
    /// are silently omitted; iteration order is not a contract.
    pub fn contact_list(&self, login: &str) -> Vec<UserData> {
        let Some(record) = self.users.get(login) else {
            return Vec::new();
        };
        record
            .contacts
            .iter()
            .filter_map(|uid| self.users.get(uid))
            .map(|user| UserData {
                uid: user.login.clone(),
                nick: user.nick.clone(),
                email: user.email.clone(),
                phone: user.phone.clone(),
                picture: user.avatar.clone(),
                myid: None,
            })
            .collect()
    }

    /// Find a user by email first, phone second; the first non-empty hit
    /// wins.
    pub fn find_by_address(&self, email: &str, phone: &str) -> Option<&UserRecord> {
        let mut login = None;
        if !email.is_empty() {
            login = self.emails.get(email);
        }
        if login.is_none() && !phone.is_empty() {
            login = self.phones.get(phone);
        }
        login.and_then(|l| self.users.get(l))
    }
}
