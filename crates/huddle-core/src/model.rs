//! Persistent records owned by rooms.
//!
//! These are the rows the [`Store`](crate::store::Store) keeps. Every
//! participant, message, ban and warning carries the id of the room it
//! belongs to, and deleting a room deletes them with it.

use crate::connection::session_of_binding;
use huddle_protocol::{MessageInfo, ParticipantInfo, RoomInfo};
use serde::Serialize;

/// Reason recorded on bans created by the warning threshold.
pub const AUTO_BAN_REASON: &str = "automatic_ban_3_warnings";

/// Reason recorded on bans created by a kick.
pub const KICK_BAN_REASON: &str = "kicked";

/// Warning type for profanity hits.
pub const PROFANITY_WARNING: &str = "profanity";

/// A chat room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub created_by: Option<String>,
    pub max_participants: u32,
    pub expires_at: Option<u64>,
    pub created_at: u64,
    pub is_active: bool,
}

impl Room {
    /// Check whether the room's expiry instant has passed.
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Check whether the room accepts participants and messages.
    #[must_use]
    pub fn is_open(&self, now: u64) -> bool {
        self.is_active && !self.is_expired(now)
    }

    /// Client-facing view.
    #[must_use]
    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            created_by: self.created_by.clone(),
            max_participants: self.max_participants,
            expires_at: self.expires_at,
            created_at: self.created_at,
        }
    }
}

/// A room membership record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: u64,
    pub room_id: String,
    pub nickname: String,
    /// Opaque token tying the membership to a connection (and session, if any).
    pub binding: String,
    pub joined_at: u64,
}

impl Participant {
    /// The session embedded in the binding token, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        session_of_binding(&self.binding)
    }

    /// Client-facing view.
    #[must_use]
    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            id: self.id,
            nickname: self.nickname.clone(),
            joined_at: self.joined_at,
        }
    }
}

/// A stored chat message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: u64,
    pub room_id: String,
    pub nickname: String,
    pub content: String,
    pub timestamp: u64,
    pub filtered: bool,
}

impl Message {
    /// Client-facing view.
    #[must_use]
    pub fn info(&self) -> MessageInfo {
        MessageInfo {
            id: self.id,
            room_id: self.room_id.clone(),
            nickname: self.nickname.clone(),
            content: self.content.clone(),
            timestamp: self.timestamp,
            filtered: self.filtered,
        }
    }
}

/// A message about to be stored.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub room_id: String,
    pub nickname: String,
    pub content: String,
    pub timestamp: u64,
    pub filtered: bool,
}

/// A time-bounded block on joining a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ban {
    pub id: u64,
    pub room_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub nickname: String,
    pub banned_at: u64,
    pub expires_at: u64,
    pub reason: String,
}

impl Ban {
    /// A ban is active while the current time is before its expiry.
    #[must_use]
    pub fn is_active(&self, now: u64) -> bool {
        now < self.expires_at
    }

    /// Remaining ban time in whole seconds, rounded up.
    #[must_use]
    pub fn remaining_secs(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now).div_ceil(1000)
    }
}

/// A ban about to be stored.
#[derive(Debug, Clone)]
pub struct NewBan {
    pub room_id: String,
    pub session_id: Option<String>,
    pub nickname: String,
    pub banned_at: u64,
    pub expires_at: u64,
    pub reason: String,
}

/// A logged moderation flag on one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub id: u64,
    pub room_id: String,
    pub session_id: Option<String>,
    pub nickname: String,
    pub original: String,
    pub filtered: String,
    pub kind: String,
    pub created_at: u64,
}

/// A warning about to be stored.
#[derive(Debug, Clone)]
pub struct NewWarning {
    pub room_id: String,
    pub session_id: Option<String>,
    pub nickname: String,
    pub original: String,
    pub filtered: String,
    pub kind: String,
    pub created_at: u64,
}
