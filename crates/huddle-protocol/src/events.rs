//! Event types for the Huddle protocol.
//!
//! Events are the messages exchanged between clients and the server. Each one
//! is a JSON object whose `type` field selects the variant; the remaining
//! fields are the variant's payload in camelCase.

use crate::models::{MessageInfo, ParticipantInfo, RoomInfo};
use serde::{Deserialize, Serialize};

/// An event sent by a client.
///
/// Unknown `type` values fail to decode rather than being ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Handshake sent after the transport connects, optionally resuming a session.
    InitSession {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },

    /// Join a room under a nickname.
    JoinRoom {
        room_id: String,
        nickname: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },

    /// Post a chat message to the bound room.
    SendMessage { content: String },

    /// Leave the bound room. Absent `explicit` means an implicit leave.
    LeaveRoom {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        explicit: Option<bool>,
    },

    /// Application-level keepalive.
    Ping,

    /// Acknowledgment of a `server-heartbeat`.
    HeartbeatAck,
}

impl ClientEvent {
    /// Get the wire name of this event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            ClientEvent::InitSession { .. } => "init-session",
            ClientEvent::JoinRoom { .. } => "join-room",
            ClientEvent::SendMessage { .. } => "send-message",
            ClientEvent::LeaveRoom { .. } => "leave-room",
            ClientEvent::Ping => "ping",
            ClientEvent::HeartbeatAck => "heartbeat-ack",
        }
    }
}

/// An event sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// The session identifier the connection is now associated with.
    SessionInitialized { session_id: String },

    /// The session's room membership was re-established on this connection.
    SessionRestored {
        room: RoomInfo,
        messages: Vec<MessageInfo>,
        participants: Vec<ParticipantInfo>,
        nickname: String,
    },

    /// Reply to a successful `join-room`.
    RoomJoined {
        room: RoomInfo,
        messages: Vec<MessageInfo>,
        participants: Vec<ParticipantInfo>,
    },

    /// A message was accepted in the room.
    NewMessage { message: MessageInfo },

    /// A new participant joined the room.
    UserJoined {
        nickname: String,
        participant_count: usize,
    },

    /// A participant left the room.
    UserLeft {
        nickname: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        participant_count: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// A participant was banned. `duration` is in seconds.
    UserBanned {
        nickname: String,
        reason: String,
        duration: u64,
    },

    /// This connection was removed from its room by a moderator.
    Kicked { message: String },

    /// Soft rejection; the connection stays usable.
    Warning { message: String },

    /// Failed action.
    Error { message: String },

    /// Reply to `ping`.
    Pong,

    /// Server-originated keepalive, answered with `heartbeat-ack`.
    ServerHeartbeat,
}

impl ServerEvent {
    /// Get the wire name of this event.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::SessionInitialized { .. } => "session-initialized",
            ServerEvent::SessionRestored { .. } => "session-restored",
            ServerEvent::RoomJoined { .. } => "room-joined",
            ServerEvent::NewMessage { .. } => "new-message",
            ServerEvent::UserJoined { .. } => "user-joined",
            ServerEvent::UserLeft { .. } => "user-left",
            ServerEvent::UserBanned { .. } => "user-banned",
            ServerEvent::Kicked { .. } => "kicked",
            ServerEvent::Warning { .. } => "warning",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Pong => "pong",
            ServerEvent::ServerHeartbeat => "server-heartbeat",
        }
    }

    /// Create a new Error event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    /// Create a new Warning event.
    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        ServerEvent::Warning {
            message: message.into(),
        }
    }

    /// Create a new UserLeft event.
    #[must_use]
    pub fn user_left(
        nickname: impl Into<String>,
        participant_count: Option<usize>,
        reason: Option<&str>,
    ) -> Self {
        ServerEvent::UserLeft {
            nickname: nickname.into(),
            participant_count,
            reason: reason.map(str::to_string),
        }
    }
}
