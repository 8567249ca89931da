//! Error types for room, session and moderation operations.

use thiserror::Error;

/// Persistence adapter errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend did not answer in time.
    #[error("Storage timed out")]
    Timeout,

    /// The backend rejected or failed the operation.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by core operations.
///
/// Every variant is scoped to one connection or one request; none is fatal
/// to the process.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Room missing, inactive or expired.
    #[error("Room not found")]
    RoomNotFound,

    /// Room is at capacity.
    #[error("Room is full")]
    RoomFull,

    /// An unexpired ban matches the identity.
    #[error("You are banned from this room for another {remaining_secs} seconds")]
    Banned {
        /// Seconds until the ban expires.
        remaining_secs: u64,
    },

    /// Message sent too soon after the previous one.
    #[error("You are sending messages too quickly. Please slow down.")]
    RateLimited,

    /// Message flagged by the content screen and dropped.
    #[error("Warning {count}/{threshold}: your message contained inappropriate language and was not sent")]
    ContentFlagged {
        /// Warnings accumulated so far.
        count: usize,
        /// Warnings that trigger a ban.
        threshold: usize,
    },

    /// Action requires room membership.
    #[error("You are not in a room")]
    NotInRoom,

    /// Unparseable or unknown payload.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// No such participant in the room.
    #[error("Participant not found")]
    ParticipantNotFound,

    /// Request fields failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The persistence adapter failed.
    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

impl ChatError {
    /// Soft errors are reported as `warning` events and leave the connection usable.
    #[must_use]
    pub fn is_soft(&self) -> bool {
        matches!(self, ChatError::RateLimited | ChatError::ContentFlagged { .. })
    }

    /// Stable label for metrics and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ChatError::RoomNotFound => "room_not_found",
            ChatError::RoomFull => "room_full",
            ChatError::Banned { .. } => "banned",
            ChatError::RateLimited => "rate_limited",
            ChatError::ContentFlagged { .. } => "content_flagged",
            ChatError::NotInRoom => "not_in_room",
            ChatError::MalformedMessage(_) => "malformed_message",
            ChatError::ParticipantNotFound => "participant_not_found",
            ChatError::InvalidInput(_) => "invalid_input",
            ChatError::Persistence(_) => "persistence_failure",
        }
    }

    /// Text shown to the client. Persistence details stay in the logs.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            ChatError::Persistence(_) => "Something went wrong, please try again".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result alias for core operations.
pub type Result<T, E = ChatError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_errors() {
        assert!(ChatError::RateLimited.is_soft());
        assert!(ChatError::ContentFlagged {
            count: 1,
            threshold: 3
        }
        .is_soft());
        assert!(!ChatError::RoomFull.is_soft());
        assert!(!ChatError::NotInRoom.is_soft());
    }

    #[test]
    fn test_flagged_message_counts() {
        let err = ChatError::ContentFlagged {
            count: 2,
            threshold: 3,
        };
        assert!(err.to_string().starts_with("Warning 2/3"));
    }

    #[test]
    fn test_persistence_message_hidden() {
        let err = ChatError::from(StoreError::Backend("disk on fire".into()));
        assert_eq!(err.kind(), "persistence_failure");
        assert!(!err.client_message().contains("disk"));
    }
}
