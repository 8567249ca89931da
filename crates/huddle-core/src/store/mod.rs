//! Persistence adapter for rooms and everything rooms own.
//!
//! The store is the single source of truth for rooms, participants,
//! messages, bans and warnings. In-memory registries elsewhere in the core
//! are derived state and can always be rebuilt from it.
//!
//! Five logical collections are kept, each row carrying a room id:
//!
//! - **rooms**
//! - **participants** - unique per (room, nickname)
//! - **messages** - append-only, read back most-recent-N in order
//! - **banned_users**
//! - **warnings** - append-only
//!
//! Operations that must not interleave with other writers (participant
//! upsert, room cascade) are single calls so a backend can make them atomic.

mod memory;

pub use memory::MemoryStore;

use crate::error::StoreError;
use crate::model::{Ban, Message, NewBan, NewMessage, NewWarning, Participant, Room, Warning};
use async_trait::async_trait;

/// Result alias for store calls.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of placing a nickname in a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upsert {
    /// A new participant record was created.
    Joined(Participant),
    /// The nickname was present; its record was replaced by one with the new binding.
    Reconnected {
        previous: Participant,
        current: Participant,
    },
    /// The nickname was absent and the room is at capacity.
    Full,
}

/// Storage backend trait.
#[async_trait]
pub trait Store: Send + Sync {
    // ==================== Rooms ====================

    /// Insert a room. Returns `false` if the id is already taken.
    async fn insert_room(&self, room: Room) -> Result<bool>;

    /// Get a room by id.
    async fn room(&self, room_id: &str) -> Result<Option<Room>>;

    /// All rooms flagged active, oldest first.
    async fn active_rooms(&self) -> Result<Vec<Room>>;

    /// Delete a room with its participants, messages, bans and warnings.
    async fn delete_room(&self, room_id: &str) -> Result<bool>;

    /// Ids of rooms whose expiry instant is at or before `now`.
    async fn expired_rooms(&self, now: u64) -> Result<Vec<String>>;

    // ==================== Participants ====================

    /// Place `nickname` in a room in one atomic step.
    ///
    /// If the nickname is present its record is replaced; otherwise a new
    /// record is added unless the room already holds `capacity` participants.
    async fn upsert_participant(
        &self,
        room_id: &str,
        nickname: &str,
        binding: &str,
        joined_at: u64,
        capacity: usize,
    ) -> Result<Upsert>;

    /// Participants of a room in join order.
    async fn participants(&self, room_id: &str) -> Result<Vec<Participant>>;

    /// Get a participant by id.
    async fn participant(&self, participant_id: u64) -> Result<Option<Participant>>;

    /// Get the participant holding a binding token.
    async fn participant_by_binding(&self, binding: &str) -> Result<Option<Participant>>;

    /// Remove a participant by id.
    async fn remove_participant(&self, participant_id: u64) -> Result<Option<Participant>>;

    /// Remove the participant holding a binding token.
    async fn remove_participant_by_binding(&self, binding: &str) -> Result<Option<Participant>>;

    /// Number of participants in a room.
    async fn participant_count(&self, room_id: &str) -> Result<usize>;

    // ==================== Messages ====================

    /// Append a message, assigning its id.
    async fn insert_message(&self, message: NewMessage) -> Result<Message>;

    /// The `limit` most recent messages of a room, oldest first.
    async fn recent_messages(&self, room_id: &str, limit: usize) -> Result<Vec<Message>>;

    // ==================== Bans ====================

    /// Record a ban, assigning its id.
    async fn insert_ban(&self, ban: NewBan) -> Result<Ban>;

    /// Find an unexpired ban blocking this identity.
    ///
    /// A ban recorded for `session_id` matches first; otherwise any unexpired
    /// ban on `nickname` in the room matches.
    async fn active_ban(
        &self,
        room_id: &str,
        session_id: Option<&str>,
        nickname: &str,
        now: u64,
    ) -> Result<Option<Ban>>;

    /// Unexpired bans of a room.
    async fn active_bans(&self, room_id: &str, now: u64) -> Result<Vec<Ban>>;

    /// Remove a ban by id.
    async fn delete_ban(&self, ban_id: u64) -> Result<bool>;

    // ==================== Warnings ====================

    /// Append a warning, assigning its id.
    async fn insert_warning(&self, warning: NewWarning) -> Result<Warning>;

    /// Count warnings in a room for a nickname created at or after `since`.
    ///
    /// With a session, only warnings recorded for that session count.
    async fn count_warnings(
        &self,
        room_id: &str,
        session_id: Option<&str>,
        nickname: &str,
        since: u64,
    ) -> Result<usize>;
}
