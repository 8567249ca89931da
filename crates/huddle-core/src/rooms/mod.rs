//! Room and participant management.
//!
//! [`RoomManager`] owns every registry and is the only code that mutates
//! room membership, whether the request arrives over a connection or the
//! HTTP surface. Membership changes are written to the store first; the
//! in-memory bindings follow.

mod membership;
mod messages;

pub use membership::{JoinKind, JoinOutcome};
pub use messages::SendOutcome;

use crate::clock::{Clock, SystemClock};
use crate::config::{validate_room_name, ChatConfig};
use crate::connection::{ConnectionId, ConnectionRegistry, Outbound};
use crate::error::{ChatError, Result, StoreError};
use crate::model::{Ban, Room};
use crate::moderation::Moderation;
use crate::router::Router;
use crate::session::{validate_session_id, Session, SessionRegistry};
use crate::store::{MemoryStore, Store};
use huddle_protocol::{MessageInfo, ParticipantInfo, RoomInfo, ServerEvent};
use rand::Rng;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Characters used in generated room ids.
const ROOM_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Attempts at finding an unused room id before giving up.
const ROOM_ID_ATTEMPTS: usize = 5;

/// Request to create a room.
#[derive(Debug, Clone, Default)]
pub struct NewRoom {
    pub name: String,
    pub max_participants: Option<u32>,
    /// Expiry instant, epoch milliseconds.
    pub expires_at: Option<u64>,
    pub created_by: Option<String>,
}

/// An active room with its head count.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    #[serde(flatten)]
    pub room: RoomInfo,
    pub participant_count: usize,
}

/// What a member sees on entering a room.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    pub room: RoomInfo,
    pub participants: Vec<ParticipantInfo>,
    pub messages: Vec<MessageInfo>,
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub rooms: usize,
    pub connections: usize,
    pub bound_connections: usize,
    pub sessions: usize,
}

/// The room/participant manager.
pub struct RoomManager {
    config: ChatConfig,
    store: Arc<dyn Store>,
    sessions: SessionRegistry,
    connections: Arc<ConnectionRegistry>,
    router: Router,
    moderation: Moderation,
    clock: Arc<dyn Clock>,
}

impl RoomManager {
    /// Create a manager over a store.
    #[must_use]
    pub fn new(config: ChatConfig, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        let connections = Arc::new(ConnectionRegistry::new());
        Self {
            sessions: SessionRegistry::new(clock.clone()),
            router: Router::new(connections.clone()),
            moderation: Moderation::new(config.moderation.clone(), store.clone(), clock.clone()),
            connections,
            config,
            store,
            clock,
        }
    }

    /// Create a manager over an in-memory store and the system clock.
    #[must_use]
    pub fn in_memory(config: ChatConfig) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    /// Get the policy.
    #[must_use]
    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// Get the session registry.
    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Get the connection registry.
    #[must_use]
    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Get the event router.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Get the moderation engine.
    #[must_use]
    pub fn moderation(&self) -> &Moderation {
        &self.moderation
    }

    /// Get the time source.
    #[must_use]
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    // ==================== Connections ====================

    /// Register a new connection and return its id.
    pub fn connect(&self, sender: mpsc::UnboundedSender<Outbound>) -> ConnectionId {
        let id = ConnectionId::generate();
        self.connections.register(id.clone(), sender);
        id
    }

    /// Record liveness for the session behind a connection.
    pub fn touch_connection(&self, connection: &ConnectionId) {
        if let Some(session_id) = self.connections.get(connection).and_then(|b| b.session_id) {
            self.sessions.touch(&session_id);
        }
    }

    // ==================== Rooms ====================

    /// Create a room with a fresh id.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidInput`] for a bad name, capacity or
    /// expiry, or a persistence error.
    pub async fn create_room(&self, request: NewRoom) -> Result<Room> {
        let name = validate_room_name(&request.name, self.config.max_room_name_length)
            .map_err(|e| ChatError::InvalidInput(e.to_string()))?;
        let max_participants = request
            .max_participants
            .unwrap_or(self.config.default_max_participants);
        if max_participants == 0 || max_participants > self.config.max_participants {
            return Err(ChatError::InvalidInput(format!(
                "Room capacity must be between 1 and {}",
                self.config.max_participants
            )));
        }
        let now = self.now();
        if request.expires_at.is_some_and(|at| at <= now) {
            return Err(ChatError::InvalidInput(
                "Expiry must be in the future".to_string(),
            ));
        }

        for _ in 0..ROOM_ID_ATTEMPTS {
            let room = Room {
                id: generate_room_id(self.config.room_id_length),
                name: name.to_string(),
                created_by: request.created_by.clone(),
                max_participants,
                expires_at: request.expires_at,
                created_at: now,
                is_active: true,
            };
            if self.store.insert_room(room.clone()).await? {
                info!(room = %room.id, name = %room.name, capacity = max_participants, "Room created");
                return Ok(room);
            }
            debug!(room = %room.id, "Room id collision, retrying");
        }

        Err(StoreError::Backend("no unused room id found".to_string()).into())
    }

    /// Active, unexpired rooms with their participant counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn list_rooms(&self) -> Result<Vec<RoomSummary>> {
        let now = self.now();
        let mut summaries = Vec::new();
        for room in self.store.active_rooms().await? {
            if !room.is_open(now) {
                continue;
            }
            let participant_count = self.store.participant_count(&room.id).await?;
            summaries.push(RoomSummary {
                room: room.info(),
                participant_count,
            });
        }
        Ok(summaries)
    }

    /// A room with its participants and recent messages.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::RoomNotFound`] if the room is missing, inactive
    /// or expired.
    pub async fn room_detail(&self, room_id: &str) -> Result<RoomSnapshot> {
        let room = self.open_room(room_id).await?;
        self.snapshot(&room).await
    }

    /// Delete a room and everything it owns.
    ///
    /// Connections bound to the room are told and unbound.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn delete_room(&self, room_id: &str) -> Result<bool> {
        if !self.store.delete_room(room_id).await? {
            return Ok(false);
        }

        let closed = ServerEvent::error("This room has been closed");
        for connection in self.connections.room_members(room_id) {
            self.router.send_to(&connection, closed.clone());
            self.connections.clear_room(&connection);
        }
        let sessions = self.sessions.clear_room_everywhere(room_id);
        info!(room = %room_id, sessions, "Room deleted");
        Ok(true)
    }

    /// Delete every room whose expiry has passed. Returns how many went.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn cleanup_expired_rooms(&self) -> Result<usize> {
        let expired = self.store.expired_rooms(self.now()).await?;
        let mut deleted = 0;
        for room_id in expired {
            if self.delete_room(&room_id).await? {
                deleted += 1;
            }
        }
        if deleted > 0 {
            info!(count = deleted, "Expired rooms removed");
        }
        Ok(deleted)
    }

    pub(crate) async fn open_room(&self, room_id: &str) -> Result<Room> {
        match self.store.room(room_id).await? {
            Some(room) if room.is_open(self.now()) => Ok(room),
            _ => Err(ChatError::RoomNotFound),
        }
    }

    pub(crate) async fn snapshot(&self, room: &Room) -> Result<RoomSnapshot> {
        let participants = self.store.participants(&room.id).await?;
        let messages = self
            .store
            .recent_messages(&room.id, self.config.message_history)
            .await?;
        Ok(RoomSnapshot {
            room: room.info(),
            participants: participants.iter().map(|p| p.info()).collect(),
            messages: messages.iter().map(|m| m.info()).collect(),
        })
    }

    // ==================== Bans ====================

    /// Unexpired bans of a room.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn list_bans(&self, room_id: &str) -> Result<Vec<Ban>> {
        Ok(self.store.active_bans(room_id, self.now()).await?)
    }

    /// Lift a ban.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn remove_ban(&self, ban_id: u64) -> Result<bool> {
        let removed = self.store.delete_ban(ban_id).await?;
        if removed {
            info!(ban = ban_id, "Ban lifted");
        }
        Ok(removed)
    }

    // ==================== Sessions ====================

    /// Create a session with no room.
    pub fn create_session(&self) -> Session {
        self.sessions.create()
    }

    /// Look up a session, rebuilding it from participant records if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidInput`] for a malformed id, or a
    /// persistence error.
    pub async fn session(&self, session_id: &str) -> Result<Option<Session>> {
        validate_session_id(session_id).map_err(|e| ChatError::InvalidInput(e.to_string()))?;
        Ok(self
            .sessions
            .get_or_restore(session_id, self.store.as_ref())
            .await?)
    }

    /// Forget a session.
    pub fn delete_session(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }

    /// Remove idle sessions and the memberships they left behind.
    ///
    /// A membership is kept if a live connection still holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn expire_stale_sessions(&self) -> Result<usize> {
        let expired = self.sessions.expire_stale(self.config.session_timeout);
        for session in &expired {
            let Some((room_id, nickname)) = session.membership() else {
                continue;
            };
            if !self.connections.holders(room_id, nickname).is_empty() {
                continue;
            }
            if self
                .release_leftover(&session.id, room_id, nickname, Some("timeout"))
                .await?
            {
                info!(room = %room_id, nickname = %nickname, "Removed participant of expired session");
            }
        }
        if !expired.is_empty() {
            info!(count = expired.len(), "Stale sessions expired");
        }
        Ok(expired.len())
    }

    // ==================== Stats ====================

    /// Current counters.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn stats(&self) -> Result<Stats> {
        let now = self.now();
        let rooms = self
            .store
            .active_rooms()
            .await?
            .iter()
            .filter(|r| r.is_open(now))
            .count();
        Ok(Stats {
            rooms,
            connections: self.connections.len(),
            bound_connections: self.connections.bound_count(),
            sessions: self.sessions.len(),
        })
    }

    /// Report a failed action to the connection that attempted it.
    pub(crate) fn report(&self, connection: &ConnectionId, error: &ChatError) {
        if let ChatError::Persistence(cause) = error {
            warn!(connection = %connection, error = %cause, "Persistence failure");
        } else {
            debug!(connection = %connection, kind = error.kind(), "Action rejected");
        }
        let event = if error.is_soft() {
            ServerEvent::warning(error.client_message())
        } else {
            ServerEvent::error(error.client_message())
        };
        self.router.send_to(connection, event);
    }
}

fn generate_room_id(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(ROOM_ID_ALPHABET[rng.gen_range(0..ROOM_ID_ALPHABET.len())]))
        .collect()
}
