//! Session tracking.
//!
//! A session is a user's identity across reconnects: it remembers the last
//! room and nickname it held and when it was last heard from. The table is
//! process-local; when an entry is missing it can be rebuilt from the
//! participant records in the store.

use crate::clock::{millis, Clock};
use crate::store::{self, Store};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Maximum session id length.
pub const MAX_SESSION_ID_LENGTH: usize = 64;

/// Validate a client-supplied session id.
///
/// # Errors
///
/// Returns an error message if the id is empty, too long, or contains
/// characters other than ASCII letters, digits, `-` and `_`.
pub fn validate_session_id(id: &str) -> Result<(), &'static str> {
    if id.is_empty() {
        return Err("Session id cannot be empty");
    }
    if id.len() > MAX_SESSION_ID_LENGTH {
        return Err("Session id too long");
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err("Session id contains invalid characters");
    }
    Ok(())
}

/// Session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub room_id: Option<String>,
    pub nickname: Option<String>,
    pub created_at: u64,
    pub last_activity: u64,
}

impl Session {
    fn new(id: impl Into<String>, now: u64) -> Self {
        Self {
            id: id.into(),
            room_id: None,
            nickname: None,
            created_at: now,
            last_activity: now,
        }
    }

    /// Room and nickname, when the session claims a membership.
    #[must_use]
    pub fn membership(&self) -> Option<(&str, &str)> {
        match (&self.room_id, &self.nickname) {
            (Some(room), Some(nickname)) => Some((room, nickname)),
            _ => None,
        }
    }

    /// Check if the session has been idle longer than `timeout`.
    #[must_use]
    pub fn is_stale(&self, now: u64, timeout: Duration) -> bool {
        now.saturating_sub(self.last_activity) > millis(timeout)
    }
}

/// Registry of sessions keyed by id.
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
    clock: Arc<dyn Clock>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
        }
    }

    /// Create a session with a fresh id.
    pub fn create(&self) -> Session {
        self.create_with_id(Uuid::new_v4().to_string())
    }

    /// Register a session under a caller-chosen id, replacing any entry.
    pub fn create_with_id(&self, id: impl Into<String>) -> Session {
        let session = Session::new(id, self.clock.now_millis());
        debug!(session = %session.id, "Session created");
        self.sessions.insert(session.id.clone(), session.clone());
        session
    }

    /// Get a session from memory.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Session> {
        self.sessions.get(session_id).map(|s| s.clone())
    }

    /// Get a session, rebuilding it from participant records if it was lost.
    ///
    /// The rebuild scans every active room for a participant whose binding
    /// token carries `session_id`. That is linear in the number of live
    /// participants.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails during the scan.
    pub async fn get_or_restore(
        &self,
        session_id: &str,
        store: &dyn Store,
    ) -> store::Result<Option<Session>> {
        if let Some(session) = self.get(session_id) {
            return Ok(Some(session));
        }

        for room in store.active_rooms().await? {
            let participants = store.participants(&room.id).await?;
            if let Some(found) = participants
                .into_iter()
                .find(|p| p.session_id() == Some(session_id))
            {
                let now = self.clock.now_millis();
                let session = Session {
                    id: session_id.to_string(),
                    room_id: Some(found.room_id),
                    nickname: Some(found.nickname),
                    created_at: now,
                    last_activity: now,
                };
                info!(
                    session = %session_id,
                    room = ?session.room_id,
                    nickname = ?session.nickname,
                    "Session restored from participant record"
                );
                // Another handler may have created the entry while we scanned.
                let entry = self
                    .sessions
                    .entry(session_id.to_string())
                    .or_insert(session);
                return Ok(Some(entry.clone()));
            }
        }

        Ok(None)
    }

    /// Update the last-activity timestamp. Returns `false` if unknown.
    pub fn touch(&self, session_id: &str) -> bool {
        match self.sessions.get_mut(session_id) {
            Some(mut session) => {
                session.last_activity = self.clock.now_millis();
                true
            }
            None => false,
        }
    }

    /// Record the session's room membership, creating the entry if needed.
    pub fn set_room(&self, session_id: &str, room_id: &str, nickname: &str) {
        let now = self.clock.now_millis();
        let mut session = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id, now));
        session.room_id = Some(room_id.to_string());
        session.nickname = Some(nickname.to_string());
        session.last_activity = now;
    }

    /// Forget the session's room membership.
    pub fn clear_room(&self, session_id: &str) {
        if let Some(mut session) = self.sessions.get_mut(session_id) {
            session.room_id = None;
            session.nickname = None;
        }
    }

    /// Forget every session's membership of a room. Returns how many changed.
    pub fn clear_room_everywhere(&self, room_id: &str) -> usize {
        let mut cleared = 0;
        for mut session in self.sessions.iter_mut() {
            if session.room_id.as_deref() == Some(room_id) {
                session.room_id = None;
                session.nickname = None;
                cleared += 1;
            }
        }
        cleared
    }

    /// Delete a session.
    pub fn remove(&self, session_id: &str) -> Option<Session> {
        self.sessions.remove(session_id).map(|(_, s)| s)
    }

    /// Remove sessions idle longer than `timeout`.
    ///
    /// Returns the removed sessions.
    pub fn expire_stale(&self, timeout: Duration) -> Vec<Session> {
        let now = self.clock.now_millis();
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| s.is_stale(now, timeout))
            .map(|s| s.key().clone())
            .collect();

        let mut removed = Vec::with_capacity(stale.len());
        for id in stale {
            // Re-check under the shard lock; a touch may have landed meanwhile.
            if let Some((_, session)) = self
                .sessions
                .remove_if(&id, |_, s| s.is_stale(now, timeout))
            {
                debug!(session = %id, "Session expired");
                removed.push(session);
            }
        }
        removed
    }

    /// Number of sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
