//! Live connection tracking.
//!
//! Each open transport connection is registered with an outbound queue and
//! a [`Binding`]: the session, room and nickname it currently speaks for.
//! Nothing here is persisted; a reconnecting client rebuilds its binding
//! through the `init-session` handshake.

use dashmap::DashMap;
use huddle_protocol::ServerEvent;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tracing::debug;

/// Separates the session from the connection inside a binding token.
const BINDING_SEPARATOR: char = ':';

static CONNECTION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Create a connection ID from an existing string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh connection ID.
    #[must_use]
    pub fn generate() -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let counter = CONNECTION_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{:x}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Binding token for a membership held through this connection.
    #[must_use]
    pub fn binding_token(&self, session_id: Option<&str>) -> String {
        match session_id {
            Some(session) => format!("{session}{BINDING_SEPARATOR}{}", self.0),
            None => self.0.clone(),
        }
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The session embedded in a binding token, if any.
#[must_use]
pub fn session_of_binding(token: &str) -> Option<&str> {
    token.split_once(BINDING_SEPARATOR).map(|(session, _)| session)
}

/// The connection embedded in a binding token.
#[must_use]
pub fn connection_of_binding(token: &str) -> &str {
    token
        .split_once(BINDING_SEPARATOR)
        .map_or(token, |(_, conn)| conn)
}

/// Something the transport loop must do for a connection.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Deliver an event.
    Event(Arc<ServerEvent>),
    /// Send a transport-level ping.
    Ping,
    /// Flush and close the connection.
    Close,
}

/// What a connection currently speaks for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Binding {
    pub session_id: Option<String>,
    pub room_id: Option<String>,
    pub nickname: Option<String>,
    /// Token of the participant record this connection holds. It keeps the
    /// session the membership was written under, even if the connection's
    /// session changes afterwards.
    pub participant: Option<String>,
}

impl Binding {
    /// Room and nickname, when bound to a room.
    #[must_use]
    pub fn membership(&self) -> Option<(&str, &str)> {
        match (&self.room_id, &self.nickname) {
            (Some(room), Some(nickname)) => Some((room, nickname)),
            _ => None,
        }
    }
}

struct ConnectionEntry {
    binding: Binding,
    sender: mpsc::UnboundedSender<Outbound>,
}

/// Registry of open connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection with its outbound queue.
    pub fn register(&self, id: ConnectionId, sender: mpsc::UnboundedSender<Outbound>) {
        debug!(connection = %id, "Connection registered");
        self.connections.insert(
            id,
            ConnectionEntry {
                binding: Binding::default(),
                sender,
            },
        );
    }

    /// Deregister a connection, returning its last binding.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Binding> {
        let removed = self.connections.remove(id).map(|(_, entry)| entry.binding);
        if removed.is_some() {
            debug!(connection = %id, "Connection deregistered");
        }
        removed
    }

    /// Check if a connection is registered.
    #[must_use]
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Current binding of a connection.
    #[must_use]
    pub fn get(&self, id: &ConnectionId) -> Option<Binding> {
        self.connections.get(id).map(|e| e.binding.clone())
    }

    /// Replace a connection's binding. Returns `false` if not registered.
    pub fn bind(&self, id: &ConnectionId, binding: Binding) -> bool {
        match self.connections.get_mut(id) {
            Some(mut entry) => {
                entry.binding = binding;
                true
            }
            None => false,
        }
    }

    /// Associate a session without touching room fields.
    pub fn set_session(&self, id: &ConnectionId, session_id: &str) {
        if let Some(mut entry) = self.connections.get_mut(id) {
            entry.binding.session_id = Some(session_id.to_string());
        }
    }

    /// Drop the room association, keeping the session.
    pub fn clear_room(&self, id: &ConnectionId) {
        if let Some(mut entry) = self.connections.get_mut(id) {
            entry.binding.room_id = None;
            entry.binding.nickname = None;
            entry.binding.participant = None;
        }
    }

    /// Connections bound to a room.
    #[must_use]
    pub fn room_members(&self, room_id: &str) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|e| e.binding.room_id.as_deref() == Some(room_id))
            .map(|e| e.key().clone())
            .collect()
    }

    /// Connections bound to a room under a nickname.
    #[must_use]
    pub fn holders(&self, room_id: &str, nickname: &str) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|e| e.binding.membership() == Some((room_id, nickname)))
            .map(|e| e.key().clone())
            .collect()
    }

    /// IDs of all registered connections.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }

    /// Queue an outbound action for a connection.
    ///
    /// Returns `false` if the connection is gone or its queue is closed.
    pub fn send(&self, id: &ConnectionId, outbound: Outbound) -> bool {
        match self.connections.get(id) {
            Some(entry) => entry.sender.send(outbound).is_ok(),
            None => false,
        }
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Number of connections bound to a room.
    #[must_use]
    pub fn bound_count(&self) -> usize {
        self.connections
            .iter()
            .filter(|e| e.binding.room_id.is_some())
            .count()
    }
}
