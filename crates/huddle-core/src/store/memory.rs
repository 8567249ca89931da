//! In-memory storage backend.

use super::{Result, Store, Upsert};
use crate::model::{Ban, Message, NewBan, NewMessage, NewWarning, Participant, Room, Warning};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Default)]
struct Tables {
    rooms: HashMap<String, Room>,
    participants: BTreeMap<u64, Participant>,
    messages: HashMap<String, Vec<Message>>,
    bans: BTreeMap<u64, Ban>,
    warnings: Vec<Warning>,
    next_id: u64,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn find_participant(&self, room_id: &str, nickname: &str) -> Option<u64> {
        self.participants
            .values()
            .find(|p| p.room_id == room_id && p.nickname == nickname)
            .map(|p| p.id)
    }

    fn find_binding(&self, binding: &str) -> Option<u64> {
        self.participants
            .values()
            .find(|p| p.binding == binding)
            .map(|p| p.id)
    }
}

/// In-memory store.
///
/// All tables sit behind one lock so multi-row operations are atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_room(&self, room: Room) -> Result<bool> {
        let mut tables = self.tables.write();
        if tables.rooms.contains_key(&room.id) {
            return Ok(false);
        }
        tables.rooms.insert(room.id.clone(), room);
        Ok(true)
    }

    async fn room(&self, room_id: &str) -> Result<Option<Room>> {
        Ok(self.tables.read().rooms.get(room_id).cloned())
    }

    async fn active_rooms(&self) -> Result<Vec<Room>> {
        let tables = self.tables.read();
        let mut rooms: Vec<Room> = tables
            .rooms
            .values()
            .filter(|r| r.is_active)
            .cloned()
            .collect();
        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rooms)
    }

    async fn delete_room(&self, room_id: &str) -> Result<bool> {
        let mut tables = self.tables.write();
        if tables.rooms.remove(room_id).is_none() {
            return Ok(false);
        }
        tables.participants.retain(|_, p| p.room_id != room_id);
        tables.messages.remove(room_id);
        tables.bans.retain(|_, b| b.room_id != room_id);
        tables.warnings.retain(|w| w.room_id != room_id);
        debug!(room = %room_id, "Deleted room and dependent rows");
        Ok(true)
    }

    async fn expired_rooms(&self, now: u64) -> Result<Vec<String>> {
        Ok(self
            .tables
            .read()
            .rooms
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.id.clone())
            .collect())
    }

    async fn upsert_participant(
        &self,
        room_id: &str,
        nickname: &str,
        binding: &str,
        joined_at: u64,
        capacity: usize,
    ) -> Result<Upsert> {
        let mut tables = self.tables.write();

        let previous = match tables.find_participant(room_id, nickname) {
            Some(id) => tables.participants.remove(&id),
            None => {
                let count = tables
                    .participants
                    .values()
                    .filter(|p| p.room_id == room_id)
                    .count();
                if count >= capacity {
                    return Ok(Upsert::Full);
                }
                None
            }
        };

        let current = Participant {
            id: tables.next_id(),
            room_id: room_id.to_string(),
            nickname: nickname.to_string(),
            binding: binding.to_string(),
            joined_at,
        };
        tables.participants.insert(current.id, current.clone());

        Ok(match previous {
            Some(previous) => Upsert::Reconnected { previous, current },
            None => Upsert::Joined(current),
        })
    }

    async fn participants(&self, room_id: &str) -> Result<Vec<Participant>> {
        Ok(self
            .tables
            .read()
            .participants
            .values()
            .filter(|p| p.room_id == room_id)
            .cloned()
            .collect())
    }

    async fn participant(&self, participant_id: u64) -> Result<Option<Participant>> {
        Ok(self.tables.read().participants.get(&participant_id).cloned())
    }

    async fn participant_by_binding(&self, binding: &str) -> Result<Option<Participant>> {
        let tables = self.tables.read();
        Ok(tables
            .find_binding(binding)
            .and_then(|id| tables.participants.get(&id).cloned()))
    }

    async fn remove_participant(&self, participant_id: u64) -> Result<Option<Participant>> {
        Ok(self.tables.write().participants.remove(&participant_id))
    }

    async fn remove_participant_by_binding(&self, binding: &str) -> Result<Option<Participant>> {
        let mut tables = self.tables.write();
        Ok(match tables.find_binding(binding) {
            Some(id) => tables.participants.remove(&id),
            None => None,
        })
    }

    async fn participant_count(&self, room_id: &str) -> Result<usize> {
        Ok(self
            .tables
            .read()
            .participants
            .values()
            .filter(|p| p.room_id == room_id)
            .count())
    }

    async fn insert_message(&self, message: NewMessage) -> Result<Message> {
        let mut tables = self.tables.write();
        let stored = Message {
            id: tables.next_id(),
            room_id: message.room_id,
            nickname: message.nickname,
            content: message.content,
            timestamp: message.timestamp,
            filtered: message.filtered,
        };
        tables
            .messages
            .entry(stored.room_id.clone())
            .or_default()
            .push(stored.clone());
        Ok(stored)
    }

    async fn recent_messages(&self, room_id: &str, limit: usize) -> Result<Vec<Message>> {
        let tables = self.tables.read();
        Ok(tables
            .messages
            .get(room_id)
            .map(|all| all[all.len().saturating_sub(limit)..].to_vec())
            .unwrap_or_default())
    }

    async fn insert_ban(&self, ban: NewBan) -> Result<Ban> {
        let mut tables = self.tables.write();
        let stored = Ban {
            id: tables.next_id(),
            room_id: ban.room_id,
            session_id: ban.session_id,
            nickname: ban.nickname,
            banned_at: ban.banned_at,
            expires_at: ban.expires_at,
            reason: ban.reason,
        };
        tables.bans.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn active_ban(
        &self,
        room_id: &str,
        session_id: Option<&str>,
        nickname: &str,
        now: u64,
    ) -> Result<Option<Ban>> {
        let tables = self.tables.read();
        let mut active = tables
            .bans
            .values()
            .filter(|b| b.room_id == room_id && b.is_active(now));

        let by_session = session_id.and_then(|sid| {
            active
                .clone()
                .find(|b| b.session_id.as_deref() == Some(sid))
        });

        Ok(by_session
            .or_else(|| active.find(|b| b.nickname == nickname))
            .cloned())
    }

    async fn active_bans(&self, room_id: &str, now: u64) -> Result<Vec<Ban>> {
        Ok(self
            .tables
            .read()
            .bans
            .values()
            .filter(|b| b.room_id == room_id && b.is_active(now))
            .cloned()
            .collect())
    }

    async fn delete_ban(&self, ban_id: u64) -> Result<bool> {
        Ok(self.tables.write().bans.remove(&ban_id).is_some())
    }

    async fn insert_warning(&self, warning: NewWarning) -> Result<Warning> {
        let mut tables = self.tables.write();
        let stored = Warning {
            id: tables.next_id(),
            room_id: warning.room_id,
            session_id: warning.session_id,
            nickname: warning.nickname,
            original: warning.original,
            filtered: warning.filtered,
            kind: warning.kind,
            created_at: warning.created_at,
        };
        tables.warnings.push(stored.clone());
        Ok(stored)
    }

    async fn count_warnings(
        &self,
        room_id: &str,
        session_id: Option<&str>,
        nickname: &str,
        since: u64,
    ) -> Result<usize> {
        Ok(self
            .tables
            .read()
            .warnings
            .iter()
            .filter(|w| w.room_id == room_id && w.nickname == nickname && w.created_at >= since)
            .filter(|w| session_id.is_none() || w.session_id.as_deref() == session_id)
            .count())
    }
}
