//! Joining, leaving, reconnecting and kicking.

use super::{RoomManager, RoomSnapshot};
use crate::config::validate_nickname;
use crate::connection::{session_of_binding, Binding, ConnectionId};
use crate::error::{ChatError, Result};
use crate::model::{Participant, Room, KICK_BAN_REASON};
use crate::moderation::Offender;
use crate::session::{validate_session_id, Session};
use crate::store::Upsert;
use huddle_protocol::ServerEvent;
use tracing::{debug, info, warn};

/// How a join was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// A new member entered the room.
    Joined,
    /// The nickname was present and now answers on this connection.
    Reconnected,
    /// The connection already held this membership.
    AlreadyJoined,
}

/// Result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub kind: JoinKind,
    pub snapshot: RoomSnapshot,
}

impl RoomManager {
    /// Handle the session handshake for a connection.
    ///
    /// Adopts `requested` if given (restoring it from participant records
    /// when it is not in memory), otherwise creates a session. Sends
    /// `session-initialized`, then `session-restored` if the session's room
    /// membership could be re-established on this connection.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::InvalidInput`] for a malformed session id, or a
    /// persistence error.
    pub async fn init_session(
        &self,
        connection: &ConnectionId,
        requested: Option<&str>,
    ) -> Result<Session> {
        let session = match requested {
            Some(id) => {
                validate_session_id(id).map_err(|e| ChatError::InvalidInput(e.to_string()))?;
                match self.sessions.get_or_restore(id, self.store.as_ref()).await? {
                    Some(session) => session,
                    None => self.sessions.create_with_id(id),
                }
            }
            None => self.sessions.create(),
        };

        self.connections.set_session(connection, &session.id);
        self.sessions.touch(&session.id);
        self.router.send_to(
            connection,
            ServerEvent::SessionInitialized {
                session_id: session.id.clone(),
            },
        );
        debug!(connection = %connection, session = %session.id, "Session initialized");

        if let Some((room_id, nickname)) = session.membership() {
            if let Err(err) = self.restore_membership(connection, &session.id, room_id, nickname).await {
                debug!(
                    connection = %connection,
                    session = %session.id,
                    room = %room_id,
                    reason = err.kind(),
                    "Session membership not restored"
                );
                self.sessions.clear_room(&session.id);
                if !matches!(err, ChatError::RoomNotFound) {
                    return Err(err);
                }
            }
        }

        Ok(self.sessions.get(&session.id).unwrap_or(session))
    }

    async fn restore_membership(
        &self,
        connection: &ConnectionId,
        session_id: &str,
        room_id: &str,
        nickname: &str,
    ) -> Result<()> {
        let room = self.open_room(room_id).await?;
        self.ensure_not_banned(&room, Some(session_id), nickname).await?;

        let current = self.connections.get(connection).unwrap_or_default();
        if current.membership().is_some() && current.membership() != Some((room_id, nickname)) {
            self.depart(connection, &current, true, None).await?;
        }

        self.place(connection, &room, nickname, Some(session_id)).await?;
        let snapshot = self.snapshot(&room).await?;
        self.router.send_to(
            connection,
            ServerEvent::SessionRestored {
                room: snapshot.room,
                messages: snapshot.messages,
                participants: snapshot.participants,
                nickname: nickname.to_string(),
            },
        );
        info!(connection = %connection, room = %room_id, nickname = %nickname, "Session restored");
        Ok(())
    }

    /// Join a room under a nickname.
    ///
    /// Rejoining with a nickname already present replaces its binding
    /// without announcing a new member, and never counts against capacity.
    /// The joiner receives `room-joined`; a genuinely new member is then
    /// announced to the room with `user-joined`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::RoomNotFound`], [`ChatError::Banned`],
    /// [`ChatError::RoomFull`], [`ChatError::InvalidInput`], or a
    /// persistence error.
    pub async fn join_room(
        &self,
        connection: &ConnectionId,
        room_id: &str,
        nickname: &str,
        session_id: Option<&str>,
    ) -> Result<JoinOutcome> {
        let nickname = validate_nickname(nickname, self.config.max_nickname_length)
            .map_err(|e| ChatError::InvalidInput(e.to_string()))?;
        if let Some(id) = session_id {
            validate_session_id(id).map_err(|e| ChatError::InvalidInput(e.to_string()))?;
            self.connections.set_session(connection, id);
        }
        let current = self.connections.get(connection).unwrap_or_default();
        let session_id = current.session_id.as_deref();

        let room = self.open_room(room_id).await?;
        self.ensure_not_banned(&room, session_id, nickname).await?;

        if current.membership() == Some((room_id, nickname)) {
            let token = connection.binding_token(session_id);
            if current.participant.as_deref() == Some(token.as_str())
                && self.store.participant_by_binding(&token).await?.is_some()
            {
                let snapshot = self.snapshot(&room).await?;
                self.send_room_joined(connection, &snapshot);
                debug!(connection = %connection, room = %room_id, nickname = %nickname, "Duplicate join ignored");
                return Ok(JoinOutcome {
                    kind: JoinKind::AlreadyJoined,
                    snapshot,
                });
            }
        } else if current.membership().is_some() {
            self.depart(connection, &current, true, None).await?;
        }

        let session = session_id.and_then(|id| self.sessions.get(id));
        let claimed = session.as_ref().and_then(|s| s.membership());
        if let (Some(id), Some((old_room, old_nickname))) = (session_id, claimed) {
            // Moving on from a membership an earlier connection left behind.
            if (old_room, old_nickname) != (room_id, nickname)
                && self.connections.holders(old_room, old_nickname).is_empty()
            {
                self.release_leftover(id, old_room, old_nickname, None).await?;
            }
        }
        // A session that still claims this membership is coming back, not arriving.
        let returning = claimed == Some((room_id, nickname));

        let kind = match self.place(connection, &room, nickname, session_id).await? {
            Upsert::Joined(_) if !returning => JoinKind::Joined,
            _ => JoinKind::Reconnected,
        };
        // The record now answers to this session; an earlier one no longer owns it.
        if let Some(previous) = current.participant.as_deref().and_then(session_of_binding) {
            if current.membership() == Some((room_id, nickname)) && Some(previous) != session_id {
                self.clear_session_room(previous, room_id, nickname);
            }
        }

        let snapshot = self.snapshot(&room).await?;
        self.send_room_joined(connection, &snapshot);
        if kind == JoinKind::Joined {
            self.router.broadcast_to_room(
                room_id,
                ServerEvent::UserJoined {
                    nickname: nickname.to_string(),
                    participant_count: snapshot.participants.len(),
                },
            );
        }
        info!(
            connection = %connection,
            room = %room_id,
            nickname = %nickname,
            kind = ?kind,
            "Joined room"
        );
        Ok(JoinOutcome { kind, snapshot })
    }

    /// Leave the connection's room.
    ///
    /// Both kinds remove the participant. An explicit leave also clears the
    /// session's membership and announces `user-left`; an implicit one is
    /// silent and leaves the session pointing at the room so a reconnect is
    /// seamless. Returns `false` if the connection was not in a room.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn leave_room(&self, connection: &ConnectionId, explicit: bool) -> Result<bool> {
        let Some(binding) = self.connections.get(connection) else {
            return Ok(false);
        };
        if binding.membership().is_none() {
            return Ok(false);
        }
        self.depart(connection, &binding, explicit, None).await?;
        Ok(true)
    }

    /// Remove a participant, ban it for the kick period and tell everyone.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::RoomNotFound`] or [`ChatError::ParticipantNotFound`],
    /// or a persistence error.
    pub async fn kick_participant(&self, room_id: &str, participant_id: u64) -> Result<Participant> {
        if self.store.room(room_id).await?.is_none() {
            return Err(ChatError::RoomNotFound);
        }
        let participant = self
            .store
            .participant(participant_id)
            .await?
            .filter(|p| p.room_id == room_id)
            .ok_or(ChatError::ParticipantNotFound)?;
        let nickname = participant.nickname.as_str();
        let session_id = participant.session_id();

        self.moderation
            .ban(
                Offender {
                    room_id,
                    session_id,
                    nickname,
                },
                self.config.moderation.kick_ban_duration,
                KICK_BAN_REASON,
            )
            .await?;
        self.store.remove_participant(participant.id).await?;

        for holder in self.connections.holders(room_id, nickname) {
            self.router.send_to(
                &holder,
                ServerEvent::Kicked {
                    message: "You have been removed from this room".to_string(),
                },
            );
            self.connections.clear_room(&holder);
        }
        if let Some(id) = session_id {
            self.clear_session_room(id, room_id, nickname);
        }

        let count = self.store.participant_count(room_id).await?;
        self.router.broadcast_to_room(
            room_id,
            ServerEvent::user_left(nickname, Some(count), Some("kicked")),
        );
        info!(room = %room_id, nickname = %nickname, "Participant kicked");
        Ok(participant)
    }

    /// Tear down a closed connection.
    ///
    /// While the session that owns the participant record exists, the record
    /// stays so the session can reclaim it. Otherwise it is removed and the
    /// room is told.
    pub async fn disconnect(&self, connection: &ConnectionId) {
        self.moderation.forget_connection(connection);
        let Some(binding) = self.connections.unregister(connection) else {
            return;
        };
        let Some((room_id, nickname)) = binding.membership() else {
            return;
        };
        let token = participant_token(connection, &binding);
        if session_of_binding(&token).is_some_and(|owner| self.sessions.get(owner).is_some()) {
            debug!(connection = %connection, room = %room_id, nickname = %nickname, "Membership kept for reconnect");
            return;
        }

        let result = async {
            if self.store.remove_participant_by_binding(&token).await?.is_some() {
                let count = self.store.participant_count(room_id).await?;
                self.router.broadcast_to_room(
                    room_id,
                    ServerEvent::user_left(nickname, Some(count), Some("disconnected")),
                );
            }
            Ok::<_, ChatError>(())
        }
        .await;
        if let Err(err) = result {
            warn!(connection = %connection, error = %err, "Failed to release participant");
        }
    }

    /// Take a connection out of its room.
    pub(crate) async fn depart(
        &self,
        connection: &ConnectionId,
        binding: &Binding,
        explicit: bool,
        reason: Option<&str>,
    ) -> Result<Option<Participant>> {
        let Some((room_id, nickname)) = binding.membership() else {
            return Ok(None);
        };
        let token = participant_token(connection, binding);
        let removed = self.store.remove_participant_by_binding(&token).await?;
        self.connections.clear_room(connection);

        if explicit {
            if let Some(owner) = session_of_binding(&token) {
                self.clear_session_room(owner, room_id, nickname);
            }
            if removed.is_some() {
                let count = self.store.participant_count(room_id).await?;
                self.router.broadcast_to_room(
                    room_id,
                    ServerEvent::user_left(nickname, Some(count), reason),
                );
            }
        }
        debug!(
            connection = %connection,
            room = %room_id,
            nickname = %nickname,
            explicit,
            "Left room"
        );
        Ok(removed)
    }

    /// Remove a participant a session left behind and announce it.
    ///
    /// Returns `false` if no such record remains.
    pub(crate) async fn release_leftover(
        &self,
        session_id: &str,
        room_id: &str,
        nickname: &str,
        reason: Option<&str>,
    ) -> Result<bool> {
        let leftover = self
            .store
            .participants(room_id)
            .await?
            .into_iter()
            .find(|p| p.nickname == nickname && p.session_id() == Some(session_id));
        let Some(participant) = leftover else {
            return Ok(false);
        };
        self.store.remove_participant(participant.id).await?;
        let count = self.store.participant_count(room_id).await?;
        self.router.broadcast_to_room(
            room_id,
            ServerEvent::user_left(nickname, Some(count), reason),
        );
        debug!(session = %session_id, room = %room_id, nickname = %nickname, "Released leftover participant");
        Ok(true)
    }

    /// Write the participant record and bind the connection to it.
    async fn place(
        &self,
        connection: &ConnectionId,
        room: &Room,
        nickname: &str,
        session_id: Option<&str>,
    ) -> Result<Upsert> {
        let token = connection.binding_token(session_id);
        let upsert = self
            .store
            .upsert_participant(
                &room.id,
                nickname,
                &token,
                self.now(),
                room.max_participants as usize,
            )
            .await?;
        if upsert == Upsert::Full {
            return Err(ChatError::RoomFull);
        }

        self.connections.bind(
            connection,
            Binding {
                session_id: session_id.map(str::to_string),
                room_id: Some(room.id.clone()),
                nickname: Some(nickname.to_string()),
                participant: Some(token),
            },
        );
        if let Some(id) = session_id {
            self.sessions.set_room(id, &room.id, nickname);
        }

        // Older connections still bound to this membership stop receiving room traffic.
        for holder in self.connections.holders(&room.id, nickname) {
            if &holder != connection {
                debug!(connection = %holder, room = %room.id, nickname = %nickname, "Displaced by reconnect");
                self.connections.clear_room(&holder);
            }
        }
        Ok(upsert)
    }

    async fn ensure_not_banned(
        &self,
        room: &Room,
        session_id: Option<&str>,
        nickname: &str,
    ) -> Result<()> {
        let offender = Offender {
            room_id: &room.id,
            session_id,
            nickname,
        };
        match self.moderation.active_ban(offender).await? {
            Some(ban) => Err(ChatError::Banned {
                remaining_secs: ban.remaining_secs(self.now()),
            }),
            None => Ok(()),
        }
    }

    fn clear_session_room(&self, session_id: &str, room_id: &str, nickname: &str) {
        let claims = self
            .sessions
            .get(session_id)
            .is_some_and(|s| s.membership() == Some((room_id, nickname)));
        if claims {
            self.sessions.clear_room(session_id);
        }
    }

    fn send_room_joined(&self, connection: &ConnectionId, snapshot: &RoomSnapshot) {
        self.router.send_to(
            connection,
            ServerEvent::RoomJoined {
                room: snapshot.room.clone(),
                messages: snapshot.messages.clone(),
                participants: snapshot.participants.clone(),
            },
        );
    }
}

/// Token of the record a binding holds, or the connection's current
/// identity when the binding carries none.
fn participant_token(connection: &ConnectionId, binding: &Binding) -> String {
    binding
        .participant
        .clone()
        .unwrap_or_else(|| connection.binding_token(binding.session_id.as_deref()))
}
