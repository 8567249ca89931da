//! The message send pipeline.

use super::RoomManager;
use crate::config::validate_content;
use crate::connection::{Binding, ConnectionId};
use crate::error::{ChatError, Result};
use crate::model::{Ban, Message, NewMessage, AUTO_BAN_REASON, PROFANITY_WARNING};
use crate::moderation::{Offender, RateDecision};
use huddle_protocol::ServerEvent;
use tracing::{debug, info};

/// What happened to an accepted `send-message`.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    /// Stored and broadcast.
    Delivered(Message),
    /// Dropped; the sender reached the warning threshold and was banned.
    AutoBanned(Ban),
}

impl RoomManager {
    /// Post a message to the connection's room.
    ///
    /// The message passes the rate limiter and the content screen before it
    /// is stored and broadcast. A flagged message is never stored: it adds a
    /// warning, and the warning that reaches the threshold bans the sender,
    /// removes it from the room and closes its connection.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NotInRoom`], [`ChatError::RateLimited`],
    /// [`ChatError::ContentFlagged`], [`ChatError::InvalidInput`],
    /// [`ChatError::RoomNotFound`], or a persistence error.
    pub async fn send_message(&self, connection: &ConnectionId, content: &str) -> Result<SendOutcome> {
        let binding = self.connections.get(connection).unwrap_or_default();
        let Some((room_id, nickname)) = binding.membership() else {
            return Err(ChatError::NotInRoom);
        };

        if self.moderation.check_rate_limit(connection) == RateDecision::Reject {
            return Err(ChatError::RateLimited);
        }
        let content = validate_content(content, self.config.max_content_length)
            .map_err(|e| ChatError::InvalidInput(e.to_string()))?;
        self.open_room(room_id).await?;

        let screening = self.moderation.screen_content(content);
        if screening.is_flagged {
            let offender = Offender {
                room_id,
                session_id: binding.session_id.as_deref(),
                nickname,
            };
            self.moderation
                .record_warning(offender, content, &screening.cleaned, PROFANITY_WARNING)
                .await?;
            let count = self.moderation.count_warnings(offender).await?;
            if self.moderation.threshold_reached(count) {
                let ban = self.auto_ban(connection, &binding, offender).await?;
                return Ok(SendOutcome::AutoBanned(ban));
            }
            return Err(ChatError::ContentFlagged {
                count,
                threshold: self.config.moderation.warning_threshold,
            });
        }

        let message = self
            .store
            .insert_message(NewMessage {
                room_id: room_id.to_string(),
                nickname: nickname.to_string(),
                content: content.to_string(),
                timestamp: self.now(),
                filtered: false,
            })
            .await?;
        self.router.broadcast_to_room(
            room_id,
            ServerEvent::NewMessage {
                message: message.info(),
            },
        );
        debug!(connection = %connection, room = %room_id, message = message.id, "Message delivered");
        Ok(SendOutcome::Delivered(message))
    }

    async fn auto_ban(
        &self,
        connection: &ConnectionId,
        binding: &Binding,
        offender: Offender<'_>,
    ) -> Result<Ban> {
        let duration = self.config.moderation.auto_ban_duration;
        let ban = self
            .moderation
            .ban(offender, duration, AUTO_BAN_REASON)
            .await?;

        self.router.broadcast_to_room(
            offender.room_id,
            ServerEvent::UserBanned {
                nickname: offender.nickname.to_string(),
                reason: AUTO_BAN_REASON.to_string(),
                duration: duration.as_secs(),
            },
        );
        self.depart(connection, binding, true, Some("banned")).await?;
        self.router.send_to(
            connection,
            ServerEvent::error(format!(
                "You have been banned from this room for {} minutes for repeated inappropriate language",
                duration.as_secs().div_ceil(60)
            )),
        );
        self.router.close(connection);
        info!(
            connection = %connection,
            room = %offender.room_id,
            nickname = %offender.nickname,
            "Sender auto-banned"
        );
        Ok(ban)
    }
}
