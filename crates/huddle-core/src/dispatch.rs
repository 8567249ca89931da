//! Inbound protocol dispatch.
//!
//! Turns decoded client events into manager calls and reports failures back
//! to the sender. A transport loop feeds one connection's frames here in
//! arrival order, awaiting each before reading the next.

use crate::connection::ConnectionId;
use crate::error::{ChatError, Result};
use crate::rooms::RoomManager;
use huddle_protocol::{codec, ClientEvent, ServerEvent};
use tracing::trace;

impl RoomManager {
    /// Handle one text frame.
    ///
    /// # Errors
    ///
    /// Returns the error that was reported to the connection, for the
    /// caller's metrics.
    pub async fn handle_text(&self, connection: &ConnectionId, text: &str) -> Result<()> {
        match codec::decode(text) {
            Ok(event) => self.handle_event(connection, event).await,
            Err(err) => self.fail(connection, ChatError::MalformedMessage(err.to_string())),
        }
    }

    /// Handle one binary frame carrying UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Returns the error that was reported to the connection.
    pub async fn handle_bytes(&self, connection: &ConnectionId, data: &[u8]) -> Result<()> {
        match codec::decode_bytes(data) {
            Ok(event) => self.handle_event(connection, event).await,
            Err(err) => self.fail(connection, ChatError::MalformedMessage(err.to_string())),
        }
    }

    /// Handle one decoded client event.
    ///
    /// Every event counts as liveness for the connection's session.
    ///
    /// # Errors
    ///
    /// Returns the error that was reported to the connection.
    pub async fn handle_event(&self, connection: &ConnectionId, event: ClientEvent) -> Result<()> {
        trace!(connection = %connection, event = event.event_type(), "Inbound event");
        self.touch_connection(connection);

        let result = match event {
            ClientEvent::InitSession { session_id } => self
                .init_session(connection, session_id.as_deref())
                .await
                .map(drop),
            ClientEvent::JoinRoom {
                room_id,
                nickname,
                session_id,
            } => self
                .join_room(connection, &room_id, &nickname, session_id.as_deref())
                .await
                .map(drop),
            ClientEvent::SendMessage { content } => {
                self.send_message(connection, &content).await.map(drop)
            }
            ClientEvent::LeaveRoom { explicit } => self
                .leave_room(connection, explicit.unwrap_or(false))
                .await
                .map(drop),
            ClientEvent::Ping => {
                self.router().send_to(connection, ServerEvent::Pong);
                Ok(())
            }
            ClientEvent::HeartbeatAck => Ok(()),
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) => self.fail(connection, err),
        }
    }

    fn fail(&self, connection: &ConnectionId, error: ChatError) -> Result<()> {
        self.report(connection, &error);
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ChatError;
    use crate::test_support::Harness;
    use huddle_protocol::ServerEvent;
    use std::time::Duration;

    #[tokio::test]
    async fn test_malformed_frames() {
        let h = Harness::new();
        let mut alice = h.connect();

        for frame in ["not json", r#"{"type":"shout"}"#, r#"{"content":"x"}"#] {
            let result = h.manager.handle_text(&alice.id, frame).await;
            assert!(matches!(result, Err(ChatError::MalformedMessage(_))));
            assert!(matches!(alice.events().as_slice(), [ServerEvent::Error { .. }]));
        }
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let h = Harness::new();
        let mut alice = h.connect();
        h.manager.handle_text(&alice.id, r#"{"type":"ping"}"#).await.unwrap();
        assert_eq!(alice.events(), vec![ServerEvent::Pong]);

        h.manager
            .handle_bytes(&alice.id, br#"{"type":"heartbeat-ack"}"#)
            .await
            .unwrap();
        assert!(alice.events().is_empty());
    }

    #[tokio::test]
    async fn test_join_and_chat_over_frames() {
        let h = Harness::new();
        let room = h.room("Test", 5).await;
        let mut alice = h.connect();

        h.manager
            .handle_text(
                &alice.id,
                &format!(r#"{{"type":"join-room","roomId":"{}","nickname":"alice"}}"#, room.id),
            )
            .await
            .unwrap();
        let events = alice.events();
        assert!(matches!(events[0], ServerEvent::RoomJoined { .. }));
        assert!(matches!(&events[1], ServerEvent::UserJoined { participant_count: 1, .. }));

        h.manager
            .handle_text(&alice.id, r#"{"type":"send-message","content":"hello"}"#)
            .await
            .unwrap();
        assert!(matches!(alice.events().as_slice(), [ServerEvent::NewMessage { .. }]));
    }

    #[tokio::test]
    async fn test_soft_errors_become_warnings() {
        let h = Harness::new();
        let room = h.room("Test", 5).await;
        let mut alice = h.connect();
        h.join(&mut alice, &room.id, "alice").await;

        let send = |content: &str| format!(r#"{{"type":"send-message","content":"{content}"}}"#);

        h.manager.handle_text(&alice.id, &send("one")).await.unwrap();
        alice.events();
        let result = h.manager.handle_text(&alice.id, &send("two")).await;
        assert!(matches!(result, Err(ChatError::RateLimited)));
        assert!(matches!(alice.events().as_slice(), [ServerEvent::Warning { .. }]));

        h.clock.advance(Duration::from_secs(2));
        let result = h.manager.handle_text(&alice.id, &send("oh shit")).await;
        assert!(matches!(result, Err(ChatError::ContentFlagged { .. })));
        match alice.events().as_slice() {
            [ServerEvent::Warning { message }] => assert!(message.starts_with("Warning 1/3")),
            other => panic!("Expected warning, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hard_errors_become_error_events() {
        let h = Harness::new();
        let mut alice = h.connect();
        let result = h
            .manager
            .handle_text(&alice.id, r#"{"type":"send-message","content":"hi"}"#)
            .await;
        assert!(matches!(result, Err(ChatError::NotInRoom)));
        match alice.events().as_slice() {
            [ServerEvent::Error { message }] => assert_eq!(message, "You are not in a room"),
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_leave_room_defaults_to_implicit() {
        let h = Harness::new();
        let room = h.room("Test", 5).await;
        let mut alice = h.connect();
        let session = h.init(&mut alice, None).await;
        h.join(&mut alice, &room.id, "alice").await;
        let mut bob = h.connect();
        h.join(&mut bob, &room.id, "bob").await;

        h.manager
            .handle_text(&alice.id, r#"{"type":"leave-room"}"#)
            .await
            .unwrap();
        assert!(bob.events().is_empty());
        assert!(h.manager.sessions().get(&session).unwrap().membership().is_some());

        h.join(&mut alice, &room.id, "alice").await;
        h.manager
            .handle_text(&alice.id, r#"{"type":"leave-room","explicit":true}"#)
            .await
            .unwrap();
        assert_eq!(bob.events(), vec![ServerEvent::user_left("alice", Some(1), None)]);
    }

    #[tokio::test]
    async fn test_heartbeat_ack_keeps_session_alive() {
        let h = Harness::new();
        let mut alice = h.connect();
        let session = h.init(&mut alice, None).await;
        let half = h.manager.config().session_timeout / 2 + Duration::from_secs(60);

        h.clock.advance(half);
        h.manager
            .handle_text(&alice.id, r#"{"type":"heartbeat-ack"}"#)
            .await
            .unwrap();
        assert_eq!(h.manager.sessions().get(&session).unwrap().last_activity, h.now());
        assert!(alice.events().is_empty());

        h.clock.advance(half);
        assert_eq!(h.manager.expire_stale_sessions().await.unwrap(), 0);
        assert!(h.manager.sessions().get(&session).is_some());
    }
}
