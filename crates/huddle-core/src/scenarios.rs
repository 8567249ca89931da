//! End-to-end flows across registries, moderation and the router.

use crate::error::ChatError;
use crate::rooms::NewRoom;
use crate::store::Store;
use crate::test_support::Harness;
use futures_util::future::join_all;
use huddle_protocol::{ClientEvent, ServerEvent};
use std::time::Duration;

#[tokio::test]
async fn capacity_rejects_third_member() {
    let h = Harness::new();
    let room = h
        .manager
        .create_room(NewRoom {
            name: "Test".into(),
            max_participants: Some(2),
            ..NewRoom::default()
        })
        .await
        .unwrap();

    let mut alice = h.connect();
    let mut bob = h.connect();
    let carol = h.connect();
    h.join(&mut alice, &room.id, "alice").await;
    h.join(&mut bob, &room.id, "bob").await;

    assert!(matches!(
        h.manager.join_room(&carol.id, &room.id, "carol", None).await,
        Err(ChatError::RoomFull)
    ));
}

#[tokio::test]
async fn message_reaches_every_member() {
    let h = Harness::new();
    let room = h.room("Test", 10).await;
    let mut alice = h.connect();
    h.join(&mut alice, &room.id, "alice").await;
    let mut bob = h.connect();
    h.join(&mut bob, &room.id, "bob").await;
    alice.events();

    h.manager
        .handle_event(
            &alice.id,
            ClientEvent::SendMessage {
                content: "hello".into(),
            },
        )
        .await
        .unwrap();

    for events in [alice.events(), bob.events()] {
        match events.as_slice() {
            [ServerEvent::NewMessage { message }] => {
                assert_eq!(message.nickname, "alice");
                assert_eq!(message.content, "hello");
            }
            other => panic!("Expected new-message, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn refresh_restores_session_silently() {
    let h = Harness::new();
    let room = h.room("Test", 10).await;

    let mut alice = h.connect();
    let session = h.init(&mut alice, None).await;
    h.join(&mut alice, &room.id, "alice").await;
    let mut bob = h.connect();
    h.join(&mut bob, &room.id, "bob").await;
    h.manager.send_message(&bob.id, "hi alice").await.unwrap();
    alice.events();
    bob.events();

    h.manager.disconnect(&alice.id).await;

    let mut reloaded = h.connect();
    h.manager
        .handle_event(
            &reloaded.id,
            ClientEvent::InitSession {
                session_id: Some(session.clone()),
            },
        )
        .await
        .unwrap();

    let events = reloaded.events();
    assert_eq!(
        events[0],
        ServerEvent::SessionInitialized {
            session_id: session.clone()
        }
    );
    match &events[1] {
        ServerEvent::SessionRestored {
            room: restored,
            nickname,
            messages,
            participants,
        } => {
            assert_eq!(restored.id, room.id);
            assert_eq!(nickname, "alice");
            assert_eq!(messages.len(), 1);
            assert_eq!(participants.len(), 2);
        }
        other => panic!("Expected session-restored, got {:?}", other),
    }
    assert_eq!(events.len(), 2);
    assert!(bob.events().is_empty());

    // The restored connection is live in the room again.
    h.clock.advance(Duration::from_secs(2));
    h.manager.send_message(&bob.id, "welcome back").await.unwrap();
    assert!(matches!(reloaded.events().as_slice(), [ServerEvent::NewMessage { .. }]));
}

#[tokio::test]
async fn lost_session_table_heals_from_participants() {
    let h = Harness::new();
    let room = h.room("Test", 10).await;

    let mut alice = h.connect();
    let session = h.init(&mut alice, None).await;
    h.join(&mut alice, &room.id, "alice").await;
    h.manager.disconnect(&alice.id).await;

    // Simulate the in-memory table being lost while the store survives.
    assert!(h.manager.delete_session(&session));

    let mut reloaded = h.connect();
    h.manager
        .init_session(&reloaded.id, Some(&session))
        .await
        .unwrap();
    let events = reloaded.events();
    assert!(matches!(
        &events[1],
        ServerEvent::SessionRestored { nickname, .. } if nickname == "alice"
    ));
}

#[tokio::test]
async fn kicked_member_is_told_and_banned() {
    let h = Harness::new();
    let room = h.room("Test", 10).await;

    let mut alice = h.connect();
    h.join(&mut alice, &room.id, "alice").await;
    let mut bob = h.connect();
    let bob_session = h.init(&mut bob, None).await;
    h.join(&mut bob, &room.id, "bob").await;
    alice.events();

    let detail = h.manager.room_detail(&room.id).await.unwrap();
    let target = detail
        .participants
        .iter()
        .find(|p| p.nickname == "bob")
        .unwrap();
    h.manager.kick_participant(&room.id, target.id).await.unwrap();

    assert!(matches!(bob.events().as_slice(), [ServerEvent::Kicked { .. }]));
    assert_eq!(
        alice.events(),
        vec![ServerEvent::user_left("bob", Some(1), Some("kicked"))]
    );

    let bans = h.manager.list_bans(&room.id).await.unwrap();
    assert_eq!(bans.len(), 1);
    assert_eq!(bans[0].session_id.as_deref(), Some(bob_session.as_str()));
    assert_eq!(bans[0].expires_at - bans[0].banned_at, 30 * 60 * 1000);

    h.clock.advance(Duration::from_secs(29 * 60));
    assert!(matches!(
        h.manager
            .join_room(&bob.id, &room.id, "bob", Some(&bob_session))
            .await,
        Err(ChatError::Banned { .. })
    ));

    h.clock.advance(Duration::from_secs(60));
    h.join(&mut bob, &room.id, "bob").await;
}

#[tokio::test]
async fn lifted_ban_allows_rejoin() {
    let h = Harness::new();
    let room = h.room("Test", 10).await;
    let mut bob = h.connect();
    h.join(&mut bob, &room.id, "bob").await;

    let participant = h.store.participants(&room.id).await.unwrap().remove(0);
    h.manager.kick_participant(&room.id, participant.id).await.unwrap();
    assert!(h.manager.join_room(&bob.id, &room.id, "bob", None).await.is_err());

    let ban = h.manager.list_bans(&room.id).await.unwrap().remove(0);
    assert!(h.manager.remove_ban(ban.id).await.unwrap());
    h.join(&mut bob, &room.id, "bob").await;
}

#[tokio::test]
async fn auto_ban_after_three_warnings() {
    let h = Harness::new();
    let room = h.room("Test", 10).await;
    let mut alice = h.connect();
    h.init(&mut alice, None).await;
    h.join(&mut alice, &room.id, "alice").await;
    let mut bob = h.connect();
    h.join(&mut bob, &room.id, "bob").await;
    alice.events();

    for _ in 0..3 {
        let _ = h
            .manager
            .handle_event(
                &alice.id,
                ClientEvent::SendMessage {
                    content: "you absolute bitch".into(),
                },
            )
            .await;
        h.clock.advance(Duration::from_millis(1_100));
    }

    let banned: Vec<_> = bob
        .events()
        .into_iter()
        .filter(|e| matches!(e, ServerEvent::UserBanned { .. }))
        .collect();
    assert_eq!(banned.len(), 1);

    let bans = h.manager.list_bans(&room.id).await.unwrap();
    assert_eq!(bans.len(), 1);
    assert_eq!(bans[0].reason, "automatic_ban_3_warnings");
    assert!(h.store.recent_messages(&room.id, 10).await.unwrap().is_empty());

    let warnings: Vec<_> = alice
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ServerEvent::Warning { message } => Some(message),
            _ => None,
        })
        .collect();
    assert_eq!(warnings.len(), 2);
    assert!(warnings[1].starts_with("Warning 2/3"));
}

#[tokio::test]
async fn concurrent_joins_keep_one_record_per_nickname() {
    let h = Harness::new();
    let room = h.room("Test", 10).await;
    let clients: Vec<_> = (0..8).map(|_| h.connect()).collect();

    let results = join_all(
        clients
            .iter()
            .map(|c| h.manager.join_room(&c.id, &room.id, "alice", None)),
    )
    .await;
    assert!(results.iter().all(Result::is_ok));

    let participants = h.store.participants(&room.id).await.unwrap();
    assert_eq!(participants.len(), 1);

    // Only the connection holding the surviving record is still bound.
    let bound: Vec<_> = clients
        .iter()
        .filter(|c| h.manager.connections().get(&c.id).unwrap().room_id.is_some())
        .collect();
    assert_eq!(bound.len(), 1);
    assert_eq!(participants[0].binding, bound[0].id.binding_token(None));
}
