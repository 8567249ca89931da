//! Fake connections over an in-memory manager.

use crate::clock::{Clock, ManualClock};
use crate::config::ChatConfig;
use crate::connection::{ConnectionId, Outbound};
use crate::model::Room;
use crate::rooms::{NewRoom, RoomManager};
use crate::store::MemoryStore;
use huddle_protocol::{ClientEvent, ServerEvent};
use std::sync::Arc;
use tokio::sync::mpsc;

/// 2024-01-01T00:00:00Z
const START: u64 = 1_704_067_200_000;

pub(crate) struct Harness {
    pub manager: Arc<RoomManager>,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
}

pub(crate) struct Client {
    pub id: ConnectionId,
    rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Client {
    /// Everything queued so far.
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Ok(outbound) = self.rx.try_recv() {
            out.push(outbound);
        }
        out
    }

    /// Events queued so far, skipping pings and closes.
    pub fn events(&mut self) -> Vec<ServerEvent> {
        self.drain()
            .into_iter()
            .filter_map(|outbound| match outbound {
                Outbound::Event(event) => Some((*event).clone()),
                _ => None,
            })
            .collect()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ChatConfig::default())
    }

    pub fn with_config(config: ChatConfig) -> Self {
        let clock = Arc::new(ManualClock::new(START));
        let store = Arc::new(MemoryStore::new());
        let manager = Arc::new(RoomManager::new(config, store.clone(), clock.clone()));
        Self {
            manager,
            store,
            clock,
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    pub fn connect(&self) -> Client {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.manager.connect(tx);
        Client { id, rx }
    }

    pub async fn room(&self, name: &str, max_participants: u32) -> Room {
        self.manager
            .create_room(NewRoom {
                name: name.to_string(),
                max_participants: Some(max_participants),
                ..NewRoom::default()
            })
            .await
            .unwrap()
    }

    /// Run the session handshake and return the session id.
    pub async fn init(&self, client: &mut Client, session_id: Option<&str>) -> String {
        self.manager
            .handle_event(
                &client.id,
                ClientEvent::InitSession {
                    session_id: session_id.map(str::to_string),
                },
            )
            .await
            .unwrap();
        match client.events().first() {
            Some(ServerEvent::SessionInitialized { session_id }) => session_id.clone(),
            other => panic!("Expected session-initialized, got {:?}", other),
        }
    }

    /// Join and discard the joiner's queued events, including any left over
    /// from before the join.
    pub async fn join(&self, client: &mut Client, room_id: &str, nickname: &str) {
        self.manager
            .join_room(&client.id, room_id, nickname, None)
            .await
            .unwrap();
        let events = client.events();
        assert!(
            events
                .iter()
                .any(|e| matches!(e, ServerEvent::RoomJoined { room, .. } if room.id == room_id)),
            "Expected room-joined, got {:?}",
            events
        );
    }
}
