//! Room-scoped event fan-out.
//!
//! The router delivers events to every connection the
//! [`ConnectionRegistry`] currently binds to a room, and drives the
//! liveness pings that keep idle connections open through proxies.

use crate::connection::{ConnectionId, ConnectionRegistry, Outbound};
use huddle_protocol::ServerEvent;
use std::sync::Arc;
use tracing::{debug, trace};

/// Event router over the connection registry.
pub struct Router {
    connections: Arc<ConnectionRegistry>,
}

impl Router {
    /// Create a router over a registry.
    #[must_use]
    pub fn new(connections: Arc<ConnectionRegistry>) -> Self {
        Self { connections }
    }

    /// Deliver an event to every connection bound to a room.
    ///
    /// A failed delivery is logged and skipped. Returns the number of
    /// connections that accepted the event.
    pub fn broadcast_to_room(&self, room_id: &str, event: ServerEvent) -> usize {
        let event = Arc::new(event);
        let mut delivered = 0;
        for connection in self.connections.room_members(room_id) {
            if self
                .connections
                .send(&connection, Outbound::Event(Arc::clone(&event)))
            {
                delivered += 1;
            } else {
                debug!(
                    connection = %connection,
                    room = %room_id,
                    event = event.event_type(),
                    "Dropped event for closed connection"
                );
            }
        }
        trace!(room = %room_id, event = event.event_type(), recipients = delivered, "Broadcast");
        delivered
    }

    /// Deliver an event to one connection.
    pub fn send_to(&self, connection: &ConnectionId, event: ServerEvent) -> bool {
        let sent = self
            .connections
            .send(connection, Outbound::Event(Arc::new(event)));
        if !sent {
            debug!(connection = %connection, "Send to closed connection");
        }
        sent
    }

    /// Ask the transport to close a connection after flushing queued events.
    pub fn close(&self, connection: &ConnectionId) -> bool {
        self.connections.send(connection, Outbound::Close)
    }

    /// Send a transport ping to every open connection.
    pub fn ping_all(&self) -> usize {
        self.fan_out_all(|| Outbound::Ping)
    }

    /// Send `server-heartbeat` to every open connection.
    pub fn heartbeat_all(&self) -> usize {
        let event = Arc::new(ServerEvent::ServerHeartbeat);
        self.fan_out_all(|| Outbound::Event(Arc::clone(&event)))
    }

    fn fan_out_all(&self, outbound: impl Fn() -> Outbound) -> usize {
        self.connections
            .ids()
            .iter()
            .filter(|id| self.connections.send(id, outbound()))
            .count()
    }
}
