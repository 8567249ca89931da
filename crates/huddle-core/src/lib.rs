//! # huddle-core
//!
//! Rooms, sessions and moderation for the Huddle chat server.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **Store** - Persistence adapter for rooms, participants, messages, bans and warnings
//! - **Sessions** - Cross-reconnect identity, rebuildable from participant records
//! - **Connections** - Live transport connections and what each one is bound to
//! - **Rooms** - Join, leave, reconnect, kick and the message pipeline
//! - **Moderation** - Rate limiting, profanity screening, warnings and bans
//! - **Router** - Room-scoped fan-out and liveness pings
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Transport  │────▶│ RoomManager │────▶│    Store    │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!        ▲              │    │    │
//!        │              ▼    │    ▼
//!        │   ┌────────────┐  │  ┌─────────────┐
//!        │   │ Moderation │  │  │  Sessions   │
//!        │   └────────────┘  ▼  └─────────────┘
//!        │             ┌─────────────┐     ┌─────────────┐
//!        └─────────────│   Router    │────▶│ Connections │
//!                      └─────────────┘     └─────────────┘
//! ```
//!
//! A transport registers each connection with [`RoomManager::connect`],
//! feeds its frames to [`RoomManager::handle_text`] one at a time, drains the
//! connection's [`Outbound`] queue, and calls [`RoomManager::disconnect`]
//! when it closes.

pub mod clock;
pub mod config;
pub mod connection;
mod dispatch;
pub mod error;
pub mod maintenance;
pub mod model;
pub mod moderation;
pub mod rooms;
pub mod router;
pub mod session;
pub mod store;

#[cfg(test)]
mod scenarios;
#[cfg(test)]
pub(crate) mod test_support;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ChatConfig;
pub use connection::{Binding, ConnectionId, ConnectionRegistry, Outbound};
pub use error::{ChatError, StoreError};
pub use maintenance::{Maintenance, MaintenanceConfig};
pub use model::{Ban, Message, Participant, Room};
pub use moderation::{Moderation, ModerationConfig, RateLimitConfig};
pub use rooms::{NewRoom, RoomManager, RoomSnapshot, RoomSummary, SendOutcome, Stats};
pub use router::Router;
pub use session::{Session, SessionRegistry};
pub use store::{MemoryStore, Store};
