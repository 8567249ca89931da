//! # huddle-protocol
//!
//! Wire protocol definitions for the Huddle chat server.
//!
//! Clients and the server exchange JSON text frames over a WebSocket. Every
//! frame is an object carrying a `type` discriminator, and each event kind has
//! its own payload shape.
//!
//! ## Event Types
//!
//! - `init-session` / `session-initialized` / `session-restored` - Session handshake
//! - `join-room` / `room-joined` / `leave-room` - Room membership
//! - `send-message` / `new-message` - Chat traffic
//! - `user-joined` / `user-left` / `user-banned` / `kicked` - Room notices
//! - `warning` / `error` - Moderation and failure reports
//! - `ping` / `pong` / `server-heartbeat` / `heartbeat-ack` - Liveness
//!
//! ## Example
//!
//! ```rust
//! use huddle_protocol::{codec, ClientEvent};
//!
//! let event = codec::decode(r#"{"type":"send-message","content":"hello"}"#).unwrap();
//! assert_eq!(event, ClientEvent::SendMessage { content: "hello".into() });
//! ```

pub mod codec;
pub mod events;
pub mod models;

pub use codec::{decode, encode, ProtocolError};
pub use events::{ClientEvent, ServerEvent};
pub use models::{MessageInfo, ParticipantInfo, RoomInfo};
