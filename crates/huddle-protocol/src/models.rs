//! Payload shapes shared by several events.
//!
//! These are views of the server's records: they carry what a client may see
//! and nothing about how a membership is bound to a transport connection.

use serde::{Deserialize, Serialize};

/// A chat room as presented to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    /// Short URL-safe room identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Tag of whoever created the room.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Capacity limit.
    pub max_participants: u32,
    /// Expiry instant, epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// Creation instant, epoch milliseconds.
    pub created_at: u64,
}

/// A room member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub id: u64,
    pub nickname: String,
    pub joined_at: u64,
}

/// A stored chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInfo {
    pub id: u64,
    pub room_id: String,
    pub nickname: String,
    pub content: String,
    /// Acceptance instant, epoch milliseconds.
    pub timestamp: u64,
    pub filtered: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_room_info_camel_case() {
        let room = RoomInfo {
            id: "k3x9a0zq".into(),
            name: "Test".into(),
            created_by: None,
            max_participants: 2,
            expires_at: None,
            created_at: 1_700_000_000_000,
        };

        let value = serde_json::to_value(&room).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "k3x9a0zq",
                "name": "Test",
                "maxParticipants": 2,
                "createdAt": 1_700_000_000_000u64,
            })
        );
    }
}
