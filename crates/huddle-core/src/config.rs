//! Core policy settings and input validation.

use crate::moderation::ModerationConfig;
use std::time::Duration;

/// Room, session and moderation policy.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Capacity used when a room is created without one.
    pub default_max_participants: u32,
    /// Largest capacity a room may be created with.
    pub max_participants: u32,
    /// Messages returned with a room snapshot.
    pub message_history: usize,
    pub max_nickname_length: usize,
    pub max_content_length: usize,
    pub max_room_name_length: usize,
    /// Length of generated room ids.
    pub room_id_length: usize,
    /// Idle time after which a session is swept.
    pub session_timeout: Duration,
    pub moderation: ModerationConfig,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_max_participants: 10,
            max_participants: 100,
            message_history: 100,
            max_nickname_length: 30,
            max_content_length: 1000,
            max_room_name_length: 100,
            room_id_length: 8,
            session_timeout: Duration::from_secs(2 * 60 * 60),
            moderation: ModerationConfig::default(),
        }
    }
}

/// Validate a nickname, returning it trimmed.
///
/// # Errors
///
/// Returns an error message if the nickname is empty, too long, or contains
/// control characters.
pub fn validate_nickname(nickname: &str, max_length: usize) -> Result<&str, &'static str> {
    let nickname = nickname.trim();
    if nickname.is_empty() {
        return Err("Nickname cannot be empty");
    }
    if nickname.chars().count() > max_length {
        return Err("Nickname too long");
    }
    if nickname.chars().any(char::is_control) {
        return Err("Nickname contains invalid characters");
    }
    Ok(nickname)
}

/// Validate message content, returning it trimmed.
///
/// # Errors
///
/// Returns an error message if the content is blank or too long.
pub fn validate_content(content: &str, max_length: usize) -> Result<&str, &'static str> {
    let content = content.trim();
    if content.is_empty() {
        return Err("Message cannot be empty");
    }
    if content.chars().count() > max_length {
        return Err("Message too long");
    }
    Ok(content)
}

/// Validate a room display name, returning it trimmed.
///
/// # Errors
///
/// Returns an error message if the name is blank or too long.
pub fn validate_room_name(name: &str, max_length: usize) -> Result<&str, &'static str> {
    let name = name.trim();
    if name.is_empty() {
        return Err("Room name cannot be empty");
    }
    if name.chars().count() > max_length {
        return Err("Room name too long");
    }
    Ok(name)
}
