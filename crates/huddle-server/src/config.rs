//! Server configuration.
//!
//! Configuration can be loaded from:
//! - TOML configuration file (`huddle.toml`, `/etc/huddle/huddle.toml`,
//!   `~/.config/huddle/huddle.toml`, first match wins)
//! - Environment variables (`HUDDLE_PORT`, `HUDDLE_LIMITS__MAX_CONNECTIONS`, ...),
//!   which override the file

use anyhow::{ensure, Context, Result};
use huddle_core::{ChatConfig, MaintenanceConfig, ModerationConfig, RateLimitConfig};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

const CONFIG_PATHS: [&str; 3] = [
    "huddle.toml",
    "/etc/huddle/huddle.toml",
    "~/.config/huddle/huddle.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Liveness pings.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Session lifetime.
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Room housekeeping.
    #[serde(default)]
    pub rooms: RoomsConfig,

    /// Moderation policy.
    #[serde(default)]
    pub moderation: ModerationSettings,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Path for WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub websocket_path: String,

    /// Prefix for the HTTP API.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum frame size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Largest capacity a room may be created with.
    #[serde(default = "default_max_participants")]
    pub max_participants: u32,

    /// Capacity of rooms created without one.
    #[serde(default = "default_room_capacity")]
    pub default_max_participants: u32,

    /// Messages sent with a room snapshot.
    #[serde(default = "default_message_history")]
    pub message_history: usize,

    #[serde(default = "default_max_nickname_length")]
    pub max_nickname_length: usize,

    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    #[serde(default = "default_max_room_name_length")]
    pub max_room_name_length: usize,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Transport ping interval in milliseconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_ms: u64,

    /// `server-heartbeat` interval in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
}

/// Session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Idle time before a session is swept.
    #[serde(default = "default_session_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_session_sweep")]
    pub sweep_interval_secs: u64,
}

/// Room configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomsConfig {
    /// How often expired rooms are deleted.
    #[serde(default = "default_room_sweep")]
    pub sweep_interval_secs: u64,

    /// Length of generated room ids.
    #[serde(default = "default_room_id_length")]
    pub id_length: usize,
}

/// Moderation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationSettings {
    #[serde(default = "default_rate_limit_messages")]
    pub rate_limit_messages: u32,

    #[serde(default = "default_rate_limit_window")]
    pub rate_limit_window_ms: u64,

    /// Warnings before an automatic ban.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: usize,

    /// Age after which warnings stop counting. 0 keeps them forever.
    #[serde(default)]
    pub warning_window_secs: u64,

    #[serde(default = "default_auto_ban")]
    pub auto_ban_secs: u64,

    #[serde(default = "default_kick_ban")]
    pub kick_ban_secs: u64,

    /// Additional words for the profanity filter.
    #[serde(default)]
    pub extra_words: Vec<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_api_prefix() -> String {
    "/api".to_string()
}

fn default_max_connections() -> usize {
    100_000
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_max_participants() -> u32 {
    100
}

fn default_room_capacity() -> u32 {
    10
}

fn default_message_history() -> usize {
    100
}

fn default_max_nickname_length() -> usize {
    30
}

fn default_max_content_length() -> usize {
    1000
}

fn default_max_room_name_length() -> usize {
    100
}

fn default_ping_interval() -> u64 {
    30_000 // 30 seconds
}

fn default_heartbeat_interval() -> u64 {
    45_000 // 45 seconds
}

fn default_session_timeout() -> u64 {
    2 * 60 * 60
}

fn default_session_sweep() -> u64 {
    10 * 60
}

fn default_room_sweep() -> u64 {
    5 * 60
}

fn default_room_id_length() -> usize {
    8
}

fn default_rate_limit_messages() -> u32 {
    1
}

fn default_rate_limit_window() -> u64 {
    1_000
}

fn default_warning_threshold() -> usize {
    3
}

fn default_auto_ban() -> u64 {
    10 * 60
}

fn default_kick_ban() -> u64 {
    30 * 60
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            sessions: SessionsConfig::default(),
            rooms: RoomsConfig::default(),
            moderation: ModerationSettings::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_ws_path(),
            api_prefix: default_api_prefix(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_message_size: default_max_message_size(),
            max_participants: default_max_participants(),
            default_max_participants: default_room_capacity(),
            message_history: default_message_history(),
            max_nickname_length: default_max_nickname_length(),
            max_content_length: default_max_content_length(),
            max_room_name_length: default_max_room_name_length(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval_ms: default_ping_interval(),
            heartbeat_interval_ms: default_heartbeat_interval(),
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_session_timeout(),
            sweep_interval_secs: default_session_sweep(),
        }
    }
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_room_sweep(),
            id_length: default_room_id_length(),
        }
    }
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            rate_limit_messages: default_rate_limit_messages(),
            rate_limit_window_ms: default_rate_limit_window(),
            warning_threshold: default_warning_threshold(),
            warning_window_secs: 0,
            auto_ban_secs: default_auto_ban(),
            kick_ban_secs: default_kick_ban(),
            extra_words: Vec::new(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, overlaid with
    /// `HUDDLE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file or variable cannot be parsed.
    pub fn load() -> Result<Self> {
        let mut builder = ::config::Config::builder();

        let found = CONFIG_PATHS
            .iter()
            .map(|path| shellexpand::tilde(path).into_owned())
            .find(|path| Path::new(path).exists());
        if let Some(path) = &found {
            builder = builder.add_source(::config::File::from(Path::new(path)));
        }

        let config: Self = builder
            .add_source(
                ::config::Environment::with_prefix("HUDDLE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("moderation.extra_words"),
            )
            .build()
            .and_then(::config::Config::try_deserialize)
            .with_context(|| match &found {
                Some(path) => format!("Failed to load configuration from {path}"),
                None => "Failed to load configuration from environment".to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;

        Ok(config)
    }

    /// Reject values the server cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first zero period or length found.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.heartbeat.ping_interval_ms > 0, "heartbeat.ping_interval_ms must be positive");
        ensure!(
            self.heartbeat.heartbeat_interval_ms > 0,
            "heartbeat.heartbeat_interval_ms must be positive"
        );
        ensure!(self.sessions.sweep_interval_secs > 0, "sessions.sweep_interval_secs must be positive");
        ensure!(self.rooms.sweep_interval_secs > 0, "rooms.sweep_interval_secs must be positive");
        ensure!(self.rooms.id_length > 0, "rooms.id_length must be positive");
        Ok(())
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if `host:port` is not a valid socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }

    /// Core room, session and moderation policy.
    #[must_use]
    pub fn chat_config(&self) -> ChatConfig {
        let moderation = &self.moderation;
        ChatConfig {
            default_max_participants: self.limits.default_max_participants,
            max_participants: self.limits.max_participants,
            message_history: self.limits.message_history,
            max_nickname_length: self.limits.max_nickname_length,
            max_content_length: self.limits.max_content_length,
            max_room_name_length: self.limits.max_room_name_length,
            room_id_length: self.rooms.id_length,
            session_timeout: Duration::from_secs(self.sessions.timeout_secs),
            moderation: ModerationConfig {
                rate_limit: RateLimitConfig {
                    max_messages: moderation.rate_limit_messages,
                    window: Duration::from_millis(moderation.rate_limit_window_ms),
                },
                warning_threshold: moderation.warning_threshold,
                warning_window: (moderation.warning_window_secs > 0)
                    .then(|| Duration::from_secs(moderation.warning_window_secs)),
                auto_ban_duration: Duration::from_secs(moderation.auto_ban_secs),
                kick_ban_duration: Duration::from_secs(moderation.kick_ban_secs),
                extra_words: moderation.extra_words.clone(),
            },
        }
    }

    /// Background task periods.
    #[must_use]
    pub fn maintenance_config(&self) -> MaintenanceConfig {
        MaintenanceConfig {
            ping_interval: Duration::from_millis(self.heartbeat.ping_interval_ms),
            heartbeat_interval: Duration::from_millis(self.heartbeat.heartbeat_interval_ms),
            session_sweep_interval: Duration::from_secs(self.sessions.sweep_interval_secs),
            room_sweep_interval: Duration::from_secs(self.rooms.sweep_interval_secs),
        }
    }
}
