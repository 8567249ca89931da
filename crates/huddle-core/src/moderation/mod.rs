//! Moderation engine.
//!
//! - **Rate limiting** - fixed window per connection
//! - **Content screening** - word-list profanity classifier
//! - **Warnings** - append-only log per (room, session, nickname)
//! - **Bans** - time-bounded, created by kicks and by the warning threshold
//!
//! The message pipeline that strings these together lives on
//! [`RoomManager::send_message`](crate::rooms::RoomManager::send_message).

mod profanity;
mod ratelimit;

pub use profanity::{ProfanityFilter, Screening};
pub use ratelimit::{RateDecision, RateLimitConfig, RateLimiter};

use crate::clock::{millis, Clock};
use crate::connection::ConnectionId;
use crate::model::{Ban, NewBan, NewWarning, Warning};
use crate::store::{self, Store};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Moderation policy.
#[derive(Debug, Clone)]
pub struct ModerationConfig {
    /// Per-connection message rate.
    pub rate_limit: RateLimitConfig,
    /// Warnings that trigger an automatic ban.
    pub warning_threshold: usize,
    /// How far back warnings count. `None` counts every warning ever recorded.
    pub warning_window: Option<Duration>,
    /// Length of an automatic ban.
    pub auto_ban_duration: Duration,
    /// Length of the ban that accompanies a kick.
    pub kick_ban_duration: Duration,
    /// Extra whole words for the profanity filter.
    pub extra_words: Vec<String>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            rate_limit: RateLimitConfig::default(),
            warning_threshold: 3,
            warning_window: None,
            auto_ban_duration: Duration::from_secs(10 * 60),
            kick_ban_duration: Duration::from_secs(30 * 60),
            extra_words: Vec::new(),
        }
    }
}

/// Identity a warning or ban applies to.
#[derive(Debug, Clone, Copy)]
pub struct Offender<'a> {
    pub room_id: &'a str,
    pub session_id: Option<&'a str>,
    pub nickname: &'a str,
}

/// The moderation engine.
pub struct Moderation {
    config: ModerationConfig,
    limiter: RateLimiter,
    filter: ProfanityFilter,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl Moderation {
    /// Create an engine over a store.
    #[must_use]
    pub fn new(config: ModerationConfig, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            limiter: RateLimiter::new(config.rate_limit.clone(), clock.clone()),
            filter: ProfanityFilter::with_words(&config.extra_words),
            config,
            store,
            clock,
        }
    }

    /// Get the policy.
    #[must_use]
    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    /// Count a message against the connection's rate window.
    pub fn check_rate_limit(&self, connection: &ConnectionId) -> RateDecision {
        let decision = self.limiter.check(connection);
        if decision == RateDecision::Reject {
            warn!(connection = %connection, "Rate limit exceeded");
        }
        decision
    }

    /// Drop rate-limit state for a closed connection.
    pub fn forget_connection(&self, connection: &ConnectionId) {
        self.limiter.forget(connection);
    }

    /// Run the profanity classifier over a text.
    #[must_use]
    pub fn screen_content(&self, text: &str) -> Screening {
        self.filter.screen(text)
    }

    /// Append a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn record_warning(
        &self,
        offender: Offender<'_>,
        original: &str,
        cleaned: &str,
        kind: &str,
    ) -> store::Result<Warning> {
        let warning = self
            .store
            .insert_warning(NewWarning {
                room_id: offender.room_id.to_string(),
                session_id: offender.session_id.map(str::to_string),
                nickname: offender.nickname.to_string(),
                original: original.to_string(),
                filtered: cleaned.to_string(),
                kind: kind.to_string(),
                created_at: self.clock.now_millis(),
            })
            .await?;
        warn!(
            room = %offender.room_id,
            nickname = %offender.nickname,
            kind = %kind,
            "Warning recorded"
        );
        Ok(warning)
    }

    /// Count warnings for an identity within the configured window.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn count_warnings(&self, offender: Offender<'_>) -> store::Result<usize> {
        let since = self
            .config
            .warning_window
            .map_or(0, |window| self.clock.now_millis().saturating_sub(millis(window)));
        self.store
            .count_warnings(offender.room_id, offender.session_id, offender.nickname, since)
            .await
    }

    /// Check whether a warning count has reached the ban threshold.
    #[must_use]
    pub fn threshold_reached(&self, count: usize) -> bool {
        count >= self.config.warning_threshold
    }

    /// Record a ban starting now.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn ban(
        &self,
        offender: Offender<'_>,
        duration: Duration,
        reason: &str,
    ) -> store::Result<Ban> {
        let now = self.clock.now_millis();
        let ban = self
            .store
            .insert_ban(NewBan {
                room_id: offender.room_id.to_string(),
                session_id: offender.session_id.map(str::to_string),
                nickname: offender.nickname.to_string(),
                banned_at: now,
                expires_at: now + millis(duration),
                reason: reason.to_string(),
            })
            .await?;
        info!(
            room = %offender.room_id,
            nickname = %offender.nickname,
            reason = %reason,
            secs = duration.as_secs(),
            "Ban created"
        );
        Ok(ban)
    }

    /// Find an unexpired ban blocking an identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn active_ban(&self, offender: Offender<'_>) -> store::Result<Option<Ban>> {
        self.store
            .active_ban(
                offender.room_id,
                offender.session_id,
                offender.nickname,
                self.clock.now_millis(),
            )
            .await
    }
}
