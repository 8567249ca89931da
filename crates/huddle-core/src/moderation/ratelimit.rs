//! Per-connection message rate limiting.
//!
//! A fixed-window counter: each connection may send `max_messages` within a
//! window that starts at its first message and resets lazily once the
//! current time passes the window's end.

use crate::clock::{millis, Clock};
use crate::connection::ConnectionId;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Rate limit configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Messages allowed per window.
    pub max_messages: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_messages: 1,
            window: Duration::from_secs(1),
        }
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    Reject,
}

#[derive(Debug)]
struct Window {
    count: u32,
    reset_at: u64,
}

/// Fixed-window rate limiter keyed by connection.
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<ConnectionId, Window>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter.
    #[must_use]
    pub fn new(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            windows: DashMap::new(),
            clock,
        }
    }

    /// Count one message from a connection against its window.
    pub fn check(&self, connection: &ConnectionId) -> RateDecision {
        let now = self.clock.now_millis();
        let window_ms = millis(self.config.window);

        let mut window = self
            .windows
            .entry(connection.clone())
            .or_insert_with(|| Window {
                count: 0,
                reset_at: now + window_ms,
            });

        if now > window.reset_at {
            window.count = 0;
            window.reset_at = now + window_ms;
        }

        if window.count >= self.config.max_messages {
            RateDecision::Reject
        } else {
            window.count += 1;
            RateDecision::Allow
        }
    }

    /// Drop a connection's window.
    pub fn forget(&self, connection: &ConnectionId) {
        self.windows.remove(connection);
    }

    /// Number of tracked connections.
    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.windows.len()
    }
}
