use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;

// Rate limit entry - tracks requests per client identity
#[derive(Debug, Clone)]
pub struct ClientWindow {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

/// Outcome of one admission check, attached to the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl AdmissionDecision {
    /// `reset_at` in whole seconds since the epoch, rounded up.
    pub fn retry_after_epoch_secs(&self) -> i64 {
        let millis = self.reset_at.timestamp_millis();
        millis.div_euclid(1000) + i64::from(millis.rem_euclid(1000) != 0)
    }

    /// Seconds left until the window resets, rounded up and never negative.
    pub fn reset_in_secs(&self, now: DateTime<Utc>) -> i64 {
        let millis = (self.reset_at - now).num_milliseconds().max(0);
        (millis + 999) / 1000
    }
}

// keeps window_start + window inside chrono's range
fn max_window() -> TimeDelta {
    TimeDelta::days(365 * 100)
}

/// Fixed-window request counter keyed by client identity.
///
/// The read-increment-write for one identity happens while holding the
/// map's shard lock for that key, so concurrent requests from the same
/// client can never both take the last slot.
pub struct RateLimiter {
    windows: DashMap<String, ClientWindow>,
    limit: u32,
    window: TimeDelta,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            window: TimeDelta::from_std(window)
                .unwrap_or_else(|_| max_window())
                .min(max_window()),
        }
    }

    pub fn window(&self) -> TimeDelta {
        self.window
    }

    pub fn check(&self, identity: &str) -> AdmissionDecision {
        self.check_at(identity, Utc::now())
    }

    pub fn check_at(&self, identity: &str, now: DateTime<Utc>) -> AdmissionDecision {
        let mut entry = self
            .windows
            .entry(identity.to_string())
            .or_insert(ClientWindow {
                count: 0,
                window_start: now,
            });

        // window expired..? reset it
        if now >= entry.window_start + self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        // a rejected request does not consume anything, so count stays <= limit
        let allowed = entry.count < self.limit;
        if allowed {
            entry.count += 1;
        }

        AdmissionDecision {
            allowed,
            limit: self.limit,
            remaining: self.limit.saturating_sub(entry.count),
            reset_at: entry.window_start + self.window,
        }
    }

    /// When the current window for `identity` resets, if one is tracked.
    #[cfg(test)]
    pub fn reset_at(&self, identity: &str) -> Option<DateTime<Utc>> {
        self.windows
            .get(identity)
            .map(|w| w.window_start + self.window)
    }

    /// Drops every window that has already expired at `now`.
    ///
    /// An expired window behaves exactly like a missing one, so this never
    /// changes a later decision. Returns how many were removed.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now < w.window_start + self.window);
        before.saturating_sub(self.windows.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }
}
