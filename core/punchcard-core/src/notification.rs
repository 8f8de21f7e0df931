//! Transient, auto-dismissing user notifications.
//!
//! Only one notification is visible at a time. Showing a new one replaces the
//! message and restarts the dismissal window. Expiry is evaluated against the
//! caller's clock, so no timer thread is involved.

use chrono::{DateTime, Duration, Utc};

pub const DEFAULT_DURATION_MS: u64 = 3000;

pub const TRACKING_STARTED: &str = "Tracking started!";
pub const TRACKING_STOPPED: &str = "Tracking stopped!";
pub const ACTIVITY_EXPORTED: &str = "Activity exported!";

pub fn export_failed(reason: &str) -> String {
    format!("Export failed: {}", reason)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub shown_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Notifier {
    duration: Duration,
    current: Option<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Notifier::new(DEFAULT_DURATION_MS)
    }
}

impl Notifier {
    pub fn new(duration_ms: u64) -> Self {
        Notifier {
            duration: Duration::milliseconds(duration_ms.min(u64::from(u32::MAX)) as i64),
            current: None,
        }
    }

    pub fn show(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        let message = message.into();
        tracing::debug!(%message, "Showing notification");
        self.current = Some(Notification {
            message,
            shown_at: now,
        });
    }

    /// The visible message, if its window has not elapsed at `now`.
    pub fn current(&self, now: DateTime<Utc>) -> Option<&str> {
        self.current
            .as_ref()
            .filter(|n| now < n.shown_at + self.duration)
            .map(|n| n.message.as_str())
    }

    /// Drops an expired notification. Returns true if one was dropped.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if self.current.is_some() && self.current(now).is_none() {
            self.current = None;
            return true;
        }
        false
    }

    pub fn dismiss(&mut self) {
        self.current = None;
    }
}
