//! Session display: a read-only replica of the session record.
//!
//! The display never writes to the store. It rebuilds its [`DisplayView`] from
//! the store on mount, on every [`StoreEvent`] for the record key, and on
//! demand via [`SessionDisplay::rehydrate`]. Absent or malformed records leave
//! the previous view untouched.
//!
//! The wall clock is independent of the store and advanced by
//! [`SessionDisplay::tick`], normally once per second.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, FixedOffset, Utc};

use crate::export::format_timestamp;
use crate::notification::{Notifier, DEFAULT_DURATION_MS};
use crate::record::{decode_record, RECORD_KEY};
use crate::store::{KeyValueStore, StoreEvent, SubscriptionId};

pub const DEFAULT_DISPLAY_TIME_FORMAT: &str = "%A, %B %-d, %Y %H:%M:%S";

/// The fields the display shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayView {
    pub first_name: String,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
}

impl DisplayView {
    /// Replaces the view from a raw stored record. Returns false, leaving the
    /// view as it was, when `raw` is absent or malformed.
    pub fn apply(&mut self, raw: Option<&str>) -> bool {
        let Some(raw) = raw else {
            return false;
        };
        match decode_record(raw) {
            Ok(record) => {
                self.first_name = record.identity.first_name;
                self.start_time = record.start_time;
                self.stop_time = record.stop_time;
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "Display skipped malformed record");
                false
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub time_format: String,
    pub utc_offset: Option<FixedOffset>,
    pub notification_duration_ms: u64,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        DisplaySettings {
            time_format: DEFAULT_DISPLAY_TIME_FORMAT.to_string(),
            utc_offset: None,
            notification_duration_ms: DEFAULT_DURATION_MS,
        }
    }
}

fn lock(view: &Mutex<DisplayView>) -> MutexGuard<'_, DisplayView> {
    view.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A mounted display. Dropping it unmounts: the store subscription is
/// released and any visible notification is cancelled.
pub struct SessionDisplay {
    store: Arc<dyn KeyValueStore>,
    view: Arc<Mutex<DisplayView>>,
    subscription: Option<SubscriptionId>,
    notifier: Notifier,
    settings: DisplaySettings,
    visible: bool,
    current_time: DateTime<Utc>,
}

impl SessionDisplay {
    pub fn mount(
        store: Arc<dyn KeyValueStore>,
        settings: DisplaySettings,
        now: DateTime<Utc>,
    ) -> Self {
        let view = Arc::new(Mutex::new(DisplayView::default()));

        let listener_view = Arc::clone(&view);
        let subscription = store.subscribe(Arc::new(move |event: &StoreEvent| {
            if event.touches(RECORD_KEY) {
                lock(&listener_view).apply(event.new_value.as_deref());
            }
        }));

        let display = SessionDisplay {
            store,
            view,
            subscription: Some(subscription),
            notifier: Notifier::new(settings.notification_duration_ms),
            settings,
            visible: true,
            current_time: now,
        };
        display.rehydrate();
        tracing::debug!("Session display mounted");
        display
    }

    /// Re-reads the record from the store. Returns true if the view changed
    /// source data (a well-formed record was found).
    pub fn rehydrate(&self) -> bool {
        let raw = match self.store.get(RECORD_KEY) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "Display failed to read store");
                return false;
            }
        };
        lock(&self.view).apply(raw.as_deref())
    }

    pub fn view(&self) -> DisplayView {
        lock(&self.view).clone()
    }

    /// Advances the wall clock and drops an expired notification.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        self.current_time = now;
        self.notifier.expire(now);
    }

    pub fn current_time(&self) -> DateTime<Utc> {
        self.current_time
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn notify(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.notifier.show(message, now);
    }

    pub fn notification(&self) -> Option<&str> {
        self.notifier.current(self.current_time)
    }

    pub fn dismiss_notification(&mut self) {
        self.notifier.dismiss();
    }

    fn format(&self, ts: DateTime<Utc>) -> String {
        format_timestamp(ts, &self.settings.time_format, self.settings.utc_offset)
    }

    /// The display's text, or `None` while hidden.
    pub fn render(&self) -> Option<String> {
        if !self.visible {
            return None;
        }
        let view = self.view();

        let mut lines = vec![
            format!("Hi, {}!", view.first_name),
            self.format(self.current_time),
            String::new(),
            "Login Time:".to_string(),
            view.start_time
                .map(|ts| format!("  {}", self.format(ts)))
                .unwrap_or_else(|| "  Not logged in yet".to_string()),
            "Logout Time:".to_string(),
            view.stop_time
                .map(|ts| format!("  {}", self.format(ts)))
                .unwrap_or_else(|| "  Not logged out yet".to_string()),
        ];
        if let Some(message) = self.notification() {
            lines.push(String::new());
            lines.push(format!("[{}]", message));
        }
        Some(lines.join("\n"))
    }
}

impl Drop for SessionDisplay {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.store.unsubscribe(id);
        }
        self.notifier.dismiss();
        tracing::debug!("Session display unmounted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{encode_record, Identity, SessionRecord};
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 1, 0, 0).unwrap()
    }

    fn settings() -> DisplaySettings {
        DisplaySettings {
            time_format: "%H:%M:%S".to_string(),
            utc_offset: FixedOffset::east_opt(0),
            ..DisplaySettings::default()
        }
    }

    fn stored(first_name: &str, start: Option<DateTime<Utc>>) -> String {
        let mut record =
            SessionRecord::with_identity(Identity::new(first_name, "Cruz", "Alpha", "1001"));
        record.start_time = start;
        encode_record(&record).unwrap()
    }

    #[test]
    fn test_mount_rehydrates_from_store() {
        let store = Arc::new(MemoryStore::new());
        store.set(RECORD_KEY, &stored("Ana", Some(t0()))).unwrap();

        let display = SessionDisplay::mount(store, settings(), t0());
        let view = display.view();
        assert_eq!(view.first_name, "Ana");
        assert_eq!(view.start_time, Some(t0()));
        assert_eq!(view.stop_time, None);
    }

    #[test]
    fn test_store_changes_flow_into_view() {
        let store = Arc::new(MemoryStore::new());
        let display = SessionDisplay::mount(store.clone(), settings(), t0());
        assert_eq!(display.view(), DisplayView::default());

        store.set(RECORD_KEY, &stored("Ana", None)).unwrap();
        assert_eq!(display.view().first_name, "Ana");
    }

    #[test]
    fn test_malformed_and_cleared_store_keep_prior_view() {
        let store = Arc::new(MemoryStore::new());
        store.set(RECORD_KEY, &stored("Ana", Some(t0()))).unwrap();
        let display = SessionDisplay::mount(store.clone(), settings(), t0());
        let before = display.view();

        store.set(RECORD_KEY, "{broken").unwrap();
        assert_eq!(display.view(), before);
        assert!(!display.rehydrate());

        store.clear().unwrap();
        assert_eq!(display.view(), before);
        assert!(!display.rehydrate());
    }

    #[test]
    fn test_other_keys_are_ignored() {
        let store = Arc::new(MemoryStore::new());
        let display = SessionDisplay::mount(store.clone(), settings(), t0());
        store.set("somethingElse", &stored("Ana", None)).unwrap();
        assert_eq!(display.view().first_name, "");
    }

    #[test]
    fn test_drop_unsubscribes() {
        let store = Arc::new(MemoryStore::new());
        let display = SessionDisplay::mount(store.clone(), settings(), t0());
        let id = display.subscription.unwrap();
        drop(display);
        assert!(!store.unsubscribe(id));
    }

    #[test]
    fn test_render_placeholders_and_times() {
        let store = Arc::new(MemoryStore::new());
        store.set(RECORD_KEY, &stored("Ana", None)).unwrap();
        let mut display = SessionDisplay::mount(store.clone(), settings(), t0());

        let text = display.render().unwrap();
        assert!(text.starts_with("Hi, Ana!\n01:00:00"));
        assert!(text.contains("Not logged in yet"));
        assert!(text.contains("Not logged out yet"));

        store.set(RECORD_KEY, &stored("Ana", Some(t0()))).unwrap();
        display.tick(t0() + Duration::seconds(5));
        let text = display.render().unwrap();
        assert!(text.contains("01:00:05"));
        assert!(text.contains("  01:00:00"));
        assert!(!text.contains("Not logged in yet"));
    }

    #[test]
    fn test_hidden_display_renders_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mut display = SessionDisplay::mount(store, settings(), t0());
        display.set_visible(false);
        assert!(display.render().is_none());
    }

    #[test]
    fn test_notification_expires_on_tick() {
        let store = Arc::new(MemoryStore::new());
        let mut display = SessionDisplay::mount(store, settings(), t0());
        display.notify("Tracking started!", t0());
        assert!(display.render().unwrap().ends_with("[Tracking started!]"));

        display.tick(t0() + Duration::seconds(1));
        assert_eq!(display.notification(), Some("Tracking started!"));

        display.tick(t0() + Duration::seconds(3));
        assert_eq!(display.notification(), None);
    }
}
