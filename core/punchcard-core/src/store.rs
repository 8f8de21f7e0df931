//! Shared key-value store.
//!
//! The controller and the display never touch storage directly; both receive a
//! [`KeyValueStore`] and talk to it through `get`/`set`/`remove`/`clear`. Change
//! notification is explicit: components [`subscribe`](KeyValueStore::subscribe)
//! and receive a [`StoreEvent`] after every mutation.
//!
//! Two implementations:
//! - [`MemoryStore`]: process-local, for tests and embedding.
//! - [`FileStore`]: one JSON file shared by every process on the machine. Other
//!   processes' writes surface through [`FileStore::poll`].
//!
//! # File Format
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": {
//!     "trackerData": "{\"firstName\":\"Ana\",...}"
//!   }
//! }
//! ```
//!
//! Concurrent writers are last-writer-wins. There is no locking.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use fs_err as fs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::{Result, TrackerError};

const FILE_VERSION: u32 = 1;

/// A mutation observed on the store.
///
/// `key == None` means the whole store was cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub key: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

impl StoreEvent {
    pub fn cleared() -> Self {
        StoreEvent {
            key: None,
            old_value: None,
            new_value: None,
        }
    }

    /// True if this event may have changed `key`.
    pub fn touches(&self, key: &str) -> bool {
        self.key.as_deref().map_or(true, |k| k == key)
    }
}

pub type ChangeListener = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// String-keyed, string-valued persistent dictionary.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;

    /// Registers `listener` for every subsequent mutation. Listeners run after
    /// the mutation is applied, with no store lock held.
    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId;

    /// Returns false if `id` was not subscribed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Listener registry
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(SubscriptionId, ChangeListener)>>,
}

impl Listeners {
    fn add(&self, listener: ChangeListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.entries).push((id, listener));
        id
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = lock(&self.entries);
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    fn emit(&self, events: &[StoreEvent]) {
        if events.is_empty() {
            return;
        }
        // Snapshot so listeners may subscribe/unsubscribe or read the store
        let listeners: Vec<ChangeListener> = lock(&self.entries)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for event in events {
            for listener in &listeners {
                listener(event);
            }
        }
    }
}

/// Events that turn `before` into `after`, one per changed key.
fn diff(before: &BTreeMap<String, String>, after: &BTreeMap<String, String>) -> Vec<StoreEvent> {
    if !before.is_empty() && after.is_empty() {
        return vec![StoreEvent::cleared()];
    }

    let mut events = Vec::new();
    for (key, old_value) in before {
        if !after.contains_key(key) {
            events.push(StoreEvent {
                key: Some(key.clone()),
                old_value: Some(old_value.clone()),
                new_value: None,
            });
        }
    }
    for (key, new_value) in after {
        let old_value = before.get(key);
        if old_value != Some(new_value) {
            events.push(StoreEvent {
                key: Some(key.clone()),
                old_value: old_value.cloned(),
                new_value: Some(new_value.clone()),
            });
        }
    }
    events
}

// ═══════════════════════════════════════════════════════════════════════════════
// MemoryStore
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    listeners: Listeners,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(lock(&self.entries).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let old_value = lock(&self.entries).insert(key.to_string(), value.to_string());
        self.listeners.emit(&[StoreEvent {
            key: Some(key.to_string()),
            old_value,
            new_value: Some(value.to_string()),
        }]);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let old_value = lock(&self.entries).remove(key);
        if old_value.is_some() {
            self.listeners.emit(&[StoreEvent {
                key: Some(key.to_string()),
                old_value,
                new_value: None,
            }]);
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        lock(&self.entries).clear();
        self.listeners.emit(&[StoreEvent::cleared()]);
        Ok(())
    }

    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId {
        self.listeners.add(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FileStore
// ═══════════════════════════════════════════════════════════════════════════════

/// The on-disk JSON structure for the store file.
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

/// File-backed store shared across processes.
///
/// Every read goes to disk, so `get` always reflects the latest write from any
/// process. `observed` is the snapshot as of the last local write or
/// [`poll`](FileStore::poll), used to detect outside changes.
pub struct FileStore {
    path: PathBuf,
    observed: Mutex<BTreeMap<String, String>>,
    listeners: Listeners,
}

impl FileStore {
    pub fn open(path: &Path) -> Self {
        let observed = read_entries(path);
        tracing::debug!(path = %path.display(), keys = observed.len(), "Opened file store");
        FileStore {
            path: path.to_path_buf(),
            observed: Mutex::new(observed),
            listeners: Listeners::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-reads the file and emits an event for each key changed by another
    /// process since the last observation. Returns the number of events.
    pub fn poll(&self) -> usize {
        let current = match load_entries(&self.path) {
            Ok(current) => current,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to poll store file");
                return 0;
            }
        };
        let events = {
            let mut observed = lock(&self.observed);
            let events = diff(&observed, &current);
            *observed = current;
            events
        };
        if !events.is_empty() {
            tracing::debug!(events = events.len(), "Detected external store changes");
        }
        self.listeners.emit(&events);
        events.len()
    }

    fn mutate<F>(&self, apply: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let before = load_entries(&self.path)?;
        let mut after = before.clone();
        apply(&mut after);
        if before == after {
            return Ok(());
        }

        write_entries(&self.path, &after)?;
        *lock(&self.observed) = after.clone();
        self.listeners.emit(&diff(&before, &after));
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(load_entries(&self.path)?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.mutate(|entries| {
            entries.remove(key);
        })
    }

    fn clear(&self) -> Result<()> {
        self.mutate(|entries| entries.clear())
    }

    fn subscribe(&self, listener: ChangeListener) -> SubscriptionId {
        self.listeners.add(listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.listeners.remove(id)
    }
}

/// Like [`load_entries`], but an unreadable file also reads as empty.
fn read_entries(path: &Path) -> BTreeMap<String, String> {
    load_entries(path).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to read store file, treating as empty");
        BTreeMap::new()
    })
}

/// Reads the store file. Missing, empty, corrupt and unsupported-version files
/// all read as an empty store. A file that exists but cannot be read is an
/// error, so a write never replaces entries it could not see.
fn load_entries(path: &Path) -> Result<BTreeMap<String, String>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }

    let content =
        fs::read_to_string(path).map_err(|e| TrackerError::io("read store file", e))?;

    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }

    let entries = match serde_json::from_str::<StoreFile>(&content) {
        Ok(file) if file.version == FILE_VERSION => file.entries,
        Ok(file) => {
            tracing::warn!(
                version = file.version,
                expected = FILE_VERSION,
                "Unsupported store file version, treating as empty"
            );
            BTreeMap::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to parse store file, treating as empty");
            BTreeMap::new()
        }
    };
    Ok(entries)
}

/// Writes via temp file + rename so readers never see a partial file.
fn write_entries(path: &Path, entries: &BTreeMap<String, String>) -> Result<()> {
    let file = StoreFile {
        version: FILE_VERSION,
        entries: entries.clone(),
    };
    let content = serde_json::to_string_pretty(&file)
        .map_err(|e| TrackerError::json("encode store file", e))?;

    let parent_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent_dir)
        .map_err(|e| TrackerError::io("create store directory", e))?;

    let mut temp_file = NamedTempFile::new_in(parent_dir)
        .map_err(|e| TrackerError::io("create temp store file", e))?;
    temp_file
        .write_all(content.as_bytes())
        .map_err(|e| TrackerError::io("write temp store file", e))?;
    temp_file
        .flush()
        .map_err(|e| TrackerError::io("flush temp store file", e))?;
    temp_file
        .persist(path)
        .map_err(|e| TrackerError::io("persist store file", e.error))?;

    Ok(())
}
