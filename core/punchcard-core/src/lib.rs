//! # punchcard-core
//!
//! Session state, persistence and export for the punchcard time tracker.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Every operation completes
//!   before it returns.
//! - **Single writer**: [`SessionController`] owns the session record and is
//!   the only component that writes it. [`SessionDisplay`] is a pure reader.
//! - **Injected storage**: Both components receive a [`KeyValueStore`]; there
//!   is no ambient global. Tests use [`MemoryStore`].
//! - **Graceful degradation**: Missing or malformed stored data reads as
//!   defaults, never as an error.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use punchcard_core::*;
//!
//! let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&path));
//! let mut controller = SessionController::restore(store.clone(), Arc::new(SystemClock));
//! controller.submit_identity(Identity::new("Ana", "Cruz", "Alpha", "1001"))?;
//! controller.start()?;
//! controller.stop()?;
//! controller.export(&ExportOptions::default(), &mut DirectorySink::new("."))?;
//! ```

pub mod clock;
pub mod config;
pub mod controller;
pub mod display;
pub mod error;
pub mod export;
pub mod notification;
pub mod record;
pub mod storage;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TrackerConfig;
pub use controller::SessionController;
pub use display::{DisplaySettings, DisplayView, SessionDisplay};
pub use error::{Result, TrackerError};
pub use export::{
    total_active_hours, ActivityRow, ArtifactSink, DirectorySink, ExportOptions, ExportReceipt,
    MemorySink, HEADERS, SHEET_NAME,
};
pub use notification::Notifier;
pub use record::{Identity, IdentityField, Phase, SessionRecord, RECORD_KEY};
pub use storage::StorageConfig;
pub use store::{ChangeListener, FileStore, KeyValueStore, MemoryStore, StoreEvent, SubscriptionId};
