//! Session controller: the single owner and writer of the session record.
//!
//! ## State Machine
//!
//! ```text
//! Intake   ── submit ──▶ Ready
//! Ready    ── start  ──▶ Active     ── stop ──▶ Stopped
//! Ready    ── stop   ──▶ Stopped
//! Active   ── start  ──▶ Active     (start time overwritten)
//! Stopped  ── start  ──▶ Active
//! Stopped  ── stop   ──▶ Stopped    (stop time overwritten)
//! Ready | Active | Stopped ── export ──▶ Intake
//! ```
//!
//! - `start` always overwrites the start time, clears the stop time and
//!   resets accumulated activity, whatever the current tracking phase.
//! - `stop` is accepted without a prior `start`; the record then carries a
//!   stop time and no start time.
//! - `export` clears the store and resets to `Intake` only after the workbook
//!   is rendered and saved. A failed export leaves everything intact.
//!
//! Every mutation is written through to the store before the call returns.

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::{Result, TrackerError};
use crate::export::{render_workbook, ActivityRow, ArtifactSink, ExportOptions, ExportReceipt};
use crate::record::{load_record, save_record, Identity, IdentityField, Phase, SessionRecord};
use crate::store::KeyValueStore;

pub struct SessionController {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    record: SessionRecord,
    /// Intake form contents; becomes the record's identity on submit.
    draft: Identity,
    phase: Phase,
}

impl SessionController {
    /// Restores the controller from whatever the store holds.
    ///
    /// A complete persisted identity resumes tracking in the phase its
    /// timestamps imply. An incomplete one lands in `Intake` with the form
    /// pre-filled. No record, or a malformed one, starts from defaults.
    pub fn restore(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        let record = load_record(store.as_ref()).unwrap_or_default();
        let phase = record.phase();

        let (record, draft) = if phase == Phase::Intake {
            (SessionRecord::default(), record.identity)
        } else {
            let draft = record.identity.clone();
            (record, draft)
        };

        tracing::info!(%phase, "Session controller restored");
        SessionController {
            store,
            clock,
            record,
            draft,
            phase,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn draft(&self) -> &Identity {
        &self.draft
    }

    pub fn is_tracking_active(&self) -> bool {
        self.phase == Phase::Active
    }

    // ─────────────────────────────────────────────────────────────────────
    // Intake
    // ─────────────────────────────────────────────────────────────────────

    /// Applies one intake form change event.
    pub fn update_field(&mut self, field: IdentityField, value: impl Into<String>) {
        self.draft.set(field, value);
    }

    /// Whether the submit action is enabled.
    pub fn is_form_valid(&self) -> bool {
        self.draft.is_complete()
    }

    /// Submits the current intake form.
    pub fn submit(&mut self) -> Result<bool> {
        self.submit_identity(self.draft.clone())
    }

    /// Persists `identity` with no timestamps and zero activity and moves to
    /// `Ready`. Returns `Ok(false)` without touching anything if any field is
    /// blank.
    pub fn submit_identity(&mut self, identity: Identity) -> Result<bool> {
        self.require_phase("submit identity", |phase| phase == Phase::Intake)?;

        if !identity.is_complete() {
            tracing::debug!("Identity incomplete, submit ignored");
            self.draft = identity;
            return Ok(false);
        }

        let record = SessionRecord::with_identity(identity);
        save_record(self.store.as_ref(), &record)?;

        self.draft = record.identity.clone();
        self.record = record;
        self.phase = Phase::Ready;
        tracing::info!(
            employee_id = %self.record.identity.employee_id,
            project = %self.record.identity.project_name,
            "Identity submitted"
        );
        Ok(true)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tracking
    // ─────────────────────────────────────────────────────────────────────

    pub fn start(&mut self) -> Result<()> {
        self.require_phase("start tracking", Phase::is_tracking)?;

        let mut record = self.record.clone();
        record.start_time = Some(self.clock.now());
        record.stop_time = None;
        record.cursor_activity_time = 0;
        self.commit(record)?;

        tracing::info!(start_time = ?self.record.start_time, "Tracking started");
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        self.require_phase("stop tracking", Phase::is_tracking)?;

        let mut record = self.record.clone();
        record.stop_time = Some(self.clock.now());
        if record.start_time.is_none() {
            tracing::warn!("Tracking stopped without a start time");
        }
        self.commit(record)?;

        tracing::info!(stop_time = ?self.record.stop_time, "Tracking stopped");
        Ok(())
    }

    /// Adds active time reported by the activity sampler. The counter never
    /// decreases.
    pub fn record_activity(&mut self, elapsed_ms: u64) -> Result<()> {
        self.require_phase("record activity", Phase::is_tracking)?;
        if elapsed_ms == 0 {
            return Ok(());
        }

        let mut record = self.record.clone();
        record.cursor_activity_time = record.cursor_activity_time.saturating_add(elapsed_ms);
        self.commit(record)?;

        tracing::debug!(
            elapsed_ms,
            total_ms = self.record.cursor_activity_time,
            "Recorded activity"
        );
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Export
    // ─────────────────────────────────────────────────────────────────────

    /// Renders the session as a workbook and hands it to `sink`.
    ///
    /// On success the store is cleared and the controller returns to `Intake`
    /// with empty identity, no timestamps and zero activity. On failure
    /// nothing is cleared, so the export can be retried.
    pub fn export(
        &mut self,
        options: &ExportOptions,
        sink: &mut dyn ArtifactSink,
    ) -> Result<ExportReceipt> {
        self.require_phase("export", Phase::is_tracking)?;

        let row = ActivityRow::from_record(&self.record, options);
        let buffer = render_workbook(&row, options).inspect_err(|e| {
            tracing::warn!(error = %e, "Export generation failed, session kept");
        })?;
        let location = sink.save(&options.file_name, &buffer).inspect_err(|e| {
            tracing::warn!(error = %e, "Export save failed, session kept");
        })?;

        self.store.clear()?;
        self.record = SessionRecord::default();
        self.draft = Identity::default();
        self.phase = Phase::Intake;

        tracing::info!(
            file_name = %options.file_name,
            total_active_hours = %row.total_active_hours,
            "Session exported and cleared"
        );
        Ok(ExportReceipt {
            file_name: options.file_name.clone(),
            location,
            row,
            size: buffer.len(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    fn require_phase(
        &self,
        operation: &'static str,
        allowed: impl Fn(Phase) -> bool,
    ) -> Result<()> {
        if allowed(self.phase) {
            Ok(())
        } else {
            Err(TrackerError::InvalidPhase {
                operation,
                phase: self.phase,
            })
        }
    }

    /// Persists `record`, then adopts it. A failed write changes nothing.
    fn commit(&mut self, record: SessionRecord) -> Result<()> {
        save_record(self.store.as_ref(), &record)?;
        self.phase = record.phase();
        self.record = record;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::export::MemorySink;
    use crate::record::RECORD_KEY;
    use crate::store::MemoryStore;
    use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
    use std::path::PathBuf;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 1, 0, 0).unwrap()
    }

    fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, SessionController) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let controller = SessionController::restore(store.clone(), clock.clone());
        (store, clock, controller)
    }

    fn ana() -> Identity {
        Identity::new("Ana", "Cruz", "Alpha", "1001")
    }

    fn utc_options() -> ExportOptions {
        ExportOptions {
            utc_offset: FixedOffset::east_opt(0),
            ..ExportOptions::default()
        }
    }

    struct FailingSink;

    impl ArtifactSink for FailingSink {
        fn save(&mut self, file_name: &str, _bytes: &[u8]) -> Result<Option<PathBuf>> {
            Err(TrackerError::ExportSave {
                file_name: file_name.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }
    }

    #[test]
    fn test_empty_store_starts_in_intake() {
        let (_, _, controller) = setup();
        assert_eq!(controller.phase(), Phase::Intake);
        assert_eq!(controller.record(), &SessionRecord::default());
        assert!(!controller.is_form_valid());
    }

    #[test]
    fn test_submit_valid_identity_persists_blank_session() {
        let (store, _, mut controller) = setup();
        assert!(controller.submit_identity(ana()).unwrap());
        assert_eq!(controller.phase(), Phase::Ready);

        let persisted = load_record(store.as_ref()).unwrap();
        assert_eq!(persisted, SessionRecord::with_identity(ana()));
    }

    #[test]
    fn test_submit_incomplete_identity_is_a_no_op() {
        let (store, _, mut controller) = setup();
        for field in IdentityField::ALL {
            let mut identity = ana();
            identity.set(field, " \t");
            assert!(!controller.submit_identity(identity).unwrap());
            assert_eq!(controller.phase(), Phase::Intake);
            assert!(store.is_empty());
        }
    }

    #[test]
    fn test_form_change_events_drive_validity() {
        let (_, _, mut controller) = setup();
        controller.update_field(IdentityField::FirstName, "Ana");
        controller.update_field(IdentityField::LastName, "Cruz");
        controller.update_field(IdentityField::ProjectName, "Alpha");
        assert!(!controller.is_form_valid());
        assert!(!controller.submit().unwrap());

        controller.update_field(IdentityField::EmployeeId, "1001");
        assert!(controller.is_form_valid());
        assert!(controller.submit().unwrap());
        assert_eq!(controller.record().identity, ana());
    }

    #[test]
    fn test_submit_twice_is_rejected() {
        let (_, _, mut controller) = setup();
        controller.submit_identity(ana()).unwrap();
        let err = controller.submit_identity(ana()).unwrap_err();
        assert!(matches!(
            err,
            TrackerError::InvalidPhase {
                phase: Phase::Ready,
                ..
            }
        ));
    }

    #[test]
    fn test_tracking_requires_identity() {
        let (store, _, mut controller) = setup();
        assert!(controller.start().is_err());
        assert!(controller.stop().is_err());
        assert!(controller.record_activity(10).is_err());
        assert!(controller.export(&utc_options(), &mut MemorySink::new()).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_start_then_stop_orders_timestamps() {
        let (store, clock, mut controller) = setup();
        controller.submit_identity(ana()).unwrap();

        controller.start().unwrap();
        assert_eq!(controller.phase(), Phase::Active);
        assert!(controller.is_tracking_active());

        clock.advance(Duration::hours(8));
        controller.stop().unwrap();
        assert_eq!(controller.phase(), Phase::Stopped);

        let record = load_record(store.as_ref()).unwrap();
        assert_eq!(record.start_time, Some(t0()));
        assert_eq!(record.stop_time, Some(t0() + Duration::hours(8)));
        assert!(record.stop_time >= record.start_time);
        assert_eq!(record.cursor_activity_time, 0);
    }

    #[test]
    fn test_restart_overwrites_start_and_resets_activity() {
        let (_, clock, mut controller) = setup();
        controller.submit_identity(ana()).unwrap();
        controller.start().unwrap();
        controller.record_activity(60_000).unwrap();
        controller.stop().unwrap();

        clock.advance(Duration::minutes(5));
        controller.start().unwrap();
        let record = controller.record();
        assert_eq!(record.start_time, Some(t0() + Duration::minutes(5)));
        assert_eq!(record.stop_time, None);
        assert_eq!(record.cursor_activity_time, 0);
        assert_eq!(controller.phase(), Phase::Active);
    }

    #[test]
    fn test_repeated_start_while_active_overwrites_start_time() {
        let (store, clock, mut controller) = setup();
        controller.submit_identity(ana()).unwrap();
        controller.start().unwrap();
        controller.record_activity(30_000).unwrap();

        clock.advance(Duration::minutes(10));
        controller.start().unwrap();

        assert_eq!(controller.phase(), Phase::Active);
        assert_eq!(
            controller.record().start_time,
            Some(t0() + Duration::minutes(10))
        );
        assert_eq!(controller.record().cursor_activity_time, 0);
        assert_eq!(load_record(store.as_ref()).as_ref(), Some(controller.record()));
    }

    #[test]
    fn test_stop_without_start_is_accepted() {
        let (_, _, mut controller) = setup();
        controller.submit_identity(ana()).unwrap();
        controller.stop().unwrap();
        assert_eq!(controller.phase(), Phase::Stopped);
        assert_eq!(controller.record().start_time, None);
        assert_eq!(controller.record().stop_time, Some(t0()));

        // Repeated stop moves the stop time forward
        controller.stop().unwrap();
        assert_eq!(controller.phase(), Phase::Stopped);
    }

    #[test]
    fn test_activity_accumulates_and_persists() {
        let (store, _, mut controller) = setup();
        controller.submit_identity(ana()).unwrap();
        controller.start().unwrap();
        controller.record_activity(1_000).unwrap();
        controller.record_activity(2_500).unwrap();
        controller.record_activity(0).unwrap();

        assert_eq!(controller.record().cursor_activity_time, 3_500);
        assert_eq!(
            load_record(store.as_ref()).unwrap().cursor_activity_time,
            3_500
        );
    }

    #[test]
    fn test_restore_resumes_phase_from_store() {
        let (store, clock, mut controller) = setup();
        controller.submit_identity(ana()).unwrap();
        controller.start().unwrap();

        let resumed = SessionController::restore(store.clone(), clock.clone());
        assert_eq!(resumed.phase(), Phase::Active);
        assert_eq!(resumed.record(), controller.record());

        controller.stop().unwrap();
        let resumed = SessionController::restore(store.clone(), clock.clone());
        assert_eq!(resumed.phase(), Phase::Stopped);
    }

    #[test]
    fn test_restore_incomplete_identity_prefills_intake() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(RECORD_KEY, r#"{"firstName":"Ana","lastName":"Cruz"}"#)
            .unwrap();
        let clock = Arc::new(ManualClock::new(t0()));

        let controller = SessionController::restore(store, clock);
        assert_eq!(controller.phase(), Phase::Intake);
        assert_eq!(controller.draft().first_name, "Ana");
        assert_eq!(controller.record(), &SessionRecord::default());
    }

    #[test]
    fn test_restore_malformed_record_uses_defaults() {
        let store = Arc::new(MemoryStore::new());
        store.set(RECORD_KEY, "not json at all").unwrap();
        let clock = Arc::new(ManualClock::new(t0()));

        let controller = SessionController::restore(store, clock);
        assert_eq!(controller.phase(), Phase::Intake);
        assert_eq!(controller.draft(), &Identity::default());
    }

    #[test]
    fn test_export_clears_store_and_resets() {
        let (store, clock, mut controller) = setup();
        controller.submit_identity(ana()).unwrap();
        controller.start().unwrap();
        controller.record_activity(5_430_000).unwrap();
        clock.advance(Duration::hours(2));
        controller.stop().unwrap();

        let mut sink = MemorySink::new();
        let receipt = controller.export(&utc_options(), &mut sink).unwrap();

        assert_eq!(receipt.file_name, "activity.xlsx");
        assert_eq!(receipt.location, None);
        assert_eq!(receipt.row.total_active_hours, "1.51");
        assert_eq!(receipt.row.logged_in, "2026-10-18 01:00:00");
        assert_eq!(receipt.row.logged_out, "2026-10-18 03:00:00");
        assert_eq!(sink.artifacts.len(), 1);
        assert_eq!(receipt.size, sink.artifacts[0].1.len());

        assert!(store.is_empty());
        assert_eq!(controller.phase(), Phase::Intake);
        assert_eq!(controller.record(), &SessionRecord::default());
        assert_eq!(controller.draft(), &Identity::default());
    }

    #[test]
    fn test_failed_save_keeps_session() {
        let (store, _, mut controller) = setup();
        controller.submit_identity(ana()).unwrap();
        controller.start().unwrap();
        let before = controller.record().clone();

        let err = controller.export(&utc_options(), &mut FailingSink).unwrap_err();
        assert!(matches!(err, TrackerError::ExportSave { .. }));
        assert_eq!(controller.phase(), Phase::Active);
        assert_eq!(controller.record(), &before);
        assert_eq!(load_record(store.as_ref()), Some(before));
    }

    #[test]
    fn test_failed_generation_keeps_session() {
        let (store, _, mut controller) = setup();
        controller
            .submit_identity(Identity::new("Ana", "Cruz", "y".repeat(40_000), "1001"))
            .unwrap();
        controller.stop().unwrap();

        let mut sink = MemorySink::new();
        let err = controller.export(&utc_options(), &mut sink).unwrap_err();
        assert!(matches!(err, TrackerError::ExportGeneration { .. }));
        assert!(sink.artifacts.is_empty());
        assert!(!store.is_empty());
        assert_eq!(controller.phase(), Phase::Stopped);
    }
}
