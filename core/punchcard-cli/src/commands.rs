//! Subcommand execution.
//!
//! [`Session`] wires one controller and one display to the shared file store,
//! the way the two UI components share browser storage.

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use punchcard_core::notification::{
    export_failed, ACTIVITY_EXPORTED, TRACKING_STARTED, TRACKING_STOPPED,
};
use punchcard_core::record::load_record;
use punchcard_core::{
    total_active_hours, Clock, DirectorySink, FileStore, IdentityField, KeyValueStore,
    SessionController, SessionDisplay, StorageConfig, SystemClock, TrackerConfig,
};

use crate::Commands;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

pub fn run(command: Commands, storage: &StorageConfig) -> Result<(), String> {
    let mut session = Session::open(storage, Arc::new(SystemClock));
    let stdout = io::stdout();
    let mut out = stdout.lock();
    session.execute(command, &mut out)
}

struct Session {
    store: Arc<FileStore>,
    clock: Arc<dyn Clock>,
    config: TrackerConfig,
    storage: StorageConfig,
    controller: SessionController,
    display: SessionDisplay,
}

impl Session {
    fn open(storage: &StorageConfig, clock: Arc<dyn Clock>) -> Self {
        let config = TrackerConfig::load(&storage.config_file());
        let store = Arc::new(FileStore::open(&storage.store_file()));
        let shared: Arc<dyn KeyValueStore> = store.clone();

        let controller = SessionController::restore(shared.clone(), clock.clone());
        let mut display = SessionDisplay::mount(shared, config.display_settings(), clock.now());
        display.set_visible(controller.phase().is_tracking());

        Session {
            store,
            clock,
            config,
            storage: storage.clone(),
            controller,
            display,
        }
    }

    fn execute(&mut self, command: Commands, out: &mut impl Write) -> Result<(), String> {
        match command {
            Commands::Submit {
                first_name,
                last_name,
                project_name,
                employee_id,
            } => {
                let values = [
                    (IdentityField::FirstName, first_name),
                    (IdentityField::LastName, last_name),
                    (IdentityField::ProjectName, project_name),
                    (IdentityField::EmployeeId, employee_id),
                ];
                for (field, value) in values {
                    if let Some(value) = value {
                        self.controller.update_field(field, value);
                    }
                }

                if !self.controller.submit()? {
                    let missing: Vec<&str> = IdentityField::ALL
                        .iter()
                        .filter(|field| self.controller.draft().get(**field).trim().is_empty())
                        .map(|field| field.as_str())
                        .collect();
                    return Err(format!(
                        "Identity incomplete, missing: {}",
                        missing.join(", ")
                    ));
                }
                self.show(out)
            }
            Commands::Start => {
                self.controller.start()?;
                self.announce(TRACKING_STARTED, out)
            }
            Commands::Stop => {
                self.controller.stop()?;
                self.announce(TRACKING_STOPPED, out)
            }
            Commands::Activity { elapsed_ms } => {
                self.controller.record_activity(elapsed_ms)?;
                let total = self.controller.record().cursor_activity_time;
                writeln!(out, "Active time: {} h", total_active_hours(total)).map_err(io_err)
            }
            Commands::Export { out_dir } => self.export(out_dir, out),
            Commands::Status => {
                let record = self.controller.record();
                writeln!(out, "Phase: {}", self.controller.phase()).map_err(io_err)?;
                writeln!(
                    out,
                    "Active time: {} h",
                    total_active_hours(record.cursor_activity_time)
                )
                .map_err(io_err)?;
                self.show(out)
            }
            Commands::Watch { ticks } => self.watch(ticks, out),
            Commands::Config => {
                let rendered = serde_json::to_string_pretty(&self.config)
                    .map_err(|e| format!("Failed to render config: {}", e))?;
                writeln!(out, "root:   {}", self.storage.root().display()).map_err(io_err)?;
                writeln!(out, "store:  {}", self.storage.store_file().display())
                    .map_err(io_err)?;
                writeln!(out, "config: {}", self.storage.config_file().display())
                    .map_err(io_err)?;
                writeln!(out, "{}", rendered).map_err(io_err)
            }
        }
    }

    fn export(&mut self, out_dir: Option<PathBuf>, out: &mut impl Write) -> Result<(), String> {
        let dir = match out_dir.or_else(|| self.config.export_dir.clone()) {
            Some(dir) => dir,
            None => env::current_dir()
                .map_err(|e| format!("Cannot resolve export directory: {}", e))?,
        };

        let options = self.config.export_options();
        let mut sink = DirectorySink::new(dir);
        match self.controller.export(&options, &mut sink) {
            Ok(receipt) => {
                self.announce(ACTIVITY_EXPORTED, out)?;
                let location = receipt
                    .location
                    .map(|path| path.display().to_string())
                    .unwrap_or(receipt.file_name);
                writeln!(out, "Saved {} ({} bytes)", location, receipt.size).map_err(io_err)
            }
            Err(e) => {
                self.announce(&export_failed(&e.to_string()), out)?;
                Err(e.into())
            }
        }
    }

    fn watch(&mut self, ticks: Option<u64>, out: &mut impl Write) -> Result<(), String> {
        let mut rendered = 0u64;
        loop {
            self.store.poll();
            let tracking = load_record(self.store.as_ref())
                .map(|record| record.phase().is_tracking())
                .unwrap_or(false);
            self.display.set_visible(tracking);

            write!(out, "{}", CLEAR_SCREEN).map_err(io_err)?;
            self.render(out)?;
            out.flush().map_err(io_err)?;

            rendered += 1;
            if ticks.is_some_and(|limit| rendered >= limit) {
                return Ok(());
            }
            thread::sleep(Duration::from_secs(1));
        }
    }

    fn announce(&mut self, message: &str, out: &mut impl Write) -> Result<(), String> {
        self.display.notify(message, self.clock.now());
        self.show(out)
    }

    /// Renders with visibility following the controller's phase.
    fn show(&mut self, out: &mut impl Write) -> Result<(), String> {
        self.display.set_visible(self.controller.phase().is_tracking());
        self.render(out)
    }

    fn render(&mut self, out: &mut impl Write) -> Result<(), String> {
        self.display.tick(self.clock.now());
        match self.display.render() {
            Some(text) => writeln!(out, "{}", text).map_err(io_err),
            None => {
                if let Some(message) = self.display.notification() {
                    writeln!(out, "[{}]", message).map_err(io_err)?;
                }
                writeln!(out, "No session in progress. Run `punchcard submit` to begin.")
                    .map_err(io_err)
            }
        }
    }
}

fn io_err(e: io::Error) -> String {
    format!("Failed to write output: {}", e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fs_err as fs;
    use punchcard_core::{ManualClock, Phase, RECORD_KEY};
    use tempfile::tempdir;

    fn open(root: &std::path::Path) -> Session {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 18, 1, 0, 0).unwrap(),
        ));
        Session::open(&StorageConfig::with_root(root.to_path_buf()), clock)
    }

    fn run_in(root: &std::path::Path, command: Commands) -> (Result<(), String>, String) {
        let mut session = open(root);
        let mut out = Vec::new();
        let result = session.execute(command, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    fn submit_ana() -> Commands {
        Commands::Submit {
            first_name: Some("Ana".to_string()),
            last_name: Some("Cruz".to_string()),
            project_name: Some("Alpha".to_string()),
            employee_id: Some("1001".to_string()),
        }
    }

    #[test]
    fn test_session_flow_across_invocations() {
        let temp = tempdir().unwrap();
        let root = temp.path();

        let (result, output) = run_in(root, submit_ana());
        result.unwrap();
        assert!(output.contains("Hi, Ana!"));

        let (result, output) = run_in(root, Commands::Start);
        result.unwrap();
        assert!(output.contains("[Tracking started!]"));

        let (result, _) = run_in(root, Commands::Activity { elapsed_ms: 5_430_000 });
        result.unwrap();

        let (result, output) = run_in(root, Commands::Stop);
        result.unwrap();
        assert!(output.contains("[Tracking stopped!]"));
        assert!(!output.contains("Not logged in yet"));

        let out_dir = root.join("exports");
        let (result, output) = run_in(
            root,
            Commands::Export {
                out_dir: Some(out_dir.clone()),
            },
        );
        result.unwrap();
        assert!(output.contains("[Activity exported!]"));
        assert!(out_dir.join("activity.xlsx").exists());

        let session = open(root);
        assert_eq!(session.controller.phase(), Phase::Intake);
        assert_eq!(session.store.get(RECORD_KEY).unwrap(), None);
    }

    #[test]
    fn test_submit_opens_tracking_view() {
        let temp = tempdir().unwrap();
        let (result, output) = run_in(temp.path(), submit_ana());
        result.unwrap();
        assert!(output.starts_with("Hi, Ana!"));
        assert!(output.contains("Not logged in yet"));
        assert!(!output.contains("No session in progress"));
    }

    #[test]
    fn test_incomplete_submit_reports_missing_fields() {
        let temp = tempdir().unwrap();
        let (result, _) = run_in(
            temp.path(),
            Commands::Submit {
                first_name: Some("Ana".to_string()),
                last_name: None,
                project_name: Some("  ".to_string()),
                employee_id: Some("1001".to_string()),
            },
        );
        assert_eq!(
            result.unwrap_err(),
            "Identity incomplete, missing: lastName, projectName"
        );
        assert!(!StorageConfig::with_root(temp.path().to_path_buf())
            .store_file()
            .exists());
    }

    #[test]
    fn test_start_before_submit_fails() {
        let temp = tempdir().unwrap();
        let (result, _) = run_in(temp.path(), Commands::Start);
        assert_eq!(
            result.unwrap_err(),
            "Cannot start tracking while session is intake"
        );
    }

    #[test]
    fn test_failed_export_keeps_session() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        run_in(root, submit_ana()).0.unwrap();
        run_in(root, Commands::Start).0.unwrap();

        // A regular file where the export directory should be
        let blocked = root.join("blocked");
        fs::write(&blocked, "not a directory").unwrap();

        let (result, output) = run_in(
            root,
            Commands::Export {
                out_dir: Some(blocked),
            },
        );
        assert!(result.is_err());
        assert!(output.contains("[Export failed: Failed to save activity.xlsx"));
        assert_eq!(open(root).controller.phase(), Phase::Active);
    }

    #[test]
    fn test_watch_renders_requested_ticks() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        run_in(root, submit_ana()).0.unwrap();

        let (result, output) = run_in(root, Commands::Watch { ticks: Some(1) });
        result.unwrap();
        assert!(output.starts_with(CLEAR_SCREEN));
        assert!(output.contains("Hi, Ana!"));
    }

    #[test]
    fn test_status_in_intake() {
        let temp = tempdir().unwrap();
        let (result, output) = run_in(temp.path(), Commands::Status);
        result.unwrap();
        assert!(output.contains("Phase: intake"));
        assert!(output.contains("No session in progress"));
    }
}
