//! Spreadsheet export of a finished session.
//!
//! A session exports as a single-row workbook: one worksheet named
//! [`SHEET_NAME`], a bold header row with the seven [`HEADERS`], and one data
//! row built by [`ActivityRow::from_record`]. The workbook is rendered to an
//! in-memory buffer and handed to an [`ArtifactSink`] for saving.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Local, Utc};
use fs_err as fs;
use rust_xlsxwriter::{Format, Workbook};
use tempfile::NamedTempFile;

use crate::error::{Result, TrackerError};
use crate::record::SessionRecord;

pub const SHEET_NAME: &str = "Activity";
pub const DEFAULT_FILE_NAME: &str = "activity.xlsx";
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const DEFAULT_COLUMN_WIDTH: f64 = 25.0;

pub const HEADERS: [&str; 7] = [
    "First Name",
    "Last Name",
    "Project Name",
    "Employee ID",
    "Logged In",
    "Logged Out",
    "Total Active Hours",
];

const MS_PER_HOUR: u128 = 3_600_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub file_name: String,
    /// strftime pattern for the Logged In / Logged Out cells.
    pub time_format: String,
    /// Offset timestamps are rendered in; `None` means the local offset.
    pub utc_offset: Option<FixedOffset>,
    pub column_width: f64,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            file_name: DEFAULT_FILE_NAME.to_string(),
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            utc_offset: None,
            column_width: DEFAULT_COLUMN_WIDTH,
        }
    }
}

/// The exported data row, cells in [`HEADERS`] order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRow {
    pub first_name: String,
    pub last_name: String,
    pub project_name: String,
    pub employee_id: String,
    pub logged_in: String,
    pub logged_out: String,
    pub total_active_hours: String,
}

impl ActivityRow {
    pub fn from_record(record: &SessionRecord, options: &ExportOptions) -> Self {
        let render = |ts: Option<DateTime<Utc>>| {
            ts.map(|ts| format_timestamp(ts, &options.time_format, options.utc_offset))
                .unwrap_or_default()
        };
        ActivityRow {
            first_name: record.identity.first_name.clone(),
            last_name: record.identity.last_name.clone(),
            project_name: record.identity.project_name.clone(),
            employee_id: record.identity.employee_id.clone(),
            logged_in: render(record.start_time),
            logged_out: render(record.stop_time),
            total_active_hours: total_active_hours(record.cursor_activity_time),
        }
    }

    pub fn cells(&self) -> [&str; 7] {
        [
            &self.first_name,
            &self.last_name,
            &self.project_name,
            &self.employee_id,
            &self.logged_in,
            &self.logged_out,
            &self.total_active_hours,
        ]
    }
}

/// Milliseconds as hours, rounded half-up to exactly two decimals.
///
/// `5_430_000` → `"1.51"`.
pub fn total_active_hours(cursor_activity_ms: u64) -> String {
    let hundredths = (u128::from(cursor_activity_ms) * 100 + MS_PER_HOUR / 2) / MS_PER_HOUR;
    format!("{}.{:02}", hundredths / 100, hundredths % 100)
}

/// False if `format` contains an unrecognized strftime specifier.
pub fn is_valid_time_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Renders `ts` with `format` in `offset` (local when `None`). Invalid patterns
/// fall back to [`DEFAULT_TIME_FORMAT`].
pub fn format_timestamp(ts: DateTime<Utc>, format: &str, offset: Option<FixedOffset>) -> String {
    let format = if is_valid_time_format(format) {
        format
    } else {
        tracing::warn!(format, "Invalid time format, using default");
        DEFAULT_TIME_FORMAT
    };
    match offset {
        Some(offset) => ts.with_timezone(&offset).format(format).to_string(),
        None => ts.with_timezone(&Local).format(format).to_string(),
    }
}

/// Renders the workbook into an xlsx buffer.
pub fn render_workbook(row: &ActivityRow, options: &ExportOptions) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (col, header) in HEADERS.iter().enumerate() {
        let col = col as u16;
        worksheet.set_column_width(col, options.column_width)?;
        worksheet.write_string_with_format(0, col, *header, &header_format)?;
    }
    for (col, cell) in row.cells().iter().enumerate() {
        worksheet.write_string(1, col as u16, *cell)?;
    }

    let buffer = workbook.save_to_buffer()?;
    tracing::debug!(bytes = buffer.len(), "Rendered activity workbook");
    Ok(buffer)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Sinks
// ═══════════════════════════════════════════════════════════════════════════════

/// Destination for a rendered artifact (the client-side "save as").
pub trait ArtifactSink {
    /// Saves `bytes` as `file_name`, returning where it landed if on disk.
    fn save(&mut self, file_name: &str, bytes: &[u8]) -> Result<Option<PathBuf>>;
}

/// Writes artifacts into a directory, replacing any file of the same name.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirectorySink { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactSink for DirectorySink {
    fn save(&mut self, file_name: &str, bytes: &[u8]) -> Result<Option<PathBuf>> {
        let save_err = |source| TrackerError::ExportSave {
            file_name: file_name.to_string(),
            source,
        };

        fs::create_dir_all(&self.dir).map_err(save_err)?;
        let target = self.dir.join(file_name);

        let mut temp_file = NamedTempFile::new_in(&self.dir).map_err(save_err)?;
        temp_file.write_all(bytes).map_err(save_err)?;
        temp_file.flush().map_err(save_err)?;
        temp_file.persist(&target).map_err(|e| save_err(e.error))?;

        tracing::info!(path = %target.display(), bytes = bytes.len(), "Saved activity export");
        Ok(Some(target))
    }
}

/// Keeps artifacts in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub artifacts: Vec<(String, Vec<u8>)>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }
}

impl ArtifactSink for MemorySink {
    fn save(&mut self, file_name: &str, bytes: &[u8]) -> Result<Option<PathBuf>> {
        self.artifacts.push((file_name.to_string(), bytes.to_vec()));
        Ok(None)
    }
}

/// What a successful export produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportReceipt {
    pub file_name: String,
    pub location: Option<PathBuf>,
    pub row: ActivityRow,
    pub size: usize,
}
