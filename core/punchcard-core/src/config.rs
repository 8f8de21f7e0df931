//! User preferences, loaded from `config.json` with defaults for anything
//! missing.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use fs_err as fs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::display::{DisplaySettings, DEFAULT_DISPLAY_TIME_FORMAT};
use crate::error::{Result, TrackerError};
use crate::export::{
    is_valid_time_format, ExportOptions, DEFAULT_COLUMN_WIDTH, DEFAULT_FILE_NAME,
    DEFAULT_TIME_FORMAT,
};
use crate::notification::DEFAULT_DURATION_MS;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub export_file_name: String,
    /// Where exports are saved; the CLI uses the working directory if unset.
    pub export_dir: Option<PathBuf>,
    pub export_time_format: String,
    pub display_time_format: String,
    /// Fixed offset for rendered timestamps; local time if unset.
    pub utc_offset_minutes: Option<i32>,
    pub notification_duration_ms: u64,
    pub column_width: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        TrackerConfig {
            export_file_name: DEFAULT_FILE_NAME.to_string(),
            export_dir: None,
            export_time_format: DEFAULT_TIME_FORMAT.to_string(),
            display_time_format: DEFAULT_DISPLAY_TIME_FORMAT.to_string(),
            utc_offset_minutes: None,
            notification_duration_ms: DEFAULT_DURATION_MS,
            column_width: DEFAULT_COLUMN_WIDTH,
        }
    }
}

impl TrackerConfig {
    /// Loads the config, returning defaults if the file is missing or
    /// malformed.
    pub fn load(path: &Path) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return TrackerConfig::default(),
        };
        match serde_json::from_str::<TrackerConfig>(&content) {
            Ok(config) => config.sanitized(),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Malformed config file, using defaults"
                );
                TrackerConfig::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| TrackerError::json("encode config", e))?;

        let parent_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent_dir)
            .map_err(|e| TrackerError::io("create config directory", e))?;

        let mut temp_file = NamedTempFile::new_in(parent_dir)
            .map_err(|e| TrackerError::io("create temp config file", e))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| TrackerError::io("write temp config file", e))?;
        temp_file
            .persist(path)
            .map_err(|e| TrackerError::io("persist config file", e.error))?;
        Ok(())
    }

    /// Replaces unusable values with defaults.
    fn sanitized(mut self) -> Self {
        let defaults = TrackerConfig::default();
        if self.export_file_name.trim().is_empty() {
            self.export_file_name = defaults.export_file_name;
        }
        if !is_valid_time_format(&self.export_time_format) {
            tracing::warn!(
                format = %self.export_time_format,
                "Invalid export_time_format, using default"
            );
            self.export_time_format = defaults.export_time_format;
        }
        if !is_valid_time_format(&self.display_time_format) {
            tracing::warn!(
                format = %self.display_time_format,
                "Invalid display_time_format, using default"
            );
            self.display_time_format = defaults.display_time_format;
        }
        if !(self.column_width.is_finite() && self.column_width > 0.0) {
            self.column_width = defaults.column_width;
        }
        if self.utc_offset().is_none() && self.utc_offset_minutes.is_some() {
            tracing::warn!(
                minutes = ?self.utc_offset_minutes,
                "utc_offset_minutes out of range, using local time"
            );
            self.utc_offset_minutes = None;
        }
        self
    }

    pub fn utc_offset(&self) -> Option<FixedOffset> {
        self.utc_offset_minutes
            .and_then(|minutes| minutes.checked_mul(60))
            .and_then(FixedOffset::east_opt)
    }

    pub fn export_options(&self) -> ExportOptions {
        ExportOptions {
            file_name: self.export_file_name.clone(),
            time_format: self.export_time_format.clone(),
            utc_offset: self.utc_offset(),
            column_width: self.column_width,
        }
    }

    pub fn display_settings(&self) -> DisplaySettings {
        DisplaySettings {
            time_format: self.display_time_format.clone(),
            utc_offset: self.utc_offset(),
            notification_duration_ms: self.notification_duration_ms,
        }
    }
}
