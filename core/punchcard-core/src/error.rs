//! Error types for punchcard-core operations.

use crate::record::Phase;

/// All errors that can occur in punchcard-core operations.
///
/// Recoverable faults (a malformed stored record, an incomplete identity) are
/// absorbed where they happen and never reach callers as errors; see
/// [`crate::record::load_record`] and [`crate::SessionController::submit_identity`].
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    // ─────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Home directory not found")]
    HomeDirNotFound,

    // ─────────────────────────────────────────────────────────────────────
    // I/O Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {context}: {source}")]
    Json {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Session Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Malformed session record: {details}")]
    MalformedRecord { details: String },

    #[error("Cannot {operation} while session is {phase}")]
    InvalidPhase {
        operation: &'static str,
        phase: Phase,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Export Errors
    // ─────────────────────────────────────────────────────────────────────
    #[error("Spreadsheet generation failed: {details}")]
    ExportGeneration { details: String },

    #[error("Failed to save {file_name}: {source}")]
    ExportSave {
        file_name: String,
        #[source]
        source: std::io::Error,
    },
}

impl TrackerError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        TrackerError::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn json(context: impl Into<String>, source: serde_json::Error) -> Self {
        TrackerError::Json {
            context: context.into(),
            source,
        }
    }
}

impl From<rust_xlsxwriter::XlsxError> for TrackerError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        TrackerError::ExportGeneration {
            details: err.to_string(),
        }
    }
}

/// Convenience type alias for Results using TrackerError.
pub type Result<T> = std::result::Result<T, TrackerError>;

// Conversion for string error compatibility
impl From<TrackerError> for String {
    fn from(err: TrackerError) -> String {
        err.to_string()
    }
}
