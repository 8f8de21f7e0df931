//! The persisted session record and its codec.
//!
//! One [`SessionRecord`] lives in the shared store under [`RECORD_KEY`], encoded
//! as a flat JSON object:
//!
//! ```json
//! {
//!   "firstName": "Ana",
//!   "lastName": "Cruz",
//!   "projectName": "Alpha",
//!   "employeeId": "1001",
//!   "startTime": "2026-10-18T01:00:00.000Z",
//!   "stopTime": null,
//!   "cursorActivityTime": 0
//! }
//! ```
//!
//! # Tolerant Loading
//!
//! The store may hold records written by older clients (including the browser
//! widget, which wrote `Date.prototype.toString()` timestamps). Loading handles:
//! - Missing or null fields (defaults: empty string, null, 0)
//! - Numeric employee ids (kept as text)
//! - RFC 3339, RFC 2822 and JavaScript-style timestamps
//! - Unparseable timestamp strings (read as null)
//!
//! Anything else, including invalid JSON, makes the record malformed, and
//! [`load_record`] reports it as absent.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, TrackerError};
use crate::store::KeyValueStore;

/// Fixed key of the singleton record in the shared store.
pub const RECORD_KEY: &str = "trackerData";

/// Who is being tracked and on what.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Identity {
    #[serde(deserialize_with = "lenient::string")]
    pub first_name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub last_name: String,
    #[serde(deserialize_with = "lenient::string")]
    pub project_name: String,
    /// Numeric-looking, but always stored as text.
    #[serde(deserialize_with = "lenient::string")]
    pub employee_id: String,
}

impl Identity {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        project_name: impl Into<String>,
        employee_id: impl Into<String>,
    ) -> Self {
        Identity {
            first_name: first_name.into(),
            last_name: last_name.into(),
            project_name: project_name.into(),
            employee_id: employee_id.into(),
        }
    }

    /// True when all four fields are non-empty after trimming.
    pub fn is_complete(&self) -> bool {
        [
            &self.first_name,
            &self.last_name,
            &self.project_name,
            &self.employee_id,
        ]
        .iter()
        .all(|field| !field.trim().is_empty())
    }

    pub fn get(&self, field: IdentityField) -> &str {
        match field {
            IdentityField::FirstName => &self.first_name,
            IdentityField::LastName => &self.last_name,
            IdentityField::ProjectName => &self.project_name,
            IdentityField::EmployeeId => &self.employee_id,
        }
    }

    pub fn set(&mut self, field: IdentityField, value: impl Into<String>) {
        let slot = match field {
            IdentityField::FirstName => &mut self.first_name,
            IdentityField::LastName => &mut self.last_name,
            IdentityField::ProjectName => &mut self.project_name,
            IdentityField::EmployeeId => &mut self.employee_id,
        };
        *slot = value.into();
    }
}

/// Names of the intake form inputs, matching the record's JSON keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityField {
    FirstName,
    LastName,
    ProjectName,
    EmployeeId,
}

impl IdentityField {
    pub const ALL: [IdentityField; 4] = [
        IdentityField::FirstName,
        IdentityField::LastName,
        IdentityField::ProjectName,
        IdentityField::EmployeeId,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityField::FirstName => "firstName",
            IdentityField::LastName => "lastName",
            IdentityField::ProjectName => "projectName",
            IdentityField::EmployeeId => "employeeId",
        }
    }
}

impl fmt::Display for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        IdentityField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| format!("Unknown identity field: {}", s))
    }
}

/// The persisted unit: identity, timestamps and accumulated activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(flatten)]
    pub identity: Identity,
    #[serde(
        default,
        serialize_with = "timestamp::serialize",
        deserialize_with = "timestamp::deserialize"
    )]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(
        default,
        serialize_with = "timestamp::serialize",
        deserialize_with = "timestamp::deserialize"
    )]
    pub stop_time: Option<DateTime<Utc>>,
    /// Accumulated active time in milliseconds.
    #[serde(default, deserialize_with = "lenient::millis")]
    pub cursor_activity_time: u64,
}

impl SessionRecord {
    pub fn with_identity(identity: Identity) -> Self {
        SessionRecord {
            identity,
            ..SessionRecord::default()
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::of(self)
    }
}

/// Where a session stands, derived from its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Identity incomplete; only the intake form is reachable.
    Intake,
    /// Identity submitted, tracking not yet started.
    Ready,
    /// Tracking started and not stopped.
    Active,
    /// Tracking stopped (possibly without ever starting).
    Stopped,
}

impl Phase {
    pub fn of(record: &SessionRecord) -> Phase {
        if !record.identity.is_complete() {
            return Phase::Intake;
        }
        match (record.start_time, record.stop_time) {
            (_, Some(_)) => Phase::Stopped,
            (Some(_), None) => Phase::Active,
            (None, None) => Phase::Ready,
        }
    }

    /// True once identity is in, i.e. the tracking view is reachable.
    pub fn is_tracking(self) -> bool {
        self != Phase::Intake
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Intake => "intake",
            Phase::Ready => "ready",
            Phase::Active => "active",
            Phase::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Codec
// ═══════════════════════════════════════════════════════════════════════════════

pub fn encode_record(record: &SessionRecord) -> Result<String> {
    serde_json::to_string(record).map_err(|e| TrackerError::json("encode session record", e))
}

pub fn decode_record(raw: &str) -> Result<SessionRecord> {
    serde_json::from_str(raw).map_err(|e| TrackerError::MalformedRecord {
        details: e.to_string(),
    })
}

/// Reads the record from the store. Absent, unreadable and malformed
/// records all come back as `None`.
pub fn load_record(store: &dyn KeyValueStore) -> Option<SessionRecord> {
    let raw = match store.get(RECORD_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read session record, using defaults");
            return None;
        }
    };

    match decode_record(&raw) {
        Ok(record) => Some(record),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed session record");
            None
        }
    }
}

pub fn save_record(store: &dyn KeyValueStore, record: &SessionRecord) -> Result<()> {
    let encoded = encode_record(record)?;
    store.set(RECORD_KEY, &encoded)
}

/// Parses a stored timestamp in any of the accepted forms.
///
/// Accepts RFC 3339, RFC 2822, and `Date.prototype.toString()` output such as
/// `Sun Oct 18 2026 09:15:00 GMT+0800 (Philippine Standard Time)`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    // Zone name in parentheses is informational only
    let without_zone_name = match raw.find(" (") {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    DateTime::parse_from_str(without_zone_name, "%a %b %d %Y %H:%M:%S GMT%z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

mod timestamp {
    use super::*;

    pub fn serialize<S>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => {
                serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(match raw {
            Some(raw) => {
                let parsed = parse_timestamp(&raw);
                if parsed.is_none() {
                    tracing::debug!(value = %raw, "Unparseable stored timestamp, treating as null");
                }
                parsed
            }
            None => None,
        })
    }
}

mod lenient {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(String::new()),
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(D::Error::custom(format!(
                "expected a string, found {}",
                other
            ))),
        }
    }

    pub fn millis<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(0),
            Value::Number(n) => Ok(n
                .as_u64()
                .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
                .unwrap_or(0)),
            other => Err(D::Error::custom(format!(
                "expected milliseconds, found {}",
                other
            ))),
        }
    }
}
