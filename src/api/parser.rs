//! Wire records returned by the backend and their conversion into domain
//! types. Field naming and timestamp formats are absorbed here and nowhere
//! else.

use crate::app::{LogEntry, LogKind, TestCase, TestStatus};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
struct Envelope<T> {
    data: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DbTestCase {
    pub id: u64,
    pub description: String,
    pub status: TestStatus,
    pub no_of_steps: u32,
}

impl From<DbTestCase> for TestCase {
    fn from(db: DbTestCase) -> Self {
        TestCase {
            id: db.id,
            description: db.description,
            step_count: db.no_of_steps,
            status: db.status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DbTestLog {
    pub message: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: LogKind,
}

impl From<DbTestLog> for LogEntry {
    fn from(db: DbTestLog) -> Self {
        LogEntry {
            message: db.message,
            created_at: db.created_at,
            kind: db.kind,
        }
    }
}

pub fn parse_cases(json: &str) -> serde_json::Result<Vec<TestCase>> {
    let envelope: Envelope<DbTestCase> = serde_json::from_str(json)?;
    Ok(envelope.data.into_iter().map(TestCase::from).collect())
}

pub fn parse_logs(json: &str) -> serde_json::Result<Vec<LogEntry>> {
    let envelope: Envelope<DbTestLog> = serde_json::from_str(json)?;
    Ok(envelope.data.into_iter().map(LogEntry::from).collect())
}

/// Accepts RFC 3339 as well as the zone-less `YYYY-MM-DD HH:MM:SS` form
/// SQLite's `CURRENT_TIMESTAMP` produces, which is UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp {raw:?}")))
}

/// Pulls the filename out of a `Content-Disposition` header, dropping any
/// directory components.
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let value = header.split(';').map(str::trim).find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("filename")
            .then(|| value.trim().trim_matches('"'))
    })?;
    let name = value.rsplit(['/', '\\']).next().unwrap_or(value).trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}
