//! Database value parsing utilities
//!
//! Provides error-safe parsing of stored values.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Error as SqlError;
use uuid::Uuid;

use crate::models::{SlotStatus, SwapStatus};

fn conversion_error(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> SqlError {
    SqlError::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

#[derive(Debug, thiserror::Error)]
#[error("unknown status value: {0}")]
struct UnknownStatus(String);

/// Parse a UUID from a database string column
pub fn parse_uuid(s: &str) -> Result<Uuid, SqlError> {
    Uuid::parse_str(s).map_err(|e| conversion_error(0, e))
}

/// Format a timestamp for storage.
///
/// Fixed-width UTC with microseconds, so text order equals time order.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a DateTime from an RFC3339 string
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, SqlError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(0, e))
}

pub fn parse_slot_status(s: &str) -> Result<SlotStatus, SqlError> {
    SlotStatus::parse(s).ok_or_else(|| conversion_error(0, UnknownStatus(s.to_string())))
}

pub fn parse_swap_status(s: &str) -> Result<SwapStatus, SqlError> {
    SwapStatus::parse(s).ok_or_else(|| conversion_error(0, UnknownStatus(s.to_string())))
}

/// Extension trait for converting rusqlite Results to Option
pub trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, SqlError>;
}

impl<T> OptionalExt<T> for Result<T, SqlError> {
    fn optional(self) -> Result<Option<T>, SqlError> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(SqlError::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
