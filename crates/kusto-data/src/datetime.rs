//! Kusto `datetime` parsing and formatting.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::{Error, ErrorKind, Result};
use crate::types::ColumnType;

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an ISO-8601 datetime. Values without an offset are taken as UTC.
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Ok(date) = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }

    Err(Error::new(ErrorKind::InvalidFormat {
        column_type: ColumnType::DateTime,
        value: value.to_string(),
    }))
}

/// Format as `yyyy-MM-ddTHH:mm:ss.fffffffZ`.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    format!(
        "{}.{:07}Z",
        value.format("%Y-%m-%dT%H:%M:%S"),
        value.timestamp_subsec_nanos() / 100
    )
}

/// Format as a query literal, e.g. `datetime(2024-01-01T00:00:00.0000000Z)`.
pub fn format_datetime_literal(value: &DateTime<Utc>) -> String {
    format!("datetime({})", format_datetime(value))
}
