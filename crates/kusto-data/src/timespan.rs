//! Parsing and formatting of Kusto `timespan` values.
//!
//! The textual form is `[-][d.]hh:mm:ss[.fffffff]`. Fractions carry up to
//! seven digits, i.e. 100ns ticks.

use std::sync::OnceLock;

use chrono::TimeDelta;

use crate::error::{Error, ErrorKind, Result};
use crate::types::ColumnType;

const NANOS_PER_TICK: i64 = 100;
const TICKS_PER_SECOND: i64 = 10_000_000;

fn pattern() -> &'static regex_lite::Regex {
    static PATTERN: OnceLock<regex_lite::Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        regex_lite::Regex::new(r"^(-)?(?:(\d+)\.)?(\d{1,2}):(\d{2}):(\d{2})(?:\.(\d{1,7}))?$")
            .expect("static pattern is valid")
    })
}

fn invalid(value: &str) -> Error {
    Error::new(ErrorKind::InvalidFormat {
        column_type: ColumnType::Timespan,
        value: value.to_string(),
    })
}

/// Parse a timespan in `[-][d.]hh:mm:ss[.fffffff]` form.
pub fn parse_timespan(value: &str) -> Result<TimeDelta> {
    let caps = pattern().captures(value).ok_or_else(|| invalid(value))?;

    let number = |idx: usize| -> Result<i64> {
        caps.get(idx)
            .map_or(Ok(0), |m| m.as_str().parse::<i64>())
            .map_err(|_| invalid(value))
    };

    let days = number(2)?;
    let hours = number(3)?;
    let minutes = number(4)?;
    let seconds = number(5)?;

    if hours >= 24 || minutes >= 60 || seconds >= 60 {
        return Err(invalid(value));
    }

    let fraction = match caps.get(6) {
        Some(fraction) => format!("{:0<7}", fraction.as_str())
            .parse::<i128>()
            .map_err(|_| invalid(value))?,
        None => 0,
    };

    let seconds = i128::from(days) * 86_400 + i128::from(hours * 3_600 + minutes * 60 + seconds);
    let magnitude = seconds * i128::from(TICKS_PER_SECOND) + fraction;
    let ticks = if caps.get(1).is_some() { -magnitude } else { magnitude };

    // Kusto timespans are signed 64-bit tick counts.
    if i64::try_from(ticks).is_err() {
        return Err(invalid(value));
    }

    let whole = i64::try_from(magnitude / i128::from(TICKS_PER_SECOND))
        .map_err(|_| invalid(value))?;
    let nanos = u32::try_from(fraction * i128::from(NANOS_PER_TICK)).map_err(|_| invalid(value))?;
    let delta = TimeDelta::new(whole, nanos).ok_or_else(|| invalid(value))?;

    Ok(if caps.get(1).is_some() { -delta } else { delta })
}

/// Format a timespan as `[-][d.]hh:mm:ss.fffffff`.
///
/// The day prefix is written only when non-zero; the fraction always has
/// seven digits. Precision below one tick is truncated.
pub fn format_timespan(value: TimeDelta) -> String {
    let negative = value < TimeDelta::zero();
    let abs = value.abs();

    let ticks = i64::from(abs.subsec_nanos()) / NANOS_PER_TICK;
    let total_seconds = abs.num_seconds();
    let seconds = total_seconds % 60;
    let minutes = (total_seconds / 60) % 60;
    let hours = (total_seconds / 3_600) % 24;
    let days = total_seconds / 86_400;

    let sign = if negative { "-" } else { "" };
    if days > 0 {
        format!(
            "{}{}.{:02}:{:02}:{:02}.{:07}",
            sign, days, hours, minutes, seconds, ticks
        )
    } else {
        format!("{}{:02}:{:02}:{:02}.{:07}", sign, hours, minutes, seconds, ticks)
    }
}

/// Format a timespan as a query literal, e.g. `time(01:00:00.0000000)`.
pub fn format_timespan_literal(value: TimeDelta) -> String {
    format!("time({})", format_timespan(value))
}
