//! Human-readable delay strings used on the wire (`"0s"`, `"1m"`, `"1h 30m"`).
//!
//! An upper delay bound of zero means "unbounded". On input it may be spelled
//! `""`, `"0"` or `"unlimited"`; on output it is always `"unlimited"`.

use crate::error::{BrokerError, Result};
use std::time::Duration;

pub const UNLIMITED: &str = "unlimited";

/// Parse a delay such as `"0s"`, `"250ms"`, `"1m"` or `"2h30m"`
pub fn parse_delay(field: &str, value: &str) -> Result<Duration> {
    let value = value.trim();
    if value == "0" {
        return Ok(Duration::ZERO);
    }

    humantime::parse_duration(value).map_err(|e| {
        BrokerError::invalid_input(format!("invalid {} '{}': {}", field, value, e))
    })
}

/// Parse an upper bound where zero/empty/`unlimited` all mean no bound
pub fn parse_max_delay(field: &str, value: &str) -> Result<Duration> {
    match value.trim() {
        "" | "0" | UNLIMITED => Ok(Duration::ZERO),
        other => parse_delay(field, other),
    }
}

pub fn format_delay(delay: Duration) -> String {
    humantime::format_duration(delay).to_string()
}

pub fn format_max_delay(delay: Duration) -> String {
    if delay.is_zero() {
        UNLIMITED.to_string()
    } else {
        format_delay(delay)
    }
}
