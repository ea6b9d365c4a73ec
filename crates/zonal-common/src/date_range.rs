//! Image acquisition date range.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ZonalError, ZonalResult};

/// Half-open acquisition window: start inclusive, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> ZonalResult<Self> {
        if start >= end {
            return Err(ZonalError::InvalidDateRange(format!(
                "start {} must be before end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse start and end strings.
    pub fn parse(start: &str, end: &str) -> ZonalResult<Self> {
        Self::new(parse_datetime(start)?, parse_datetime(end)?)
    }

    /// Milliseconds since the epoch of the start bound.
    pub fn start_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    /// Milliseconds since the epoch of the (exclusive) end bound.
    pub fn end_millis(&self) -> i64 {
        self.end.timestamp_millis()
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Parse an ISO 8601 date or datetime, assuming UTC when no offset is given.
pub fn parse_datetime(s: &str) -> ZonalResult<DateTime<Utc>> {
    let s = s.trim();

    // Try full datetime with timezone
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try without timezone (assume UTC)
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&ndt));
    }

    // Try date only
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(ndt) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&ndt));
        }
    }

    Err(ZonalError::InvalidDateRange(format!(
        "'{}' is not a date (YYYY-MM-DD) or datetime",
        s
    )))
}
