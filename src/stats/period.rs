//! Period resolution for dashboard queries.
//!
//! Maps a duration label to a concrete `[start, end]` window and a
//! resolution. `end` is anchored to the start of the last fully elapsed
//! hour (or the previous UTC day): the write path only finalizes a bucket
//! once it has completely passed, so the read path must never claim data
//! for the bucket still in progress. All arithmetic is in UTC.

use chrono::{DateTime, Months, TimeDelta, Utc};

use crate::stats::types::StatsError;

pub const ALLOWED_DURATIONS: [&str; 5] = ["24h", "7d", "30d", "6m", "1y"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Hourly,
    Daily,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub resolution: Resolution,
}

/// Truncate to the top of the hour, UTC.
pub fn start_of_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    let secs = t.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(3600), 0).unwrap_or(t)
}

/// Truncate to midnight, UTC.
pub fn start_of_day(t: DateTime<Utc>) -> DateTime<Utc> {
    let secs = t.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(86_400), 0).unwrap_or(t)
}

pub fn resolve_period(duration: &str, now: DateTime<Utc>) -> Result<Period, StatsError> {
    match duration {
        "24h" => {
            let end = start_of_hour(now) - TimeDelta::hours(1);
            Ok(Period {
                start: end - TimeDelta::hours(24),
                end,
                resolution: Resolution::Hourly,
            })
        }
        "7d" | "30d" | "6m" | "1y" => {
            let end = start_of_day(now) - TimeDelta::days(1);
            let start = match duration {
                "7d" => end - TimeDelta::days(7),
                "30d" => end - TimeDelta::days(30),
                "6m" => end - Months::new(6),
                _ => end - Months::new(12),
            };
            Ok(Period {
                start,
                end,
                resolution: Resolution::Daily,
            })
        }
        other => Err(StatsError::InvalidDuration(other.to_string())),
    }
}
