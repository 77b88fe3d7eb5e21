//! Expected bucket boundaries for a query window.
//!
//! The window is treated as `(start, end]`: the write path produces one
//! bucket per fully elapsed period, so a 24h window yields exactly 24
//! hourly boundaries and a 7d window exactly 7 daily ones.

use chrono::{DateTime, TimeDelta, Utc};

use crate::stats::period::{start_of_day, start_of_hour, Resolution};

/// Finite iterator over the normalized boundary timestamps in `(start, end]`.
/// Empty when `start >= end`.
#[derive(Debug, Clone)]
pub struct BucketStarts {
    cursor: DateTime<Utc>,
    end: DateTime<Utc>,
    step: TimeDelta,
}

pub fn bucket_starts(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    resolution: Resolution,
) -> BucketStarts {
    let (cursor, end, step) = match resolution {
        Resolution::Hourly => (start_of_hour(start), start_of_hour(end), TimeDelta::hours(1)),
        Resolution::Daily => (start_of_day(start), start_of_day(end), TimeDelta::days(1)),
    };
    BucketStarts { cursor, end, step }
}

impl Iterator for BucketStarts {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<DateTime<Utc>> {
        let next = self.cursor.checked_add_signed(self.step)?;
        if next > self.end {
            return None;
        }
        self.cursor = next;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::period::resolve_period;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn hourly_window_yields_one_boundary_per_hour() {
        let start = at(2026, 8, 28, 9, 0);
        let end = at(2026, 8, 29, 9, 0);
        let buckets: Vec<_> = bucket_starts(start, end, Resolution::Hourly).collect();
        assert_eq!(buckets.len(), 24);
        assert_eq!(buckets[0], at(2026, 8, 28, 10, 0));
        assert_eq!(buckets[23], end);
    }

    #[test]
    fn daily_window_is_start_exclusive() {
        let start = at(2026, 8, 21, 0, 0);
        let end = at(2026, 8, 28, 0, 0);
        let buckets: Vec<_> = bucket_starts(start, end, Resolution::Daily).collect();
        assert_eq!(buckets.len(), 7);
        assert_eq!(buckets[0], at(2026, 8, 22, 0, 0));
        assert_eq!(buckets[6], end);
    }

    #[test]
    fn unnormalized_inputs_are_truncated_first() {
        let buckets: Vec<_> = bucket_starts(
            at(2026, 8, 29, 7, 45),
            at(2026, 8, 29, 9, 10),
            Resolution::Hourly,
        )
        .collect();
        assert_eq!(buckets, vec![at(2026, 8, 29, 8, 0), at(2026, 8, 29, 9, 0)]);
    }

    #[test]
    fn inverted_or_empty_windows_terminate() {
        let later = at(2026, 8, 29, 9, 0);
        let earlier = at(2026, 8, 29, 6, 0);
        assert_eq!(bucket_starts(later, earlier, Resolution::Hourly).count(), 0);
        assert_eq!(bucket_starts(later, later, Resolution::Daily).count(), 0);
    }

    #[test]
    fn every_resolved_period_produces_its_expected_point_count() {
        let now = at(2026, 8, 29, 13, 37);
        for (duration, expected) in [("24h", 24usize), ("7d", 7), ("30d", 30)] {
            let period = resolve_period(duration, now).unwrap();
            let count = bucket_starts(period.start, period.end, period.resolution).count();
            assert_eq!(count, expected, "duration {duration}");
        }
        // Calendar-month windows vary in length but are never empty.
        for duration in ["6m", "1y"] {
            let period = resolve_period(duration, now).unwrap();
            assert!(bucket_starts(period.start, period.end, period.resolution).count() > 180);
        }
    }
}
