//! Bucket aggregation: read raw events for one bucket and fold them into
//! totals.
//!
//! The SQL side only selects and filters; all derived values (counts, mean
//! duration, rounding) are computed in Rust so the fold is deterministic
//! and unit-testable without a database.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::BTreeMap;

use crate::stats::types::{BucketTotals, JobTypeTotals, StatsError};

/// Terminal pipeline outcomes that count toward a bucket. Everything else
/// (running, canceled, skipped, manual, deleted) is excluded from stats.
pub const COUNTED_STATUSES: [&str; 2] = ["success", "failed"];

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    pub status: String,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobEventRow {
    pub job_type_id: i64,
    pub status: String,
    pub duration: Option<f64>,
}

/// Fold a bucket's events into totals. Returns `None` for an empty slice so
/// callers can skip writing a row instead of persisting zeros.
pub fn fold_totals(events: &[EventRow]) -> Option<BucketTotals> {
    if events.is_empty() {
        return None;
    }
    let mut passed = 0_i64;
    let mut failed = 0_i64;
    let mut duration_sum = 0.0_f64;
    let mut duration_count = 0_i64;
    for event in events {
        match event.status.as_str() {
            "success" => passed += 1,
            "failed" => failed += 1,
            _ => {}
        }
        if let Some(duration) = event.duration {
            duration_sum += duration;
            duration_count += 1;
        }
    }
    let avg_duration_seconds = if duration_count > 0 {
        (duration_sum / duration_count as f64).round() as i64
    } else {
        0
    };
    Some(BucketTotals {
        total: events.len() as i64,
        passed,
        failed,
        avg_duration_seconds,
    })
}

/// Group job events by job type and fold each group. The map keeps the
/// output ordered by job type id regardless of row order.
pub fn fold_job_type_totals(events: &[JobEventRow]) -> Vec<JobTypeTotals> {
    let mut grouped: BTreeMap<i64, Vec<EventRow>> = BTreeMap::new();
    for event in events {
        grouped.entry(event.job_type_id).or_default().push(EventRow {
            status: event.status.clone(),
            duration: event.duration,
        });
    }
    grouped
        .into_iter()
        .filter_map(|(job_type_id, rows)| {
            fold_totals(&rows).map(|totals| JobTypeTotals {
                job_type_id,
                totals,
            })
        })
        .collect()
}

/// Sanity check before persisting: counts must be non-negative and the
/// outcome split can never exceed the total.
pub fn check_totals(totals: &BucketTotals) -> Result<(), StatsError> {
    if totals.total < 0 || totals.passed < 0 || totals.failed < 0 {
        return Err(StatsError::InvariantViolation {
            detail: format!("negative count in {totals:?}"),
        });
    }
    if totals.passed + totals.failed > totals.total {
        return Err(StatsError::InvariantViolation {
            detail: format!(
                "passed + failed exceeds total ({} + {} > {})",
                totals.passed, totals.failed, totals.total
            ),
        });
    }
    Ok(())
}

/// Aggregate pipeline events started within `[bucket_start, bucket_end)`.
pub async fn compute_pipeline_bucket(
    pool: &PgPool,
    bucket_start: DateTime<Utc>,
    bucket_end: DateTime<Utc>,
) -> Result<Option<BucketTotals>, StatsError> {
    let events = sqlx::query_as::<_, EventRow>(
        r#"
        SELECT status, duration
        FROM pipelines
        WHERE started_at >= $1
          AND started_at < $2
          AND status = ANY($3)
        "#,
    )
    .bind(bucket_start)
    .bind(bucket_end)
    .bind(&COUNTED_STATUSES[..])
    .fetch_all(pool)
    .await?;

    let totals = fold_totals(&events);
    if let Some(ref totals) = totals {
        check_totals(totals)?;
    }
    Ok(totals)
}

/// Aggregate job events for managed job types started within
/// `[bucket_start, bucket_end)`, one result per job type.
pub async fn compute_job_type_buckets(
    pool: &PgPool,
    bucket_start: DateTime<Utc>,
    bucket_end: DateTime<Utc>,
) -> Result<Vec<JobTypeTotals>, StatsError> {
    let events = sqlx::query_as::<_, JobEventRow>(
        r#"
        SELECT j.job_type_id, j.status, j.duration
        FROM jobs j
        JOIN job_types jt ON jt.id = j.job_type_id
        WHERE j.started_at >= $1
          AND j.started_at < $2
          AND j.status = ANY($3)
          AND jt.origin = 'managed'
        "#,
    )
    .bind(bucket_start)
    .bind(bucket_end)
    .bind(&COUNTED_STATUSES[..])
    .fetch_all(pool)
    .await?;

    let buckets = fold_job_type_totals(&events);
    for bucket in &buckets {
        check_totals(&bucket.totals)?;
    }
    Ok(buckets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(status: &str, duration: Option<f64>) -> EventRow {
        EventRow {
            status: status.to_string(),
            duration,
        }
    }

    #[test]
    fn folds_counts_and_mean_duration() {
        // One success at 120s and one failure at 60s within the same hour.
        let events = vec![event("success", Some(120.0)), event("failed", Some(60.0))];
        let totals = fold_totals(&events).unwrap();
        assert_eq!(totals.total, 2);
        assert_eq!(totals.passed, 1);
        assert_eq!(totals.failed, 1);
        assert_eq!(totals.avg_duration_seconds, 90);
    }

    #[test]
    fn empty_bucket_folds_to_none() {
        assert_eq!(fold_totals(&[]), None);
    }

    #[test]
    fn missing_durations_do_not_skew_the_mean() {
        let events = vec![
            event("success", Some(100.0)),
            event("success", None),
            event("failed", Some(50.0)),
        ];
        let totals = fold_totals(&events).unwrap();
        assert_eq!(totals.total, 3);
        // Mean over the two events that carried a duration.
        assert_eq!(totals.avg_duration_seconds, 75);
    }

    #[test]
    fn all_durations_missing_yields_zero_average() {
        let events = vec![event("success", None), event("failed", None)];
        let totals = fold_totals(&events).unwrap();
        assert_eq!(totals.avg_duration_seconds, 0);
    }

    #[test]
    fn mean_is_rounded_to_whole_seconds() {
        let events = vec![event("success", Some(10.0)), event("success", Some(11.0))];
        assert_eq!(fold_totals(&events).unwrap().avg_duration_seconds, 11);
    }

    #[test]
    fn fold_is_deterministic_across_input_order() {
        let forward = vec![
            event("success", Some(30.0)),
            event("failed", Some(90.0)),
            event("success", Some(60.0)),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(fold_totals(&forward), fold_totals(&reversed));
    }

    #[test]
    fn job_events_group_by_type_in_id_order() {
        let events = vec![
            JobEventRow {
                job_type_id: 7,
                status: "failed".to_string(),
                duration: Some(20.0),
            },
            JobEventRow {
                job_type_id: 3,
                status: "success".to_string(),
                duration: Some(40.0),
            },
            JobEventRow {
                job_type_id: 7,
                status: "success".to_string(),
                duration: Some(10.0),
            },
        ];
        let buckets = fold_job_type_totals(&events);
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].job_type_id, 3);
        assert_eq!(buckets[0].totals.total, 1);
        assert_eq!(buckets[1].job_type_id, 7);
        assert_eq!(buckets[1].totals.total, 2);
        assert_eq!(buckets[1].totals.avg_duration_seconds, 15);
    }

    #[test]
    fn invariant_check_rejects_impossible_splits() {
        let bad = BucketTotals {
            total: 1,
            passed: 1,
            failed: 1,
            avg_duration_seconds: 0,
        };
        assert!(matches!(
            check_totals(&bad),
            Err(StatsError::InvariantViolation { .. })
        ));

        let good = BucketTotals {
            total: 2,
            passed: 1,
            failed: 1,
            avg_duration_seconds: 90,
        };
        assert!(check_totals(&good).is_ok());
    }
}
