//! Idempotent writes into the stat tables.
//!
//! Every write is an `ON CONFLICT ... DO UPDATE` that overwrites the full
//! measure set, so re-running a sweep over the same window converges to
//! the same rows instead of double counting. Batch writers prefetch the
//! existing keys so the sweep can report how many rows were created versus
//! refreshed.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use std::collections::BTreeSet;

use crate::stats::types::{BucketTotals, JobTypeTotals, StatsError, UpsertOutcome};

pub async fn upsert_hourly_pipeline_stats(
    pool: &PgPool,
    period_start: DateTime<Utc>,
    totals: &BucketTotals,
) -> Result<(), StatsError> {
    sqlx::query(
        r#"
        INSERT INTO hourly_pipeline_stats
            (period_start, total_pipelines, passed_pipelines, failed_pipelines, avg_duration_seconds)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (period_start) DO UPDATE SET
            total_pipelines = EXCLUDED.total_pipelines,
            passed_pipelines = EXCLUDED.passed_pipelines,
            failed_pipelines = EXCLUDED.failed_pipelines,
            avg_duration_seconds = EXCLUDED.avg_duration_seconds
        "#,
    )
    .bind(period_start)
    .bind(totals.total)
    .bind(totals.passed)
    .bind(totals.failed)
    .bind(totals.avg_duration_seconds)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn upsert_daily_pipeline_stats(
    pool: &PgPool,
    date: NaiveDate,
    totals: &BucketTotals,
) -> Result<(), StatsError> {
    sqlx::query(
        r#"
        INSERT INTO daily_pipeline_stats
            (date, total_pipelines, passed_pipelines, failed_pipelines, avg_duration_seconds)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (date) DO UPDATE SET
            total_pipelines = EXCLUDED.total_pipelines,
            passed_pipelines = EXCLUDED.passed_pipelines,
            failed_pipelines = EXCLUDED.failed_pipelines,
            avg_duration_seconds = EXCLUDED.avg_duration_seconds
        "#,
    )
    .bind(date)
    .bind(totals.total)
    .bind(totals.passed)
    .bind(totals.failed)
    .bind(totals.avg_duration_seconds)
    .execute(pool)
    .await?;
    Ok(())
}

async fn upsert_hourly_job_type_row(
    pool: &PgPool,
    period_start: DateTime<Utc>,
    bucket: &JobTypeTotals,
) -> Result<(), StatsError> {
    sqlx::query(
        r#"
        INSERT INTO hourly_job_type_stats
            (period_start, job_type_id, total_jobs, passed_jobs, failed_jobs, avg_duration_seconds)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (period_start, job_type_id) DO UPDATE SET
            total_jobs = EXCLUDED.total_jobs,
            passed_jobs = EXCLUDED.passed_jobs,
            failed_jobs = EXCLUDED.failed_jobs,
            avg_duration_seconds = EXCLUDED.avg_duration_seconds
        "#,
    )
    .bind(period_start)
    .bind(bucket.job_type_id)
    .bind(bucket.totals.total)
    .bind(bucket.totals.passed)
    .bind(bucket.totals.failed)
    .bind(bucket.totals.avg_duration_seconds)
    .execute(pool)
    .await?;
    Ok(())
}

async fn upsert_daily_job_type_row(
    pool: &PgPool,
    date: NaiveDate,
    bucket: &JobTypeTotals,
) -> Result<(), StatsError> {
    sqlx::query(
        r#"
        INSERT INTO daily_job_type_stats
            (date, job_type_id, total_jobs, passed_jobs, failed_jobs, avg_duration_seconds)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (date, job_type_id) DO UPDATE SET
            total_jobs = EXCLUDED.total_jobs,
            passed_jobs = EXCLUDED.passed_jobs,
            failed_jobs = EXCLUDED.failed_jobs,
            avg_duration_seconds = EXCLUDED.avg_duration_seconds
        "#,
    )
    .bind(date)
    .bind(bucket.job_type_id)
    .bind(bucket.totals.total)
    .bind(bucket.totals.passed)
    .bind(bucket.totals.failed)
    .bind(bucket.totals.avg_duration_seconds)
    .execute(pool)
    .await?;
    Ok(())
}

/// Count the incoming keys against the set that already exists.
fn split_outcome<K: Ord>(incoming: &[K], existing: &BTreeSet<K>) -> UpsertOutcome {
    let mut outcome = UpsertOutcome::default();
    for key in incoming {
        if existing.contains(key) {
            outcome.updated += 1;
        } else {
            outcome.created += 1;
        }
    }
    outcome
}

/// Write one hourly job-type bucket (all job types for one period_start),
/// reporting created/updated counts.
pub async fn upsert_hourly_job_type_stats(
    pool: &PgPool,
    period_start: DateTime<Utc>,
    buckets: &[JobTypeTotals],
) -> Result<UpsertOutcome, StatsError> {
    if buckets.is_empty() {
        return Ok(UpsertOutcome::default());
    }
    let ids: Vec<i64> = buckets.iter().map(|b| b.job_type_id).collect();
    let existing: BTreeSet<i64> = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT job_type_id FROM hourly_job_type_stats
        WHERE period_start = $1 AND job_type_id = ANY($2)
        "#,
    )
    .bind(period_start)
    .bind(&ids)
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();

    for bucket in buckets {
        upsert_hourly_job_type_row(pool, period_start, bucket).await?;
    }
    Ok(split_outcome(&ids, &existing))
}

/// Daily counterpart of [`upsert_hourly_job_type_stats`].
pub async fn upsert_daily_job_type_stats(
    pool: &PgPool,
    date: NaiveDate,
    buckets: &[JobTypeTotals],
) -> Result<UpsertOutcome, StatsError> {
    if buckets.is_empty() {
        return Ok(UpsertOutcome::default());
    }
    let ids: Vec<i64> = buckets.iter().map(|b| b.job_type_id).collect();
    let existing: BTreeSet<i64> = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT job_type_id FROM daily_job_type_stats
        WHERE date = $1 AND job_type_id = ANY($2)
        "#,
    )
    .bind(date)
    .bind(&ids)
    .fetch_all(pool)
    .await?
    .into_iter()
    .collect();

    for bucket in buckets {
        upsert_daily_job_type_row(pool, date, bucket).await?;
    }
    Ok(split_outcome(&ids, &existing))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_new_keys_count_as_created() {
        let incoming = vec![1_i64, 2, 3, 4, 5];
        let existing = BTreeSet::new();
        assert_eq!(
            split_outcome(&incoming, &existing),
            UpsertOutcome {
                created: 5,
                updated: 0
            }
        );
    }

    #[test]
    fn overlapping_keys_count_as_updated() {
        let incoming = vec![1_i64, 2, 3, 4, 5];
        let existing: BTreeSet<i64> = [2, 4, 5].into_iter().collect();
        assert_eq!(
            split_outcome(&incoming, &existing),
            UpsertOutcome {
                created: 2,
                updated: 3
            }
        );
    }

    #[test]
    fn absorb_accumulates_across_buckets() {
        let mut total = UpsertOutcome::default();
        total.absorb(UpsertOutcome {
            created: 2,
            updated: 1,
        });
        total.absorb(UpsertOutcome {
            created: 0,
            updated: 4,
        });
        assert_eq!(
            total,
            UpsertOutcome {
                created: 2,
                updated: 5
            }
        );
    }
}
