//! Dense time series for the dashboard.
//!
//! The stat tables are sparse: a bucket with no events has no row. The
//! chart layer expects one point per expected bucket, so assembly walks
//! the expected boundaries and emits explicit nulls where no row exists.
//! Gaps are never rendered as zeros; a zero bucket would read as "ran and
//! all failed to count" rather than "nothing ran".

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::collections::BTreeMap;
use utoipa::ToSchema;

use crate::stats::buckets::bucket_starts;
use crate::stats::period::{resolve_period, Resolution};
use crate::stats::types::StatsError;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PipelineSeriesPoint {
    pub date: DateTime<Utc>,
    pub total: Option<i64>,
    pub passed: Option<i64>,
    pub failed: Option<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobTypeSeriesPoint {
    pub date: DateTime<Utc>,
    pub total: Option<i64>,
    pub passed: Option<i64>,
    pub failed: Option<i64>,
    pub avg_duration_seconds: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
struct Measures {
    total: i64,
    passed: i64,
    failed: i64,
    avg_duration_seconds: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct HourlyPipelineRow {
    period_start: DateTime<Utc>,
    total_pipelines: i64,
    passed_pipelines: i64,
    failed_pipelines: i64,
    avg_duration_seconds: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct DailyPipelineRow {
    date: NaiveDate,
    total_pipelines: i64,
    passed_pipelines: i64,
    failed_pipelines: i64,
    avg_duration_seconds: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct HourlyJobTypeRow {
    period_start: DateTime<Utc>,
    total_jobs: i64,
    passed_jobs: i64,
    failed_jobs: i64,
    avg_duration_seconds: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct DailyJobTypeRow {
    date: NaiveDate,
    total_jobs: i64,
    passed_jobs: i64,
    failed_jobs: i64,
    avg_duration_seconds: i64,
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or_default()
}

fn assemble_pipeline_series(
    expected: impl Iterator<Item = DateTime<Utc>>,
    rows: &BTreeMap<DateTime<Utc>, Measures>,
) -> Vec<PipelineSeriesPoint> {
    expected
        .map(|bucket| match rows.get(&bucket) {
            Some(m) => PipelineSeriesPoint {
                date: bucket,
                total: Some(m.total),
                passed: Some(m.passed),
                failed: Some(m.failed),
            },
            None => PipelineSeriesPoint {
                date: bucket,
                total: None,
                passed: None,
                failed: None,
            },
        })
        .collect()
}

fn assemble_job_type_series(
    expected: impl Iterator<Item = DateTime<Utc>>,
    rows: &BTreeMap<DateTime<Utc>, Measures>,
) -> Vec<JobTypeSeriesPoint> {
    expected
        .map(|bucket| match rows.get(&bucket) {
            Some(m) => JobTypeSeriesPoint {
                date: bucket,
                total: Some(m.total),
                passed: Some(m.passed),
                failed: Some(m.failed),
                avg_duration_seconds: Some(m.avg_duration_seconds),
            },
            None => JobTypeSeriesPoint {
                date: bucket,
                total: None,
                passed: None,
                failed: None,
                avg_duration_seconds: None,
            },
        })
        .collect()
}

/// Dense pipeline series for a duration label.
pub async fn pipeline_series(
    pool: &PgPool,
    duration: &str,
    now: DateTime<Utc>,
) -> Result<Vec<PipelineSeriesPoint>, StatsError> {
    let period = resolve_period(duration, now)?;
    let rows: BTreeMap<DateTime<Utc>, Measures> = match period.resolution {
        Resolution::Hourly => sqlx::query_as::<_, HourlyPipelineRow>(
            r#"
            SELECT period_start, total_pipelines, passed_pipelines,
                   failed_pipelines, avg_duration_seconds
            FROM hourly_pipeline_stats
            WHERE period_start > $1 AND period_start <= $2
            "#,
        )
        .bind(period.start)
        .bind(period.end)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|r| {
            (
                r.period_start,
                Measures {
                    total: r.total_pipelines,
                    passed: r.passed_pipelines,
                    failed: r.failed_pipelines,
                    avg_duration_seconds: r.avg_duration_seconds,
                },
            )
        })
        .collect(),
        Resolution::Daily => sqlx::query_as::<_, DailyPipelineRow>(
            r#"
            SELECT date, total_pipelines, passed_pipelines,
                   failed_pipelines, avg_duration_seconds
            FROM daily_pipeline_stats
            WHERE date > $1 AND date <= $2
            "#,
        )
        .bind(period.start.date_naive())
        .bind(period.end.date_naive())
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|r| {
            (
                midnight_utc(r.date),
                Measures {
                    total: r.total_pipelines,
                    passed: r.passed_pipelines,
                    failed: r.failed_pipelines,
                    avg_duration_seconds: r.avg_duration_seconds,
                },
            )
        })
        .collect(),
    };

    let expected = bucket_starts(period.start, period.end, period.resolution);
    Ok(assemble_pipeline_series(expected, &rows))
}

/// Dense per-job-type series for a duration label.
pub async fn job_type_series(
    pool: &PgPool,
    job_type_id: i64,
    duration: &str,
    now: DateTime<Utc>,
) -> Result<Vec<JobTypeSeriesPoint>, StatsError> {
    let period = resolve_period(duration, now)?;
    let rows: BTreeMap<DateTime<Utc>, Measures> = match period.resolution {
        Resolution::Hourly => sqlx::query_as::<_, HourlyJobTypeRow>(
            r#"
            SELECT period_start, total_jobs, passed_jobs,
                   failed_jobs, avg_duration_seconds
            FROM hourly_job_type_stats
            WHERE job_type_id = $1
              AND period_start > $2 AND period_start <= $3
            "#,
        )
        .bind(job_type_id)
        .bind(period.start)
        .bind(period.end)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|r| {
            (
                r.period_start,
                Measures {
                    total: r.total_jobs,
                    passed: r.passed_jobs,
                    failed: r.failed_jobs,
                    avg_duration_seconds: r.avg_duration_seconds,
                },
            )
        })
        .collect(),
        Resolution::Daily => sqlx::query_as::<_, DailyJobTypeRow>(
            r#"
            SELECT date, total_jobs, passed_jobs,
                   failed_jobs, avg_duration_seconds
            FROM daily_job_type_stats
            WHERE job_type_id = $1
              AND date > $2 AND date <= $3
            "#,
        )
        .bind(job_type_id)
        .bind(period.start.date_naive())
        .bind(period.end.date_naive())
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|r| {
            (
                midnight_utc(r.date),
                Measures {
                    total: r.total_jobs,
                    passed: r.passed_jobs,
                    failed: r.failed_jobs,
                    avg_duration_seconds: r.avg_duration_seconds,
                },
            )
        })
        .collect(),
    };

    let expected = bucket_starts(period.start, period.end, period.resolution);
    Ok(assemble_job_type_series(expected, &rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, 0, 0).unwrap()
    }

    #[test]
    fn missing_buckets_become_explicit_nulls() {
        let start = at(2026, 8, 29, 6);
        let end = at(2026, 8, 29, 9);
        let mut rows = BTreeMap::new();
        rows.insert(
            at(2026, 8, 29, 8),
            Measures {
                total: 4,
                passed: 3,
                failed: 1,
                avg_duration_seconds: 77,
            },
        );

        let points = assemble_pipeline_series(
            bucket_starts(start, end, Resolution::Hourly),
            &rows,
        );
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].date, at(2026, 8, 29, 7));
        assert_eq!(points[0].total, None);
        assert_eq!(points[1].total, Some(4));
        assert_eq!(points[1].passed, Some(3));
        assert_eq!(points[2].total, None);
    }

    #[test]
    fn empty_store_yields_all_null_series_of_full_length() {
        let start = at(2026, 8, 21, 0);
        let end = at(2026, 8, 28, 0);
        let rows = BTreeMap::new();
        let points = assemble_job_type_series(
            bucket_starts(start, end, Resolution::Daily),
            &rows,
        );
        assert_eq!(points.len(), 7);
        assert!(points
            .iter()
            .all(|p| p.total.is_none() && p.avg_duration_seconds.is_none()));
    }

    #[test]
    fn series_length_matches_bucket_count_for_every_duration() {
        let now = at(2026, 8, 29, 13);
        let rows = BTreeMap::new();
        for duration in crate::stats::period::ALLOWED_DURATIONS {
            let period = resolve_period(duration, now).unwrap();
            let expected =
                bucket_starts(period.start, period.end, period.resolution).count();
            let points = assemble_pipeline_series(
                bucket_starts(period.start, period.end, period.resolution),
                &rows,
            );
            assert_eq!(points.len(), expected, "duration {duration}");
        }
    }

    #[test]
    fn daily_rows_key_on_midnight_utc() {
        assert_eq!(
            midnight_utc(NaiveDate::from_ymd_opt(2026, 8, 28).unwrap()),
            at(2026, 8, 28, 0)
        );
    }
}
