//! Aggregation core: periodic sweeps that roll raw pipeline/job events
//! into hourly and daily stat buckets, plus the pure pieces the read path
//! and alerting share.
//!
//! Sweeps re-cover a lookback window on every run so late-arriving events
//! (a poller catching up, a backfilled pipeline) are folded in; the
//! overwrite-style upserts make that re-cover idempotent.

pub mod aggregate;
pub mod alerts;
pub mod buckets;
pub mod period;
pub mod series;
pub mod types;
pub mod upsert;

pub use self::types::{BucketTotals, JobTypeTotals, StatsError, UpsertOutcome};

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::state::AppState;
use self::period::{start_of_day, start_of_hour, Resolution};

/// Schedules the hourly and daily sweeps a few minutes past the boundary,
/// leaving the ingest side time to land events for the period that just
/// closed.
pub struct StatsSweepService {
    state: AppState,
}

impl StatsSweepService {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn start(self, cancel: CancellationToken) {
        let hourly_offset = self.state.config.hourly_sweep_offset_minutes;
        let daily_offset = self.state.config.daily_sweep_offset_minutes;

        let state = self.state.clone();
        let hourly_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let delay = next_run_delay(Utc::now(), hourly_offset, Resolution::Hourly);
                tokio::select! {
                    _ = hourly_cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {
                        if !run_hourly_sweep(&state).await {
                            warn!("hourly stats sweep completed with errors");
                        }
                    }
                }
            }
        });

        let state = self.state;
        tokio::spawn(async move {
            loop {
                let delay = next_run_delay(Utc::now(), daily_offset, Resolution::Daily);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {
                        if !run_daily_sweep(&state).await {
                            warn!("daily stats sweep completed with errors");
                        }
                    }
                }
            }
        });
    }
}

/// Time until the next boundary-plus-offset run, e.g. the next `HH:05` for
/// hourly sweeps or the next `00:15` for daily ones.
pub fn next_run_delay(now: DateTime<Utc>, offset_minutes: u64, resolution: Resolution) -> Duration {
    let offset = TimeDelta::minutes(offset_minutes as i64);
    let (base, step) = match resolution {
        Resolution::Hourly => (start_of_hour(now), TimeDelta::hours(1)),
        Resolution::Daily => (start_of_day(now), TimeDelta::days(1)),
    };
    let mut candidate = base + offset;
    if candidate <= now {
        candidate += step;
    }
    (candidate - now).to_std().unwrap_or_default()
}

/// Aggregate and persist every hourly bucket in the configured lookback
/// windows, then evaluate alerts on the freshest bucket. Returns `false`
/// if any bucket failed; the rest still run.
pub async fn run_hourly_sweep(state: &AppState) -> bool {
    let now = Utc::now();
    let mut ok = true;

    // Job-type buckets use a short lookback; their alerting only cares
    // about recent hours.
    let job_lookback = state.config.hourly_job_lookback_hours as i64;
    let pipeline_lookback = state.config.hourly_pipeline_lookback_hours as i64;
    let end = start_of_hour(now);

    let mut job_outcome = UpsertOutcome::default();
    let mut cursor = end - TimeDelta::hours(job_lookback);
    while cursor < end {
        let bucket_end = cursor + TimeDelta::hours(1);
        match sweep_hourly_job_bucket(state, cursor, bucket_end).await {
            Ok(outcome) => job_outcome.absorb(outcome),
            Err(err) => {
                warn!(bucket = %cursor, error = %err, "hourly job-type bucket failed");
                ok = false;
            }
        }
        cursor = bucket_end;
    }

    let mut pipeline_buckets = 0_u64;
    let mut cursor = end - TimeDelta::hours(pipeline_lookback);
    while cursor < end {
        let bucket_end = cursor + TimeDelta::hours(1);
        match sweep_hourly_pipeline_bucket(state, cursor, bucket_end).await {
            Ok(written) => pipeline_buckets += u64::from(written),
            Err(err) => {
                warn!(bucket = %cursor, error = %err, "hourly pipeline bucket failed");
                ok = false;
            }
        }
        cursor = bucket_end;
    }

    info!(
        job_rows_created = job_outcome.created,
        job_rows_updated = job_outcome.updated,
        pipeline_buckets,
        "hourly stats sweep finished"
    );

    if let Err(err) = evaluate_hourly_alerts(state, end - TimeDelta::hours(1)).await {
        warn!(error = %err, "hourly alert evaluation failed");
        ok = false;
    }

    ok
}

/// Aggregate and persist daily buckets for the previous N full days.
pub async fn run_daily_sweep(state: &AppState) -> bool {
    let now = Utc::now();
    let mut ok = true;
    let today = start_of_day(now);
    let lookback = state.config.daily_lookback_days as i64;

    let mut outcome = UpsertOutcome::default();
    for days_back in 1..=lookback {
        let bucket_start = today - TimeDelta::days(days_back);
        let bucket_end = bucket_start + TimeDelta::days(1);
        match sweep_daily_bucket(state, bucket_start, bucket_end).await {
            Ok(bucket_outcome) => outcome.absorb(bucket_outcome),
            Err(err) => {
                warn!(bucket = %bucket_start, error = %err, "daily bucket failed");
                ok = false;
            }
        }
    }

    info!(
        rows_created = outcome.created,
        rows_updated = outcome.updated,
        "daily stats sweep finished"
    );
    ok
}

async fn sweep_hourly_job_bucket(
    state: &AppState,
    bucket_start: DateTime<Utc>,
    bucket_end: DateTime<Utc>,
) -> Result<UpsertOutcome, StatsError> {
    let buckets = aggregate::compute_job_type_buckets(&state.db, bucket_start, bucket_end).await?;
    upsert::upsert_hourly_job_type_stats(&state.db, bucket_start, &buckets).await
}

async fn sweep_hourly_pipeline_bucket(
    state: &AppState,
    bucket_start: DateTime<Utc>,
    bucket_end: DateTime<Utc>,
) -> Result<bool, StatsError> {
    match aggregate::compute_pipeline_bucket(&state.db, bucket_start, bucket_end).await? {
        Some(totals) => {
            upsert::upsert_hourly_pipeline_stats(&state.db, bucket_start, &totals).await?;
            Ok(true)
        }
        // No events in the hour: leave the gap for the read path to null-fill.
        None => Ok(false),
    }
}

async fn sweep_daily_bucket(
    state: &AppState,
    bucket_start: DateTime<Utc>,
    bucket_end: DateTime<Utc>,
) -> Result<UpsertOutcome, StatsError> {
    let date = bucket_start.date_naive();
    let mut outcome = UpsertOutcome::default();

    if let Some(totals) =
        aggregate::compute_pipeline_bucket(&state.db, bucket_start, bucket_end).await?
    {
        upsert::upsert_daily_pipeline_stats(&state.db, date, &totals).await?;
    }

    let buckets = aggregate::compute_job_type_buckets(&state.db, bucket_start, bucket_end).await?;
    outcome.absorb(upsert::upsert_daily_job_type_stats(&state.db, date, &buckets).await?);
    Ok(outcome)
}

#[derive(sqlx::FromRow)]
struct AlertRow {
    name: String,
    total_jobs: i64,
    passed_jobs: i64,
}

/// Read the just-written bucket back, evaluate the pass-rate threshold,
/// and send one batched notice. Delivery is best-effort.
async fn evaluate_hourly_alerts(
    state: &AppState,
    period_start: DateTime<Utc>,
) -> Result<(), StatsError> {
    let threshold = state.config.alert_pass_rate_threshold;
    if threshold <= 0 {
        return Ok(());
    }

    let rows = sqlx::query_as::<_, AlertRow>(
        r#"
        SELECT jt.name, s.total_jobs, s.passed_jobs
        FROM hourly_job_type_stats s
        JOIN job_types jt ON jt.id = s.job_type_id
        WHERE s.period_start = $1
        "#,
    )
    .bind(period_start)
    .fetch_all(&state.db)
    .await?;

    let inputs: Vec<(String, i64, i64)> = rows
        .into_iter()
        .map(|r| (r.name, r.total_jobs, r.passed_jobs))
        .collect();
    let breaches = alerts::collect_breaches(&inputs, threshold)?;
    if breaches.is_empty() {
        return Ok(());
    }

    let message = alerts::format_breach_message(&breaches, threshold);
    match state.notifier.send_alert(&message).await {
        Ok(outcome) => info!(
            breaches = breaches.len(),
            sent = outcome.sent,
            "pass-rate alert evaluated"
        ),
        Err(err) => warn!(error = %err, "pass-rate alert delivery failed"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 29, h, mi, s).unwrap()
    }

    #[test]
    fn hourly_runs_land_at_the_offset_past_each_hour() {
        // 10:02 with a 5-minute offset waits 3 minutes.
        let delay = next_run_delay(at(10, 2, 0), 5, Resolution::Hourly);
        assert_eq!(delay, Duration::from_secs(3 * 60));

        // Already past this hour's slot: wait for the next hour's.
        let delay = next_run_delay(at(10, 30, 0), 5, Resolution::Hourly);
        assert_eq!(delay, Duration::from_secs(35 * 60));
    }

    #[test]
    fn exactly_at_the_slot_schedules_the_next_period() {
        let delay = next_run_delay(at(10, 5, 0), 5, Resolution::Hourly);
        assert_eq!(delay, Duration::from_secs(60 * 60));
    }

    #[test]
    fn daily_runs_land_at_the_offset_past_midnight() {
        let delay = next_run_delay(at(23, 45, 0), 15, Resolution::Daily);
        assert_eq!(delay, Duration::from_secs(30 * 60));

        let delay = next_run_delay(at(0, 10, 30), 15, Resolution::Daily);
        assert_eq!(delay, Duration::from_secs(4 * 60 + 30));
    }
}
