//! Background reconciliation of registered pipelines against GitLab.
//!
//! Registration only stores the pipeline id; this poller revisits every
//! pipeline still in `created`, and once GitLab reports a terminal status
//! it fills in the outcome and syncs the pipeline's jobs. Pipelines GitLab
//! no longer knows about are marked `deleted` so they stop being polled.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::types::Json as SqlJson;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::services::gitlab::{is_terminal_status, JobDetails, PipelineDetails};
use crate::state::AppState;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub checked: u64,
    pub updated: u64,
    pub deleted: u64,
}

#[derive(sqlx::FromRow)]
struct PendingPipeline {
    pipeline_id: i64,
    project_id: i64,
}

pub struct PipelinePollerService {
    state: AppState,
    interval: Duration,
}

impl PipelinePollerService {
    pub fn new(state: AppState, interval: Duration) -> Self {
        Self { state, interval }
    }

    pub fn start(self, cancel: CancellationToken) {
        let state = self.state.clone();
        let interval = self.interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match check_pending_pipelines(&state).await {
                            Ok(summary) if summary.checked > 0 => {
                                info!(
                                    checked = summary.checked,
                                    updated = summary.updated,
                                    deleted = summary.deleted,
                                    "pipeline poll finished"
                                );
                            }
                            Ok(_) => {}
                            Err(err) => warn!("pipeline poll failed: {err:#}"),
                        }
                    }
                }
            }
        });
    }
}

/// One poll pass over everything still in `created`. A failure against one
/// pipeline is logged and skipped; the rest of the batch still runs.
pub async fn check_pending_pipelines(state: &AppState) -> Result<PollSummary> {
    let pending: Vec<PendingPipeline> = sqlx::query_as(
        r#"
        SELECT pipeline_id, project_id
        FROM pipelines
        WHERE status = 'created'
        ORDER BY pipeline_id
        "#,
    )
    .fetch_all(&state.db)
    .await
    .context("failed to load pending pipelines")?;

    let mut summary = PollSummary::default();
    for pipeline in pending {
        summary.checked += 1;
        match reconcile_pipeline(state, &pipeline).await {
            Ok(Reconciliation::Updated) => summary.updated += 1,
            Ok(Reconciliation::Deleted) => summary.deleted += 1,
            Ok(Reconciliation::StillPending) => {}
            Err(err) => {
                warn!(
                    pipeline_id = pipeline.pipeline_id,
                    "pipeline reconcile failed: {err:#}"
                );
            }
        }
    }
    Ok(summary)
}

enum Reconciliation {
    Updated,
    Deleted,
    StillPending,
}

async fn reconcile_pipeline(
    state: &AppState,
    pending: &PendingPipeline,
) -> Result<Reconciliation> {
    let details = state
        .gitlab
        .fetch_pipeline(pending.project_id, pending.pipeline_id)
        .await?;

    let Some(details) = details else {
        mark_pipeline_deleted(state, pending.pipeline_id).await?;
        return Ok(Reconciliation::Deleted);
    };

    if !is_terminal_status(&details.status) {
        return Ok(Reconciliation::StillPending);
    }

    update_pipeline(state, pending.pipeline_id, &details).await?;
    sync_pipeline_jobs(state, pending).await?;
    Ok(Reconciliation::Updated)
}

async fn mark_pipeline_deleted(state: &AppState, pipeline_id: i64) -> Result<()> {
    sqlx::query("UPDATE pipelines SET status = 'deleted' WHERE pipeline_id = $1")
        .bind(pipeline_id)
        .execute(&state.db)
        .await
        .context("failed to mark pipeline deleted")?;
    Ok(())
}

async fn update_pipeline(
    state: &AppState,
    pipeline_id: i64,
    details: &PipelineDetails,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE pipelines SET
            status = $2,
            started_at = $3,
            finished_at = $4,
            duration = $5,
            web_url = COALESCE($6, web_url),
            "ref" = COALESCE($7, "ref"),
            sha = COALESCE($8, sha),
            user_id = COALESCE($9, user_id)
        WHERE pipeline_id = $1
        "#,
    )
    .bind(pipeline_id)
    .bind(&details.status)
    .bind(details.started_at)
    .bind(details.finished_at)
    .bind(details.duration)
    .bind(&details.web_url)
    .bind(&details.git_ref)
    .bind(&details.sha)
    .bind(details.user.as_ref().and_then(|u| u.username.clone()))
    .execute(&state.db)
    .await
    .context("failed to update pipeline")?;
    Ok(())
}

async fn sync_pipeline_jobs(state: &AppState, pending: &PendingPipeline) -> Result<()> {
    let jobs = state
        .gitlab
        .fetch_pipeline_jobs(pending.project_id, pending.pipeline_id)
        .await?
        .unwrap_or_default();

    for job in jobs {
        let job_type_id = get_or_create_job_type(state, &job.name, job.stage.as_deref()).await?;
        upsert_job(state, pending, job_type_id, &job).await?;
    }
    Ok(())
}

/// Job types discovered through ingestion default to `external`; only
/// curated types are promoted to `managed` (and thereby counted in the
/// job-type stats). The stage is backfilled when GitLab supplies one.
async fn get_or_create_job_type(
    state: &AppState,
    name: &str,
    stage: Option<&str>,
) -> Result<i64> {
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO job_types (name, origin, stage)
        VALUES ($1, 'external', $2)
        ON CONFLICT (name)
        DO UPDATE SET stage = COALESCE(EXCLUDED.stage, job_types.stage)
        RETURNING id
        "#,
    )
    .bind(name)
    .bind(stage)
    .fetch_one(&state.db)
    .await
    .with_context(|| format!("failed to upsert job type '{name}'"))?;
    Ok(id)
}

async fn upsert_job(
    state: &AppState,
    pending: &PendingPipeline,
    job_type_id: i64,
    job: &JobDetails,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO jobs
            (job_id, pipeline_id, project_id, job_type_id, name, stage,
             status, started_at, finished_at, duration, web_url, runner_info)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (job_id) DO UPDATE SET
            job_type_id = EXCLUDED.job_type_id,
            status = EXCLUDED.status,
            started_at = EXCLUDED.started_at,
            finished_at = EXCLUDED.finished_at,
            duration = EXCLUDED.duration,
            web_url = EXCLUDED.web_url,
            runner_info = EXCLUDED.runner_info
        "#,
    )
    .bind(job.id)
    .bind(pending.pipeline_id)
    .bind(pending.project_id)
    .bind(job_type_id)
    .bind(&job.name)
    .bind(&job.stage)
    .bind(&job.status)
    .bind(job.started_at)
    .bind(job.finished_at)
    .bind(job.duration)
    .bind(&job.web_url)
    .bind(job.runner.as_ref().map(|r| SqlJson(r.clone())))
    .execute(&state.db)
    .await
    .with_context(|| format!("failed to upsert job {}", job.id))?;
    Ok(())
}
