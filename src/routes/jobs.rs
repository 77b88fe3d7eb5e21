use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::types::Json as SqlJson;

use crate::error::map_db_error;
use crate::state::AppState;

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    job_id: i64,
    pipeline_id: i64,
    project_id: i64,
    job_type_id: i64,
    name: String,
    stage: Option<String>,
    status: String,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    duration: Option<f64>,
    web_url: Option<String>,
    runner_info: Option<SqlJson<JsonValue>>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct JobResponse {
    id: i64,
    job_id: i64,
    pipeline_id: i64,
    project_id: i64,
    job_type_id: i64,
    name: String,
    stage: Option<String>,
    status: String,
    started_at: Option<String>,
    finished_at: Option<String>,
    duration: Option<f64>,
    web_url: Option<String>,
    runner_info: Option<JsonValue>,
}

impl From<JobRow> for JobResponse {
    fn from(row: JobRow) -> Self {
        Self {
            id: row.id,
            job_id: row.job_id,
            pipeline_id: row.pipeline_id,
            project_id: row.project_id,
            job_type_id: row.job_type_id,
            name: row.name,
            stage: row.stage,
            status: row.status,
            started_at: row.started_at.map(|ts| ts.to_rfc3339()),
            finished_at: row.finished_at.map(|ts| ts.to_rfc3339()),
            duration: row.duration,
            web_url: row.web_url,
            runner_info: row.runner_info.map(|value| value.0),
        }
    }
}

const JOB_COLUMNS: &str = r#"id, job_id, pipeline_id, project_id, job_type_id, name, stage,
       status, started_at, finished_at, duration, web_url, runner_info"#;

#[utoipa::path(
    get,
    path = "/api/jobs/{job_id}",
    tag = "jobs",
    params(("job_id" = i64, Path, description = "GitLab job id")),
    responses(
        (status = 200, description = "Job", body = JobResponse),
        (status = 404, description = "Job not found")
    )
)]
pub(crate) async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<i64>,
) -> Result<Json<JobResponse>, (StatusCode, String)> {
    let row: Option<JobRow> = sqlx::query_as(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM jobs
        WHERE job_id = $1
        "#
    ))
    .bind(job_id)
    .fetch_optional(&state.db)
    .await
    .map_err(map_db_error)?;

    let row = row.ok_or((StatusCode::NOT_FOUND, "Job not found".to_string()))?;
    Ok(Json(JobResponse::from(row)))
}

#[utoipa::path(
    get,
    path = "/api/jobs/pipeline/{pipeline_id}",
    tag = "jobs",
    params(("pipeline_id" = i64, Path, description = "GitLab pipeline id")),
    responses((status = 200, description = "Pipeline jobs", body = [JobResponse]))
)]
pub(crate) async fn list_pipeline_jobs(
    State(state): State<AppState>,
    Path(pipeline_id): Path<i64>,
) -> Result<Json<Vec<JobResponse>>, (StatusCode, String)> {
    let rows: Vec<JobRow> = sqlx::query_as(&format!(
        r#"
        SELECT {JOB_COLUMNS}
        FROM jobs
        WHERE pipeline_id = $1
        ORDER BY started_at ASC NULLS LAST, id ASC
        "#
    ))
    .bind(pipeline_id)
    .fetch_all(&state.db)
    .await
    .map_err(map_db_error)?;

    Ok(Json(rows.into_iter().map(JobResponse::from).collect()))
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs/{job_id}", get(get_job))
        .route("/jobs/pipeline/{pipeline_id}", get(list_pipeline_jobs))
}
