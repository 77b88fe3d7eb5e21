use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::error::{map_db_error, map_stats_error};
use crate::state::AppState;
use crate::stats::alerts::pass_rate;
use crate::stats::series::{
    job_type_series, pipeline_series, JobTypeSeriesPoint, PipelineSeriesPoint,
};

const DEFAULT_DURATION: &str = "7d";

#[derive(Debug, Clone, serde::Deserialize, utoipa::IntoParams)]
pub(crate) struct SeriesQuery {
    /// One of 24h, 7d, 30d, 6m, 1y.
    duration: Option<String>,
}

#[derive(sqlx::FromRow)]
struct DashboardRow {
    job_types: i64,
    managed_job_types: i64,
    jobs: i64,
    pipelines: i64,
    completed_pipelines: i64,
    passed_pipelines: i64,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct DashboardStatsResponse {
    job_types: i64,
    managed_job_types: i64,
    jobs: i64,
    pipelines: i64,
    completed_pipelines: i64,
    /// Whole-percent rate over completed pipelines; null before any
    /// pipeline has finished.
    success_rate: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/stats/dashboard",
    tag = "stats",
    responses((status = 200, description = "Dashboard totals", body = DashboardStatsResponse))
)]
pub(crate) async fn dashboard_stats(
    State(state): State<AppState>,
) -> Result<Json<DashboardStatsResponse>, (StatusCode, String)> {
    let row: DashboardRow = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM job_types) AS job_types,
            (SELECT COUNT(*) FROM job_types WHERE origin = 'managed') AS managed_job_types,
            (SELECT COUNT(*) FROM jobs) AS jobs,
            (SELECT COUNT(*) FROM pipelines) AS pipelines,
            (SELECT COUNT(*) FROM pipelines WHERE status IN ('success', 'failed')) AS completed_pipelines,
            (SELECT COUNT(*) FROM pipelines WHERE status = 'success') AS passed_pipelines
        "#,
    )
    .fetch_one(&state.db)
    .await
    .map_err(map_db_error)?;

    Ok(Json(DashboardStatsResponse {
        job_types: row.job_types,
        managed_job_types: row.managed_job_types,
        jobs: row.jobs,
        pipelines: row.pipelines,
        completed_pipelines: row.completed_pipelines,
        success_rate: pass_rate(row.completed_pipelines, row.passed_pipelines),
    }))
}

#[utoipa::path(
    get,
    path = "/api/stats/pipelines",
    tag = "stats",
    params(SeriesQuery),
    responses(
        (status = 200, description = "Dense pipeline series", body = [PipelineSeriesPoint]),
        (status = 400, description = "Unknown duration")
    )
)]
pub(crate) async fn pipeline_stats(
    State(state): State<AppState>,
    Query(query): Query<SeriesQuery>,
) -> Result<Json<Vec<PipelineSeriesPoint>>, (StatusCode, String)> {
    let duration = query.duration.as_deref().unwrap_or(DEFAULT_DURATION);
    let points = pipeline_series(&state.db, duration, Utc::now())
        .await
        .map_err(map_stats_error)?;
    Ok(Json(points))
}

#[utoipa::path(
    get,
    path = "/api/stats/job-types/{job_type_id}",
    tag = "stats",
    params(
        ("job_type_id" = i64, Path, description = "Job type id"),
        SeriesQuery
    ),
    responses(
        (status = 200, description = "Dense job-type series", body = [JobTypeSeriesPoint]),
        (status = 400, description = "Unknown duration")
    )
)]
pub(crate) async fn job_type_stats(
    State(state): State<AppState>,
    Path(job_type_id): Path<i64>,
    Query(query): Query<SeriesQuery>,
) -> Result<Json<Vec<JobTypeSeriesPoint>>, (StatusCode, String)> {
    let duration = query.duration.as_deref().unwrap_or(DEFAULT_DURATION);
    let points = job_type_series(&state.db, job_type_id, duration, Utc::now())
        .await
        .map_err(map_stats_error)?;
    Ok(Json(points))
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/stats/dashboard", get(dashboard_stats))
        .route("/stats/pipelines", get(pipeline_stats))
        .route("/stats/job-types/{job_type_id}", get(job_type_stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .nest("/api", router())
            .with_state(crate::state::test_state())
    }

    #[tokio::test]
    async fn unknown_duration_is_rejected_before_touching_the_store() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .uri("/api/stats/pipelines?duration=14d")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn job_type_series_validates_duration_too() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .uri("/api/stats/job-types/3?duration=yesterday")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
