use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};

use crate::error::map_db_error;
use crate::routes::filters::{
    parse_rfc3339_optional, parse_sort, parse_status_filter, Pagination,
};
use crate::services::pipeline_poller::check_pending_pipelines;
use crate::state::AppState;

#[derive(sqlx::FromRow)]
pub(crate) struct PipelineRow {
    id: i64,
    pipeline_id: i64,
    project_id: i64,
    status: String,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    duration: Option<f64>,
    web_url: Option<String>,
    #[sqlx(rename = "ref")]
    git_ref: Option<String>,
    sha: Option<String>,
    user_id: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct PipelineResponse {
    id: i64,
    pipeline_id: i64,
    project_id: i64,
    status: String,
    created_at: String,
    started_at: Option<String>,
    finished_at: Option<String>,
    duration: Option<f64>,
    web_url: Option<String>,
    #[serde(rename = "ref")]
    git_ref: Option<String>,
    sha: Option<String>,
    user_id: Option<String>,
}

impl From<PipelineRow> for PipelineResponse {
    fn from(row: PipelineRow) -> Self {
        Self {
            id: row.id,
            pipeline_id: row.pipeline_id,
            project_id: row.project_id,
            status: row.status,
            created_at: row.created_at.to_rfc3339(),
            started_at: row.started_at.map(|ts| ts.to_rfc3339()),
            finished_at: row.finished_at.map(|ts| ts.to_rfc3339()),
            duration: row.duration,
            web_url: row.web_url,
            git_ref: row.git_ref,
            sha: row.sha,
            user_id: row.user_id,
        }
    }
}

const PIPELINE_COLUMNS: &str = r#"id, pipeline_id, project_id, status, created_at,
       started_at, finished_at, duration, web_url, "ref", sha, user_id"#;

#[derive(Debug, Clone, serde::Deserialize, utoipa::ToSchema)]
pub(crate) struct PipelineRegisterRequest {
    /// GitLab pipeline id.
    id: i64,
    project_id: i64,
    created_at: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize, utoipa::IntoParams)]
pub(crate) struct PipelinesQuery {
    /// Comma-separated status filter.
    status: Option<String>,
    from: Option<String>,
    to: Option<String>,
    /// Column name, `-` prefix for descending.
    sort: Option<String>,
    #[param(minimum = 1)]
    page: Option<u32>,
    #[param(minimum = 1, maximum = 250)]
    limit: Option<u32>,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct PipelinesListResponse {
    items: Vec<PipelineResponse>,
    total: i64,
    page: i64,
    limit: i64,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct PipelineCheckResponse {
    checked: u64,
    updated: u64,
    deleted: u64,
}

#[utoipa::path(
    post,
    path = "/api/pipelines",
    tag = "pipelines",
    request_body = PipelineRegisterRequest,
    responses(
        (status = 201, description = "Pipeline registered", body = PipelineResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Pipeline already registered")
    )
)]
pub(crate) async fn register_pipeline(
    State(state): State<AppState>,
    Json(payload): Json<PipelineRegisterRequest>,
) -> Result<(StatusCode, Json<PipelineResponse>), (StatusCode, String)> {
    if payload.id <= 0 || payload.project_id <= 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "id and project_id must be positive".to_string(),
        ));
    }
    let created_at = parse_rfc3339_optional(payload.created_at.as_deref(), "created_at")?
        .unwrap_or_else(Utc::now);

    // Registration stores only the identity; the poller fills in the rest
    // once GitLab reports a terminal status. Duplicate ids hit the unique
    // index and surface as 409 through map_db_error.
    let row: PipelineRow = sqlx::query_as(&format!(
        r#"
        INSERT INTO pipelines (pipeline_id, project_id, status, created_at)
        VALUES ($1, $2, 'created', $3)
        RETURNING {PIPELINE_COLUMNS}
        "#
    ))
    .bind(payload.id)
    .bind(payload.project_id)
    .bind(created_at)
    .fetch_one(&state.db)
    .await
    .map_err(map_db_error)?;

    Ok((StatusCode::CREATED, Json(PipelineResponse::from(row))))
}

#[utoipa::path(
    get,
    path = "/api/pipelines",
    tag = "pipelines",
    params(PipelinesQuery),
    responses(
        (status = 200, description = "Pipelines", body = PipelinesListResponse),
        (status = 400, description = "Invalid filter")
    )
)]
pub(crate) async fn list_pipelines(
    State(state): State<AppState>,
    Query(query): Query<PipelinesQuery>,
) -> Result<Json<PipelinesListResponse>, (StatusCode, String)> {
    let statuses = parse_status_filter(query.status.as_deref())?;
    let from = parse_rfc3339_optional(query.from.as_deref(), "from")?;
    let to = parse_rfc3339_optional(query.to.as_deref(), "to")?;
    let (sort_column, sort_direction) = parse_sort(query.sort.as_deref())?;
    let page = Pagination::from_query(query.page, query.limit);

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM pipelines
        WHERE ($1::text[] IS NULL OR status = ANY($1))
          AND ($2::timestamptz IS NULL OR created_at >= $2)
          AND ($3::timestamptz IS NULL OR created_at <= $3)
        "#,
    )
    .bind(&statuses)
    .bind(from)
    .bind(to)
    .fetch_one(&state.db)
    .await
    .map_err(map_db_error)?;

    // sort_column/sort_direction come from the whitelist in parse_sort.
    let rows: Vec<PipelineRow> = sqlx::query_as(&format!(
        r#"
        SELECT {PIPELINE_COLUMNS}
        FROM pipelines
        WHERE ($1::text[] IS NULL OR status = ANY($1))
          AND ($2::timestamptz IS NULL OR created_at >= $2)
          AND ($3::timestamptz IS NULL OR created_at <= $3)
        ORDER BY {sort_column} {sort_direction}, id DESC
        LIMIT $4 OFFSET $5
        "#
    ))
    .bind(&statuses)
    .bind(from)
    .bind(to)
    .bind(page.limit)
    .bind(page.offset())
    .fetch_all(&state.db)
    .await
    .map_err(map_db_error)?;

    Ok(Json(PipelinesListResponse {
        items: rows.into_iter().map(PipelineResponse::from).collect(),
        total,
        page: page.page,
        limit: page.limit,
    }))
}

#[utoipa::path(
    get,
    path = "/api/pipelines/{pipeline_id}",
    tag = "pipelines",
    params(("pipeline_id" = i64, Path, description = "GitLab pipeline id")),
    responses(
        (status = 200, description = "Pipeline", body = PipelineResponse),
        (status = 404, description = "Pipeline not found")
    )
)]
pub(crate) async fn get_pipeline(
    State(state): State<AppState>,
    Path(pipeline_id): Path<i64>,
) -> Result<Json<PipelineResponse>, (StatusCode, String)> {
    let row: Option<PipelineRow> = sqlx::query_as(&format!(
        r#"
        SELECT {PIPELINE_COLUMNS}
        FROM pipelines
        WHERE pipeline_id = $1
        "#
    ))
    .bind(pipeline_id)
    .fetch_optional(&state.db)
    .await
    .map_err(map_db_error)?;

    let row = row.ok_or((StatusCode::NOT_FOUND, "Pipeline not found".to_string()))?;
    Ok(Json(PipelineResponse::from(row)))
}

#[utoipa::path(
    get,
    path = "/api/pipelines/project/{project_id}",
    tag = "pipelines",
    params(("project_id" = i64, Path, description = "GitLab project id")),
    responses((status = 200, description = "Project pipelines", body = [PipelineResponse]))
)]
pub(crate) async fn list_project_pipelines(
    State(state): State<AppState>,
    Path(project_id): Path<i64>,
) -> Result<Json<Vec<PipelineResponse>>, (StatusCode, String)> {
    let rows: Vec<PipelineRow> = sqlx::query_as(&format!(
        r#"
        SELECT {PIPELINE_COLUMNS}
        FROM pipelines
        WHERE project_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT 250
        "#
    ))
    .bind(project_id)
    .fetch_all(&state.db)
    .await
    .map_err(map_db_error)?;

    Ok(Json(rows.into_iter().map(PipelineResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/api/pipelines/check",
    tag = "pipelines",
    responses((status = 200, description = "Poll summary", body = PipelineCheckResponse))
)]
pub(crate) async fn check_pipelines(
    State(state): State<AppState>,
) -> Result<Json<PipelineCheckResponse>, (StatusCode, String)> {
    let summary = check_pending_pipelines(&state)
        .await
        .map_err(crate::error::internal_error)?;
    Ok(Json(PipelineCheckResponse {
        checked: summary.checked,
        updated: summary.updated,
        deleted: summary.deleted,
    }))
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/pipelines", get(list_pipelines).post(register_pipeline))
        .route("/pipelines/check", post(check_pipelines))
        .route("/pipelines/{pipeline_id}", get(get_pipeline))
        .route("/pipelines/project/{project_id}", get(list_project_pipelines))
}
