use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use crate::error::map_db_error;
use crate::routes::filters::JOB_TYPE_ORIGINS;
use crate::state::AppState;

#[derive(sqlx::FromRow)]
struct JobTypeRow {
    id: i64,
    name: String,
    origin: String,
    stage: Option<String>,
    description: Option<String>,
    is_critical: bool,
}

#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub(crate) struct JobTypeResponse {
    id: i64,
    name: String,
    origin: String,
    stage: Option<String>,
    description: Option<String>,
    is_critical: bool,
}

impl From<JobTypeRow> for JobTypeResponse {
    fn from(row: JobTypeRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            origin: row.origin,
            stage: row.stage,
            description: row.description,
            is_critical: row.is_critical,
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize, utoipa::ToSchema)]
pub(crate) struct JobTypeUpdateRequest {
    origin: Option<String>,
    stage: Option<String>,
    description: Option<String>,
    is_critical: Option<bool>,
}

const JOB_TYPE_COLUMNS: &str = "id, name, origin, stage, description, is_critical";

#[utoipa::path(
    get,
    path = "/api/job-types",
    tag = "job-types",
    responses((status = 200, description = "Job types", body = [JobTypeResponse]))
)]
pub(crate) async fn list_job_types(
    State(state): State<AppState>,
) -> Result<Json<Vec<JobTypeResponse>>, (StatusCode, String)> {
    let rows: Vec<JobTypeRow> = sqlx::query_as(&format!(
        r#"
        SELECT {JOB_TYPE_COLUMNS}
        FROM job_types
        ORDER BY name ASC
        "#
    ))
    .fetch_all(&state.db)
    .await
    .map_err(map_db_error)?;

    Ok(Json(rows.into_iter().map(JobTypeResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/job-types/origin/{origin}",
    tag = "job-types",
    params(("origin" = String, Path, description = "managed or external")),
    responses(
        (status = 200, description = "Job types", body = [JobTypeResponse]),
        (status = 400, description = "Unknown origin")
    )
)]
pub(crate) async fn list_job_types_by_origin(
    State(state): State<AppState>,
    Path(origin): Path<String>,
) -> Result<Json<Vec<JobTypeResponse>>, (StatusCode, String)> {
    let origin = origin.trim().to_lowercase();
    if !JOB_TYPE_ORIGINS.contains(&origin.as_str()) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("unknown origin '{origin}'"),
        ));
    }

    let rows: Vec<JobTypeRow> = sqlx::query_as(&format!(
        r#"
        SELECT {JOB_TYPE_COLUMNS}
        FROM job_types
        WHERE origin = $1
        ORDER BY name ASC
        "#
    ))
    .bind(origin)
    .fetch_all(&state.db)
    .await
    .map_err(map_db_error)?;

    Ok(Json(rows.into_iter().map(JobTypeResponse::from).collect()))
}

#[utoipa::path(
    get,
    path = "/api/job-types/{name}",
    tag = "job-types",
    params(("name" = String, Path, description = "Job type name")),
    responses(
        (status = 200, description = "Job type", body = JobTypeResponse),
        (status = 404, description = "Job type not found")
    )
)]
pub(crate) async fn get_job_type(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<JobTypeResponse>, (StatusCode, String)> {
    let row: Option<JobTypeRow> = sqlx::query_as(&format!(
        r#"
        SELECT {JOB_TYPE_COLUMNS}
        FROM job_types
        WHERE name = $1
        "#
    ))
    .bind(name.trim())
    .fetch_optional(&state.db)
    .await
    .map_err(map_db_error)?;

    let row = row.ok_or((StatusCode::NOT_FOUND, "Job type not found".to_string()))?;
    Ok(Json(JobTypeResponse::from(row)))
}

#[utoipa::path(
    patch,
    path = "/api/job-types/{name}",
    tag = "job-types",
    params(("name" = String, Path, description = "Job type name")),
    request_body = JobTypeUpdateRequest,
    responses(
        (status = 200, description = "Updated job type", body = JobTypeResponse),
        (status = 400, description = "Invalid request"),
        (status = 404, description = "Job type not found")
    )
)]
pub(crate) async fn update_job_type(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(payload): Json<JobTypeUpdateRequest>,
) -> Result<Json<JobTypeResponse>, (StatusCode, String)> {
    let origin = payload
        .origin
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_lowercase);
    if let Some(origin) = &origin {
        if !JOB_TYPE_ORIGINS.contains(&origin.as_str()) {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("unknown origin '{origin}'"),
            ));
        }
    }

    let row: Option<JobTypeRow> = sqlx::query_as(&format!(
        r#"
        UPDATE job_types SET
            origin = COALESCE($2, origin),
            stage = COALESCE($3, stage),
            description = COALESCE($4, description),
            is_critical = COALESCE($5, is_critical)
        WHERE name = $1
        RETURNING {JOB_TYPE_COLUMNS}
        "#
    ))
    .bind(name.trim())
    .bind(origin)
    .bind(payload.stage)
    .bind(payload.description)
    .bind(payload.is_critical)
    .fetch_optional(&state.db)
    .await
    .map_err(map_db_error)?;

    let row = row.ok_or((StatusCode::NOT_FOUND, "Job type not found".to_string()))?;
    Ok(Json(JobTypeResponse::from(row)))
}

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/job-types", get(list_job_types))
        .route("/job-types/origin/{origin}", get(list_job_types_by_origin))
        .route(
            "/job-types/{name}",
            get(get_job_type).patch(update_job_type),
        )
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
    async fn unknown_origin_is_rejected() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .uri("/api/job-types/origin/upstream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn patch_rejects_unknown_origin() {
        let resp = app()
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/api/job-types/build")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"origin": "upstream"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
