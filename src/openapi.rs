use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "CI Status API",
        description = "Pipeline telemetry ingestion and time-bucketed CI statistics"
    ),
    paths(
        crate::routes::health::healthz_handler,
        crate::routes::stats::dashboard_stats,
        crate::routes::stats::pipeline_stats,
        crate::routes::stats::job_type_stats,
        crate::routes::pipelines::register_pipeline,
        crate::routes::pipelines::list_pipelines,
        crate::routes::pipelines::get_pipeline,
        crate::routes::pipelines::list_project_pipelines,
        crate::routes::pipelines::check_pipelines,
        crate::routes::jobs::get_job,
        crate::routes::jobs::list_pipeline_jobs,
        crate::routes::job_types::list_job_types,
        crate::routes::job_types::list_job_types_by_origin,
        crate::routes::job_types::get_job_type,
        crate::routes::job_types::update_job_type,
    ),
    components(schemas(
        crate::routes::health::HealthResponse,
        crate::stats::series::PipelineSeriesPoint,
        crate::stats::series::JobTypeSeriesPoint,
    ))
)]
pub struct ApiDoc;

pub fn openapi_json() -> serde_json::Value {
    let doc = ApiDoc::openapi();
    serde_json::to_value(&doc).unwrap_or_else(|_| serde_json::json!({}))
}

async fn serve_openapi() -> Json<serde_json::Value> {
    Json(openapi_json())
}

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(serve_openapi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_the_series_endpoints() {
        let doc = openapi_json();
        let paths = doc.get("paths").and_then(|value| value.as_object()).unwrap();
        assert!(paths.contains_key("/healthz"));
        assert!(paths.contains_key("/api/stats/pipelines"));
        assert!(paths.contains_key("/api/stats/job-types/{job_type_id}"));
        assert!(paths.contains_key("/api/pipelines/check"));
    }
}
