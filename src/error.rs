use axum::http::StatusCode;
use std::fmt::Display;

use crate::stats::StatsError;

pub fn internal_error(err: impl Display) -> (StatusCode, String) {
    tracing::error!(error = %err, "internal error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

pub fn bad_request(message: impl Into<String>) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, message.into())
}

pub fn map_db_error(err: sqlx::Error) -> (StatusCode, String) {
    let status = match &err {
        sqlx::Error::RowNotFound => StatusCode::NOT_FOUND,
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("23505") => StatusCode::CONFLICT,    // unique_violation
            Some("23503") => StatusCode::BAD_REQUEST, // foreign_key_violation
            Some("23502") => StatusCode::BAD_REQUEST, // not_null_violation
            Some("22P02") => StatusCode::BAD_REQUEST, // invalid_text_representation
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    tracing::error!(error = %err, status = %status, "database error");

    let message = match status {
        StatusCode::NOT_FOUND => "Resource not found",
        StatusCode::CONFLICT => "Resource already exists",
        StatusCode::BAD_REQUEST => "Invalid request",
        _ => "Database error",
    };

    (status, message.to_string())
}

/// Validation failures surface to the caller as 400s; everything else from
/// the aggregation core is a store-side problem.
pub fn map_stats_error(err: StatsError) -> (StatusCode, String) {
    match err {
        StatsError::InvalidDuration(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        StatsError::Store(err) => map_db_error(err),
        StatsError::InvariantViolation { .. } => internal_error(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_duration_maps_to_bad_request() {
        let (status, message) = map_stats_error(StatsError::InvalidDuration("14d".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(message.contains("14d"));
    }

    #[test]
    fn row_not_found_maps_to_404() {
        let (status, _) = map_db_error(sqlx::Error::RowNotFound);
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
