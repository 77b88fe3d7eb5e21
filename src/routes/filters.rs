//! Shared query-string parsing for the list endpoints.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};

pub(crate) const PIPELINE_STATUSES: [&str; 8] = [
    "created", "running", "success", "failed", "skipped", "manual", "canceled", "deleted",
];

pub(crate) const JOB_TYPE_ORIGINS: [&str; 2] = ["managed", "external"];

/// Comma-separated status filter, validated against the known set.
pub(crate) fn parse_status_filter(
    raw: Option<&str>,
) -> Result<Option<Vec<String>>, (StatusCode, String)> {
    let Some(raw) = raw else { return Ok(None) };
    let statuses: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.to_lowercase())
        .collect();
    if statuses.is_empty() {
        return Ok(None);
    }
    for status in &statuses {
        if !PIPELINE_STATUSES.contains(&status.as_str()) {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("unknown status '{status}'"),
            ));
        }
    }
    Ok(Some(statuses))
}

pub(crate) fn parse_rfc3339_optional(
    raw: Option<&str>,
    field: &str,
) -> Result<Option<DateTime<Utc>>, (StatusCode, String)> {
    let Some(raw) = raw else { return Ok(None) };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let parsed = DateTime::parse_from_rfc3339(trimmed)
        .map_err(|_| (StatusCode::BAD_REQUEST, format!("{field} must be RFC3339")))?;
    Ok(Some(parsed.with_timezone(&Utc)))
}

/// Sort column whitelist; anything else is rejected rather than
/// interpolated into SQL.
pub(crate) fn parse_sort(
    raw: Option<&str>,
) -> Result<(&'static str, &'static str), (StatusCode, String)> {
    let column = match raw.map(str::trim).filter(|value| !value.is_empty()) {
        None => return Ok(("created_at", "DESC")),
        Some(value) => value,
    };
    let (name, direction) = match column.strip_prefix('-') {
        Some(rest) => (rest, "DESC"),
        None => (column, "ASC"),
    };
    let column = match name {
        "created_at" => "created_at",
        "started_at" => "started_at",
        "finished_at" => "finished_at",
        "duration" => "duration",
        "pipeline_id" => "pipeline_id",
        "status" => "status",
        other => {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("cannot sort by '{other}'"),
            ))
        }
    };
    Ok((column, direction))
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    pub(crate) fn from_query(page: Option<u32>, limit: Option<u32>) -> Self {
        let page = page.unwrap_or(1).max(1) as i64;
        let limit = limit.unwrap_or(50).clamp(1, 250) as i64;
        Self { page, limit }
    }

    pub(crate) fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filter_splits_and_validates() {
        let parsed = parse_status_filter(Some("success, Failed")).unwrap().unwrap();
        assert_eq!(parsed, vec!["success", "failed"]);

        assert_eq!(parse_status_filter(None).unwrap(), None);
        assert_eq!(parse_status_filter(Some("  ,")).unwrap(), None);

        let err = parse_status_filter(Some("success,bogus")).unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn sort_rejects_unknown_columns() {
        assert_eq!(parse_sort(None).unwrap(), ("created_at", "DESC"));
        assert_eq!(parse_sort(Some("duration")).unwrap(), ("duration", "ASC"));
        assert_eq!(parse_sort(Some("-started_at")).unwrap(), ("started_at", "DESC"));
        assert!(parse_sort(Some("web_url; DROP TABLE pipelines")).is_err());
    }

    #[test]
    fn pagination_clamps_and_offsets() {
        let page = Pagination::from_query(Some(3), Some(20));
        assert_eq!(page.offset(), 40);

        let defaults = Pagination::from_query(None, None);
        assert_eq!(defaults.page, 1);
        assert_eq!(defaults.limit, 50);

        let clamped = Pagination::from_query(Some(0), Some(10_000));
        assert_eq!(clamped.page, 1);
        assert_eq!(clamped.limit, 250);
    }
}
