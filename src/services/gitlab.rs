//! Thin GitLab REST client used by the pipeline poller.

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value as JsonValue;

/// Pipeline statuses GitLab will not change again. `canceled`, `skipped`
/// and `manual` are terminal for polling purposes even though stats only
/// count `success` and `failed`.
pub const TERMINAL_PIPELINE_STATUSES: [&str; 5] =
    ["success", "failed", "canceled", "skipped", "manual"];

pub fn is_terminal_status(status: &str) -> bool {
    TERMINAL_PIPELINE_STATUSES.contains(&status)
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRef {
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineDetails {
    pub id: i64,
    pub status: String,
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub sha: Option<String>,
    pub source: Option<String>,
    pub user: Option<UserRef>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub duration: Option<f64>,
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobDetails {
    pub id: i64,
    pub name: String,
    pub stage: Option<String>,
    pub status: String,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
    pub duration: Option<f64>,
    pub web_url: Option<String>,
    pub runner: Option<JsonValue>,
}

pub struct GitLabClient {
    http: Client,
    base_url: String,
    token: Option<String>,
}

impl GitLabClient {
    pub fn new(http: Client, base_url: String, token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// `Ok(None)` on 404 so the caller can distinguish "pipeline deleted
    /// upstream" from transport failures.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.http.get(&url);
        if let Some(token) = &self.token {
            request = request.header("PRIVATE-TOKEN", token);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("GitLab request failed: {url}"))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .with_context(|| format!("GitLab returned an error for {url}"))?;
        let body = response
            .json::<T>()
            .await
            .with_context(|| format!("GitLab response decode failed: {url}"))?;
        Ok(Some(body))
    }

    pub async fn fetch_pipeline(
        &self,
        project_id: i64,
        pipeline_id: i64,
    ) -> Result<Option<PipelineDetails>> {
        self.get_json(&format!("/projects/{project_id}/pipelines/{pipeline_id}"))
            .await
    }

    pub async fn fetch_pipeline_jobs(
        &self,
        project_id: i64,
        pipeline_id: i64,
    ) -> Result<Option<Vec<JobDetails>>> {
        self.get_json(&format!(
            "/projects/{project_id}/pipelines/{pipeline_id}/jobs?per_page=100"
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_cover_the_non_counting_outcomes() {
        for status in ["success", "failed", "canceled", "skipped", "manual"] {
            assert!(is_terminal_status(status), "{status}");
        }
        for status in ["created", "running", "pending", "deleted"] {
            assert!(!is_terminal_status(status), "{status}");
        }
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = GitLabClient::new(
            Client::new(),
            "https://gitlab.example.org/api/v4/".to_string(),
            None,
        );
        assert_eq!(client.base_url, "https://gitlab.example.org/api/v4");
    }

    #[test]
    fn pipeline_details_decode_gitlab_shape() {
        let details: PipelineDetails = serde_json::from_value(serde_json::json!({
            "id": 901,
            "status": "success",
            "ref": "debian/master",
            "sha": "abc123",
            "source": "push",
            "user": {"username": "maintainer"},
            "created_at": "2026-08-29T10:00:00Z",
            "started_at": "2026-08-29T10:01:00Z",
            "finished_at": "2026-08-29T10:05:00Z",
            "duration": 240.0,
            "web_url": "https://gitlab.example.org/p/-/pipelines/901"
        }))
        .unwrap();
        assert_eq!(details.git_ref.as_deref(), Some("debian/master"));
        assert_eq!(details.user.unwrap().username.as_deref(), Some("maintainer"));
    }
}
