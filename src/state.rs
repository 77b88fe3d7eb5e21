use crate::config::AppConfig;
use crate::services::gitlab::GitLabClient;
use crate::services::notifier::MatrixNotifier;
use axum::extract::FromRef;
use reqwest::Client;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: PgPool,
    pub http: Client,
    pub gitlab: Arc<GitLabClient>,
    pub notifier: Arc<MatrixNotifier>,
}

impl FromRef<AppState> for PgPool {
    fn from_ref(state: &AppState) -> PgPool {
        state.db.clone()
    }
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    let config = crate::config::test_config();
    let db = crate::db::connect_lazy(&config.database_url).expect("connect_lazy");
    let http = Client::new();
    let gitlab = Arc::new(GitLabClient::new(
        http.clone(),
        config.gitlab_api_base_url.clone(),
        config.gitlab_token.clone(),
    ));
    let notifier = Arc::new(MatrixNotifier::from_config(http.clone(), &config));
    AppState {
        config,
        db,
        http,
        gitlab,
        notifier,
    }
}
