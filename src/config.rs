use anyhow::{Context, Result};

/// Runtime configuration, resolved from `CI_STATUS_*` environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub cors_origin: Option<String>,
    pub gitlab_api_base_url: String,
    pub gitlab_token: Option<String>,
    pub pipeline_poll_interval_seconds: u64,
    pub enable_stats_sweeps: bool,
    pub hourly_sweep_offset_minutes: u64,
    pub daily_sweep_offset_minutes: u64,
    pub hourly_job_lookback_hours: u32,
    pub hourly_pipeline_lookback_hours: u32,
    pub daily_lookback_days: u32,
    /// Pass-rate alert threshold in percent; 0 disables alert evaluation.
    pub alert_pass_rate_threshold: i64,
    pub matrix_alerts_enabled: bool,
    pub matrix_homeserver_url: Option<String>,
    pub matrix_room_id: Option<String>,
    pub matrix_access_token: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = env_optional_string("CI_STATUS_DATABASE_URL")
            .context("CI_STATUS_DATABASE_URL must be set")?;

        let cors_origin = env_optional_string("CI_STATUS_CORS_ORIGIN");
        let gitlab_api_base_url = env_string(
            "CI_STATUS_GITLAB_API_BASE_URL",
            "https://gitlab.com/api/v4",
        );
        let gitlab_token = env_optional_string("CI_STATUS_GITLAB_TOKEN");

        let pipeline_poll_interval_seconds =
            env_u64("CI_STATUS_PIPELINE_POLL_INTERVAL_SECONDS", 600).clamp(30, 24 * 3600);
        let enable_stats_sweeps = env_bool("CI_STATUS_ENABLE_STATS_SWEEPS", true);
        // The write path finalizes a bucket only once it is fully elapsed, so both
        // sweeps run a few minutes past the boundary they aggregate.
        let hourly_sweep_offset_minutes =
            env_u64("CI_STATUS_HOURLY_SWEEP_OFFSET_MINUTES", 5).clamp(1, 55);
        let daily_sweep_offset_minutes =
            env_u64("CI_STATUS_DAILY_SWEEP_OFFSET_MINUTES", 15).clamp(1, 12 * 60);
        let hourly_job_lookback_hours =
            env_u32("CI_STATUS_HOURLY_JOB_LOOKBACK_HOURS", 4).clamp(1, 168);
        let hourly_pipeline_lookback_hours =
            env_u32("CI_STATUS_HOURLY_PIPELINE_LOOKBACK_HOURS", 24).clamp(1, 168);
        let daily_lookback_days = env_u32("CI_STATUS_DAILY_LOOKBACK_DAYS", 1).clamp(1, 31);

        let alert_pass_rate_threshold =
            env_u64("CI_STATUS_ALERT_PASS_RATE_THRESHOLD", 0).min(100) as i64;
        let matrix_alerts_enabled = env_bool("CI_STATUS_MATRIX_ALERTS_ENABLED", false);
        let matrix_homeserver_url = env_optional_string("CI_STATUS_MATRIX_HOMESERVER_URL");
        let matrix_room_id = env_optional_string("CI_STATUS_MATRIX_ROOM_ID");
        let matrix_access_token = env_optional_string("CI_STATUS_MATRIX_ACCESS_TOKEN");

        Ok(Self {
            database_url,
            cors_origin,
            gitlab_api_base_url,
            gitlab_token,
            pipeline_poll_interval_seconds,
            enable_stats_sweeps,
            hourly_sweep_offset_minutes,
            daily_sweep_offset_minutes,
            hourly_job_lookback_hours,
            hourly_pipeline_lookback_hours,
            daily_lookback_days,
            alert_pass_rate_threshold,
            matrix_alerts_enabled,
            matrix_homeserver_url,
            matrix_room_id,
            matrix_access_token,
        })
    }
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_optional_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key)
        .ok()
        .map(|value| value.trim().to_lowercase())
    {
        Some(value) if value == "1" || value == "true" || value == "yes" => true,
        Some(value) if value == "0" || value == "false" || value == "no" => false,
        _ => default,
    }
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgresql://postgres@localhost/postgres".to_string(),
        cors_origin: None,
        gitlab_api_base_url: "https://gitlab.example.org/api/v4".to_string(),
        gitlab_token: None,
        pipeline_poll_interval_seconds: 600,
        enable_stats_sweeps: false,
        hourly_sweep_offset_minutes: 5,
        daily_sweep_offset_minutes: 15,
        hourly_job_lookback_hours: 4,
        hourly_pipeline_lookback_hours: 24,
        daily_lookback_days: 1,
        alert_pass_rate_threshold: 0,
        matrix_alerts_enabled: false,
        matrix_homeserver_url: None,
        matrix_room_id: None,
        matrix_access_token: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_bool_accepts_common_spellings() {
        assert!(env_bool("CI_STATUS_TEST_MISSING_BOOL", true));
        assert!(!env_bool("CI_STATUS_TEST_MISSING_BOOL", false));

        std::env::set_var("CI_STATUS_TEST_BOOL_YES", "Yes");
        std::env::set_var("CI_STATUS_TEST_BOOL_ZERO", "0");
        assert!(env_bool("CI_STATUS_TEST_BOOL_YES", false));
        assert!(!env_bool("CI_STATUS_TEST_BOOL_ZERO", true));
        std::env::remove_var("CI_STATUS_TEST_BOOL_YES");
        std::env::remove_var("CI_STATUS_TEST_BOOL_ZERO");
    }

    #[test]
    fn env_string_ignores_blank_values() {
        std::env::set_var("CI_STATUS_TEST_BLANK", "   ");
        assert_eq!(env_string("CI_STATUS_TEST_BLANK", "fallback"), "fallback");
        assert_eq!(env_optional_string("CI_STATUS_TEST_BLANK"), None);
        std::env::remove_var("CI_STATUS_TEST_BLANK");
    }
}
