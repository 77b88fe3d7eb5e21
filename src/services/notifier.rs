//! Best-effort Matrix delivery for pass-rate alerts.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde_json::json;

use crate::config::AppConfig;

/// `ok` reports whether delivery is considered healthy; `sent` whether a
/// message actually went out. A disabled notifier is healthy but silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertOutcome {
    pub ok: bool,
    pub sent: bool,
}

pub struct MatrixNotifier {
    http: Client,
    target: Option<MatrixTarget>,
}

struct MatrixTarget {
    homeserver_url: String,
    room_id: String,
    access_token: String,
}

impl MatrixNotifier {
    /// Alerts stay disabled unless the flag is on and the homeserver, room
    /// and token are all configured.
    pub fn from_config(http: Client, config: &AppConfig) -> Self {
        let target = if config.matrix_alerts_enabled {
            match (
                &config.matrix_homeserver_url,
                &config.matrix_room_id,
                &config.matrix_access_token,
            ) {
                (Some(homeserver), Some(room), Some(token)) => Some(MatrixTarget {
                    homeserver_url: homeserver.trim_end_matches('/').to_string(),
                    room_id: room.clone(),
                    access_token: token.clone(),
                }),
                _ => {
                    tracing::warn!(
                        "Matrix alerts enabled but homeserver/room/token incomplete; disabling"
                    );
                    None
                }
            }
        } else {
            None
        };
        Self { http, target }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    pub async fn send_alert(&self, message: &str) -> Result<AlertOutcome> {
        let Some(target) = &self.target else {
            return Ok(AlertOutcome {
                ok: true,
                sent: false,
            });
        };

        let txn_id = format!("{}-{}", Utc::now().timestamp_millis(), rand::random::<u32>());
        let url = format!(
            "{}/_matrix/client/v3/rooms/{}/send/m.room.message/{txn_id}",
            target.homeserver_url, target.room_id
        );
        let response = self
            .http
            .put(&url)
            .bearer_auth(&target.access_token)
            .json(&json!({
                "msgtype": "m.notice",
                "body": message,
            }))
            .send()
            .await
            .context("Matrix send failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Matrix send rejected ({status}): {body}");
        }

        Ok(AlertOutcome {
            ok: true,
            sent: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_notifier_reports_healthy_without_sending() {
        let config = crate::config::test_config();
        let notifier = MatrixNotifier::from_config(Client::new(), &config);
        assert!(!notifier.is_enabled());
        let outcome = notifier.send_alert("test").await.unwrap();
        assert_eq!(
            outcome,
            AlertOutcome {
                ok: true,
                sent: false
            }
        );
    }

    #[test]
    fn incomplete_matrix_settings_disable_alerts() {
        let mut config = crate::config::test_config();
        config.matrix_alerts_enabled = true;
        config.matrix_homeserver_url = Some("https://matrix.example.org".to_string());
        // Room and token still missing.
        let notifier = MatrixNotifier::from_config(Client::new(), &config);
        assert!(!notifier.is_enabled());
    }

    #[test]
    fn complete_matrix_settings_enable_alerts() {
        let mut config = crate::config::test_config();
        config.matrix_alerts_enabled = true;
        config.matrix_homeserver_url = Some("https://matrix.example.org/".to_string());
        config.matrix_room_id = Some("!room:example.org".to_string());
        config.matrix_access_token = Some("secret".to_string());
        let notifier = MatrixNotifier::from_config(Client::new(), &config);
        assert!(notifier.is_enabled());
    }
}
