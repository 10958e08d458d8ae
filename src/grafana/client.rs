use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, error};

use crate::error::Error;

pub const ADMIN_USER: &str = "admin";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangePasswordRequest<'a> {
    old_password: &'a str,
    new_password: &'a str,
    confirm_new: &'a str,
}

/// Minimal client for Grafana's HTTP API.
#[derive(Debug, Clone)]
pub struct GrafanaClient {
    base_url: String,
    http: reqwest::Client,
}

impl GrafanaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Client for Grafana reached through a tunnel on `localhost:port`.
    pub fn for_local_port(port: u16) -> Self {
        Self::new(format!("http://127.0.0.1:{}", port))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Change the admin user's password, authenticating with the old one.
    pub async fn change_admin_password(&self, old_password: &str, new_password: &str) -> Result<()> {
        let url = format!("{}/api/user/password", self.base_url);
        let body = ChangePasswordRequest {
            old_password,
            new_password,
            confirm_new: new_password,
        };
        debug!("PUT {}", url);
        let res = self
            .http
            .put(&url)
            .basic_auth(ADMIN_USER, Some(old_password))
            .json(&body)
            .send()
            .await
            .context("Failed to send Grafana password change request")?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            error!("Grafana password change failed: {} - {}", status, body);
            return Err(Error::Grafana {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(())
    }
}
