pub mod client;

use anyhow::Result;
use std::future::Future;
use tracing::info;

use crate::error::Error;
use crate::kubernetes::{PodLocator, SecretStore};
use crate::portforward::{PortForward, PortForwarder};
use crate::types::{PodSelector, Release, FORWARD_PORT_GRAFANA, LISTEN_PORT_GRAFANA};

pub use client::GrafanaClient;

/// Key of the Grafana secret holding the admin password.
pub const ADMIN_PASSWORD_KEY: &str = "admin-password";

/// Grafana operations for one release.
pub struct GrafanaManager<'a> {
    release: &'a Release,
    pods: &'a dyn PodLocator,
    forwarder: &'a dyn PortForwarder,
    secrets: &'a dyn SecretStore,
}

impl<'a> GrafanaManager<'a> {
    pub fn new(
        release: &'a Release,
        pods: &'a dyn PodLocator,
        forwarder: &'a dyn PortForwarder,
        secrets: &'a dyn SecretStore,
    ) -> Self {
        Self {
            release,
            pods,
            forwarder,
            secrets,
        }
    }

    async fn tunnel(&self, local_port: u16) -> Result<PortForward> {
        let namespace = &self.release.namespace;
        let pod = self
            .pods
            .find_pod(namespace, &PodSelector::grafana(self.release))
            .await?;
        self.forwarder
            .forward(namespace, &pod, local_port, FORWARD_PORT_GRAFANA)
            .await
    }

    /// Keep a tunnel to Grafana open until `shutdown` resolves. A tunnel
    /// that dies on its own is an error.
    pub async fn port_forward<S>(&self, local_port: u16, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let mut tunnel = self.tunnel(local_port).await?;
        println!("Grafana is available at http://localhost:{}", tunnel.local_port());

        // A Ctrl-C that also reached kubectl still counts as a shutdown.
        let exited = tokio::select! {
            biased;
            _ = shutdown => None,
            status = tunnel.wait() => Some(status),
        };
        match exited {
            None => {
                info!("Shutdown signal received, stopping port-forward");
                tunnel.close().await
            }
            Some(status) => Err(Error::PortForward {
                target: tunnel.target().to_string(),
                message: format!("kubectl exited ({})", status?),
            }
            .into()),
        }
    }

    /// The admin password stored in the release's Grafana secret.
    pub async fn get_initial_password(&self) -> Result<String> {
        self.secrets
            .get_secret_value(
                &self.release.namespace,
                &self.release.grafana_secret(),
                ADMIN_PASSWORD_KEY,
            )
            .await
    }

    /// Change the admin password in Grafana, then record it in the secret.
    pub async fn change_password(&self, new_password: &str) -> Result<()> {
        if new_password.is_empty() {
            return Err(Error::EmptyArgument { what: "password" }.into());
        }
        let namespace = &self.release.namespace;
        let secret = self.release.grafana_secret();
        let old_password = self
            .secrets
            .get_secret_value(namespace, &secret, ADMIN_PASSWORD_KEY)
            .await?;

        let tunnel = self.tunnel(LISTEN_PORT_GRAFANA).await?;
        let client = GrafanaClient::for_local_port(tunnel.local_port());
        client
            .change_admin_password(&old_password, new_password)
            .await?;
        info!("Grafana admin password changed, updating secret {}", secret);

        self.secrets
            .set_secret_value(namespace, &secret, ADMIN_PASSWORD_KEY, new_password)
            .await?;
        tunnel.close().await
    }
}
