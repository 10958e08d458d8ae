use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::{
    api::{ListParams, Patch, PatchParams},
    Api, Client,
};
use tracing::debug;

use crate::error::Error;
use crate::types::PodSelector;

/// Resolves a pod name from a label selector.
#[async_trait]
pub trait PodLocator: Send + Sync {
    async fn find_pod(&self, namespace: &str, selector: &PodSelector) -> Result<String>;
}

/// Reads and writes single keys of Kubernetes secrets.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret_value(&self, namespace: &str, secret: &str, key: &str) -> Result<String>;

    async fn set_secret_value(
        &self,
        namespace: &str,
        secret: &str,
        key: &str,
        value: &str,
    ) -> Result<()>;
}

pub struct KubePodLocator {
    client: Client,
}

impl KubePodLocator {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PodLocator for KubePodLocator {
    async fn find_pod(&self, namespace: &str, selector: &PodSelector) -> Result<String> {
        let pod_api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let labels = selector.to_string();
        let pods = pod_api
            .list(&ListParams::default().labels(&labels))
            .await
            .with_context(|| format!("listing pods in {} matching {}", namespace, labels))?;
        debug!("{} pod(s) in {} match {}", pods.items.len(), namespace, labels);

        let name = select_pod(&pods.items).ok_or_else(|| Error::PodNotFound {
            namespace: namespace.to_string(),
            selector: labels,
        })?;
        Ok(name)
    }
}

/// Prefer a running pod; otherwise take the first one listed.
pub fn select_pod(pods: &[Pod]) -> Option<String> {
    pods.iter()
        .find(|p| p.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Running"))
        .or_else(|| pods.first())
        .and_then(|p| p.metadata.name.clone())
}

pub struct KubeSecretStore {
    client: Client,
}

impl KubeSecretStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get_secret_value(&self, namespace: &str, secret: &str, key: &str) -> Result<String> {
        let secret_api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let found = secret_api
            .get(secret)
            .await
            .with_context(|| format!("fetching secret {}/{}", namespace, secret))?;
        Ok(secret_value(&found, secret, key)?)
    }

    async fn set_secret_value(
        &self,
        namespace: &str,
        secret: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let secret_api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let patch = serde_json::json!({ "stringData": { key: value } });
        secret_api
            .patch(secret, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .with_context(|| format!("updating secret {}/{}", namespace, secret))?;
        debug!("updated key {} of secret {}/{}", key, namespace, secret);
        Ok(())
    }
}

/// Decode one key of a secret's data as UTF-8.
pub fn secret_value(secret: &Secret, name: &str, key: &str) -> Result<String, Error> {
    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(|| Error::SecretKeyMissing {
            secret: name.to_string(),
            key: key.to_string(),
        })?;
    String::from_utf8(bytes.0.clone()).map_err(|_| Error::SecretNotUtf8 {
        secret: name.to_string(),
        key: key.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::PodStatus;
    use k8s_openapi::ByteString;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;

    fn pod(name: &str, phase: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_select_pod_prefers_running() {
        let pods = vec![pod("tobs-0", "Pending"), pod("tobs-1", "Running")];
        assert_eq!(select_pod(&pods), Some("tobs-1".to_string()));
    }

    #[test]
    fn test_select_pod_falls_back_to_first() {
        let pods = vec![pod("tobs-0", "Pending"), pod("tobs-1", "Failed")];
        assert_eq!(select_pod(&pods), Some("tobs-0".to_string()));
        assert_eq!(select_pod(&[]), None);
    }

    #[test]
    fn test_secret_value() {
        let mut data = BTreeMap::new();
        data.insert("admin-password".to_string(), ByteString(b"kraken".to_vec()));
        data.insert("binary".to_string(), ByteString(vec![0xff, 0xfe]));
        let secret = Secret {
            data: Some(data),
            ..Default::default()
        };

        assert_eq!(
            secret_value(&secret, "tobs-grafana", "admin-password").unwrap(),
            "kraken"
        );
        assert!(matches!(
            secret_value(&secret, "tobs-grafana", "admin-user"),
            Err(Error::SecretKeyMissing { .. })
        ));
        assert!(matches!(
            secret_value(&secret, "tobs-grafana", "binary"),
            Err(Error::SecretNotUtf8 { .. })
        ));
        assert!(secret_value(&Secret::default(), "empty", "admin-password").is_err());
    }
}
