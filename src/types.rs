use std::collections::BTreeMap;
use std::fmt;

pub const LISTEN_PORT_TSDB: u16 = 5432;
pub const FORWARD_PORT_TSDB: u16 = 5432;
pub const LISTEN_PORT_GRAFANA: u16 = 8080;
pub const FORWARD_PORT_GRAFANA: u16 = 3000;

pub const DEFAULT_RELEASE_NAME: &str = "tobs";
pub const DEFAULT_NAMESPACE: &str = "default";

/// The Helm release the observability stack was installed as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    pub name: String,
    pub namespace: String,
}

impl Release {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Secret the Grafana chart stores its admin credentials in.
    pub fn grafana_secret(&self) -> String {
        format!("{}-grafana", self.name)
    }
}

impl Default for Release {
    fn default() -> Self {
        Self::new(DEFAULT_RELEASE_NAME, DEFAULT_NAMESPACE)
    }
}

/// Label key/value pairs identifying a pod. Rendered in key order so the
/// selector string is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodSelector {
    labels: BTreeMap<String, String>,
}

impl PodSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn timescaledb_master(release: &Release) -> Self {
        Self::new()
            .with_label("release", release.name.clone())
            .with_label("role", "master")
    }

    pub fn grafana(release: &Release) -> Self {
        Self::new()
            .with_label("app.kubernetes.io/instance", release.name.clone())
            .with_label("app.kubernetes.io/name", "grafana")
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }
}

impl fmt::Display for PodSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.labels {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}={}", key, value)?;
            first = false;
        }
        Ok(())
    }
}
