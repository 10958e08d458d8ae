use anyhow::Result;
use chrono::Duration;
use tracing::{debug, info};

use crate::config::{load_database_config_with_env, DatabaseConfig, EnvironmentProvider};
use crate::db::{ChunkIntervalStatement, Connector, SqlExecutor};
use crate::duration::{format_duration, parse_duration};
use crate::error::Error;
use crate::kubernetes::PodLocator;
use crate::portforward::PortForwarder;
use crate::types::{PodSelector, Release, FORWARD_PORT_TSDB, LISTEN_PORT_TSDB};

/// A validated chunk-interval change, ready to apply.
///
/// Building one performs every local precondition check; nothing here
/// touches the network.
#[derive(Debug, Clone)]
pub struct ChunkIntervalRequest {
    pub database: DatabaseConfig,
    pub statement: ChunkIntervalStatement,
}

impl ChunkIntervalRequest {
    pub fn set<E: EnvironmentProvider + ?Sized>(
        env: &E,
        metric: &str,
        duration: &str,
    ) -> Result<Self, Error> {
        let database = load_database_config_with_env(env)?;
        if metric.is_empty() {
            return Err(Error::EmptyArgument { what: "metric name" });
        }
        let interval = parse_duration(duration)?;
        if interval < Duration::minutes(1) {
            return Err(Error::IntervalTooShort);
        }
        Ok(Self {
            database,
            statement: ChunkIntervalStatement::set(metric, interval),
        })
    }

    pub fn reset<E: EnvironmentProvider + ?Sized>(env: &E, metric: &str) -> Result<Self, Error> {
        let database = load_database_config_with_env(env)?;
        if metric.is_empty() {
            return Err(Error::EmptyArgument { what: "metric name" });
        }
        Ok(Self {
            database,
            statement: ChunkIntervalStatement::reset(metric),
        })
    }
}

/// Applies chunk-interval changes to the release's TimescaleDB master.
pub struct ChunkIntervalManager<'a, C: Connector> {
    release: &'a Release,
    pods: &'a dyn PodLocator,
    forwarder: &'a dyn PortForwarder,
    connector: &'a C,
}

impl<'a, C: Connector> ChunkIntervalManager<'a, C> {
    pub fn new(
        release: &'a Release,
        pods: &'a dyn PodLocator,
        forwarder: &'a dyn PortForwarder,
        connector: &'a C,
    ) -> Self {
        Self {
            release,
            pods,
            forwarder,
            connector,
        }
    }

    /// `chunk-interval set <metric> <duration>`
    pub async fn set<E: EnvironmentProvider + ?Sized>(
        &self,
        env: &E,
        metric: &str,
        duration: &str,
    ) -> Result<()> {
        let request = ChunkIntervalRequest::set(env, metric, duration)?;
        self.apply(&request).await
    }

    /// `chunk-interval reset <metric>`
    pub async fn reset<E: EnvironmentProvider + ?Sized>(&self, env: &E, metric: &str) -> Result<()> {
        let request = ChunkIntervalRequest::reset(env, metric)?;
        self.apply(&request).await
    }

    /// Pod lookup, tunnel, connect, execute. Stops at the first failure;
    /// the session and the tunnel are released on every path.
    pub async fn apply(&self, request: &ChunkIntervalRequest) -> Result<()> {
        let namespace = &self.release.namespace;
        let selector = PodSelector::timescaledb_master(self.release);
        let pod = self.pods.find_pod(namespace, &selector).await?;
        info!(
            "Using TimescaleDB pod {}/{} for metric {}",
            namespace,
            pod,
            request.statement.metric()
        );

        let tunnel = self
            .forwarder
            .forward(namespace, &pod, LISTEN_PORT_TSDB, FORWARD_PORT_TSDB)
            .await?;
        let session = self
            .connector
            .connect(&request.database, tunnel.local_port())
            .await?;

        match &request.statement {
            ChunkIntervalStatement::Set { metric, interval } => {
                println!("Setting chunk interval of {} to {}", metric, format_duration(*interval));
            }
            ChunkIntervalStatement::Reset { metric } => {
                println!("Resetting chunk interval of {} to the default", metric);
            }
        }
        let rows = session.execute(&request.statement).await?;
        debug!("{} row(s) from {}", rows, request.statement);

        drop(session);
        tunnel.close().await?;
        Ok(())
    }
}
