use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Duration;
use std::fmt;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

use crate::config::DatabaseConfig;
use crate::duration::{format_seconds, seconds};

const SET_CHUNK_INTERVAL_SQL: &str =
    "SELECT prom_api.set_metric_chunk_interval($1::text, INTERVAL '1 second' * $2::float8)";
const RESET_CHUNK_INTERVAL_SQL: &str = "SELECT prom_api.reset_metric_chunk_interval($1::text)";

/// Administrative calls against the `prom_api` schema.
///
/// The executed form binds the metric name and the interval as parameters;
/// `Display` renders the equivalent literal statement for logs.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkIntervalStatement {
    Set { metric: String, interval: Duration },
    Reset { metric: String },
}

impl ChunkIntervalStatement {
    pub fn set(metric: impl Into<String>, interval: Duration) -> Self {
        Self::Set {
            metric: metric.into(),
            interval,
        }
    }

    pub fn reset(metric: impl Into<String>) -> Self {
        Self::Reset {
            metric: metric.into(),
        }
    }

    pub fn metric(&self) -> &str {
        match self {
            Self::Set { metric, .. } | Self::Reset { metric } => metric,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            Self::Set { .. } => SET_CHUNK_INTERVAL_SQL,
            Self::Reset { .. } => RESET_CHUNK_INTERVAL_SQL,
        }
    }
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

impl fmt::Display for ChunkIntervalStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set { metric, interval } => write!(
                f,
                "SELECT prom_api.set_metric_chunk_interval({}, INTERVAL '1 second' * {})",
                quote_literal(metric),
                format_seconds(*interval)
            ),
            Self::Reset { metric } => write!(
                f,
                "SELECT prom_api.reset_metric_chunk_interval({})",
                quote_literal(metric)
            ),
        }
    }
}

/// Runs administrative statements on an open database session.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, statement: &ChunkIntervalStatement) -> Result<u64>;
}

/// Opens a database session through a forwarded local port.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: SqlExecutor;

    async fn connect(&self, config: &DatabaseConfig, local_port: u16) -> Result<Self::Session>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresConnector;

#[async_trait]
impl Connector for PostgresConnector {
    type Session = PostgresSession;

    async fn connect(&self, config: &DatabaseConfig, local_port: u16) -> Result<PostgresSession> {
        let url = config.redacted_url(local_port);
        debug!("Connecting to {}", url);
        let (client, connection) = config
            .connection_config(local_port)
            .connect(NoTls)
            .await
            .with_context(|| format!("Error connecting to {}", url))?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                warn!("postgres connection error: {}", err);
            }
        });

        Ok(PostgresSession { client })
    }
}

/// A live connection. Dropping the client ends the background
/// connection task.
pub struct PostgresSession {
    client: Client,
}

#[async_trait]
impl SqlExecutor for PostgresSession {
    async fn execute(&self, statement: &ChunkIntervalStatement) -> Result<u64> {
        debug!("Executing {}", statement);
        let rows = match statement {
            ChunkIntervalStatement::Set { metric, interval } => {
                self.client
                    .execute(statement.sql(), &[&metric.as_str(), &seconds(*interval)])
                    .await
            }
            ChunkIntervalStatement::Reset { metric } => {
                self.client.execute(statement.sql(), &[&metric.as_str()]).await
            }
        }
        .with_context(|| format!("Error executing {}", statement))?;
        Ok(rows)
    }
}
