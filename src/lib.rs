// Public modules
pub mod types;
pub mod error;
pub mod config;
pub mod duration;
pub mod kubernetes;
pub mod portforward;
pub mod db;
pub mod chunk_interval;
pub mod grafana;
pub mod cli;

// Re-export commonly used items
pub use types::*;
pub use error::{display_causes, Error};
pub use config::{
    load_database_config_with_env, DatabaseConfig, EnvironmentProvider,
    FileEnvironment, MockEnvironment, SystemEnvironment, PGPASSWORD_VAR,
};
pub use duration::{format_duration, format_seconds, parse_duration, seconds, DurationError};
pub use kubernetes::{KubePodLocator, KubeSecretStore, PodLocator, SecretStore};
pub use portforward::{KubectlPortForwarder, PortForward, PortForwarder};
pub use db::{ChunkIntervalStatement, Connector, PostgresConnector, PostgresSession, SqlExecutor};
pub use chunk_interval::{ChunkIntervalManager, ChunkIntervalRequest};
pub use grafana::{GrafanaClient, GrafanaManager};
