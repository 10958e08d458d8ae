use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::types::{Release, DEFAULT_NAMESPACE, DEFAULT_RELEASE_NAME, LISTEN_PORT_GRAFANA};

/// Command-line options, parsed using `clap`.
#[derive(Debug, Parser)]
#[command(
    name = "ts-obs",
    version,
    about = "Manage a TimescaleDB and Grafana observability stack running on Kubernetes."
)]
pub struct Cli {
    /// Helm release name of the stack.
    #[arg(short = 'n', long, global = true, default_value = DEFAULT_RELEASE_NAME)]
    pub name: String,

    /// Kubernetes namespace the stack is installed in.
    #[arg(long, global = true, default_value = DEFAULT_NAMESPACE)]
    pub namespace: String,

    /// Read variables such as PGPASSWORD_POSTGRES from this file before
    /// falling back to the process environment.
    #[arg(long, global = true, value_name = "PATH")]
    pub env_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn release(&self) -> Release {
        Release::new(self.name.clone(), self.namespace.clone())
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Per-metric chunk interval settings in TimescaleDB.
    #[command(subcommand)]
    ChunkInterval(ChunkIntervalSubcommand),

    /// Grafana access and credentials.
    #[command(subcommand)]
    Grafana(GrafanaSubcommand),
}

#[derive(Debug, Subcommand)]
pub enum ChunkIntervalSubcommand {
    /// Sets the chunk interval for a specific metric (at least 1 minute).
    Set {
        metric: String,
        /// Duration such as 90s, 5m, 1h30m.
        #[arg(allow_hyphen_values = true)]
        duration: String,
    },

    /// Resets the chunk interval of a metric to the default.
    Reset { metric: String },
}

#[derive(Debug, Subcommand)]
pub enum GrafanaSubcommand {
    /// Port-forwards Grafana to localhost until interrupted.
    PortForward {
        /// Local port to listen on.
        #[arg(short, long, default_value_t = LISTEN_PORT_GRAFANA)]
        port: u16,
    },

    /// Prints the Grafana admin password from the release's secret.
    GetInitialPassword,

    /// Changes the Grafana admin password.
    ChangePassword {
        #[arg(allow_hyphen_values = true)]
        password: String,
    },
}
