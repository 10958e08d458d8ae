use anyhow::{Context, Result};
use clap::Parser;
use kube::Client;
use std::future::Future;
use std::process::ExitCode;
use tracing::{debug, info};

use ts_obs::cli::{ChunkIntervalSubcommand, Cli, Command, GrafanaSubcommand};
use ts_obs::{
    display_causes, ChunkIntervalManager, ChunkIntervalRequest, EnvironmentProvider,
    FileEnvironment, GrafanaManager, KubePodLocator, KubeSecretStore, KubectlPortForwarder,
    PostgresConnector, SystemEnvironment,
};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint!("{}", display_causes(&err));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let release = cli.release();
    info!("release = {}, namespace = {}", release.name, release.namespace);

    let env: Box<dyn EnvironmentProvider> = match &cli.env_file {
        Some(path) => Box::new(FileEnvironment::load(path)?),
        None => Box::new(SystemEnvironment),
    };
    let forwarder = KubectlPortForwarder::new();

    match cli.command {
        Command::ChunkInterval(cmd) => {
            // Validate before touching the cluster
            let request = match &cmd {
                ChunkIntervalSubcommand::Set { metric, duration } => {
                    ChunkIntervalRequest::set(env.as_ref(), metric, duration)?
                }
                ChunkIntervalSubcommand::Reset { metric } => {
                    ChunkIntervalRequest::reset(env.as_ref(), metric)?
                }
            };
            let client = kube_client().await?;
            let pods = KubePodLocator::new(client);
            let connector = PostgresConnector;
            ChunkIntervalManager::new(&release, &pods, &forwarder, &connector)
                .apply(&request)
                .await
        }
        Command::Grafana(cmd) => {
            let client = kube_client().await?;
            let pods = KubePodLocator::new(client.clone());
            let secrets = KubeSecretStore::new(client);
            let grafana = GrafanaManager::new(&release, &pods, &forwarder, &secrets);
            match cmd {
                GrafanaSubcommand::PortForward { port } => {
                    let shutdown = shutdown_signal()?;
                    grafana.port_forward(port, shutdown).await
                }
                GrafanaSubcommand::GetInitialPassword => {
                    let password = grafana.get_initial_password().await?;
                    println!("{}", password);
                    Ok(())
                }
                GrafanaSubcommand::ChangePassword { password } => {
                    grafana.change_password(&password).await?;
                    println!("Grafana admin password changed");
                    Ok(())
                }
            }
        }
    }
}

async fn kube_client() -> Result<Client> {
    Client::try_default()
        .await
        .context("could not create Kubernetes client")
}

/// Install the SIGINT and SIGTERM handlers now. The returned future
/// resolves once either signal arrives, including one received before it
/// is first polled.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt =
        signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
    let mut terminate =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => {
                debug!("Received SIGINT");
            }
            _ = terminate.recv() => {
                debug!("Received SIGTERM");
            }
        }
    })
}

#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    Ok(async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
        debug!("Received Ctrl-C");
    })
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
