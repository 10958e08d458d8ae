use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::error::Error;

/// How long to wait for kubectl to report that the tunnel is listening.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

const READY_MARKER: &str = "Forwarding from";

/// Opens a tunnel from a local port to a port inside a pod.
#[async_trait]
pub trait PortForwarder: Send + Sync {
    async fn forward(
        &self,
        namespace: &str,
        pod: &str,
        local_port: u16,
        remote_port: u16,
    ) -> Result<PortForward>;
}

/// An established tunnel. The kubectl process is killed when this is
/// dropped, so early returns after the tunnel is up do not leak it.
#[derive(Debug)]
pub struct PortForward {
    target: String,
    local_port: u16,
    child: Option<Child>,
}

impl PortForward {
    /// A tunnel with no backing process, for forwards managed elsewhere.
    pub fn detached(target: impl Into<String>, local_port: u16) -> Self {
        Self {
            target: target.into(),
            local_port,
            child: None,
        }
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Resolves when the tunnel process exits. Never resolves for a
    /// detached forward.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        match self.child.as_mut() {
            Some(child) => Ok(child
                .wait()
                .await
                .context("error waiting for kubectl port-forward")?),
            None => std::future::pending().await,
        }
    }

    pub async fn close(mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            if child.try_wait()?.is_none() {
                child
                    .kill()
                    .await
                    .with_context(|| format!("error stopping port-forward to {}", self.target))?;
            }
            debug!("closed port-forward to {}", self.target);
        }
        Ok(())
    }
}

/// Runs `kubectl port-forward` as a child process.
#[derive(Debug, Clone)]
pub struct KubectlPortForwarder {
    program: String,
    leading_args: Vec<String>,
    ready_timeout: Duration,
}

impl Default for KubectlPortForwarder {
    fn default() -> Self {
        Self::new()
    }
}

impl KubectlPortForwarder {
    pub fn new() -> Self {
        Self {
            program: "kubectl".to_string(),
            leading_args: Vec::new(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    /// Use another program (a pinned kubectl, or a wrapper such as `sudo`)
    /// with arguments placed before the port-forward arguments.
    pub fn with_program<I, S>(program: impl Into<String>, leading_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            leading_args: leading_args.into_iter().map(Into::into).collect(),
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }
}

pub fn port_forward_args(namespace: &str, pod: &str, local_port: u16, remote_port: u16) -> Vec<String> {
    vec![
        "port-forward".to_string(),
        "-n".to_string(),
        namespace.to_string(),
        format!("pod/{}", pod),
        format!("{}:{}", local_port, remote_port),
    ]
}

#[async_trait]
impl PortForwarder for KubectlPortForwarder {
    async fn forward(
        &self,
        namespace: &str,
        pod: &str,
        local_port: u16,
        remote_port: u16,
    ) -> Result<PortForward> {
        let target = format!("{}/{}", namespace, pod);
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .args(port_forward_args(namespace, pod, local_port, remote_port))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true);
        // Keep terminal Ctrl-C away from kubectl; we stop it ourselves.
        #[cfg(unix)]
        cmd.process_group(0);
        let mut child = cmd
            .spawn()
            .with_context(|| format!("error starting {} port-forward for {}", self.program, target))?;

        let stdout = child.stdout.take().context("kubectl stdout is missing")?;
        let mut lines = BufReader::new(stdout).lines();

        let ready = tokio::time::timeout(self.ready_timeout, async {
            while let Some(line) = lines.next_line().await? {
                debug!("kubectl: {}", line);
                if line.contains(READY_MARKER) {
                    return Ok(true);
                }
            }
            Ok::<_, std::io::Error>(false)
        })
        .await;

        match ready {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                let status = child.wait().await?;
                return Err(Error::PortForward {
                    target,
                    message: format!("kubectl exited before the tunnel was ready ({})", status),
                }
                .into());
            }
            Ok(Err(err)) => {
                return Err(err).with_context(|| format!("error reading kubectl output for {}", target));
            }
            Err(_) => {
                return Err(Error::PortForward {
                    target,
                    message: format!("tunnel not ready after {:?}", self.ready_timeout),
                }
                .into());
            }
        }

        // kubectl logs every accepted connection; keep the pipe drained.
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("kubectl: {}", line);
            }
        });

        info!("Forwarding localhost:{} -> {}:{}", local_port, target, remote_port);
        Ok(PortForward {
            target,
            local_port,
            child: Some(child),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripted(script: &str) -> KubectlPortForwarder {
        // Trailing arguments become positional parameters of the script.
        KubectlPortForwarder::with_program("sh", ["-c", script, "kubectl"])
            .with_ready_timeout(Duration::from_secs(5))
    }

    #[test]
    fn test_port_forward_args() {
        assert_eq!(
            port_forward_args("observability", "tobs-timescaledb-0", 5432, 5432),
            vec!["port-forward", "-n", "observability", "pod/tobs-timescaledb-0", "5432:5432"]
        );
    }

    #[tokio::test]
    async fn test_missing_program() {
        let forwarder = KubectlPortForwarder::with_program("no-such-kubectl-binary", Vec::<String>::new());
        let result = forwarder.forward("default", "tobs-grafana-0", 8080, 3000).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_ready_tunnel() {
        let forwarder = scripted("echo 'Forwarding from 127.0.0.1:8080 -> 3000'; sleep 30");
        let forward = forwarder.forward("default", "tobs-grafana-0", 8080, 3000).await.unwrap();

        assert_eq!(forward.local_port(), 8080);
        assert_eq!(forward.target(), "default/tobs-grafana-0");
        forward.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_exit_before_ready() {
        let forwarder = scripted("echo 'error: pod not found' >&2; exit 3");
        let err = forwarder.forward("default", "missing", 8080, 3000).await.unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("default/missing"), "{}", msg);
        assert!(msg.contains("exited before the tunnel was ready"), "{}", msg);
    }

    #[tokio::test]
    async fn test_ready_timeout() {
        let forwarder = scripted("sleep 30").with_ready_timeout(Duration::from_millis(200));
        let err = forwarder.forward("default", "slow", 8080, 3000).await.unwrap_err();
        assert!(err.to_string().contains("not ready"));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_kubectl_runs_in_own_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let pgrp_file = dir.path().join("pgrp");
        let script = format!(
            "read -r _ _ _ _ pgrp _ < /proc/$$/stat; echo $pgrp > '{}'; \
             echo 'Forwarding from 127.0.0.1:8080 -> 3000'; sleep 30",
            pgrp_file.display()
        );
        let forwarder = scripted(&script);
        let forward = forwarder.forward("default", "tobs-grafana-0", 8080, 3000).await.unwrap();

        let pid = forward.child.as_ref().and_then(|c| c.id()).unwrap();
        let pgrp: u32 = std::fs::read_to_string(&pgrp_file).unwrap().trim().parse().unwrap();
        assert_eq!(pgrp, pid, "kubectl shares the caller's process group");
        forward.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_reports_exit() {
        let forwarder = scripted("echo 'Forwarding from 127.0.0.1:1 -> 1'; exit 0");
        let mut forward = forwarder.forward("default", "short", 1, 1).await.unwrap();
        let status = forward.wait().await.unwrap();
        assert!(status.success());
    }
}
