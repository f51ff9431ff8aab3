//! Docker Engine implementation of [`ContainerRuntime`].

use async_trait::async_trait;
use bollard::container::{
    Config as ContainerConfig, CreateContainerOptions, InspectContainerOptions, LogOutput,
    RemoveContainerOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::Docker;
use futures_util::StreamExt;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::{Result, SandboxError};
use super::runtime::{ContainerRuntime, ContainerSpec, ContainerStatus, ExecOutput};
use crate::config::DockerConfig;

/// Talks to the local Docker daemon.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Wrap an already connected client.
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect to the local daemon, retrying with exponential backoff.
    ///
    /// Fails with [`SandboxError::DockerUnavailable`] once the retry budget
    /// in `config` is exhausted.
    pub async fn connect(config: &DockerConfig) -> Result<Self> {
        let attempts = config.connect_retries.max(1);
        let mut backoff = Duration::from_millis(config.initial_backoff_ms);
        let max_backoff = Duration::from_millis(config.max_backoff_ms);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match Self::try_connect().await {
                Ok(docker) => {
                    info!(attempt, "Connected to Docker daemon");
                    return Ok(Self::new(docker));
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Docker connection failed");
                    last_error = e.to_string();
                }
            }

            if attempt < attempts {
                tokio::time::sleep(backoff).await;
                backoff = next_backoff(backoff, max_backoff);
            }
        }

        Err(SandboxError::docker_unavailable(format!(
            "gave up after {attempts} attempts: {last_error}"
        )))
    }

    async fn try_connect() -> std::result::Result<Docker, BollardError> {
        let docker = Docker::connect_with_local_defaults()?;
        docker.ping().await?;
        Ok(docker)
    }

    fn build_container_config(spec: &ContainerSpec) -> ContainerConfig<String> {
        let binds = spec.binds.iter().map(super::runtime::Bind::to_bind_string).collect();

        ContainerConfig {
            image: Some(spec.image.clone()),
            working_dir: Some(spec.work_dir.clone()),
            cmd: spec.command.clone(),
            user: spec.user.clone(),
            network_disabled: Some(spec.network_disabled),
            host_config: Some(bollard::service::HostConfig {
                binds: Some(binds),
                readonly_rootfs: Some(spec.read_only_rootfs),
                network_mode: spec.network_disabled.then(|| "none".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// Double the delay, never exceeding `max`.
fn next_backoff(current: Duration, max: Duration) -> Duration {
    current.saturating_mul(2).min(max)
}

/// HTTP status carried by a daemon error response, if any.
fn status_code(err: &BollardError) -> Option<u16> {
    match err {
        BollardError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

fn is_not_found(err: &BollardError) -> bool {
    status_code(err) == Some(404)
}

/// 304 means the container was already in the requested state.
fn is_not_modified(err: &BollardError) -> bool {
    status_code(err) == Some(304)
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn run(&self, spec: &ContainerSpec) -> Result<()> {
        debug!(container = %spec.name, image = %spec.image, "Creating container");
        self.docker
            .create_container(
                Some(CreateContainerOptions {
                    name: spec.name.clone(),
                    platform: None,
                }),
                Self::build_container_config(spec),
            )
            .await
            .map_err(|e| SandboxError::provisioning(&spec.name, e.to_string()))?;

        debug!(container = %spec.name, "Starting container");
        self.docker
            .start_container::<String>(&spec.name, None)
            .await
            .map_err(|e| SandboxError::provisioning(&spec.name, e.to_string()))?;

        Ok(())
    }

    async fn start(&self, name: &str) -> Result<()> {
        match self.docker.start_container::<String>(name, None).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) if is_not_found(&e) => Err(SandboxError::not_found(name)),
            Err(e) => Err(SandboxError::provisioning(name, e.to_string())),
        }
    }

    async fn exec(&self, name: &str, command: &[String]) -> Result<ExecOutput> {
        let exec = self
            .docker
            .create_exec(
                name,
                CreateExecOptions {
                    cmd: Some(command.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    SandboxError::not_found(name)
                } else {
                    SandboxError::exec(name, format!("create exec: {e}"))
                }
            })?;

        let mut output = ExecOutput::default();

        if let StartExecResults::Attached {
            output: mut stream, ..
        } = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| SandboxError::exec(name, format!("start exec: {e}")))?
        {
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => {
                        output.stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        output.stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Err(e) => {
                        warn!(container = %name, error = %e, "Error reading exec output");
                    }
                    _ => {}
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| SandboxError::exec(name, format!("inspect exec: {e}")))?;
        output.exit_code = inspect.exit_code.unwrap_or(-1);

        debug!(container = %name, exit_code = output.exit_code, "Exec completed");
        Ok(output)
    }

    async fn stop(&self, name: &str) -> Result<()> {
        match self
            .docker
            .stop_container(name, None::<StopContainerOptions>)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) if is_not_found(&e) => Err(SandboxError::not_found(name)),
            Err(e) => Err(SandboxError::cleanup(name, e.to_string())),
        }
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    SandboxError::not_found(name)
                } else {
                    SandboxError::cleanup(name, e.to_string())
                }
            })
    }

    async fn inspect(&self, name: &str) -> Result<ContainerStatus> {
        match self
            .docker
            .inspect_container(name, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => {
                let running = details
                    .state
                    .and_then(|state| state.running)
                    .unwrap_or(false);
                Ok(if running {
                    ContainerStatus::Running
                } else {
                    ContainerStatus::Stopped
                })
            }
            Err(e) if is_not_found(&e) => Ok(ContainerStatus::Absent),
            Err(e) => Err(SandboxError::docker_unavailable(e.to_string())),
        }
    }
}
