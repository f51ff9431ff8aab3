//! A single named container and its lifecycle.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::{Result, SandboxError};
use super::runtime::{Bind, ContainerRuntime, ContainerSpec, ContainerStatus, ExecOutput};
use super::VolumeMount;

/// Image, mounts and isolation flags shared by every start of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerOptions {
    /// Image the container is created from.
    pub image: String,
    /// Working directory for the main process and every exec.
    pub work_dir: String,
    /// Host paths bound into the container.
    pub mounts: Vec<VolumeMount>,
    /// Mount the root filesystem read-only.
    pub read_only_rootfs: bool,
    /// Run with no network at all.
    pub network_disabled: bool,
    /// User to run as, `None` for the image default.
    pub user: Option<String>,
}

/// Thin wrapper around one daemon-managed container, addressed by name.
pub struct ContainerHandle {
    runtime: Arc<dyn ContainerRuntime>,
    name: String,
    options: ContainerOptions,
}

impl std::fmt::Debug for ContainerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerHandle")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ContainerHandle {
    /// Address the container `name`. Nothing is sent to the daemon yet.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        name: impl Into<String>,
        options: ContainerOptions,
    ) -> Self {
        Self {
            runtime,
            name: name.into(),
            options,
        }
    }

    /// The daemon-side container name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create and start the container detached, running `command`.
    ///
    /// Missing host directories are created first for mounts that ask for it.
    pub async fn run(&self, command: Vec<String>) -> Result<()> {
        let mounts = &self.options.mounts;
        ensure_host_paths(mounts)
            .await
            .map_err(|e| SandboxError::provisioning(&self.name, e.to_string()))?;

        let binds = mounts
            .iter()
            .map(|m| Bind {
                host_path: m.host_path.display().to_string(),
                container_path: m.container_path.clone(),
                read_only: m.read_only,
            })
            .collect();

        let spec = ContainerSpec {
            name: self.name.clone(),
            image: self.options.image.clone(),
            work_dir: self.options.work_dir.clone(),
            binds,
            read_only_rootfs: self.options.read_only_rootfs,
            network_disabled: self.options.network_disabled,
            user: self.options.user.clone(),
            command: Some(command),
        };

        self.runtime.run(&spec).await?;
        info!(container = %self.name, image = %self.options.image, "Container started");
        Ok(())
    }

    /// Start an existing, stopped container.
    pub async fn restart(&self) -> Result<()> {
        self.runtime.start(&self.name).await?;
        info!(container = %self.name, "Container restarted");
        Ok(())
    }

    /// Run a command inside the container.
    ///
    /// A container that exists but is not running is restarted first. With a
    /// timeout, the wait is abandoned once it elapses; the command itself may
    /// keep running inside the container.
    pub async fn exec(&self, command: &[String], timeout: Option<Duration>) -> Result<ExecOutput> {
        match self.status().await? {
            ContainerStatus::Running => {}
            ContainerStatus::Stopped => {
                debug!(container = %self.name, "Container not running, restarting before exec");
                self.restart().await?;
            }
            ContainerStatus::Absent => return Err(SandboxError::not_found(&self.name)),
        }

        let fut = self.runtime.exec(&self.name, command);
        match timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| SandboxError::timeout(limit))?,
            None => fut.await,
        }
    }

    /// Stop the main process. Errors if the daemon refuses.
    pub async fn stop(&self) -> Result<()> {
        self.runtime.stop(&self.name).await
    }

    /// Delete the container. Errors if the daemon refuses or never had it.
    pub async fn remove(&self) -> Result<()> {
        self.runtime.remove(&self.name).await
    }

    /// Stop and remove the container.
    ///
    /// Both steps are attempted regardless of the other's outcome; failures
    /// are logged and never returned. Returns true once the container is gone,
    /// including when it had already been removed.
    pub async fn close(&self) -> bool {
        if let Err(e) = self.stop().await {
            warn!(container = %self.name, error = %e, "Failed to stop container");
        }

        match self.remove().await {
            Ok(()) => {
                info!(container = %self.name, "Container removed");
                true
            }
            Err(e) if e.is_not_found() => true,
            Err(e) => {
                warn!(container = %self.name, error = %e, "Failed to remove container");
                false
            }
        }
    }

    /// Current daemon-side state of the container.
    pub async fn status(&self) -> Result<ContainerStatus> {
        self.runtime.inspect(&self.name).await
    }

    /// True if the daemon still has a record of this container, running or not.
    pub async fn in_use(&self) -> Result<bool> {
        Ok(self.status().await? != ContainerStatus::Absent)
    }

    /// True if the container's main process is running.
    pub async fn is_running(&self) -> Result<bool> {
        Ok(self.status().await? == ContainerStatus::Running)
    }
}

async fn ensure_host_paths(mounts: &[VolumeMount]) -> std::io::Result<()> {
    for mount in mounts {
        if !mount.create_if_missing || path_exists(&mount.host_path).await {
            continue;
        }
        debug!(path = %mount.host_path.display(), "Creating missing host mount path");
        tokio::fs::create_dir_all(&mount.host_path).await?;
    }
    Ok(())
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
