//! Docker sandboxes for isolated agent execution.
//!
//! A [`Sandbox`] is a file/command facade over one long-lived container
//! whose name is derived from the owning agent and session. Dropping a
//! `Sandbox` never touches the container; only [`Sandbox::close`] does.

mod command;
mod container;
mod docker;
mod error;
#[cfg(test)]
pub(crate) mod mock;
mod runtime;

pub use command::{execute_file_command, read_file_command, write_file_command};
pub use container::{ContainerHandle, ContainerOptions};
pub use docker::DockerRuntime;
pub use error::{Result, SandboxError};
pub use runtime::{Bind, ContainerRuntime, ContainerSpec, ContainerStatus, ExecOutput};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Deterministic container name for an agent session.
pub fn container_name(agent_name: &str, session_id: &str) -> String {
    format!("{agent_name}-sandbox-{session_id}")
}

/// A host path mounted into a sandbox container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Path on the host; a leading `~/` is expanded when loaded from config.
    pub host_path: PathBuf,
    /// Mount point inside the container.
    pub container_path: String,
    /// Bind read-only.
    #[serde(default)]
    pub read_only: bool,
    /// Create `host_path` as a directory if it does not exist yet.
    #[serde(default = "default_true")]
    pub create_if_missing: bool,
}

fn default_true() -> bool {
    true
}

impl VolumeMount {
    /// A read-write mount that creates its host directory on demand.
    pub fn new(host_path: impl AsRef<Path>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.as_ref().to_path_buf(),
            container_path: container_path.into(),
            read_only: false,
            create_if_missing: true,
        }
    }

    /// Bind this mount read-only.
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

/// Everything needed to provision a sandbox for one agent session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Owning agent; first half of the container name.
    pub agent_name: String,
    /// Conversation or session; second half of the container name.
    pub session_id: String,
    /// Image for newly created containers.
    pub image: String,
    /// Host paths bound into the container.
    pub mounts: Vec<VolumeMount>,
    /// Keep-alive budget for the container's main process, in seconds.
    pub life_seconds: u64,
    /// Working directory inside the container.
    pub work_dir: String,
    /// Mount the root filesystem read-only.
    pub read_only_rootfs: bool,
    /// Run with no network at all.
    pub network_disabled: bool,
    /// User to run as, `None` for the image default.
    pub user: Option<String>,
    /// Default timeout applied to every command run through the sandbox.
    pub exec_timeout: Option<Duration>,
}

impl SandboxConfig {
    /// Defaults: no mounts, one hour keep-alive, `/workspace`, no timeout.
    pub fn new(
        agent_name: impl Into<String>,
        session_id: impl Into<String>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            session_id: session_id.into(),
            image: image.into(),
            mounts: Vec::new(),
            life_seconds: 3600,
            work_dir: "/workspace".to_string(),
            read_only_rootfs: false,
            network_disabled: false,
            user: None,
            exec_timeout: None,
        }
    }

    /// The container this session always maps to.
    pub fn container_name(&self) -> String {
        container_name(&self.agent_name, &self.session_id)
    }

    /// Check the identity is usable as a container name and the lifetime
    /// and timeout are positive.
    pub fn validate(&self) -> Result<()> {
        if !is_name_safe(&self.agent_name) {
            return Err(SandboxError::invalid_argument(format!(
                "agent name '{}' must be non-empty, start with a letter or digit and contain only [A-Za-z0-9_.-]",
                self.agent_name
            )));
        }
        if self.session_id.is_empty() || !self.session_id.chars().all(is_name_char) {
            return Err(SandboxError::invalid_argument(format!(
                "session id '{}' must be non-empty and contain only [A-Za-z0-9_.-]",
                self.session_id
            )));
        }
        if self.image.is_empty() {
            return Err(SandboxError::invalid_argument("image is required"));
        }
        if self.life_seconds == 0 {
            return Err(SandboxError::invalid_argument("life_seconds must be >= 1"));
        }
        if self.exec_timeout.is_some_and(|t| t.is_zero()) {
            return Err(SandboxError::invalid_argument("exec timeout must be non-zero"));
        }
        Ok(())
    }

    /// Image and isolation settings for this session's container.
    pub fn container_options(&self) -> ContainerOptions {
        ContainerOptions {
            image: self.image.clone(),
            work_dir: self.work_dir.clone(),
            mounts: self.mounts.clone(),
            read_only_rootfs: self.read_only_rootfs,
            network_disabled: self.network_disabled,
            user: self.user.clone(),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn is_name_safe(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_alphanumeric()) && name.chars().all(is_name_char)
}

/// File and command operations against one session container.
///
/// Each operation is a single exec. `bash` runs whatever it is given:
/// filtering commands is the caller's job.
#[derive(Debug, Clone)]
pub struct Sandbox {
    container: Arc<ContainerHandle>,
    session_id: String,
    exec_timeout: Option<Duration>,
}

impl Sandbox {
    /// Attach to the session's container, restarting it if it already
    /// exists, or run a new one that stays alive for `life_seconds`.
    pub async fn create(runtime: Arc<dyn ContainerRuntime>, config: &SandboxConfig) -> Result<Self> {
        config.validate()?;

        let container =
            ContainerHandle::new(runtime, config.container_name(), config.container_options());

        if container.in_use().await? {
            info!(container = %container.name(), "Reusing existing container");
            container.restart().await?;
        } else {
            let keep_alive = vec!["sleep".to_string(), config.life_seconds.to_string()];
            container.run(keep_alive).await?;
        }

        Ok(Self {
            container: Arc::new(container),
            session_id: config.session_id.clone(),
            exec_timeout: config.exec_timeout,
        })
    }

    /// Name of the backing container.
    pub fn container_name(&self) -> &str {
        self.container.name()
    }

    /// The backing container. Every clone of a sandbox shares it.
    pub fn container(&self) -> &ContainerHandle {
        &self.container
    }

    /// Run a file inside the container using the interpreter implied by its extension.
    pub async fn execute_file(&self, path: &str, args: &[String]) -> Result<ExecOutput> {
        let argv = execute_file_command(path, args, &self.session_id);
        self.exec(&argv, self.exec_timeout).await
    }

    /// Write `content` to `path` inside the container, exactly as given.
    pub async fn write_file(&self, path: &str, content: &str) -> Result<ExecOutput> {
        self.exec(&write_file_command(path, content), self.exec_timeout)
            .await
    }

    /// Print the file at `path` to stdout.
    pub async fn read_file(&self, path: &str) -> Result<ExecOutput> {
        self.exec(&read_file_command(path), self.exec_timeout).await
    }

    /// Run a shell command string as-is.
    pub async fn bash(&self, command: &str) -> Result<ExecOutput> {
        self.bash_with_timeout(command, self.exec_timeout).await
    }

    /// Like [`bash`](Self::bash), with an explicit timeout instead of the configured one.
    pub async fn bash_with_timeout(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecOutput> {
        self.exec(&command::shell(command), timeout).await
    }

    async fn exec(&self, argv: &[String], timeout: Option<Duration>) -> Result<ExecOutput> {
        self.container.exec(argv, timeout).await
    }

    /// Stop and remove the container; see [`ContainerHandle::close`].
    pub async fn close(&self) -> bool {
        self.container.close().await
    }
}
