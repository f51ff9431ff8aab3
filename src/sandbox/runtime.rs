//! Container daemon client contract.
//!
//! Everything above this seam talks to the daemon through
//! [`ContainerRuntime`], so the pool can run against Docker in production
//! and against an in-memory recorder in tests.

use async_trait::async_trait;
use serde::Serialize;

use super::error::Result;

/// Observed state of a named container at the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    /// The container exists and its main process is running.
    Running,
    /// The container exists but is created, exited, paused or otherwise not running.
    Stopped,
    /// The daemon has no record of the container.
    Absent,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

/// A host path bound into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bind {
    /// Host side of the bind.
    pub host_path: String,
    /// Mount point inside the container.
    pub container_path: String,
    /// Bind read-only.
    pub read_only: bool,
}

impl Bind {
    /// Docker `-v` style bind string (`host:container:mode`).
    pub fn to_bind_string(&self) -> String {
        let mode = if self.read_only { "ro" } else { "rw" };
        format!("{}:{}:{}", self.host_path, self.container_path, mode)
    }
}

/// Everything the daemon needs to create and start a detached container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name, unique per daemon.
    pub name: String,
    /// Image to create from.
    pub image: String,
    /// Working directory for the main process.
    pub work_dir: String,
    /// Host paths to bind.
    pub binds: Vec<Bind>,
    /// Mount the root filesystem read-only.
    pub read_only_rootfs: bool,
    /// Run with no network.
    pub network_disabled: bool,
    /// User to run as.
    pub user: Option<String>,
    /// Main process argv; `None` keeps the image default.
    pub command: Option<Vec<String>>,
}

/// Captured result of a command run inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecOutput {
    /// Everything the command wrote to stdout.
    pub stdout: String,
    /// Everything the command wrote to stderr.
    pub stderr: String,
    /// Process exit status.
    pub exit_code: i64,
}

impl ExecOutput {
    /// Returns true if the command exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Operations the pool needs from a container daemon.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create and start a detached container.
    async fn run(&self, spec: &ContainerSpec) -> Result<()>;

    /// Start an existing container by name.
    async fn start(&self, name: &str) -> Result<()>;

    /// Run a command in a running container and capture its output.
    async fn exec(&self, name: &str, command: &[String]) -> Result<ExecOutput>;

    /// Stop a container.
    async fn stop(&self, name: &str) -> Result<()>;

    /// Remove a container.
    async fn remove(&self, name: &str) -> Result<()>;

    /// Report whether the container is running, stopped or unknown.
    async fn inspect(&self, name: &str) -> Result<ContainerStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_string() {
        let bind = Bind {
            host_path: "/data/convo.md".to_string(),
            container_path: "/workspace/conversations/convo.md".to_string(),
            read_only: true,
        };
        assert_eq!(
            bind.to_bind_string(),
            "/data/convo.md:/workspace/conversations/convo.md:ro"
        );
    }

    #[test]
    fn test_container_status_display() {
        assert_eq!(ContainerStatus::Running.to_string(), "running");
        assert_eq!(ContainerStatus::Stopped.to_string(), "stopped");
        assert_eq!(ContainerStatus::Absent.to_string(), "absent");
    }
}
