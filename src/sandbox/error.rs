//! Domain-specific error types for sandbox and pool operations.
//!
//! Typed errors enable callers to match on specific failure modes
//! rather than parsing error message strings.

use std::time::Duration;

/// Errors that can occur during sandbox operations.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Caller supplied an invalid or missing argument (e.g. unknown key without a config).
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong.
        message: String,
    },

    /// Docker daemon rejected a create/start request.
    #[error("Failed to provision container {container}: {message}")]
    Provisioning {
        /// Container name.
        container: String,
        /// Daemon error text.
        message: String,
    },

    /// The daemon has no record of the named container.
    #[error("Container not found: {container}")]
    NotFound {
        /// Container name.
        container: String,
    },

    /// Stop or remove failed while tearing a container down.
    #[error("Failed to clean up container {container}: {message}")]
    Cleanup {
        /// Container name.
        container: String,
        /// Daemon error text.
        message: String,
    },

    /// Command execution exceeded the caller-supplied timeout.
    #[error("Container execution timed out after {timeout_secs} seconds")]
    Timeout {
        /// The limit that elapsed, in whole seconds.
        timeout_secs: u64,
    },

    /// Docker daemon is not running or not accessible.
    #[error("Docker is not available: {message}")]
    DockerUnavailable {
        /// Last connection error.
        message: String,
    },

    /// Exec could not be created, started or inspected.
    #[error("Exec failed in container {container}: {message}")]
    Exec {
        /// Container name.
        container: String,
        /// Daemon error text.
        message: String,
    },
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, SandboxError>;

impl SandboxError {
    /// Creates an `InvalidArgument` error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a `Provisioning` error.
    pub fn provisioning(container: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provisioning {
            container: container.into(),
            message: message.into(),
        }
    }

    /// Creates a `NotFound` error.
    pub fn not_found(container: impl Into<String>) -> Self {
        Self::NotFound {
            container: container.into(),
        }
    }

    /// Creates a `Cleanup` error.
    pub fn cleanup(container: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Cleanup {
            container: container.into(),
            message: message.into(),
        }
    }

    /// Creates a `Timeout` error from a `Duration`.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout {
            timeout_secs: duration.as_secs(),
        }
    }

    /// Creates a `DockerUnavailable` error.
    pub fn docker_unavailable(message: impl Into<String>) -> Self {
        Self::DockerUnavailable {
            message: message.into(),
        }
    }

    /// Creates an `Exec` error.
    pub fn exec(container: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Exec {
            container: container.into(),
            message: message.into(),
        }
    }

    /// Returns true if this is an invalid argument error.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// Returns true if this is a provisioning error.
    pub fn is_provisioning(&self) -> bool {
        matches!(self, Self::Provisioning { .. })
    }

    /// Returns true if the container does not exist at the daemon.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this is a cleanup error.
    pub fn is_cleanup(&self) -> bool {
        matches!(self, Self::Cleanup { .. })
    }

    /// Returns true if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true if this is a Docker unavailability error.
    pub fn is_docker_unavailable(&self) -> bool {
        matches!(self, Self::DockerUnavailable { .. })
    }
}
