//! `sandpool.toml` configuration.
//!
//! Every field has a default, so a missing file or a partial file is fine.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pool::ReaperConfig;
use crate::sandbox::{SandboxConfig, VolumeMount};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "sandpool.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// `[pool]`
    #[serde(default)]
    pub pool: PoolConfig,
    /// `[docker]`
    #[serde(default)]
    pub docker: DockerConfig,
    /// `[sandbox]`
    #[serde(default)]
    pub sandbox: SandboxDefaults,
}

/// Pool sizing and reclamation timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of active sandboxes
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Evicted sandboxes idle longer than this are destroyed
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Seconds between idle sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Destroy all containers on shutdown. Turning this off leaks them
    /// unless something else tears them down.
    #[serde(default = "default_true")]
    pub close_on_shutdown: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            idle_timeout_secs: default_idle_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            close_on_shutdown: true,
        }
    }
}

impl PoolConfig {
    /// Reaper timing derived from this section.
    pub fn reaper(&self) -> ReaperConfig {
        ReaperConfig {
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            close_on_shutdown: self.close_on_shutdown,
        }
    }
}

/// Docker daemon connection bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Connection attempts before giving up
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    /// Delay before the second attempt; doubles after each failure
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the retry delay
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            connect_retries: default_connect_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

/// Settings applied to every sandbox created from the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxDefaults {
    /// Docker image to use
    #[serde(default = "default_image")]
    pub image: String,

    /// Working directory inside the container
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    /// Keep-alive for the container's main process
    #[serde(default = "default_life_seconds")]
    pub life_seconds: u64,

    /// Mount the root filesystem read-only
    #[serde(default)]
    pub read_only_rootfs: bool,

    /// Run sandboxes with no network
    #[serde(default)]
    pub network_disabled: bool,

    /// User to run as inside the container
    #[serde(default)]
    pub user: Option<String>,

    /// Per-command timeout; unset means wait forever
    #[serde(default)]
    pub exec_timeout_secs: Option<u64>,

    /// Host paths mounted into every sandbox
    #[serde(default)]
    pub mounts: Vec<VolumeMount>,
}

impl Default for SandboxDefaults {
    fn default() -> Self {
        Self {
            image: default_image(),
            work_dir: default_work_dir(),
            life_seconds: default_life_seconds(),
            read_only_rootfs: false,
            network_disabled: false,
            user: None,
            exec_timeout_secs: None,
            mounts: Vec::new(),
        }
    }
}

impl SandboxDefaults {
    /// Build the provisioning config for one agent session.
    pub fn for_session(&self, agent_name: &str, session_id: &str) -> Result<SandboxConfig> {
        let mounts = self
            .mounts
            .iter()
            .map(|m| {
                Ok(VolumeMount {
                    host_path: expand_path(&m.host_path)?,
                    ..m.clone()
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SandboxConfig {
            mounts,
            life_seconds: self.life_seconds,
            work_dir: self.work_dir.clone(),
            read_only_rootfs: self.read_only_rootfs,
            network_disabled: self.network_disabled,
            user: self.user.clone(),
            exec_timeout: self.exec_timeout_secs.map(Duration::from_secs),
            ..SandboxConfig::new(agent_name, session_id, self.image.clone())
        })
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_capacity() -> usize {
    10
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_connect_retries() -> u32 {
    5
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    8000
}

fn default_image() -> String {
    "python:3.12".to_string()
}

fn default_work_dir() -> String {
    "/workspace".to_string()
}

fn default_life_seconds() -> u64 {
    3600
}

/// Expand a leading `~/` to the home directory.
fn expand_path(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir().context("Could not determine home directory")?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

impl Config {
    /// Load configuration from `path`, using defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    /// Reject values the pool cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pool.capacity == 0 {
            bail!("pool.capacity must be >= 1");
        }
        if self.pool.sweep_interval_secs == 0 {
            bail!("pool.sweep_interval_secs must be >= 1");
        }
        if self.sandbox.life_seconds == 0 {
            bail!("sandbox.life_seconds must be >= 1");
        }
        if self.docker.connect_retries == 0 {
            bail!("docker.connect_retries must be >= 1");
        }
        if self.docker.initial_backoff_ms == 0 {
            bail!("docker.initial_backoff_ms must be >= 1");
        }
        if self.docker.max_backoff_ms < self.docker.initial_backoff_ms {
            bail!("docker.max_backoff_ms must be >= docker.initial_backoff_ms");
        }
        if self.sandbox.exec_timeout_secs == Some(0) {
            bail!("sandbox.exec_timeout_secs must be >= 1 when set");
        }
        Ok(())
    }
}
