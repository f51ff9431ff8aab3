//! Destroy a session's container outside of any running pool.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use sandpool::config::Config;
use sandpool::{ContainerHandle, ContainerStatus, DockerRuntime};

use super::format;

/// Entry point: stops and removes `<agent>-sandbox-<session>` if it exists.
pub async fn run(config_path: &Path, agent: &str, session: &str) -> Result<()> {
    let config = Config::load(config_path)?;
    let sandbox_config = config.sandbox.for_session(agent, session)?;
    sandbox_config.validate()?;

    let runtime = DockerRuntime::connect(&config.docker)
        .await
        .context("Failed to connect to Docker")?;
    let container = ContainerHandle::new(
        Arc::new(runtime),
        sandbox_config.container_name(),
        sandbox_config.container_options(),
    );

    let before = container.status().await?;
    let removed = match before {
        ContainerStatus::Absent => false,
        ContainerStatus::Running | ContainerStatus::Stopped => container.close().await,
    };

    print!("{}", format::format_removed(container.name(), before, removed));
    Ok(())
}
