//! Keep a sandbox pool and its reaper alive, answering requests on stdin.
//!
//! stdout carries only JSON responses; the banner and shutdown summary go
//! to stderr.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;
use tokio::io::BufReader;

use sandpool::config::Config;
use sandpool::{DockerRuntime, PoolService, Reaper, SandboxPool};

use super::format;

/// Entry point: serves until stdin closes or Ctrl-C, then shuts the pool down.
pub async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;

    let runtime = DockerRuntime::connect(&config.docker)
        .await
        .context("Failed to connect to Docker")?;
    let pool = Arc::new(SandboxPool::new(Arc::new(runtime), config.pool.capacity)?);

    let mut reaper = Reaper::new(Arc::clone(&pool), config.pool.reaper());
    reaper.start();

    let service = PoolService::new(Arc::clone(&pool), config.sandbox.clone());

    eprint!("{}", format::format_banner(&config));
    eprintln!(
        "{} Reading JSON requests from stdin. Ctrl-C or EOF to stop.",
        "ℹ".blue()
    );

    let outcome = tokio::select! {
        served = service.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout()) => {
            served.map(|handled| format!("Input closed after {handled} request(s)."))
        }
        signal = tokio::signal::ctrl_c() => {
            signal
                .context("Failed to listen for Ctrl-C")
                .map(|()| "Interrupted.".to_string())
        }
    };

    eprintln!("\n{} Shutting down...", "⚠".yellow());
    eprint!("{}", format::format_snapshot(&pool.snapshot().await));

    let cleared = reaper.shutdown().await;
    eprintln!(
        "{} Cleared {} sandbox(es) after {} sweep(s).",
        "✓".green(),
        cleared,
        reaper.stats().sweeps()
    );

    let message = outcome?;
    eprintln!("{message}");
    Ok(())
}
