//! Run one command or file in a session sandbox.
//!
//! The sandbox is provisioned through a single-use pool, so an existing
//! container for the session is restarted and reused rather than duplicated.

use anyhow::{bail, Context, Result};
use clap::Args;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sandpool::config::Config;
use sandpool::{DockerRuntime, ExecOutput, Sandbox, SandboxKey, SandboxPool};

use super::format;

#[derive(Debug, Args)]
pub struct ExecArgs {
    /// Agent name
    #[arg(long)]
    pub agent: String,

    /// Session identifier
    #[arg(long)]
    pub session: String,

    /// Run a file already inside the container instead of a shell command
    #[arg(long)]
    pub file: Option<String>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// Destroy the container afterwards
    #[arg(long)]
    pub rm: bool,

    /// Per-command timeout in seconds, overriding the config
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: Option<u64>,

    /// Shell command, or arguments when --file is given
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// What to run inside the sandbox.
#[derive(Debug, PartialEq, Eq)]
pub enum Invocation {
    Shell(String),
    File { path: String, args: Vec<String> },
}

/// Decide what to run. A single command word is passed to the shell as-is,
/// so `"ls | wc -l"` keeps its pipe; several words are quoted and joined.
pub fn invocation(file: Option<&str>, command: &[String]) -> Result<Invocation> {
    if let Some(path) = file {
        return Ok(Invocation::File {
            path: path.to_string(),
            args: command.to_vec(),
        });
    }

    match command {
        [] => bail!("Nothing to run: pass a command or --file"),
        [single] => Ok(Invocation::Shell(single.clone())),
        words => Ok(Invocation::Shell(shell_words::join(words))),
    }
}

async fn run_invocation(
    sandbox: &Sandbox,
    invocation: &Invocation,
) -> sandpool::sandbox::Result<ExecOutput> {
    match invocation {
        Invocation::Shell(script) => sandbox.bash(script).await,
        Invocation::File { path, args } => sandbox.execute_file(path, args).await,
    }
}

/// Entry point. Returns the command's exit code.
pub async fn run(config_path: &Path, args: ExecArgs) -> Result<i64> {
    let config = Config::load(config_path)?;

    let mut sandbox_config = config.sandbox.for_session(&args.agent, &args.session)?;
    if let Some(secs) = args.timeout {
        sandbox_config.exec_timeout = Some(Duration::from_secs(secs));
    }
    sandbox_config.validate()?;
    let invocation = invocation(args.file.as_deref(), &args.command)?;

    let runtime = DockerRuntime::connect(&config.docker)
        .await
        .context("Failed to connect to Docker")?;
    let pool = SandboxPool::new(Arc::new(runtime), 1)?;
    let key = SandboxKey::new(&args.agent, &args.session);

    let sandbox = pool
        .get_sandbox(&key, Some(&sandbox_config))
        .await
        .with_context(|| format!("Failed to provision sandbox for {key}"))?;

    let result = run_invocation(&sandbox, &invocation).await;

    if args.rm {
        pool.remove_sandbox(&key).await;
    } else {
        pool.clear_pool(false).await;
    }

    let output = result.with_context(|| format!("Command failed in {}", sandbox.container_name()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print!("{}", format::format_exec_output(&output));
    }

    Ok(output.exit_code)
}
