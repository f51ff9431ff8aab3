//! `sandpool` command-line entry point.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;

#[derive(Parser)]
#[command(name = "sandpool")]
#[command(
    author,
    version,
    about = "Bounded pool of per-session Docker sandboxes"
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = "SANDPOOL_CONFIG", default_value = sandpool::config::CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve JSON-line sandbox requests on stdin against a long-lived pool
    Serve,

    /// Run a command or file in a session sandbox
    Exec(commands::exec::ExecArgs),

    /// Stop and remove the container of a session
    Remove {
        /// Agent name
        #[arg(long)]
        agent: String,

        /// Session identifier
        #[arg(long)]
        session: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("sandpool=debug")
        } else {
            EnvFilter::new("sandpool=info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Serve => {
            commands::serve::run(&cli.config).await?;
        }
        Commands::Exec(args) => {
            let code = commands::exec::run(&cli.config, args).await?;
            if code != 0 {
                std::process::exit(i32::try_from(code).unwrap_or(1));
            }
        }
        Commands::Remove { agent, session } => {
            commands::remove::run(&cli.config, &agent, &session).await?;
        }
    }

    Ok(())
}
