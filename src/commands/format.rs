//! Pure output formatting for CLI commands.

use colored::Colorize;
use std::fmt::Write;

use sandpool::config::Config;
use sandpool::{ContainerStatus, ExecOutput, PoolEntryInfo};

/// Startup banner for `serve`.
pub fn format_banner(config: &Config) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n{}", "━".repeat(50).dimmed());
    let _ = writeln!(out, "{}", "   Sandbox pool".yellow().bold());
    let _ = writeln!(out, "{}", "━".repeat(50).dimmed());
    let _ = writeln!(
        out,
        "  Capacity:     {}",
        config.pool.capacity.to_string().cyan()
    );
    let _ = writeln!(
        out,
        "  Idle timeout: {}",
        format!("{}s", config.pool.idle_timeout_secs).cyan()
    );
    let _ = writeln!(
        out,
        "  Sweep every:  {}",
        format!("{}s", config.pool.sweep_interval_secs).cyan()
    );
    let _ = writeln!(out, "  Image:        {}", config.sandbox.image.cyan());
    let _ = writeln!(out, "  Requests:     {}", "JSON lines on stdin".cyan());
    let _ = writeln!(out, "{}", "━".repeat(50).dimmed());
    out
}

/// Human-readable result of a sandbox command.
pub fn format_exec_output(output: &ExecOutput) -> String {
    let mut out = String::new();
    out.push_str(&output.stdout);
    if !output.stderr.is_empty() {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        let _ = write!(out, "{}", output.stderr.red());
    }
    if !output.success() {
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        let _ = writeln!(
            out,
            "{} exited with code {}",
            "✗".red(),
            output.exit_code.to_string().red().bold()
        );
    }
    out
}

/// Outcome of `remove` for a container in the given prior state.
pub fn format_removed(container: &str, before: ContainerStatus, removed: bool) -> String {
    match (before, removed) {
        (ContainerStatus::Absent, _) => {
            format!("{} No container named {}\n", "ℹ".blue(), container.cyan())
        }
        (_, true) => format!("{} Removed {}\n", "✓".green(), container.cyan()),
        (_, false) => format!(
            "{} Could not remove {} (see logs)\n",
            "✗".red(),
            container.cyan()
        ),
    }
}

/// One line per pooled sandbox, for the shutdown summary.
pub fn format_snapshot(entries: &[PoolEntryInfo]) -> String {
    let mut out = String::new();
    if entries.is_empty() {
        let _ = writeln!(out, "{} Pool is empty.", "ℹ".blue());
        return out;
    }
    for entry in entries {
        let _ = writeln!(
            out,
            "  {:<8} {:<40} uses={:<4} idle={:.0}s",
            entry.tier.to_string(),
            entry.container_name,
            entry.access_count,
            entry.idle_seconds
        );
    }
    out
}
