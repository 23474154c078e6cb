//! MiniBit CLI - run a tracker, a peer agent, or a whole local swarm

mod commands;

use std::path::PathBuf;

use clap::Parser;
use minibit_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "minibit")]
#[command(about = "A small BitTorrent-style file distribution swarm")]
struct Cli {
    /// Console log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: CliLogLevel,

    /// Directory for per-process trace logs
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(
        cli.log_level.as_tracing_level(),
        cli.logs_dir.as_deref(),
        &cli.command.role(),
    )
    .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    commands::handle_command(cli.command).await
}
