mod catalog;
mod cli;
mod commands;
mod config;
mod model;
mod results;
mod store;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::config::UsageError;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbosity);

    if let Err(err) = run(cli) {
        if let Some(usage) = err.downcast_ref::<UsageError>() {
            error!(error = %usage, "usage error");
            std::process::exit(usage.exit_code);
        }

        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Extract(args) => commands::extract::run(args, cli.verbosity),
        Commands::Score(args) => commands::score::run(args),
        Commands::Status(args) => commands::status::run(args),
    }
}

fn init_tracing(verbosity: u8) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level(verbosity)));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn default_level(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2..=5 => "debug",
        _ => "trace",
    }
}
