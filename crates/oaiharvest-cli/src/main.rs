//! oaiharvest - CLI tool for OAI-PMH repository exploration.
//!
//! This is a thin wrapper over the `oaiharvest` library, intended for manual
//! protocol exploration and debugging against a repository.

mod cli;
mod commands;
mod output;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.json_logs);

    let config = cli.client.to_config();
    let result = match cli.command {
        Commands::Count(args) => commands::count::run(args, config),
        Commands::Headers(args) => commands::headers::run(args, config),
        Commands::Record(args) => commands::record::run(args, config),
    };

    if let Err(err) = result {
        output::failure(&err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Filter directives for `-v` counts when `RUST_LOG` is unset.
///
/// Harvester crates get one level more detail than the HTTP stack below them.
fn default_directives(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "warn,oaiharvest=info",
        2 => "info,oaiharvest=debug",
        _ => "debug,oaiharvest=trace",
    }
}

/// Install a stderr subscriber, leaving stdout to harvested data.
fn init_logging(verbosity: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbosity)));
    let layer = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_target(false).with_writer(std::io::stderr).boxed()
    };
    tracing_subscriber::registry().with(filter).with(layer).init();
}
