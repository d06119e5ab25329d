mod cli;
mod commands;
mod config;
mod error;
mod logging;

use crate::cli::{Cli, Commands};
use crate::error::Result;
use clap::Parser;
use tracing::debug;

fn main() {
    if let Err(error) = run_app() {
        eprintln!("Error: {}", error);
        std::process::exit(1);
    }
}

fn run_app() -> Result<()> {
    let cli = Cli::parse();
    logging::setup_logging(cli.verbose, cli.quiet, cli.log_file.clone())?;
    debug!("parsed CLI arguments: {:?}", &cli);

    let options = config::resolve_options(cli.config.as_deref(), &cli.parser_flags)?;
    match &cli.command {
        Commands::Info(args) => commands::info::run(args, &options),
        Commands::Convert(args) => commands::convert::run(args, &options),
        Commands::Assembly(args) => commands::assembly::run(args, &options),
    }
}
