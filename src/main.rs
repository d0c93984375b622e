//! `realitymarble` command-line entry point.
use anyhow::Result;
use clap::Parser;

use realitymarble::cli::{Cli, Command};
use realitymarble::{commands, logging};

fn main() -> Result<()> {
    let _ = enable_ansi_support::enable_ansi_support();
    let args = Cli::parse();

    match &args.command {
        // The elevated child's stdout carries only its JSON reply.
        Command::RunElevated(opts) => commands::elevated::run(opts),
        Command::Completions(opts) => {
            commands::completions::run(opts);
            Ok(())
        }
        command => {
            let Some((verb, files)) = command.verb() else {
                return Ok(());
            };
            logging::init_subscriber(args.global.debug, verb, &args.global.reality_marble);
            let log = logging::Logger::new(verb);
            commands::verb::run(&args.global, verb, files, &log)
        }
    }
}
