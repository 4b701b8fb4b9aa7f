//! coldstash CLI binary

use clap::Parser;
use coldstash::logging::init_logging;
use coldstash::tooling::cli::{Cli, CliContext};
use std::process;

fn main() {
    let cli = Cli::parse();

    let context = match CliContext::new(cli.config.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            process::exit(1);
        }
    };

    let mut logging = context.config().logging.clone();
    cli.apply_logging_overrides(&mut logging);
    if let Err(e) = init_logging(Some(&logging)) {
        eprintln!("Warning: logging disabled: {}", e);
    }

    match context.execute(&cli.command) {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
