//! polyaffine CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command};
use polyaffine::{LegalizeOptions, PipelineError, legalize_source, print_source, read_input};
use polyaffine_passes::AffineCfgConfig;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli.command) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<(), PipelineError> {
    match command {
        Command::Legalize {
            file,
            max_iterations,
            max_compose_steps,
            no_dce,
            verify,
        } => {
            let source = read_input(&file)?;
            let options = LegalizeOptions {
                config: AffineCfgConfig {
                    max_iterations,
                    run_dce: !no_dce,
                    max_compose_steps,
                },
                verify,
            };
            let output = legalize_source(&source, &file.display().to_string(), options)?;
            print!("{}", output.text);
        }
        Command::Print { file } => {
            let source = read_input(&file)?;
            print!("{}", print_source(&source, &file.display().to_string())?);
        }
    }
    Ok(())
}
