//! Command-line interface for the affine legalizer.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "polyaffine")]
#[command(about = "Raise index arithmetic, memory accesses and guards into the affine dialect", long_about = None)]
pub struct Cli {
    /// Log filter used when `RUST_LOG` is not set
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Legalize a module and print the result
    Legalize {
        /// Input file, or `-` for standard input
        file: PathBuf,
        /// Maximum greedy rewrite sweeps
        #[arg(long, default_value_t = 10)]
        max_iterations: usize,
        /// Maximum composition rounds per map or set
        #[arg(long, default_value_t = 32)]
        max_compose_steps: usize,
        /// Keep operations left dead by the rewrite
        #[arg(long)]
        no_dce: bool,
        /// Validate the module before and after legalizing
        #[arg(long)]
        verify: bool,
    },
    /// Parse a module and print it back
    Print {
        /// Input file, or `-` for standard input
        file: PathBuf,
    },
}
