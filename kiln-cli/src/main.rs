//! # kiln CLI
//!
//! Command-line interface for the kiln incremental compiler.

mod commands;
mod rules_file;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "kiln.yml")]
    config: PathBuf,

    /// Path to rules file
    #[arg(long, default_value = "rules.yml")]
    rules: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile everything that is outdated
    Build {
        /// Recompile items matching this glob even if up to date
        #[arg(long)]
        force: Option<String>,
    },

    /// Show which reps are outdated and why, without compiling
    Status,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Build { force } => {
            commands::build::run(&cli.config, &cli.rules, force.as_deref())
        }
        Commands::Status => commands::status::run(&cli.config, &cli.rules),
    }
}
