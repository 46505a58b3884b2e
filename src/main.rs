mod classifier;
mod cli;
mod db;
mod dedup;
mod error;
mod fiscal;
mod fmt;
mod ledger;
mod models;
mod reconciler;
mod settings;
mod source;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands, RulesCommands};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Sync {
            file,
            format,
            days,
            json,
        } => cli::sync::run(&file, format.as_deref(), days, json),
        Commands::Classify { text } => cli::classify::run(&text),
        Commands::Rules { command } => match command {
            RulesCommands::List => cli::rules::list(),
        },
        Commands::Partitions => cli::partitions::list(),
        Commands::Show { label } => cli::partitions::show(&label),
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
