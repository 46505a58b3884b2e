pub mod classify;
pub mod init;
pub mod partitions;
pub mod rules;
pub mod status;
pub mod sync;

use clap::{Parser, Subcommand};
use rusqlite::Connection;

use crate::db::{get_connection, init_db, seed_template};
use crate::error::Result;
use crate::settings::Settings;

/// Open the ledger database, creating the schema and template partition if needed.
pub(crate) fn open_ledger(settings: &Settings) -> Result<Connection> {
    std::fs::create_dir_all(&settings.data_dir)?;
    let conn = get_connection(&settings.ledger_path())?;
    init_db(&conn)?;
    seed_template(&conn, &settings.template_partition)?;
    Ok(conn)
}

#[derive(Parser)]
#[command(name = "chobo", about = "Sync chat-posted expense messages into a fiscal-year ledger.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up chobo: choose a data directory and initialize the ledger.
    Init {
        /// Path for chobo data (default: ~/Documents/chobo)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Classify and append new expense messages to the current fiscal partition.
    Sync {
        /// Message export to read (Slack channel JSON or CSV)
        file: String,
        /// Source format key: slack_export, csv (default: from file extension)
        #[arg(long)]
        format: Option<String>,
        /// Lookback window in days (default: from settings)
        #[arg(long)]
        days: Option<u32>,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the account code a piece of text would be filed under.
    Classify {
        /// Message content, e.g. 'タクシー代'
        text: String,
    },
    /// Inspect the keyword rule table.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// List fiscal partitions in the ledger.
    Partitions,
    /// Print the data rows of one fiscal partition.
    Show {
        /// Fiscal year label or partition name, e.g. 2024 or 2024年度
        label: String,
    },
    /// Show settings, ledger location and the last sync.
    Status,
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// List the active keyword rules in match order.
    List,
}
