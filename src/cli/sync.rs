use std::path::Path;

use chrono::{DateTime, Local, NaiveDate};
use colored::Colorize;
use comfy_table::{Cell, Table};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cli::open_ledger;
use crate::db::{record_sync_run, SyncRunLog};
use crate::error::{ChoboError, Result};
use crate::fmt::yen;
use crate::ledger::SqliteLedger;
use crate::models::Record;
use crate::reconciler::{Reconciler, SyncOptions, SyncReport};
use crate::settings::{load_settings, Settings};
use crate::source::{FileSource, MessageSource};

/// Response shape printed by `sync --json`.
#[derive(Debug, Serialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
    pub appended_count: usize,
    pub records: Vec<Record>,
}

#[derive(Debug)]
pub struct SyncRun {
    pub fetched: usize,
    pub report: SyncReport,
}

/// Classified messages from one source, not yet written anywhere.
#[derive(Debug)]
pub struct Batch {
    pub source: String,
    pub fetched: usize,
    pub records: Vec<Record>,
}

/// Fetch and classify. Touches nothing on disk besides the source file.
pub fn fetch_batch(
    settings: &Settings,
    source: &FileSource,
    window_days: u32,
    now: DateTime<Local>,
) -> Result<Batch> {
    let classifier = settings.classifier()?;
    let messages = source.fetch(window_days, now)?;
    let fetched = messages.len();
    let records = classifier.classify_all(messages);
    info!(fetched, window_days, kind = source.kind().key(), "classified messages");
    Ok(Batch {
        source: source.path().display().to_string(),
        fetched,
        records,
    })
}

/// Reconcile a batch into the ledger and log the run in `sync_runs`.
pub fn reconcile_batch(
    conn: &Connection,
    options: SyncOptions,
    batch: Batch,
    today: NaiveDate,
) -> Result<SyncRun> {
    let ledger = SqliteLedger::new(conn);
    let engine = Reconciler::new(&ledger, options);

    match engine.sync(&batch.records, today) {
        Ok(report) => {
            debug!(phases = ?report.completed, "sync finished");
            log_run(conn, &SyncRunLog {
                source: &batch.source,
                partition: Some(report.partition.as_str()),
                fetched: batch.fetched,
                appended: report.appended,
                duplicates: report.duplicates,
                out_of_window: report.out_of_window,
                failed_phase: None,
                error: None,
            });
            Ok(SyncRun {
                fetched: batch.fetched,
                report,
            })
        }
        Err(err) => {
            let failed_phase = match &err {
                ChoboError::Sync { phase, .. } => Some(phase.to_string()),
                _ => None,
            };
            log_run(conn, &SyncRunLog {
                source: &batch.source,
                partition: None,
                fetched: batch.fetched,
                appended: 0,
                duplicates: 0,
                out_of_window: 0,
                failed_phase,
                error: Some(err.to_string()),
            });
            Err(err)
        }
    }
}

// Never changes the sync result; a failed insert only warns.
fn log_run(conn: &Connection, run: &SyncRunLog<'_>) {
    if let Err(e) = record_sync_run(conn, run) {
        warn!(error = %e, source = run.source, "could not record sync run");
    }
}

fn execute(settings: &Settings, file: &str, format: Option<&str>, window_days: u32) -> Result<SyncRun> {
    let options = settings.sync_options()?;
    let source = FileSource::open(Path::new(file), format)?;
    let now = Local::now();
    let batch = fetch_batch(settings, &source, window_days, now)?;
    let conn = open_ledger(settings)?;
    reconcile_batch(&conn, options, batch, now.date_naive())
}

pub fn run(file: &str, format: Option<&str>, days: Option<u32>, json: bool) -> Result<()> {
    let settings = load_settings();
    let window_days = days.unwrap_or(settings.default_window_days);

    let result = execute(&settings, file, format, window_days);

    if json {
        let outcome = match &result {
            Ok(run) => SyncOutcome {
                success: true,
                message: format!(
                    "Successfully processed {} expenses ({} appended to {})",
                    run.fetched, run.report.appended, run.report.partition
                ),
                appended_count: run.report.appended,
                records: run.report.records.clone(),
            },
            Err(e) => SyncOutcome {
                success: false,
                message: format!("Failed to sync expenses: {e}"),
                appended_count: 0,
                records: Vec::new(),
            },
        };
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return result.map(|_| ());
    }

    let run = result?;
    print_report(&run);
    Ok(())
}

fn print_report(run: &SyncRun) {
    let report = &run.report;
    if report.created_partition {
        println!("Created partition {}", report.partition.bold());
    }

    if report.records.is_empty() {
        println!("{}", "Nothing new to append.".yellow());
    } else {
        let mut table = Table::new();
        table.set_header(vec!["Date", "Code", "Content", "Amount"]);
        for record in &report.records {
            table.add_row(vec![
                Cell::new(record.date.format("%Y-%m-%d")),
                Cell::new(record.account_code),
                Cell::new(&record.content),
                Cell::new(yen(record.amount)),
            ]);
        }
        println!("{}\n{table}", report.partition);
    }

    println!(
        "{} fetched, {} appended, {} duplicates, {} outside fiscal year {}",
        run.fetched,
        report.appended.to_string().green(),
        report.duplicates,
        report.out_of_window,
        report.fiscal_year
    );
    if let Some(row) = report.first_row {
        println!("First new row: {row}");
    }
}
