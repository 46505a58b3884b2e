use comfy_table::{Cell, Table};

use crate::cli::open_ledger;
use crate::dedup::normalize_number;
use crate::error::{ChoboError, Result};
use crate::fmt::yen;
use crate::ledger::{LedgerSink, SqliteLedger};
use crate::models::{RowLayout, RowRange};
use crate::reconciler::{DATA_START_ROW, HEADER_ROWS};
use crate::settings::load_settings;

pub fn list() -> Result<()> {
    let settings = load_settings();
    let conn = open_ledger(&settings)?;
    let ledger = SqliteLedger::new(&conn);

    let mut table = Table::new();
    table.set_header(vec!["Partition", "Data rows"]);
    for (name, last_row) in ledger.list_partitions()? {
        let data_rows = (last_row - i64::from(HEADER_ROWS)).max(0);
        let label = if name == settings.template_partition {
            format!("{name} (template)")
        } else {
            name
        };
        table.add_row(vec![Cell::new(label), Cell::new(data_rows)]);
    }
    println!("Partitions\n{table}");
    Ok(())
}

pub fn show(label: &str) -> Result<()> {
    let settings = load_settings();
    let options = settings.sync_options()?;
    let fiscal_year = options
        .calendar
        .parse_label(label)
        .ok_or_else(|| ChoboError::UnknownPartition(label.to_string()))?;
    let partition = fiscal_year.partition_name();

    let conn = open_ledger(&settings)?;
    let ledger = SqliteLedger::new(&conn);
    if !ledger.partition_exists(&partition)? {
        return Err(ChoboError::UnknownPartition(partition));
    }

    let layout: RowLayout = options.detector.layout;
    let rows = ledger.read_range(&partition, RowRange::open(DATA_START_ROW, layout.width))?;

    let mut table = Table::new();
    table.set_header(vec!["Row", "Date", "Code", "Content", "Amount"]);
    let mut total = 0i64;
    for (i, row) in rows.iter().enumerate() {
        let row = layout.pad(row);
        let amount = normalize_number(&row[layout.amount_col]);
        total += amount;
        table.add_row(vec![
            Cell::new(DATA_START_ROW as usize + i),
            Cell::new(&row[layout.date_col]),
            Cell::new(&row[layout.code_col]),
            Cell::new(&row[layout.content_col]),
            Cell::new(yen(amount)),
        ]);
    }
    println!(
        "{partition} ({} to {})\n{table}",
        fiscal_year.window_start(),
        fiscal_year.window_end().pred_opt().unwrap_or(fiscal_year.window_end())
    );
    println!("{} rows, total {}", rows.len(), yen(total));
    Ok(())
}
