use crate::cli::open_ledger;
use crate::db::last_sync_run;
use crate::error::Result;
use crate::ledger::SqliteLedger;
use crate::settings::{load_settings, settings_file_exists};

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = settings.ledger_path();

    println!(
        "Settings:   {}",
        if settings_file_exists() { "saved" } else { "(defaults; run `chobo init` to save)" }
    );
    println!("Data dir:   {}", settings.data_dir);
    println!("Ledger:     {}", db_path.display());
    let options = settings.sync_options()?;
    let current = options.calendar.resolve_current_label(chrono::Local::now().date_naive());
    println!(
        "Fiscal year starts in month {} (current: {})",
        options.calendar.start_month(),
        current.partition_name()
    );
    println!("Template:   {}", settings.template_partition);
    println!("Row width:  {}", settings.row_width);

    if !db_path.exists() {
        println!();
        println!("Ledger not found. Run `chobo init` to set up.");
        return Ok(());
    }

    let conn = open_ledger(&settings)?;
    let partitions = SqliteLedger::new(&conn).list_partitions()?;
    println!();
    println!("Partitions: {}", partitions.len());

    match last_sync_run(&conn)? {
        Some(last) => {
            let target = last.partition.as_deref().unwrap_or("-");
            match last.failed_phase {
                Some(phase) => println!("Last sync:  {} FAILED during {phase}", last.run_at),
                None => println!("Last sync:  {} appended {} to {target}", last.run_at, last.appended),
            }
        }
        None => println!("Last sync:  never"),
    }
    Ok(())
}
