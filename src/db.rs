use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS partitions (
    name TEXT PRIMARY KEY,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS cells (
    partition TEXT NOT NULL,
    row INTEGER NOT NULL,
    col INTEGER NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (partition, row, col),
    FOREIGN KEY (partition) REFERENCES partitions(name)
);

CREATE TABLE IF NOT EXISTS sync_runs (
    id INTEGER PRIMARY KEY,
    run_at TEXT DEFAULT (datetime('now')),
    source TEXT NOT NULL,
    partition TEXT,
    fetched INTEGER NOT NULL DEFAULT 0,
    appended INTEGER NOT NULL DEFAULT 0,
    duplicates INTEGER NOT NULL DEFAULT 0,
    out_of_window INTEGER NOT NULL DEFAULT 0,
    failed_phase TEXT,
    error TEXT
);
";

/// Header block seeded into a fresh template partition: (row, col, value).
const DEFAULT_TEMPLATE: &[(u32, usize, &str)] = &[
    (1, 0, "経費帳"),
    (3, 0, "会社名"),
    (4, 0, "会計期間"),
    (6, 0, "日付"),
    (6, 7, "科目コード"),
    (6, 12, "摘要"),
    (6, 14, "金額"),
];

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Create the template partition with a default header if it does not exist yet.
pub fn seed_template(conn: &Connection, template: &str) -> Result<bool> {
    let exists: bool = conn
        .prepare("SELECT 1 FROM partitions WHERE name = ?1")?
        .exists([template])?;
    if exists {
        return Ok(false);
    }
    conn.execute("INSERT INTO partitions (name) VALUES (?1)", [template])?;
    for (row, col, value) in DEFAULT_TEMPLATE {
        conn.execute(
            "INSERT INTO cells (partition, row, col, value) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![template, row, *col as i64, value],
        )?;
    }
    Ok(true)
}

pub struct SyncRunLog<'a> {
    pub source: &'a str,
    pub partition: Option<&'a str>,
    pub fetched: usize,
    pub appended: usize,
    pub duplicates: usize,
    pub out_of_window: usize,
    pub failed_phase: Option<String>,
    pub error: Option<String>,
}

pub fn record_sync_run(conn: &Connection, run: &SyncRunLog<'_>) -> Result<()> {
    conn.execute(
        "INSERT INTO sync_runs (source, partition, fetched, appended, duplicates, out_of_window, failed_phase, error) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            run.source,
            run.partition,
            run.fetched as i64,
            run.appended as i64,
            run.duplicates as i64,
            run.out_of_window as i64,
            run.failed_phase,
            run.error,
        ],
    )?;
    Ok(())
}

pub struct LastSync {
    pub run_at: String,
    pub partition: Option<String>,
    pub appended: i64,
    pub failed_phase: Option<String>,
}

pub fn last_sync_run(conn: &Connection) -> Result<Option<LastSync>> {
    let mut stmt = conn.prepare(
        "SELECT run_at, partition, appended, failed_phase FROM sync_runs ORDER BY id DESC LIMIT 1",
    )?;
    let mut rows = stmt.query_map([], |row| {
        Ok(LastSync {
            run_at: row.get(0)?,
            partition: row.get(1)?,
            appended: row.get(2)?,
            failed_phase: row.get(3)?,
        })
    })?;
    let last = rows.next().transpose()?;
    Ok(last)
}
