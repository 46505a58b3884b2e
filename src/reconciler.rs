use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::dedup::DuplicateDetector;
use crate::error::{ChoboError, Result};
use crate::fiscal::{FiscalCalendar, FiscalYear};
use crate::ledger::LedgerSink;
use crate::models::{Record, Row, RowRange};

/// Rows 1..=HEADER_ROWS of every partition mirror the template partition.
pub const HEADER_ROWS: u32 = 6;
pub const DATA_START_ROW: u32 = HEADER_ROWS + 1;

pub const DEFAULT_TEMPLATE_PARTITION: &str = "テンプレート";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    ResolvePartition,
    ReplicateHeader,
    ReadExisting,
    FilterWindow,
    Order,
    Deduplicate,
    Layout,
    Append,
}

impl SyncPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResolvePartition => "resolve_partition",
            Self::ReplicateHeader => "replicate_header",
            Self::ReadExisting => "read_existing",
            Self::FilterWindow => "filter_window",
            Self::Order => "order",
            Self::Deduplicate => "deduplicate",
            Self::Layout => "layout",
            Self::Append => "append",
        }
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub calendar: FiscalCalendar,
    pub template_partition: String,
    pub detector: DuplicateDetector,
    /// Compare later records in a batch against the ones already accepted from it.
    pub dedup_within_batch: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            calendar: FiscalCalendar::default(),
            template_partition: DEFAULT_TEMPLATE_PARTITION.to_string(),
            detector: DuplicateDetector::default(),
            dedup_within_batch: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncReport {
    pub fiscal_year: FiscalYear,
    pub partition: String,
    pub created_partition: bool,
    pub appended: usize,
    /// Row the first appended record landed on; `None` when nothing was written.
    pub first_row: Option<u32>,
    pub out_of_window: usize,
    pub duplicates: usize,
    pub records: Vec<Record>,
    pub completed: Vec<SyncPhase>,
}

/// Tracks which phases finished so a failure can say where it stopped.
struct Progress {
    completed: Vec<SyncPhase>,
}

impl Progress {
    fn run<T>(&mut self, phase: SyncPhase, step: impl FnOnce() -> Result<T>) -> Result<T> {
        debug!(%phase, "sync phase started");
        match step() {
            Ok(value) => {
                self.completed.push(phase);
                Ok(value)
            }
            Err(source) => {
                warn!(%phase, error = %source, "sync phase failed");
                Err(ChoboError::Sync {
                    phase,
                    completed: self.completed.clone(),
                    source: Box::new(source),
                })
            }
        }
    }
}

/// Merges classified records into the fiscal partition for "today".
pub struct Reconciler<'s, S: LedgerSink + ?Sized> {
    sink: &'s S,
    options: SyncOptions,
}

impl<'s, S: LedgerSink + ?Sized> Reconciler<'s, S> {
    pub fn new(sink: &'s S, options: SyncOptions) -> Self {
        Self { sink, options }
    }

    pub fn sync(&self, records: &[Record], today: NaiveDate) -> Result<SyncReport> {
        let layout = self.options.detector.layout;
        let width = layout.width;
        let mut progress = Progress {
            completed: Vec::new(),
        };

        let fiscal_year = self.options.calendar.resolve_current_label(today);
        let partition = fiscal_year.partition_name();

        let created_partition = progress.run(SyncPhase::ResolvePartition, || {
            if self.sink.partition_exists(&partition)? {
                return Ok(false);
            }
            self.sink.create_partition(&partition)?;
            info!(%partition, "created fiscal partition");
            Ok(true)
        })?;

        progress.run(SyncPhase::ReplicateHeader, || {
            let header_range = RowRange::bounded(1, HEADER_ROWS, width);
            let mut header = self
                .sink
                .read_range(&self.options.template_partition, header_range)?;
            header.resize(HEADER_ROWS as usize, Vec::new());
            for row in &mut header {
                row.resize(width, String::new());
            }
            self.sink.write_range(&partition, header_range, &header)
        })?;

        let existing = progress.run(SyncPhase::ReadExisting, || {
            self.sink
                .read_range(&partition, RowRange::open(DATA_START_ROW, width))
        })?;
        let existing_rows = existing.len();
        debug!(%partition, existing_rows, "read existing data region");

        let mut candidates = progress.run(SyncPhase::FilterWindow, || {
            Ok(records
                .iter()
                .filter(|r| fiscal_year.contains(r.date))
                .cloned()
                .collect::<Vec<_>>())
        })?;
        let out_of_window = records.len() - candidates.len();

        progress.run(SyncPhase::Order, || {
            candidates.sort_by_key(|r| r.date);
            Ok(())
        })?;

        let detector = self.options.detector;
        let (accepted, duplicates) = progress.run(SyncPhase::Deduplicate, || {
            let mut known: Vec<Row> = existing;
            let mut accepted = Vec::with_capacity(candidates.len());
            let mut duplicates = 0usize;
            for record in candidates {
                if detector.is_duplicate(&record, &known) {
                    duplicates += 1;
                    continue;
                }
                if self.options.dedup_within_batch {
                    known.push(layout.to_row(&record));
                }
                accepted.push(record);
            }
            Ok((accepted, duplicates))
        })?;

        let rows = progress.run(SyncPhase::Layout, || {
            Ok(accepted.iter().map(|r| layout.to_row(r)).collect::<Vec<_>>())
        })?;

        let first_row = progress.run(SyncPhase::Append, || {
            if rows.is_empty() {
                return Ok(None);
            }
            let after = HEADER_ROWS + existing_rows as u32;
            self.sink.append_rows(&partition, after, &rows).map(Some)
        })?;

        info!(
            %partition,
            appended = accepted.len(),
            duplicates,
            out_of_window,
            "sync complete"
        );

        Ok(SyncReport {
            fiscal_year,
            partition,
            created_partition,
            appended: accepted.len(),
            first_row,
            out_of_window,
            duplicates,
            records: accepted,
            completed: progress.completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use rusqlite::Connection;

    use super::*;
    use crate::db::{get_connection, init_db, seed_template};
    use crate::dedup::DedupKey;
    use crate::ledger::SqliteLedger;
    use crate::models::RowLayout;

    fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        seed_template(&conn, DEFAULT_TEMPLATE_PARTITION).unwrap();
        (dir, conn)
    }

    fn d(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    fn record(date: &str, amount: i64, content: &str, code: i64) -> Record {
        Record {
            date: d(date),
            amount,
            content: content.to_string(),
            account_code: code,
        }
    }

    fn data_rows(ledger: &SqliteLedger, partition: &str) -> Vec<Row> {
        ledger
            .read_range(partition, RowRange::open(DATA_START_ROW, 15))
            .unwrap()
    }

    /// Wraps a real ledger, counting calls and optionally failing one of them.
    struct SpySink<'c> {
        inner: SqliteLedger<'c>,
        fail_on: Option<&'static str>,
        creates: Cell<usize>,
        writes: Cell<usize>,
        reads: RefCell<Vec<String>>,
        appends: Cell<usize>,
    }

    impl<'c> SpySink<'c> {
        fn new(conn: &'c Connection) -> Self {
            Self {
                inner: SqliteLedger::new(conn),
                fail_on: None,
                creates: Cell::new(0),
                writes: Cell::new(0),
                reads: RefCell::new(Vec::new()),
                appends: Cell::new(0),
            }
        }

        fn check(&self, call: &'static str) -> Result<()> {
            if self.fail_on == Some(call) {
                Err(ChoboError::Io(std::io::Error::other(format!("{call} unavailable"))))
            } else {
                Ok(())
            }
        }
    }

    impl LedgerSink for SpySink<'_> {
        fn partition_exists(&self, name: &str) -> Result<bool> {
            self.check("exists")?;
            self.inner.partition_exists(name)
        }

        fn create_partition(&self, name: &str) -> Result<()> {
            self.check("create")?;
            self.creates.set(self.creates.get() + 1);
            self.inner.create_partition(name)
        }

        fn read_range(&self, name: &str, range: RowRange) -> Result<Vec<Row>> {
            self.reads.borrow_mut().push(name.to_string());
            if name != DEFAULT_TEMPLATE_PARTITION {
                self.check("read_data")?;
            }
            self.inner.read_range(name, range)
        }

        fn write_range(&self, name: &str, range: RowRange, grid: &[Row]) -> Result<()> {
            self.check("write")?;
            self.writes.set(self.writes.get() + 1);
            self.inner.write_range(name, range, grid)
        }

        fn append_rows(&self, name: &str, after_row: u32, grid: &[Row]) -> Result<u32> {
            self.check("append")?;
            self.appends.set(self.appends.get() + 1);
            self.inner.append_rows(name, after_row, grid)
        }
    }

    #[test]
    fn test_taxi_scenario() {
        let (_dir, conn) = test_db();
        let ledger = SqliteLedger::new(&conn);
        let engine = Reconciler::new(&ledger, SyncOptions::default());
        let records = vec![record("2024-09-05", 1200, "タクシー代", 722)];

        let report = engine.sync(&records, d("2024-09-20")).unwrap();

        assert_eq!(report.partition, "2024年度");
        assert!(report.created_partition);
        assert_eq!(report.appended, 1);
        assert_eq!(report.first_row, Some(DATA_START_ROW));
        let rows = data_rows(&ledger, "2024年度");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "2024-09-05");
        assert_eq!(rows[0][7], "722");
        assert_eq!(rows[0][12], "タクシー代");
        assert_eq!(rows[0][14], "1200");
    }

    #[test]
    fn test_header_copied_from_template() {
        let (_dir, conn) = test_db();
        let ledger = SqliteLedger::new(&conn);
        let engine = Reconciler::new(&ledger, SyncOptions::default());
        engine.sync(&[], d("2024-09-20")).unwrap();

        let header = RowRange::bounded(1, HEADER_ROWS, 15);
        let template = ledger.read_range(DEFAULT_TEMPLATE_PARTITION, header).unwrap();
        let copied = ledger.read_range("2024年度", header).unwrap();
        assert!(!template.is_empty());
        assert_eq!(template, copied);
    }

    #[test]
    fn test_header_drift_is_repaired() {
        let (_dir, conn) = test_db();
        let ledger = SqliteLedger::new(&conn);
        ledger.create_partition("2024年度").unwrap();
        ledger
            .write_range(
                "2024年度",
                RowRange::bounded(1, 2, 15),
                &[vec!["stale".to_string()], vec!["junk".to_string(), "x".to_string()]],
            )
            .unwrap();
        let engine = Reconciler::new(&ledger, SyncOptions::default());
        let report = engine.sync(&[], d("2024-10-01")).unwrap();
        assert!(!report.created_partition);

        let header = RowRange::bounded(1, HEADER_ROWS, 15);
        assert_eq!(
            ledger.read_range(DEFAULT_TEMPLATE_PARTITION, header).unwrap(),
            ledger.read_range("2024年度", header).unwrap()
        );
    }

    #[test]
    fn test_second_sync_appends_nothing() {
        let (_dir, conn) = test_db();
        let ledger = SqliteLedger::new(&conn);
        let engine = Reconciler::new(&ledger, SyncOptions::default());
        let records = vec![
            record("2024-09-05", 1200, "タクシー代", 722),
            record("2024-09-06", 3000, "会議費", 737),
        ];
        assert_eq!(engine.sync(&records, d("2024-09-20")).unwrap().appended, 2);
        let second = engine.sync(&records, d("2024-09-21")).unwrap();
        assert_eq!(second.appended, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(second.first_row, None);
        assert_eq!(data_rows(&ledger, "2024年度").len(), 2);
    }

    #[test]
    fn test_records_outside_window_are_dropped() {
        let (_dir, conn) = test_db();
        let ledger = SqliteLedger::new(&conn);
        let engine = Reconciler::new(&ledger, SyncOptions::default());
        let records = vec![
            record("2024-05-10", 500, "文具", 728),
            record("2024-09-02", 800, "電車", 722),
        ];
        let report = engine.sync(&records, d("2024-09-15")).unwrap();
        assert_eq!(report.out_of_window, 1);
        assert_eq!(report.appended, 1);
        assert!(!ledger.partition_exists("2023年度").unwrap());
        let rows = data_rows(&ledger, "2024年度");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "2024-09-02");
    }

    #[test]
    fn test_appends_in_date_order_keeping_ties_stable() {
        let (_dir, conn) = test_db();
        let ledger = SqliteLedger::new(&conn);
        let engine = Reconciler::new(&ledger, SyncOptions::default());
        let records = vec![
            record("2024-03-02", 100, "バス", 722),
            record("2024-03-01", 200, "電車", 722),
            record("2024-03-01", 200, "新幹線", 722),
        ];
        let report = engine.sync(&records, d("2024-03-10")).unwrap();
        assert_eq!(report.partition, "2023年度");
        assert_eq!(report.appended, 3);
        let rows = data_rows(&ledger, "2023年度");
        let order: Vec<(&str, &str)> = rows.iter().map(|r| (r[0].as_str(), r[12].as_str())).collect();
        assert_eq!(
            order,
            vec![("2024-03-01", "電車"), ("2024-03-01", "新幹線"), ("2024-03-02", "バス")]
        );
    }

    #[test]
    fn test_batch_dedup_option() {
        let (_dir, conn) = test_db();
        let ledger = SqliteLedger::new(&conn);
        let options = SyncOptions {
            dedup_within_batch: true,
            ..SyncOptions::default()
        };
        let engine = Reconciler::new(&ledger, options);
        let records = vec![
            record("2024-03-01", 200, "電車", 722),
            record("2024-03-01", 200, "新幹線", 722),
        ];
        let report = engine.sync(&records, d("2024-03-10")).unwrap();
        assert_eq!(report.appended, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.records[0].content, "電車");
    }

    #[test]
    fn test_content_key_keeps_same_amount_different_content() {
        let (_dir, conn) = test_db();
        let ledger = SqliteLedger::new(&conn);
        let engine = Reconciler::new(&ledger, SyncOptions::default());
        engine
            .sync(&[record("2024-03-01", 200, "電車", 722)], d("2024-03-10"))
            .unwrap();

        let options = SyncOptions {
            detector: DuplicateDetector::new(DedupKey::DateCodeAmountContent, RowLayout::default()),
            ..SyncOptions::default()
        };
        let engine = Reconciler::new(&ledger, options);
        let report = engine
            .sync(&[record("2024-03-01", 200, "新幹線", 722)], d("2024-03-10"))
            .unwrap();
        assert_eq!(report.appended, 1);
    }

    #[test]
    fn test_short_existing_row_counts_as_duplicate() {
        let (_dir, conn) = test_db();
        let ledger = SqliteLedger::new(&conn);
        ledger.create_partition("2024年度").unwrap();
        let short: Row = ["2024/9/5", "", "", "", "", "", "", "722", "", "", "", "", "タクシー代", "", "¥1,200"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        ledger.append_rows("2024年度", HEADER_ROWS, &[short[..8].to_vec(), short]).unwrap();

        let engine = Reconciler::new(&ledger, SyncOptions::default());
        let records = vec![
            record("2024-09-05", 1200, "タクシー代", 722),
            record("2024-09-05", 0, "", 722),
        ];
        let report = engine.sync(&records, d("2024-09-20")).unwrap();
        assert_eq!(report.duplicates, 2);
        assert_eq!(report.appended, 0);
    }

    #[test]
    fn test_appends_after_last_existing_row() {
        let (_dir, conn) = test_db();
        let ledger = SqliteLedger::new(&conn);
        let engine = Reconciler::new(&ledger, SyncOptions::default());
        engine
            .sync(
                &[record("2024-09-01", 100, "電車", 722), record("2024-09-02", 100, "バス", 722)],
                d("2024-09-20"),
            )
            .unwrap();
        let report = engine
            .sync(&[record("2024-09-05", 1200, "タクシー代", 722)], d("2024-09-20"))
            .unwrap();
        assert_eq!(report.first_row, Some(DATA_START_ROW + 2));
    }

    #[test]
    fn test_sink_round_trips_are_batched() {
        let (_dir, conn) = test_db();
        let sink = SpySink::new(&conn);
        let engine = Reconciler::new(&sink, SyncOptions::default());
        let records = vec![
            record("2024-09-05", 1200, "タクシー代", 722),
            record("2024-09-06", 300, "文具", 728),
        ];
        engine.sync(&records, d("2024-09-20")).unwrap();
        assert_eq!(sink.creates.get(), 1);
        assert_eq!(sink.writes.get(), 1);
        assert_eq!(sink.appends.get(), 1);
        assert_eq!(
            *sink.reads.borrow(),
            vec![DEFAULT_TEMPLATE_PARTITION.to_string(), "2024年度".to_string()]
        );

        engine.sync(&records, d("2024-09-20")).unwrap();
        assert_eq!(sink.creates.get(), 1);
        assert_eq!(sink.writes.get(), 2);
        assert_eq!(sink.appends.get(), 1);
    }

    #[test]
    fn test_failure_reports_phase_and_progress() {
        let (_dir, conn) = test_db();
        let mut sink = SpySink::new(&conn);
        sink.fail_on = Some("read_data");
        let engine = Reconciler::new(&sink, SyncOptions::default());
        let err = engine
            .sync(&[record("2024-09-05", 1200, "タクシー代", 722)], d("2024-09-20"))
            .unwrap_err();
        match err {
            ChoboError::Sync { phase, completed, .. } => {
                assert_eq!(phase, SyncPhase::ReadExisting);
                assert_eq!(completed, vec![SyncPhase::ResolvePartition, SyncPhase::ReplicateHeader]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sink.writes.get(), 1);
        assert_eq!(sink.appends.get(), 0);
    }

    #[test]
    fn test_failure_before_any_mutation() {
        let (_dir, conn) = test_db();
        let mut sink = SpySink::new(&conn);
        sink.fail_on = Some("exists");
        let engine = Reconciler::new(&sink, SyncOptions::default());
        let err = engine.sync(&[], d("2024-09-20")).unwrap_err();
        assert!(matches!(
            err,
            ChoboError::Sync { phase: SyncPhase::ResolvePartition, .. }
        ));
        assert_eq!(sink.creates.get(), 0);
        assert_eq!(sink.writes.get(), 0);
    }

    #[test]
    fn test_missing_template_fails_header_phase() {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        let ledger = SqliteLedger::new(&conn);
        let engine = Reconciler::new(&ledger, SyncOptions::default());
        let err = engine.sync(&[], d("2024-09-20")).unwrap_err();
        assert!(matches!(
            err,
            ChoboError::Sync { phase: SyncPhase::ReplicateHeader, .. }
        ));
        assert!(err.to_string().contains("replicate_header"));
    }

    #[test]
    fn test_wide_layout_writes_31_columns() {
        let (_dir, conn) = test_db();
        let ledger = SqliteLedger::new(&conn);
        let options = SyncOptions {
            detector: DuplicateDetector::new(DedupKey::DateCodeAmount, RowLayout::with_width(31)),
            ..SyncOptions::default()
        };
        let engine = Reconciler::new(&ledger, options);
        let report = engine
            .sync(&[record("2024-09-05", 1200, "タクシー代", 722)], d("2024-09-20"))
            .unwrap();
        assert_eq!(report.appended, 1);
        let again = engine
            .sync(&[record("2024-09-05", 1200, "タクシー代", 722)], d("2024-09-20"))
            .unwrap();
        assert_eq!(again.appended, 0);
    }
}
