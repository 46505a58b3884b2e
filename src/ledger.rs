use rusqlite::Connection;

use crate::error::{ChoboError, Result};
use crate::models::{Row, RowRange};

/// Spreadsheet-like store holding one sheet per fiscal partition.
///
/// Rows are 1-based, columns 0-based. Reads return rows from the start of the
/// requested range up to its last non-empty row, each with trailing blank cells
/// trimmed, so callers must tolerate short rows.
pub trait LedgerSink {
    fn partition_exists(&self, name: &str) -> Result<bool>;

    fn create_partition(&self, name: &str) -> Result<()>;

    fn read_range(&self, name: &str, range: RowRange) -> Result<Vec<Row>>;

    /// Overwrite `range`: every cell in it is cleared, then `grid` is written from `range.first`.
    fn write_range(&self, name: &str, range: RowRange, grid: &[Row]) -> Result<()>;

    /// Append below `after_row` (or below the last used row, if that is further down).
    /// Returns the row number the first appended row landed on.
    fn append_rows(&self, name: &str, after_row: u32, grid: &[Row]) -> Result<u32>;
}

/// `LedgerSink` backed by the `partitions` / `cells` tables.
pub struct SqliteLedger<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteLedger<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    pub fn list_partitions(&self) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.name, COALESCE(MAX(c.row), 0) FROM partitions p \
             LEFT JOIN cells c ON c.partition = p.name \
             GROUP BY p.name ORDER BY p.name",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn require_partition(&self, name: &str) -> Result<()> {
        if self.partition_exists(name)? {
            Ok(())
        } else {
            Err(ChoboError::UnknownPartition(name.to_string()))
        }
    }

    fn last_used_row(&self, name: &str) -> Result<u32> {
        let last: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(row), 0) FROM cells WHERE partition = ?1",
            [name],
            |r| r.get(0),
        )?;
        Ok(last as u32)
    }

    fn insert_grid(&self, name: &str, first_row: u32, grid: &[Row], width: Option<usize>) -> Result<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT OR REPLACE INTO cells (partition, row, col, value) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for (offset, row) in grid.iter().enumerate() {
            let row_num = first_row + offset as u32;
            for (col, value) in row.iter().enumerate() {
                if value.is_empty() || width.is_some_and(|w| col >= w) {
                    continue;
                }
                stmt.execute(rusqlite::params![name, row_num, col as i64, value])?;
            }
        }
        Ok(())
    }
}

impl LedgerSink for SqliteLedger<'_> {
    fn partition_exists(&self, name: &str) -> Result<bool> {
        let mut stmt = self.conn.prepare_cached("SELECT 1 FROM partitions WHERE name = ?1")?;
        Ok(stmt.exists([name])?)
    }

    fn create_partition(&self, name: &str) -> Result<()> {
        self.conn
            .execute("INSERT INTO partitions (name) VALUES (?1)", [name])?;
        Ok(())
    }

    fn read_range(&self, name: &str, range: RowRange) -> Result<Vec<Row>> {
        self.require_partition(name)?;
        let last = range.last.map_or(i64::MAX, i64::from);
        let mut stmt = self.conn.prepare(
            "SELECT row, col, value FROM cells \
             WHERE partition = ?1 AND row >= ?2 AND row <= ?3 AND col < ?4 \
             ORDER BY row, col",
        )?;
        let cells: Vec<(i64, i64, String)> = stmt
            .query_map(
                rusqlite::params![name, range.first, last, range.width as i64],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let Some(max_row) = cells.iter().map(|(r, _, _)| *r).max() else {
            return Ok(Vec::new());
        };
        let mut grid: Vec<Row> = vec![Vec::new(); (max_row - i64::from(range.first) + 1) as usize];
        for (row, col, value) in cells {
            let target = &mut grid[(row - i64::from(range.first)) as usize];
            let col = col as usize;
            if target.len() <= col {
                target.resize(col + 1, String::new());
            }
            target[col] = value;
        }
        Ok(grid)
    }

    fn write_range(&self, name: &str, range: RowRange, grid: &[Row]) -> Result<()> {
        self.require_partition(name)?;
        let last = range
            .last
            .unwrap_or(range.first + grid.len().saturating_sub(1) as u32);
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM cells WHERE partition = ?1 AND row >= ?2 AND row <= ?3 AND col < ?4",
            rusqlite::params![name, range.first, last, range.width as i64],
        )?;
        let rows = (0..grid.len())
            .take_while(|&i| range.contains_row(range.first + i as u32))
            .count();
        self.insert_grid(name, range.first, &grid[..rows], Some(range.width))?;
        tx.commit()?;
        Ok(())
    }

    fn append_rows(&self, name: &str, after_row: u32, grid: &[Row]) -> Result<u32> {
        self.require_partition(name)?;
        let first = after_row.max(self.last_used_row(name)?) + 1;
        let tx = self.conn.unchecked_transaction()?;
        self.insert_grid(name, first, grid, None)?;
        tx.commit()?;
        Ok(first)
    }
}
