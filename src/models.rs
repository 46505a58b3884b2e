use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A message as it comes off a source, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub date: NaiveDate,
    pub amount: i64,
    pub content: String,
}

/// A classified expense, ready to be reconciled into a partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    pub date: NaiveDate,
    pub amount: i64,
    pub content: String,
    pub account_code: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub code: i64,
    pub keywords: Vec<String>,
}

impl CategoryRule {
    pub fn new(code: i64, keywords: &[&str]) -> Self {
        Self {
            code,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// One spreadsheet-style row of cell values.
pub type Row = Vec<String>;

/// Inclusive 1-based row span. `last: None` means "to the end of the sheet".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowRange {
    pub first: u32,
    pub last: Option<u32>,
    pub width: usize,
}

impl RowRange {
    pub fn bounded(first: u32, last: u32, width: usize) -> Self {
        Self {
            first,
            last: Some(last),
            width,
        }
    }

    pub fn open(first: u32, width: usize) -> Self {
        Self {
            first,
            last: None,
            width,
        }
    }

    pub fn contains_row(&self, row: u32) -> bool {
        row >= self.first && self.last.map_or(true, |last| row <= last)
    }
}

/// Where each field of a record lands in a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLayout {
    pub width: usize,
    pub date_col: usize,
    pub code_col: usize,
    pub content_col: usize,
    pub amount_col: usize,
}

pub const MIN_ROW_WIDTH: usize = 15;

impl RowLayout {
    pub fn with_width(width: usize) -> Self {
        Self {
            width: width.max(MIN_ROW_WIDTH),
            date_col: 0,
            code_col: 7,
            content_col: 12,
            amount_col: 14,
        }
    }

    pub fn to_row(&self, record: &Record) -> Row {
        let mut row = vec![String::new(); self.width];
        row[self.date_col] = record.date.format("%Y-%m-%d").to_string();
        row[self.code_col] = record.account_code.to_string();
        row[self.content_col] = record.content.clone();
        row[self.amount_col] = record.amount.to_string();
        row
    }

    /// Right-pad a short row with blanks so every column index is addressable.
    pub fn pad<'a>(&self, row: &'a [String]) -> std::borrow::Cow<'a, [String]> {
        if row.len() >= self.width {
            std::borrow::Cow::Borrowed(row)
        } else {
            let mut padded = row.to_vec();
            padded.resize(self.width, String::new());
            std::borrow::Cow::Owned(padded)
        }
    }
}

impl Default for RowLayout {
    fn default() -> Self {
        Self::with_width(MIN_ROW_WIDTH)
    }
}
