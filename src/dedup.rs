use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Record, Row, RowLayout};

/// Which normalized fields must agree for two rows to count as the same expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupKey {
    #[default]
    DateCodeAmount,
    DateCodeAmountContent,
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y.%m.%d"];

/// `None` is the sentinel for a date cell that could not be parsed.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Strips every non-digit ("¥1,200" -> 1200). Blank or unparseable is 0.
pub fn normalize_number(raw: &str) -> i64 {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

pub fn normalize_text(raw: &str) -> &str {
    raw.trim()
}

/// Normalized comparison tuple for one row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fingerprint<'a> {
    date: Option<NaiveDate>,
    code: i64,
    amount: i64,
    content: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct DuplicateDetector {
    pub key: DedupKey,
    pub layout: RowLayout,
    /// When set, two unparseable dates compare equal.
    pub match_unparseable_dates: bool,
}

impl DuplicateDetector {
    pub fn new(key: DedupKey, layout: RowLayout) -> Self {
        Self {
            key,
            layout,
            match_unparseable_dates: false,
        }
    }

    pub fn is_duplicate(&self, candidate: &Record, existing: &[Row]) -> bool {
        let row = self.layout.to_row(candidate);
        existing.iter().any(|other| self.rows_equal(&row, other))
    }

    pub fn rows_equal(&self, a: &[String], b: &[String]) -> bool {
        let a = self.layout.pad(a);
        let b = self.layout.pad(b);
        let fa = self.fingerprint(&a);
        let fb = self.fingerprint(&b);

        let dates_equal = match (fa.date, fb.date) {
            (Some(x), Some(y)) => x == y,
            (None, None) => self.match_unparseable_dates,
            _ => false,
        };
        if !dates_equal || fa.code != fb.code || fa.amount != fb.amount {
            return false;
        }
        match self.key {
            DedupKey::DateCodeAmount => true,
            DedupKey::DateCodeAmountContent => fa.content == fb.content,
        }
    }

    fn fingerprint<'a>(&self, row: &'a [String]) -> Fingerprint<'a> {
        Fingerprint {
            date: normalize_date(&row[self.layout.date_col]),
            code: normalize_number(&row[self.layout.code_col]),
            amount: normalize_number(&row[self.layout.amount_col]),
            content: normalize_text(&row[self.layout.content_col]),
        }
    }
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(DedupKey::default(), RowLayout::default())
    }
}
