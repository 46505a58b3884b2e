use chrono::{Datelike, NaiveDate};

use crate::error::{ChoboError, Result};

pub const DEFAULT_START_MONTH: u32 = 9;

/// Maps calendar dates onto fiscal years that begin on the first of `start_month`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiscalCalendar {
    start_month: u32,
}

/// A fiscal year, labelled by the calendar year in which it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FiscalYear {
    pub label: i32,
    start_month: u32,
}

impl FiscalCalendar {
    pub fn new(start_month: u32) -> Result<Self> {
        if !(1..=12).contains(&start_month) {
            return Err(ChoboError::InvalidSetting {
                name: "fiscal_year_start",
                reason: format!("month must be 1-12, got {start_month}"),
            });
        }
        Ok(Self { start_month })
    }

    pub fn start_month(&self) -> u32 {
        self.start_month
    }

    pub fn resolve_label(&self, date: NaiveDate) -> FiscalYear {
        let label = if date.month() >= self.start_month {
            date.year()
        } else {
            date.year() - 1
        };
        self.year(label)
    }

    pub fn resolve_current_label(&self, today: NaiveDate) -> FiscalYear {
        self.resolve_label(today)
    }

    pub fn year(&self, label: i32) -> FiscalYear {
        FiscalYear {
            label,
            start_month: self.start_month,
        }
    }

    /// Parse either a bare label ("2024") or a partition name ("2024年度").
    pub fn parse_label(&self, raw: &str) -> Option<FiscalYear> {
        let raw = raw.trim();
        let digits = raw.strip_suffix(PARTITION_SUFFIX).unwrap_or(raw);
        digits.parse::<i32>().ok().map(|label| self.year(label))
    }
}

impl Default for FiscalCalendar {
    fn default() -> Self {
        Self {
            start_month: DEFAULT_START_MONTH,
        }
    }
}

const PARTITION_SUFFIX: &str = "年度";

impl FiscalYear {
    pub fn window_start(&self) -> NaiveDate {
        first_of_month(self.label, self.start_month)
    }

    /// Exclusive upper bound: the first day of the following fiscal year.
    pub fn window_end(&self) -> NaiveDate {
        first_of_month(self.label + 1, self.start_month)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.window_start() && date < self.window_end()
    }

    pub fn partition_name(&self) -> String {
        format!("{}{PARTITION_SUFFIX}", self.label)
    }
}

impl std::fmt::Display for FiscalYear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label)
    }
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    // month is validated to 1..=12 by FiscalCalendar::new, so day 1 always exists
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_resolve_label_before_start_month() {
        let cal = FiscalCalendar::default();
        assert_eq!(cal.resolve_label(d(2024, 2, 15)).label, 2023);
        assert_eq!(cal.resolve_label(d(2024, 8, 31)).label, 2023);
    }

    #[test]
    fn test_resolve_label_on_or_after_start_month() {
        let cal = FiscalCalendar::default();
        assert_eq!(cal.resolve_label(d(2024, 9, 1)).label, 2024);
        assert_eq!(cal.resolve_label(d(2024, 12, 31)).label, 2024);
    }

    #[test]
    fn test_january_start_is_calendar_year() {
        let cal = FiscalCalendar::new(1).unwrap();
        assert_eq!(cal.resolve_label(d(2024, 1, 1)).label, 2024);
        assert_eq!(cal.resolve_label(d(2024, 12, 31)).label, 2024);
    }

    #[test]
    fn test_rejects_bad_month() {
        assert!(FiscalCalendar::new(0).is_err());
        assert!(FiscalCalendar::new(13).is_err());
    }

    #[test]
    fn test_window_bounds() {
        let fy = FiscalCalendar::default().year(2024);
        assert_eq!(fy.window_start(), d(2024, 9, 1));
        assert_eq!(fy.window_end(), d(2025, 9, 1));
        assert!(fy.contains(d(2024, 9, 1)));
        assert!(fy.contains(d(2025, 8, 31)));
        assert!(!fy.contains(d(2024, 8, 31)));
        assert!(!fy.contains(d(2025, 9, 1)));
    }

    #[test]
    fn test_partition_name() {
        assert_eq!(FiscalCalendar::default().year(2024).partition_name(), "2024年度");
    }

    #[test]
    fn test_parse_label() {
        let cal = FiscalCalendar::default();
        assert_eq!(cal.parse_label("2024").map(|f| f.label), Some(2024));
        assert_eq!(cal.parse_label("2023年度").map(|f| f.label), Some(2023));
        assert!(cal.parse_label("next year").is_none());
    }
}
