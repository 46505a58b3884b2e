use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone};
use serde::Deserialize;
use tracing::debug;

use crate::error::{ChoboError, Result};
use crate::models::RawMessage;

/// Anything that can hand back the expense messages posted in the last `window_days`.
pub trait MessageSource {
    fn fetch(&self, window_days: u32, now: DateTime<Local>) -> Result<Vec<RawMessage>>;
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Split `"1200, タクシー代"` into amount and content. `None` when the amount is not an integer.
/// Only the first comma separates; later commas stay in the content.
pub fn parse_message_text(text: &str) -> Option<(i64, String)> {
    let mut parts = text.splitn(2, ',');
    let amount = parts.next()?.trim().parse::<i64>().ok()?;
    let content = parts.next().map(|c| c.trim().to_string()).unwrap_or_default();
    Some((amount, content))
}

/// Slack timestamps look like `"1725500000.000100"` (epoch seconds).
pub fn parse_slack_ts(ts: &str) -> Option<DateTime<Local>> {
    let (secs, frac) = ts.trim().split_once('.').unwrap_or((ts.trim(), "0"));
    let secs: i64 = secs.parse().ok()?;
    let micros: u32 = format!("{frac:0<6}").get(..6)?.parse().ok()?;
    Local.timestamp_opt(secs, micros * 1000).single()
}

fn window_start(now: DateTime<Local>, window_days: u32) -> DateTime<Local> {
    now - Duration::days(i64::from(window_days))
}

// ---------------------------------------------------------------------------
// Source kinds: enum dispatch over the supported export formats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceKind {
    SlackExport,
    Csv,
}

impl SourceKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::SlackExport => "slack_export",
            Self::Csv => "csv",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Self::SlackExport => "json",
            Self::Csv => "csv",
        }
    }
}

const ALL_SOURCES: &[SourceKind] = &[SourceKind::SlackExport, SourceKind::Csv];

pub fn get_by_key(key: &str) -> Option<SourceKind> {
    ALL_SOURCES.iter().find(|s| s.key() == key).copied()
}

pub fn get_for_file(file_path: &Path) -> Option<SourceKind> {
    let ext = file_path.extension()?.to_str()?.to_lowercase();
    ALL_SOURCES.iter().find(|s| s.extension() == ext).copied()
}

/// A message export on disk.
pub struct FileSource {
    kind: SourceKind,
    path: PathBuf,
}

impl FileSource {
    pub fn new(kind: SourceKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// Pick the kind from `format_key` if given, otherwise from the file extension.
    pub fn open(path: &Path, format_key: Option<&str>) -> Result<Self> {
        let kind = match format_key {
            Some(key) => get_by_key(key).ok_or_else(|| ChoboError::UnknownFormat(key.to_string()))?,
            None => get_for_file(path)
                .ok_or_else(|| ChoboError::UnknownFormat(path.display().to_string()))?,
        };
        Ok(Self::new(kind, path))
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fetch_error(&self, err: impl std::fmt::Display) -> ChoboError {
        ChoboError::SourceFetch(format!("{}: {err}", self.path.display()))
    }
}

impl MessageSource for FileSource {
    fn fetch(&self, window_days: u32, now: DateTime<Local>) -> Result<Vec<RawMessage>> {
        let oldest = window_start(now, window_days);
        let messages = match self.kind {
            SourceKind::SlackExport => self.fetch_slack_export(oldest),
            SourceKind::Csv => self.fetch_csv(oldest.date_naive()),
        }?;
        debug!(
            source = %self.path.display(),
            kind = self.kind.key(),
            count = messages.len(),
            "fetched messages"
        );
        Ok(messages)
    }
}

// ---------------------------------------------------------------------------
// Slack export parser
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SlackMessage {
    #[serde(default)]
    ts: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl FileSource {
    fn fetch_slack_export(&self, oldest: DateTime<Local>) -> Result<Vec<RawMessage>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| self.fetch_error(e))?;
        let messages: Vec<SlackMessage> =
            serde_json::from_str(&content).map_err(|e| self.fetch_error(e))?;

        let mut rows = Vec::new();
        for message in messages {
            let (Some(ts), Some(text)) = (message.ts, message.text) else {
                continue;
            };
            if text.trim().is_empty() {
                continue;
            }
            let Some(posted) = parse_slack_ts(&ts) else {
                debug!(%ts, "skipping message with unreadable timestamp");
                continue;
            };
            if posted < oldest {
                continue;
            }
            let Some((amount, content)) = parse_message_text(&text) else {
                debug!(%text, "skipping message without an integer amount");
                continue;
            };
            rows.push(RawMessage {
                date: posted.date_naive(),
                amount,
                content,
            });
        }
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // CSV parser
    // -----------------------------------------------------------------------

    fn fetch_csv(&self, oldest: NaiveDate) -> Result<Vec<RawMessage>> {
        let file = std::fs::File::open(&self.path).map_err(|e| self.fetch_error(e))?;
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(std::io::BufReader::new(file));

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| self.fetch_error(e))?;
            if record.len() < 2 || record[0].is_empty() {
                continue;
            }
            let Ok(date) = NaiveDate::parse_from_str(&record[0], "%Y-%m-%d") else {
                debug!(date = &record[0], "skipping row with unreadable date");
                continue;
            };
            if date < oldest {
                continue;
            }
            let Ok(amount) = record[1].parse::<i64>() else {
                debug!(amount = &record[1], "skipping row without an integer amount");
                continue;
            };
            let content = record.get(2).unwrap_or("").to_string();
            rows.push(RawMessage {
                date,
                amount,
                content,
            });
        }
        Ok(rows)
    }
}
