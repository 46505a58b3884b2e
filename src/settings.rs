use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::classifier::{default_rules, load_rules, Classifier, FALLBACK_CODE};
use crate::dedup::{DedupKey, DuplicateDetector};
use crate::error::{ChoboError, Result};
use crate::fiscal::{FiscalCalendar, DEFAULT_START_MONTH};
use crate::models::{RowLayout, MIN_ROW_WIDTH};
use crate::reconciler::{SyncOptions, DEFAULT_TEMPLATE_PARTITION};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default = "default_fiscal_year_start")]
    pub fiscal_year_start: u32,
    #[serde(default = "default_template_partition")]
    pub template_partition: String,
    #[serde(default = "default_row_width")]
    pub row_width: usize,
    #[serde(default)]
    pub dedup_key: DedupKey,
    #[serde(default)]
    pub match_unparseable_dates: bool,
    #[serde(default)]
    pub dedup_within_batch: bool,
    #[serde(default)]
    pub rules_path: Option<String>,
    #[serde(default = "default_fallback_code")]
    pub fallback_code: i64,
    #[serde(default = "default_window_days")]
    pub default_window_days: u32,
}

fn default_fiscal_year_start() -> u32 {
    DEFAULT_START_MONTH
}

fn default_template_partition() -> String {
    DEFAULT_TEMPLATE_PARTITION.to_string()
}

fn default_row_width() -> usize {
    MIN_ROW_WIDTH
}

fn default_fallback_code() -> i64 {
    FALLBACK_CODE
}

fn default_window_days() -> u32 {
    30
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            fiscal_year_start: default_fiscal_year_start(),
            template_partition: default_template_partition(),
            row_width: default_row_width(),
            dedup_key: DedupKey::default(),
            match_unparseable_dates: false,
            dedup_within_batch: false,
            rules_path: None,
            fallback_code: default_fallback_code(),
            default_window_days: default_window_days(),
        }
    }
}

impl Settings {
    pub fn ledger_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("ledger.db")
    }

    pub fn sync_options(&self) -> Result<SyncOptions> {
        if self.row_width < MIN_ROW_WIDTH {
            return Err(ChoboError::InvalidSetting {
                name: "row_width",
                reason: format!("must be at least {MIN_ROW_WIDTH}, got {}", self.row_width),
            });
        }
        let mut detector = DuplicateDetector::new(self.dedup_key, RowLayout::with_width(self.row_width));
        detector.match_unparseable_dates = self.match_unparseable_dates;
        Ok(SyncOptions {
            calendar: FiscalCalendar::new(self.fiscal_year_start)?,
            template_partition: self.template_partition.clone(),
            detector,
            dedup_within_batch: self.dedup_within_batch,
        })
    }

    pub fn classifier(&self) -> Result<Classifier> {
        let rules = match &self.rules_path {
            Some(path) => load_rules(&PathBuf::from(shellexpand_path(path)))?,
            None => default_rules(),
        };
        Ok(Classifier::new(rules, self.fallback_code))
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("chobo")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("chobo")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| ChoboError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn settings_file_exists() -> bool {
    settings_path().exists()
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}
