use thiserror::Error;

use crate::reconciler::SyncPhase;

#[derive(Error, Debug)]
pub enum ChoboError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to fetch messages: {0}")]
    SourceFetch(String),

    #[error("Unknown format: {0}")]
    UnknownFormat(String),

    #[error("Unknown partition: {0}")]
    UnknownPartition(String),

    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Sync failed during {phase} (completed: {}): {source}", completed_list(.completed))]
    Sync {
        phase: SyncPhase,
        completed: Vec<SyncPhase>,
        #[source]
        source: Box<ChoboError>,
    },
}

fn completed_list(phases: &[SyncPhase]) -> String {
    if phases.is_empty() {
        return "none".to_string();
    }
    phases
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, ChoboError>;
