//! Error types for study-features

use thiserror::Error;

/// Errors that can occur while loading, extracting or exporting features
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Malformed event log for user {user_id}: {reason}")]
    MalformedEventLog { user_id: String, reason: String },

    #[error("Feature {0} produced by more than one extractor")]
    FeatureCollision(String),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ComputeError {
    pub(crate) fn malformed(user_id: &str, reason: impl Into<String>) -> Self {
        ComputeError::MalformedEventLog {
            user_id: user_id.to_string(),
            reason: reason.into(),
        }
    }
}
