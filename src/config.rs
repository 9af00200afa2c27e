//! Engine configuration
//!
//! Loaded from JSON with every field optional; command-line flags override
//! file values.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ComputeError;
use crate::types::EventKind;

/// How click events are paired with go-back events when measuring dwell time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DwellPairing {
    /// Pair every click with every later go-back on the same content.
    ///
    /// A content item visited several times contributes one interval per
    /// (click, later go-back) combination, so revisits inflate the count.
    #[default]
    AllForward,
    /// Each go-back closes the most recent open click on the same content,
    /// so a click is paired at most once.
    Nearest,
}

/// Event kinds tallied per part by default
pub fn default_tracked_kinds() -> Vec<EventKind> {
    vec![
        EventKind::ShowMore,
        EventKind::ArtworkSelected,
        EventKind::ArtworkDeselected,
    ]
}

fn default_workers() -> usize {
    1
}

/// Feature engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Dwell interval pairing policy
    pub pairing: DwellPairing,
    /// Event kinds counted per part; their sum across parts is `total_events`
    pub tracked_kinds: Vec<EventKind>,
    /// Worker threads used to process users (1 = sequential)
    pub workers: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pairing: DwellPairing::default(),
            tracked_kinds: default_tracked_kinds(),
            workers: default_workers(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ComputeError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        if self.workers == 0 {
            return Err(ComputeError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        for (i, kind) in self.tracked_kinds.iter().enumerate() {
            if self.tracked_kinds[..i].contains(kind) {
                return Err(ComputeError::InvalidConfig(format!(
                    "event kind {kind} is tracked twice"
                )));
            }
        }
        Ok(())
    }
}
