//! study-features - per-user behavioral features for a two-part recommendation study
//!
//! Turns a timestamped interaction log into one feature row per participant
//! through a deterministic pipeline: CSV loading → partitioning at the
//! distraction task cutoff → temporal and descriptive extraction → table export.
//!
//! ## Modules
//!
//! - **Loader**: read interaction and user CSVs into per-user event logs
//! - **Extractors**: part durations, dwell time, visit and selection counts
//! - **Engine**: run both extractors over every user, isolating per-user failures
//! - **Table**: flatten feature records into CSV / JSON rows

pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod loader;
pub mod table;
pub mod types;

pub use config::{DwellPairing, EngineConfig};
pub use engine::{FeatureEngine, FeatureRun, UserError};
pub use error::ComputeError;
pub use loader::{load_study, StudyData};
pub use table::{FeatureTable, TableFormat};
pub use types::{Event, EventKind, EventLog, FeatureRecord, FeatureValue, Part, UserId};

/// Crate version reported by the CLI
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
