//! Feature engine orchestration
//!
//! Runs the temporal and descriptive extractors over every user and collects
//! one [`FeatureRecord`] per user. A user whose log cannot be processed is
//! reported in [`FeatureRun::errors`] without affecting other users.

use std::collections::BTreeMap;
use std::thread;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::ComputeError;
use crate::extract::{DescriptiveFeatureExtractor, TemporalFeatureExtractor, TemporalFeatures};
use crate::table::FeatureTable;
use crate::types::{EventLog, FeatureRecord, UserId};

/// A per-user failure collected during a run
#[derive(Debug)]
pub struct UserError {
    pub user_id: UserId,
    pub error: ComputeError,
}

/// Result of running the engine over a set of users
#[derive(Debug, Default)]
pub struct FeatureRun {
    /// Feature records for every user that was processed successfully
    pub records: BTreeMap<UserId, FeatureRecord>,
    /// Users that could not be processed, ordered by user id
    pub errors: Vec<UserError>,
}

impl FeatureRun {
    pub fn to_table(&self) -> FeatureTable {
        FeatureTable::from_records(&self.records)
    }

    pub fn user_count(&self) -> usize {
        self.records.len() + self.errors.len()
    }
}

/// Drives both extractors over every user's event log
#[derive(Debug, Clone)]
pub struct FeatureEngine {
    temporal: TemporalFeatureExtractor,
    descriptive: DescriptiveFeatureExtractor,
    workers: usize,
}

impl Default for FeatureEngine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl FeatureEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            temporal: TemporalFeatureExtractor::new(config.pairing),
            descriptive: DescriptiveFeatureExtractor::new(config.tracked_kinds.clone()),
            workers: config.workers.max(1),
        }
    }

    /// Names of every feature a successfully processed user receives.
    ///
    /// Fails if the configured tracked kinds clash with another feature name.
    pub fn feature_names(&self) -> Result<Vec<String>, ComputeError> {
        let temporal = TemporalFeatures::undefined().into_record()?;
        let descriptive = self.descriptive.compute(&EventLog::default()).into_record()?;
        let record = temporal.merge(descriptive)?;
        Ok(record.names().map(str::to_string).collect())
    }

    /// Compute the full feature record for one user
    pub fn extract_user(&self, user_id: &str, log: &EventLog) -> Result<FeatureRecord, ComputeError> {
        log.validate(user_id)?;
        let temporal = self.temporal.compute(user_id, log)?.into_record()?;
        let record = FeatureRecord::new().merge(temporal)?;

        let descriptive = self.descriptive.compute(log).into_record()?;
        record.merge(descriptive)
    }

    /// Process every user. Each call starts from empty records.
    pub fn run(&self, logs: BTreeMap<UserId, EventLog>) -> FeatureRun {
        let users = logs.len();
        let results = if self.workers > 1 && users > 1 {
            self.extract_parallel(logs)
        } else {
            logs.into_iter()
                .map(|(user_id, log)| {
                    let result = self.extract_user(&user_id, &log);
                    (user_id, result)
                })
                .collect()
        };

        let mut run = FeatureRun::default();
        for (user_id, result) in results {
            match result {
                Ok(record) => {
                    debug!(user_id = %user_id, features = record.len(), "extracted user features");
                    run.records.insert(user_id, record);
                }
                Err(error) => {
                    warn!(user_id = %user_id, error = %error, "feature extraction failed");
                    run.errors.push(UserError { user_id, error });
                }
            }
        }
        run.errors.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        info!(
            users,
            rows = run.records.len(),
            failed = run.errors.len(),
            workers = self.workers,
            "feature run complete"
        );
        run
    }

    /// Split users into disjoint chunks and process each on its own thread
    fn extract_parallel(
        &self,
        logs: BTreeMap<UserId, EventLog>,
    ) -> Vec<(UserId, Result<FeatureRecord, ComputeError>)> {
        let entries: Vec<(UserId, EventLog)> = logs.into_iter().collect();
        let chunk_size = entries.len().div_ceil(self.workers);

        thread::scope(|scope| {
            let handles: Vec<_> = entries
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|(user_id, log)| (user_id.clone(), self.extract_user(user_id, log)))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| match handle.join() {
                    Ok(results) => results,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }
}
