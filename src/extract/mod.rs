//! Per-user feature extraction
//!
//! Two extractors run over each [`EventLog`](crate::types::EventLog):
//! - [`TemporalFeatureExtractor`]: time spent per part and dwell time on artworks
//! - [`DescriptiveFeatureExtractor`]: visit, revisit, event-kind and pre-choice counts
//!
//! Both are pure functions of the log; neither performs I/O.

pub mod descriptive;
pub mod temporal;

pub use descriptive::{DescriptiveFeatureExtractor, DescriptiveFeatures, PartSummary, PreChoiceExploration};
pub use temporal::{DwellInterval, DwellStats, TemporalFeatureExtractor, TemporalFeatures};

use chrono::{DateTime, Utc};

/// Round to 3 decimal places (NaN stays NaN)
pub(crate) fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

/// Whole seconds elapsed from `start` to `end`
pub(crate) fn whole_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds()
}

/// Whole seconds expressed in minutes, rounded to 3 decimal places
pub(crate) fn seconds_to_minutes(seconds: i64) -> f64 {
    round3(seconds as f64 / 60.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_round3() {
        assert_eq!(round3(1.23456), 1.235);
        assert_eq!(round3(10.0), 10.0);
        assert!(round3(f64::NAN).is_nan());
    }

    #[test]
    fn test_whole_seconds_truncates_subsecond() {
        let start = Utc.with_ymd_and_hms(2023, 3, 1, 10, 0, 0).unwrap();
        let end = start + chrono::Duration::milliseconds(5_900);
        assert_eq!(whole_seconds(start, end), 5);
    }

    #[test]
    fn test_seconds_to_minutes() {
        assert_eq!(seconds_to_minutes(90), 1.5);
        assert_eq!(seconds_to_minutes(100), 1.667);
        assert_eq!(seconds_to_minutes(0), 0.0);
    }
}
