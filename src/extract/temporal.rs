//! Time-based features: part durations and artwork dwell time
//!
//! A dwell interval runs from a `click` on an artwork to a `go-back` on the
//! same artwork. How clicks and go-backs are matched is governed by
//! [`DwellPairing`].

use std::collections::HashMap;

use crate::config::DwellPairing;
use crate::error::ComputeError;
use crate::extract::{round3, seconds_to_minutes, whole_seconds};
use crate::types::{Event, EventKind, EventLog, FeatureRecord, Part};

/// A matched (click, go-back) pair on the same content item
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DwellInterval<'a> {
    pub click: &'a Event,
    pub go_back: &'a Event,
}

impl DwellInterval<'_> {
    /// Whole seconds between the click and the go-back
    pub fn duration_seconds(&self) -> i64 {
        whole_seconds(self.click.timestamp, self.go_back.timestamp)
    }
}

/// Summary of dwell intervals within one part
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DwellStats {
    /// Mean interval in seconds (NaN without intervals)
    pub mean_seconds: f64,
    /// Population standard deviation in seconds (NaN without intervals)
    pub std_seconds: f64,
    /// Number of intervals the statistics were computed from
    pub intervals: usize,
}

impl DwellStats {
    fn from_durations(durations: &[i64]) -> Self {
        if durations.is_empty() {
            return Self {
                mean_seconds: f64::NAN,
                std_seconds: f64::NAN,
                intervals: 0,
            };
        }

        let n = durations.len() as f64;
        let mean = durations.iter().map(|&d| d as f64).sum::<f64>() / n;
        let variance = durations
            .iter()
            .map(|&d| (d as f64 - mean).powi(2))
            .sum::<f64>()
            / n;

        Self {
            mean_seconds: round3(mean),
            std_seconds: round3(variance.sqrt()),
            intervals: durations.len(),
        }
    }
}

/// Temporal features for one user
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalFeatures {
    /// Minutes between first and last event of part one
    pub part_one_minutes: f64,
    /// Minutes between first and last event of part two
    pub part_two_minutes: f64,
    /// Minutes across both parts
    pub overall_minutes: f64,
    pub part_one_dwell: DwellStats,
    pub part_two_dwell: DwellStats,
}

impl TemporalFeatures {
    /// Features with every measure undefined
    pub fn undefined() -> Self {
        let dwell = DwellStats::from_durations(&[]);
        Self {
            part_one_minutes: f64::NAN,
            part_two_minutes: f64::NAN,
            overall_minutes: f64::NAN,
            part_one_dwell: dwell,
            part_two_dwell: dwell,
        }
    }

    pub fn dwell(&self, part: Part) -> &DwellStats {
        match part {
            Part::PartOne => &self.part_one_dwell,
            Part::PartTwo => &self.part_two_dwell,
        }
    }

    pub fn into_record(self) -> Result<FeatureRecord, ComputeError> {
        let mut record = FeatureRecord::new();
        record.insert("part_one_time", self.part_one_minutes)?;
        record.insert("part_two_time", self.part_two_minutes)?;
        record.insert("overall_time", self.overall_minutes)?;
        for part in Part::ALL {
            let dwell = self.dwell(part);
            record.insert(format!("{part}_artwork_time_m"), dwell.mean_seconds)?;
            record.insert(format!("{part}_artwork_time_std"), dwell.std_seconds)?;
        }
        Ok(record)
    }
}

/// Extractor for part durations and dwell statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct TemporalFeatureExtractor {
    pairing: DwellPairing,
}

impl TemporalFeatureExtractor {
    pub fn new(pairing: DwellPairing) -> Self {
        Self { pairing }
    }

    /// Compute temporal features for one user.
    ///
    /// Both parts must contain at least one event.
    pub fn compute(&self, user_id: &str, log: &EventLog) -> Result<TemporalFeatures, ComputeError> {
        let part_one_seconds = part_seconds(user_id, &log.part_one, Part::PartOne)?;
        let part_two_seconds = part_seconds(user_id, &log.part_two, Part::PartTwo)?;

        Ok(TemporalFeatures {
            part_one_minutes: seconds_to_minutes(part_one_seconds),
            part_two_minutes: seconds_to_minutes(part_two_seconds),
            overall_minutes: seconds_to_minutes(part_one_seconds + part_two_seconds),
            part_one_dwell: self.dwell_stats(&log.part_one),
            part_two_dwell: self.dwell_stats(&log.part_two),
        })
    }

    /// Dwell statistics over one part's events
    pub fn dwell_stats(&self, events: &[Event]) -> DwellStats {
        let durations: Vec<i64> = pair_dwell_intervals(events, self.pairing)
            .iter()
            .map(DwellInterval::duration_seconds)
            .collect();
        DwellStats::from_durations(&durations)
    }
}

/// Elapsed whole seconds between the first and last event of a part
fn part_seconds(user_id: &str, events: &[Event], part: Part) -> Result<i64, ComputeError> {
    match (events.first(), events.last()) {
        (Some(first), Some(last)) => Ok(whole_seconds(first.timestamp, last.timestamp)),
        _ => Err(ComputeError::malformed(user_id, format!("{part} has no events"))),
    }
}

/// Match clicks with go-backs on the same content, in event order
pub fn pair_dwell_intervals(events: &[Event], pairing: DwellPairing) -> Vec<DwellInterval<'_>> {
    match pairing {
        DwellPairing::AllForward => pair_all_forward(events),
        DwellPairing::Nearest => pair_nearest(events),
    }
}

fn pair_all_forward(events: &[Event]) -> Vec<DwellInterval<'_>> {
    let mut pairs = Vec::new();
    for (index, click) in events.iter().enumerate() {
        if click.kind != EventKind::Click {
            continue;
        }
        pairs.extend(
            events[index..]
                .iter()
                .filter(|later| later.kind == EventKind::GoBack && later.content_id == click.content_id)
                .map(|go_back| DwellInterval { click, go_back }),
        );
    }
    pairs
}

fn pair_nearest(events: &[Event]) -> Vec<DwellInterval<'_>> {
    let mut open: HashMap<&str, Vec<&Event>> = HashMap::new();
    let mut pairs = Vec::new();

    for event in events {
        match event.kind {
            EventKind::Click => open.entry(event.content_id.as_str()).or_default().push(event),
            EventKind::GoBack => {
                if let Some(click) = open.get_mut(event.content_id.as_str()).and_then(Vec::pop) {
                    pairs.push(DwellInterval {
                        click,
                        go_back: event,
                    });
                }
            }
            _ => {}
        }
    }
    pairs
}
