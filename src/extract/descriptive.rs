//! Count-based features computed independently for each part
//!
//! Per part:
//! - distinct artworks visited (clicks, home button excluded)
//! - artworks clicked more than once
//! - tallies of the tracked event kinds
//! - clicks and elapsed time before the first `artwork-selected`

use std::collections::{HashMap, HashSet};

use crate::config::default_tracked_kinds;
use crate::error::ComputeError;
use crate::extract::{seconds_to_minutes, whole_seconds};
use crate::types::{Event, EventKind, EventLog, FeatureRecord, Part};

/// Browsing before the first selection in a part
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreChoiceExploration {
    /// Artwork clicks strictly before the first selection (0 without a selection)
    pub clicks_before: u64,
    /// Minutes from the part's first event to the first selection (NaN without a selection)
    pub minutes_before: f64,
}

/// Descriptive features of a single part
#[derive(Debug, Clone, PartialEq)]
pub struct PartSummary {
    pub distinct_items_visited: u64,
    pub revisit_count: u64,
    /// Tallies in tracked-kind order
    pub kind_counts: Vec<(EventKind, u64)>,
    pub pre_choice: PreChoiceExploration,
}

impl PartSummary {
    pub fn kind_count(&self, kind: &EventKind) -> Option<u64> {
        self.kind_counts
            .iter()
            .find(|(k, _)| k == kind)
            .map(|(_, count)| *count)
    }

    fn tallied_events(&self) -> u64 {
        self.kind_counts.iter().map(|(_, count)| count).sum()
    }

    fn write_into(&self, part: Part, record: &mut FeatureRecord) -> Result<(), ComputeError> {
        record.insert(format!("num_artworks_{part}"), self.distinct_items_visited)?;
        record.insert(format!("num_revisits_{part}"), self.revisit_count)?;
        for (kind, count) in &self.kind_counts {
            record.insert(format!("{}_{part}", kind.column_stem()), *count)?;
        }
        record.insert(
            format!("num_visited_before_first_choice_{part}"),
            self.pre_choice.clicks_before,
        )?;
        record.insert(
            format!("time_before_first_choice_{part}"),
            self.pre_choice.minutes_before,
        )?;
        Ok(())
    }
}

/// Descriptive features for one user
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptiveFeatures {
    pub part_one: PartSummary,
    pub part_two: PartSummary,
    /// Sum of all tracked kind tallies across both parts
    pub total_events: u64,
}

impl DescriptiveFeatures {
    pub fn part(&self, part: Part) -> &PartSummary {
        match part {
            Part::PartOne => &self.part_one,
            Part::PartTwo => &self.part_two,
        }
    }

    pub fn into_record(self) -> Result<FeatureRecord, ComputeError> {
        let mut record = FeatureRecord::new();
        for part in Part::ALL {
            self.part(part).write_into(part, &mut record)?;
        }
        record.insert("total_events", self.total_events)?;
        Ok(record)
    }
}

/// Extractor for visit counts, event tallies and pre-choice exploration
#[derive(Debug, Clone)]
pub struct DescriptiveFeatureExtractor {
    tracked_kinds: Vec<EventKind>,
}

impl Default for DescriptiveFeatureExtractor {
    fn default() -> Self {
        Self::new(default_tracked_kinds())
    }
}

impl DescriptiveFeatureExtractor {
    pub fn new(tracked_kinds: Vec<EventKind>) -> Self {
        Self { tracked_kinds }
    }

    pub fn compute(&self, log: &EventLog) -> DescriptiveFeatures {
        let part_one = self.summarize(&log.part_one);
        let part_two = self.summarize(&log.part_two);
        let total_events = part_one.tallied_events() + part_two.tallied_events();

        DescriptiveFeatures {
            part_one,
            part_two,
            total_events,
        }
    }

    /// Summarize one part's events
    pub fn summarize(&self, events: &[Event]) -> PartSummary {
        PartSummary {
            distinct_items_visited: distinct_items_visited(events),
            revisit_count: revisit_count(events),
            kind_counts: self
                .tracked_kinds
                .iter()
                .map(|kind| (kind.clone(), count_kind(events, kind)))
                .collect(),
            pre_choice: pre_choice_exploration(events),
        }
    }
}

/// Number of distinct artworks clicked
pub fn distinct_items_visited(events: &[Event]) -> u64 {
    events
        .iter()
        .filter(|e| e.is_artwork_click())
        .map(|e| e.content_id.as_str())
        .collect::<HashSet<_>>()
        .len() as u64
}

/// Occurrences of `kind` in the part
pub fn count_kind(events: &[Event], kind: &EventKind) -> u64 {
    events.iter().filter(|e| &e.kind == kind).count() as u64
}

/// Number of artworks clicked at least twice
pub fn revisit_count(events: &[Event]) -> u64 {
    let mut clicks: HashMap<&str, u32> = HashMap::new();
    for event in events.iter().filter(|e| e.is_artwork_click()) {
        *clicks.entry(event.content_id.as_str()).or_insert(0) += 1;
    }
    clicks.values().filter(|&&count| count > 1).count() as u64
}

/// Index of the first `artwork-selected` event
pub fn first_selection_index(events: &[Event]) -> Option<usize> {
    events
        .iter()
        .position(|e| e.kind == EventKind::ArtworkSelected)
}

/// Clicks and elapsed time before the first selection
pub fn pre_choice_exploration(events: &[Event]) -> PreChoiceExploration {
    let Some(index) = first_selection_index(events) else {
        return PreChoiceExploration {
            clicks_before: 0,
            minutes_before: f64::NAN,
        };
    };

    let clicks_before = events[..index]
        .iter()
        .filter(|e| e.is_artwork_click())
        .count() as u64;
    let minutes_before = seconds_to_minutes(whole_seconds(
        events[0].timestamp,
        events[index].timestamp,
    ));

    PreChoiceExploration {
        clicks_before,
        minutes_before,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HOME_BUTTON;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, 1, 10, 0, 0).unwrap()
    }

    fn ev(content: &str, kind: EventKind, offset_sec: i64) -> Event {
        Event::new(content, kind, t0() + Duration::seconds(offset_sec), Part::PartOne)
    }

    fn browsing_session() -> Vec<Event> {
        vec![
            ev("A", EventKind::Click, 0),
            ev("A", EventKind::GoBack, 10),
            ev(HOME_BUTTON, EventKind::Click, 12),
            ev("B", EventKind::Click, 15),
            ev("B", EventKind::GoBack, 20),
            ev("A", EventKind::Click, 30),
            ev("A", EventKind::GoBack, 40),
            ev("list", EventKind::ShowMore, 45),
            ev("B", EventKind::ArtworkSelected, 90),
            ev("C", EventKind::Click, 100),
            ev("B", EventKind::ArtworkDeselected, 110),
            ev("C", EventKind::ArtworkSelected, 120),
        ]
    }

    #[test]
    fn test_distinct_items_visited() {
        let events = browsing_session();
        // A, B, C; home button and non-click events excluded
        assert_eq!(distinct_items_visited(&events), 3);

        let clicks = events.iter().filter(|e| e.kind == EventKind::Click).count() as u64;
        assert!(distinct_items_visited(&events) <= clicks);
    }

    #[test]
    fn test_distinct_items_stable_under_same_timestamp_reordering() {
        let mut events = vec![
            ev("A", EventKind::Click, 5),
            ev("B", EventKind::Click, 5),
            ev("A", EventKind::Click, 5),
        ];
        let before = distinct_items_visited(&events);
        events.reverse();
        assert_eq!(distinct_items_visited(&events), before);
    }

    #[test]
    fn test_revisit_count() {
        let events = browsing_session();
        // only A is clicked twice
        assert_eq!(revisit_count(&events), 1);
        assert!(revisit_count(&events) <= distinct_items_visited(&events));
    }

    #[test]
    fn test_revisit_counts_ids_not_extra_clicks() {
        let events = vec![
            ev("A", EventKind::Click, 0),
            ev("A", EventKind::Click, 1),
            ev("A", EventKind::Click, 2),
            ev(HOME_BUTTON, EventKind::Click, 3),
            ev(HOME_BUTTON, EventKind::Click, 4),
        ];
        assert_eq!(revisit_count(&events), 1);
    }

    #[test]
    fn test_kind_counts() {
        let events = browsing_session();
        let summary = DescriptiveFeatureExtractor::default().summarize(&events);

        assert_eq!(summary.kind_count(&EventKind::ShowMore), Some(1));
        assert_eq!(summary.kind_count(&EventKind::ArtworkSelected), Some(2));
        assert_eq!(summary.kind_count(&EventKind::ArtworkDeselected), Some(1));
        assert_eq!(summary.kind_count(&EventKind::Click), None);
    }

    #[test]
    fn test_pre_choice_exploration() {
        let events = browsing_session();
        let pre_choice = pre_choice_exploration(&events);

        // A, B, A clicked before the first selection at 90s
        assert_eq!(pre_choice.clicks_before, 3);
        assert_eq!(pre_choice.minutes_before, 1.5);
    }

    #[test]
    fn test_no_selection_event() {
        let events = vec![ev("A", EventKind::Click, 0), ev("A", EventKind::GoBack, 4)];
        let pre_choice = pre_choice_exploration(&events);

        assert_eq!(pre_choice.clicks_before, 0);
        assert!(pre_choice.minutes_before.is_nan());
    }

    #[test]
    fn test_empty_part_yields_zero_counts() {
        let summary = DescriptiveFeatureExtractor::default().summarize(&[]);

        assert_eq!(summary.distinct_items_visited, 0);
        assert_eq!(summary.revisit_count, 0);
        assert!(summary.kind_counts.iter().all(|(_, c)| *c == 0));
        assert_eq!(summary.pre_choice.clicks_before, 0);
        assert!(summary.pre_choice.minutes_before.is_nan());
    }

    #[test]
    fn test_total_events_is_sum_of_tallies() {
        let part_two = vec![
            Event::new("list", EventKind::ShowMore, t0(), Part::PartTwo),
            Event::new("list", EventKind::ShowMore, t0(), Part::PartTwo),
            Event::new("D", EventKind::ArtworkSelected, t0(), Part::PartTwo),
        ];
        let log = EventLog::new(browsing_session(), part_two);

        let features = DescriptiveFeatureExtractor::default().compute(&log);
        // part one: 1 + 2 + 1, part two: 2 + 1 + 0
        assert_eq!(features.total_events, 7);

        let with_clicks = DescriptiveFeatureExtractor::new(vec![
            EventKind::ShowMore,
            EventKind::ArtworkSelected,
            EventKind::ArtworkDeselected,
            EventKind::Click,
        ])
        .compute(&log);
        // plus 5 clicks in part one
        assert_eq!(with_clicks.total_events, 12);
    }

    #[test]
    fn test_into_record_columns() {
        let log = EventLog::new(browsing_session(), vec![]);
        let record = DescriptiveFeatureExtractor::default()
            .compute(&log)
            .into_record()
            .unwrap();

        assert_eq!(record.get("num_artworks_part_one").unwrap().as_count(), Some(3));
        assert_eq!(record.get("artwork_selected_part_one").unwrap().as_count(), Some(2));
        assert_eq!(record.get("show_more_part_two").unwrap().as_count(), Some(0));
        assert_eq!(
            record.get("time_before_first_choice_part_one").unwrap().as_f64(),
            1.5
        );
        assert!(record.get("time_before_first_choice_part_two").unwrap().is_missing());
        assert_eq!(record.get("total_events").unwrap().as_count(), Some(4));
        // 4 per-part features + 3 tallies, twice, plus total
        assert_eq!(record.len(), 15);
    }

    #[test]
    fn test_tracked_kind_clashing_with_feature_name_is_rejected() {
        let extractor =
            DescriptiveFeatureExtractor::new(vec![EventKind::Other("num-artworks".to_string())]);
        let result = extractor.compute(&EventLog::default()).into_record();
        assert!(matches!(result, Err(ComputeError::FeatureCollision(_))));
    }
}
