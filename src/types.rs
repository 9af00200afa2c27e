//! Interaction event types and per-user feature containers
//!
//! Events flow from the loader into an [`EventLog`] per user; the extractors
//! turn each log into a [`FeatureRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ComputeError;

/// Content identifier of the navigation button that returns to the home page.
///
/// Clicks on it are navigation, not artwork visits.
pub const HOME_BUTTON: &str = "home-button";

/// Study participant identifier
pub type UserId = String;

/// Interaction event kinds recorded by the study interface
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// Opened a content item
    Click,
    /// Closed a content item and returned to the listing
    GoBack,
    /// Requested more recommendations
    ShowMore,
    ArtworkSelected,
    ArtworkDeselected,
    /// Any other kind, carried verbatim
    #[serde(untagged)]
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Click => "click",
            EventKind::GoBack => "go-back",
            EventKind::ShowMore => "show-more",
            EventKind::ArtworkSelected => "artwork-selected",
            EventKind::ArtworkDeselected => "artwork-deselected",
            EventKind::Other(name) => name.as_str(),
        }
    }

    /// Stem used when this kind names a feature column (`show-more` -> `show_more`)
    pub fn column_stem(&self) -> String {
        self.as_str().replace('-', "_")
    }
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        match value {
            "click" => EventKind::Click,
            "go-back" => EventKind::GoBack,
            "show-more" => EventKind::ShowMore,
            "artwork-selected" => EventKind::ArtworkSelected,
            "artwork-deselected" => EventKind::ArtworkDeselected,
            other => EventKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Study phase an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    PartOne,
    PartTwo,
}

impl Part {
    pub const ALL: [Part; 2] = [Part::PartOne, Part::PartTwo];

    pub fn as_str(self) -> &'static str {
        match self {
            Part::PartOne => "part_one",
            Part::PartTwo => "part_two",
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single interaction record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Artwork identifier, or [`HOME_BUTTON`]
    pub content_id: String,
    /// What the user did
    #[serde(rename = "event")]
    pub kind: EventKind,
    /// Page the event happened on (not interpreted)
    #[serde(default)]
    pub page: String,
    pub timestamp: DateTime<Utc>,
    pub part: Part,
}

impl Event {
    pub fn new(
        content_id: impl Into<String>,
        kind: EventKind,
        timestamp: DateTime<Utc>,
        part: Part,
    ) -> Self {
        Self {
            content_id: content_id.into(),
            kind,
            page: String::new(),
            timestamp,
            part,
        }
    }

    /// A click that opened an artwork (as opposed to the home button)
    pub fn is_artwork_click(&self) -> bool {
        self.kind == EventKind::Click && self.content_id != HOME_BUTTON
    }
}

/// One user's activity, split at the distraction task cutoff.
///
/// Each part is sorted ascending by timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    pub part_one: Vec<Event>,
    pub part_two: Vec<Event>,
}

impl EventLog {
    pub fn new(part_one: Vec<Event>, part_two: Vec<Event>) -> Self {
        Self { part_one, part_two }
    }

    pub fn part(&self, part: Part) -> &[Event] {
        match part {
            Part::PartOne => &self.part_one,
            Part::PartTwo => &self.part_two,
        }
    }

    pub(crate) fn part_mut(&mut self, part: Part) -> &mut Vec<Event> {
        match part {
            Part::PartOne => &mut self.part_one,
            Part::PartTwo => &mut self.part_two,
        }
    }

    pub fn total_len(&self) -> usize {
        self.part_one.len() + self.part_two.len()
    }

    /// Check that each part is sorted by timestamp and holds only its own events
    pub fn validate(&self, user_id: &str) -> Result<(), ComputeError> {
        for part in Part::ALL {
            let events = self.part(part);
            if let Some(event) = events.iter().find(|event| event.part != part) {
                return Err(ComputeError::malformed(
                    user_id,
                    format!("{part} holds an event tagged {}", event.part),
                ));
            }
            if events.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
                return Err(ComputeError::malformed(
                    user_id,
                    format!("{part} is not sorted by timestamp"),
                ));
            }
        }
        Ok(())
    }
}

/// A single feature value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Count(u64),
    /// Real-valued measure; NaN marks an undefined value
    Real(f64),
}

impl FeatureValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            FeatureValue::Count(n) => *n as f64,
            FeatureValue::Real(x) => *x,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            FeatureValue::Count(n) => Some(*n),
            FeatureValue::Real(_) => None,
        }
    }

    /// True for undefined measures (no dwell pairs, no selection event)
    pub fn is_missing(&self) -> bool {
        matches!(self, FeatureValue::Real(x) if x.is_nan())
    }
}

impl From<u64> for FeatureValue {
    fn from(v: u64) -> Self {
        FeatureValue::Count(v)
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Real(v)
    }
}

/// Features computed for one user, keyed by column name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureRecord {
    values: BTreeMap<String, FeatureValue>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a feature, refusing to overwrite an existing one
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: impl Into<FeatureValue>,
    ) -> Result<(), ComputeError> {
        let name = name.into();
        if self.values.contains_key(&name) {
            return Err(ComputeError::FeatureCollision(name));
        }
        self.values.insert(name, value.into());
        Ok(())
    }

    /// Combine two records whose feature names must be disjoint
    pub fn merge(mut self, other: FeatureRecord) -> Result<FeatureRecord, ComputeError> {
        for (name, value) in other.values {
            self.insert(name, value)?;
        }
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<FeatureValue> {
        self.values.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, FeatureValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_kind_serialization() {
        let json = serde_json::to_string(&EventKind::ArtworkSelected).unwrap();
        assert_eq!(json, "\"artwork-selected\"");

        let parsed: EventKind = serde_json::from_str("\"go-back\"").unwrap();
        assert_eq!(parsed, EventKind::GoBack);

        let other: EventKind = serde_json::from_str("\"scroll\"").unwrap();
        assert_eq!(other, EventKind::Other("scroll".to_string()));
    }

    #[test]
    fn test_event_kind_from_str_matches_as_str() {
        for kind in [
            EventKind::Click,
            EventKind::GoBack,
            EventKind::ShowMore,
            EventKind::ArtworkSelected,
            EventKind::ArtworkDeselected,
        ] {
            assert_eq!(EventKind::from(kind.as_str()), kind);
        }
        assert_eq!(EventKind::ShowMore.column_stem(), "show_more");
    }

    #[test]
    fn test_artwork_click_excludes_home_button() {
        let ts = Utc.with_ymd_and_hms(2023, 3, 1, 10, 0, 0).unwrap();
        assert!(Event::new("A", EventKind::Click, ts, Part::PartOne).is_artwork_click());
        assert!(!Event::new(HOME_BUTTON, EventKind::Click, ts, Part::PartOne).is_artwork_click());
        assert!(!Event::new("A", EventKind::GoBack, ts, Part::PartOne).is_artwork_click());
    }

    #[test]
    fn test_validate_accepts_sorted_tagged_log() {
        let t0 = Utc.with_ymd_and_hms(2023, 3, 1, 10, 0, 0).unwrap();
        let log = EventLog::new(
            vec![
                Event::new("A", EventKind::Click, t0, Part::PartOne),
                Event::new("A", EventKind::GoBack, t0, Part::PartOne),
            ],
            vec![Event::new("B", EventKind::Click, t0 + chrono::Duration::seconds(5), Part::PartTwo)],
        );
        assert!(log.validate("u1").is_ok());
        assert!(EventLog::default().validate("u1").is_ok());
    }

    #[test]
    fn test_validate_rejects_unsorted_part() {
        let t0 = Utc.with_ymd_and_hms(2023, 3, 1, 10, 0, 0).unwrap();
        let log = EventLog::new(
            vec![],
            vec![
                Event::new("B", EventKind::Click, t0 + chrono::Duration::seconds(5), Part::PartTwo),
                Event::new("B", EventKind::GoBack, t0, Part::PartTwo),
            ],
        );
        let err = log.validate("u1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Malformed event log for user u1: part_two is not sorted by timestamp"
        );
    }

    #[test]
    fn test_validate_rejects_mistagged_event() {
        let t0 = Utc.with_ymd_and_hms(2023, 3, 1, 10, 0, 0).unwrap();
        let log = EventLog::new(vec![Event::new("A", EventKind::Click, t0, Part::PartTwo)], vec![]);
        assert!(matches!(
            log.validate("u1"),
            Err(ComputeError::MalformedEventLog { .. })
        ));
    }

    #[test]
    fn test_merge_disjoint_records() {
        let mut a = FeatureRecord::new();
        a.insert("part_one_time", 1.5).unwrap();
        let mut b = FeatureRecord::new();
        b.insert("total_events", 4u64).unwrap();

        let merged = a.merge(b).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get("total_events"), Some(FeatureValue::Count(4)));
    }

    #[test]
    fn test_merge_collision_fails() {
        let mut a = FeatureRecord::new();
        a.insert("total_events", 1u64).unwrap();
        let mut b = FeatureRecord::new();
        b.insert("total_events", 2u64).unwrap();

        match a.merge(b) {
            Err(ComputeError::FeatureCollision(name)) => assert_eq!(name, "total_events"),
            other => panic!("expected collision, got {other:?}"),
        }
    }

    #[test]
    fn test_nan_serializes_as_null() {
        let mut record = FeatureRecord::new();
        record.insert("part_one_artwork_time_m", f64::NAN).unwrap();
        assert!(record.get("part_one_artwork_time_m").unwrap().is_missing());

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"part_one_artwork_time_m":null}"#);
    }
}
