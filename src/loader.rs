//! Study data loader
//!
//! Reads the raw interaction log and the per-user distraction task table,
//! then builds one [`EventLog`] per user:
//! - timestamps are parsed into UTC instants
//! - each user's events are sorted by timestamp (stable for ties)
//! - events before the user's cutoff go to part one, the rest to part two

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ComputeError;
use crate::types::{Event, EventKind, EventLog, Part, UserId};

/// Naive timestamp layouts accepted in addition to RFC 3339 (read as UTC)
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Header line occupies line 1
const FIRST_DATA_LINE: usize = 2;

#[derive(Debug, Deserialize)]
struct InteractionRow {
    user_id: String,
    #[serde(default)]
    content_id: String,
    event: String,
    #[serde(default)]
    page: String,
    timestamp: String,
}

#[derive(Debug, Deserialize)]
struct UserRow {
    user_id: String,
    distraction_task_timestamp: String,
}

/// Partitioned study data ready for the feature engine
#[derive(Debug, Default)]
pub struct StudyData {
    /// One log per user in the users table
    pub logs: BTreeMap<UserId, EventLog>,
    /// Interaction rows dropped because their user has no cutoff
    pub skipped_events: usize,
    /// Users seen in the interaction log but missing from the users table
    pub unknown_users: Vec<UserId>,
}

impl StudyData {
    pub fn event_count(&self) -> usize {
        self.logs.values().map(EventLog::total_len).sum()
    }
}

/// Parse a timestamp as RFC 3339, falling back to naive UTC layouts
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ComputeError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ComputeError::DateParseError(format!("unrecognized timestamp '{raw}'")))
}

/// Read the users table into user id -> distraction task cutoff
pub fn read_cutoffs<R: Read>(reader: R) -> Result<BTreeMap<UserId, DateTime<Utc>>, ComputeError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut cutoffs = BTreeMap::new();

    for (index, row) in rdr.deserialize::<UserRow>().enumerate() {
        let row = row?;
        let line = index + FIRST_DATA_LINE;
        let cutoff = parse_timestamp(&row.distraction_task_timestamp).map_err(|e| {
            ComputeError::DateParseError(format!("users line {line}: {e}"))
        })?;
        if cutoffs.insert(row.user_id.clone(), cutoff).is_some() {
            warn!(user_id = %row.user_id, line, "duplicate user row, keeping the later cutoff");
        }
    }

    Ok(cutoffs)
}

/// Read the interaction log and partition it by the given cutoffs
pub fn read_interactions<R: Read>(
    reader: R,
    cutoffs: &BTreeMap<UserId, DateTime<Utc>>,
) -> Result<StudyData, ComputeError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut by_user: BTreeMap<UserId, Vec<Event>> = cutoffs
        .keys()
        .map(|user_id| (user_id.clone(), Vec::new()))
        .collect();
    let mut data = StudyData::default();

    for (index, row) in rdr.deserialize::<InteractionRow>().enumerate() {
        let row = row?;
        let line = index + FIRST_DATA_LINE;
        let timestamp = parse_timestamp(&row.timestamp).map_err(|e| {
            ComputeError::DateParseError(format!("interactions line {line}: {e}"))
        })?;

        let Some(events) = by_user.get_mut(&row.user_id) else {
            data.skipped_events += 1;
            if !data.unknown_users.contains(&row.user_id) {
                warn!(user_id = %row.user_id, line, "interaction for user without cutoff, skipping");
                data.unknown_users.push(row.user_id);
            }
            continue;
        };

        events.push(Event {
            content_id: row.content_id,
            kind: EventKind::from(row.event.as_str()),
            page: row.page,
            timestamp,
            // assigned during partitioning
            part: Part::PartOne,
        });
    }

    for (user_id, events) in by_user {
        let Some(cutoff) = cutoffs.get(&user_id) else {
            continue;
        };
        let log = partition(events, *cutoff);
        debug!(
            user_id = %user_id,
            part_one = log.part_one.len(),
            part_two = log.part_two.len(),
            "partitioned user events"
        );
        data.logs.insert(user_id, log);
    }

    info!(
        users = data.logs.len(),
        events = data.event_count(),
        skipped = data.skipped_events,
        "loaded study data"
    );
    Ok(data)
}

/// Load both CSV files from disk
pub fn load_study(interactions: &Path, users: &Path) -> Result<StudyData, ComputeError> {
    let cutoffs = read_cutoffs(File::open(users)?)?;
    read_interactions(File::open(interactions)?, &cutoffs)
}

/// Sort one user's events and split them at the cutoff.
///
/// An event exactly at the cutoff belongs to part two.
pub fn partition(mut events: Vec<Event>, cutoff: DateTime<Utc>) -> EventLog {
    events.sort_by_key(|e| e.timestamp);

    let mut log = EventLog::default();
    for mut event in events {
        event.part = if event.timestamp < cutoff {
            Part::PartOne
        } else {
            Part::PartTwo
        };
        log.part_mut(event.part).push(event);
    }
    log
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const USERS_CSV: &str = "\
user_id,age,distraction_task_timestamp
u1,31,2023-03-01 10:30:00
u2,27,2023-03-01T11:00:00Z
u3,45,2023-03-01 12:00:00.250
";

    const INTERACTIONS_CSV: &str = "\
user_id,content_id,event,page,timestamp
u1,A,click,home,2023-03-01 10:00:10
u1,A,go-back,artwork,2023-03-01 10:00:20
u1,home-button,click,artwork,2023-03-01 10:00:05
u1,B,artwork-selected,home,2023-03-01 10:30:00
u1,C,click,home,2023-03-01 10:45:00
u2,A,click,home,2023-03-01 10:10:00.500
u9,A,click,home,2023-03-01 10:10:00
u9,B,click,home,2023-03-01 10:11:00
u2,,show-more,home,2023-03-01 11:05:00
";

    fn load() -> StudyData {
        let cutoffs = read_cutoffs(USERS_CSV.as_bytes()).unwrap();
        read_interactions(INTERACTIONS_CSV.as_bytes(), &cutoffs).unwrap()
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2023, 3, 1, 10, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2023-03-01 10:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2023-03-01T10:30:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2023-03-01T10:30:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2023-03-01T12:30:00+02:00").unwrap(), expected);
        assert_eq!(
            parse_timestamp("2023-03-01 10:30:00.250").unwrap(),
            expected + chrono::Duration::milliseconds(250)
        );
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(ComputeError::DateParseError(_))
        ));
    }

    #[test]
    fn test_events_sorted_and_partitioned() {
        let data = load();
        let u1 = &data.logs["u1"];

        let part_one: Vec<&str> = u1.part_one.iter().map(|e| e.content_id.as_str()).collect();
        assert_eq!(part_one, vec!["home-button", "A", "A"]);
        assert!(u1.part_one.iter().all(|e| e.part == Part::PartOne));

        // the selection is exactly at the cutoff, so it opens part two
        let part_two: Vec<&EventKind> = u1.part_two.iter().map(|e| &e.kind).collect();
        assert_eq!(part_two, vec![&EventKind::ArtworkSelected, &EventKind::Click]);
        assert!(u1.part_two.iter().all(|e| e.part == Part::PartTwo));
        assert_eq!(u1.part_one[1].page, "home");
    }

    #[test]
    fn test_every_user_gets_a_log() {
        let data = load();
        assert_eq!(data.logs.len(), 3);
        assert_eq!(data.logs["u2"].part_one.len(), 1);
        assert_eq!(data.logs["u2"].part_two.len(), 1);
        assert_eq!(data.logs["u2"].part_two[0].content_id, "");
        assert_eq!(data.logs["u3"].total_len(), 0);
        assert_eq!(data.event_count(), 7);
    }

    #[test]
    fn test_unknown_users_are_skipped() {
        let data = load();
        assert_eq!(data.skipped_events, 2);
        assert_eq!(data.unknown_users, vec!["u9".to_string()]);
        assert!(!data.logs.contains_key("u9"));
    }

    #[test]
    fn test_bad_timestamp_reports_line() {
        let cutoffs = read_cutoffs(USERS_CSV.as_bytes()).unwrap();
        let csv = "user_id,content_id,event,page,timestamp\nu1,A,click,home,2023-03-01 10:00:00\nu1,A,go-back,home,not-a-time\n";

        match read_interactions(csv.as_bytes(), &cutoffs) {
            Err(ComputeError::DateParseError(msg)) => assert!(msg.contains("line 3"), "{msg}"),
            other => panic!("expected date parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_column_is_an_error() {
        let csv = "user_id,when\nu1,2023-03-01 10:30:00\n";
        assert!(matches!(read_cutoffs(csv.as_bytes()), Err(ComputeError::Csv(_))));
    }

    #[test]
    fn test_partition_keeps_tie_order() {
        let ts = Utc.with_ymd_and_hms(2023, 3, 1, 10, 0, 0).unwrap();
        let events = vec![
            Event::new("A", EventKind::Click, ts, Part::PartOne),
            Event::new("A", EventKind::GoBack, ts, Part::PartOne),
        ];
        let log = partition(events, ts + chrono::Duration::hours(1));
        assert_eq!(log.part_one[0].kind, EventKind::Click);
        assert_eq!(log.part_one[1].kind, EventKind::GoBack);
        assert!(log.part_two.is_empty());
    }

    #[test]
    fn test_load_study_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let users = dir.path().join("users.csv");
        let interactions = dir.path().join("interaction_data.csv");
        std::fs::write(&users, USERS_CSV).unwrap();
        std::fs::write(&interactions, INTERACTIONS_CSV).unwrap();

        let data = load_study(&interactions, &users).unwrap();
        assert_eq!(data.logs.len(), 3);

        let missing = load_study(&dir.path().join("nope.csv"), &users);
        assert!(matches!(missing, Err(ComputeError::Io(_))));
    }
}
