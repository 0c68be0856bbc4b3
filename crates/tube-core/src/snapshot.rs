//! §3 DATA MODEL: the cached payload and its replication-relevant metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The tube line identifiers the upstream is known to report on.
///
/// Additive: an unrecognized id in an upstream payload is not an error, it is
/// carried through as-is (§6.2: "unknown fields MUST be ignored" applies to
/// the shape of each line record, not to the set of lines).
pub const KNOWN_LINE_IDS: &[&str] = &[
    "bakerloo",
    "central",
    "circle",
    "district",
    "hammersmith-city",
    "jubilee",
    "metropolitan",
    "northern",
    "piccadilly",
    "victoria",
    "waterloo-city",
];

/// One disruption entry attached to a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disruption {
    pub category: String,
    pub description: String,
    pub planned: bool,
}

/// One line's status at the moment a [`Snapshot`] was taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRecord {
    pub id: String,
    pub name: String,
    pub status: String,
    pub status_description: String,
    pub disruptions: Vec<Disruption>,
}

impl LineRecord {
    /// True if this line has at least one disruption that isn't planned
    /// engineering work. Used by the `getDisruptions` read.
    pub fn has_unplanned_disruption(&self) -> bool {
        self.disruptions.iter().any(|d| !d.planned)
    }
}

/// The cached payload: an ordered set of line records stamped with the
/// originating node and the instant its upstream fetch completed.
///
/// `queried_at` is fixed at creation (§3 invariant: CRDT replication MUST NOT
/// update it) — there is deliberately no setter; the only way to get a new
/// value is [`Snapshot::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub lines: Vec<LineRecord>,
    queried_at: DateTime<Utc>,
    queried_by: String,
}

impl Snapshot {
    /// Constructs a snapshot stamped with the given completion time and
    /// originating node id. Only C4 should call this, at the moment an
    /// upstream fetch succeeds.
    pub fn new(lines: Vec<LineRecord>, queried_at: DateTime<Utc>, queried_by: impl Into<String>) -> Self {
        Self {
            lines,
            queried_at,
            queried_by: queried_by.into(),
        }
    }

    pub fn queried_at(&self) -> DateTime<Utc> {
        self.queried_at
    }

    pub fn queried_by(&self) -> &str {
        &self.queried_by
    }

    /// `ageMs(now) = now − queriedAt`, clamped to zero so that clock skew
    /// between peers never produces a negative age (§3: "must be ≥ 0").
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.queried_at).num_milliseconds().max(0)
    }

    /// The LWW merge order used by both the register (§4.5) and the
    /// coordinator's peer-update path (§4.6): larger `queried_at` wins, ties
    /// broken by `queried_by` lexicographic order.
    pub fn supersedes(&self, other: &Snapshot) -> bool {
        match self.queried_at.cmp(&other.queried_at) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.queried_by > other.queried_by,
        }
    }

    /// Returns a copy filtered to the line matching `line_id`
    /// (case-insensitive), or `None` if no line matches.
    pub fn filtered_to_line(&self, line_id: &str) -> Option<Snapshot> {
        let line = self
            .lines
            .iter()
            .find(|l| l.id.eq_ignore_ascii_case(line_id))?
            .clone();
        Some(Snapshot {
            lines: vec![line],
            queried_at: self.queried_at,
            queried_by: self.queried_by.clone(),
        })
    }

    /// Returns a copy filtered to lines with at least one unplanned
    /// disruption. Used by `getDisruptions`.
    pub fn filtered_to_disruptions(&self) -> Snapshot {
        Snapshot {
            lines: self
                .lines
                .iter()
                .filter(|l| l.has_unplanned_disruption())
                .cloned()
                .collect(),
            queried_at: self.queried_at,
            queried_by: self.queried_by.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(at_secs: i64, by: &str) -> Snapshot {
        Snapshot::new(
            vec![],
            DateTime::from_timestamp(at_secs, 0).unwrap(),
            by,
        )
    }

    #[test]
    fn supersedes_by_queried_at() {
        let older = snap(100, "n1");
        let newer = snap(200, "n1");
        assert!(newer.supersedes(&older));
        assert!(!older.supersedes(&newer));
    }

    #[test]
    fn ties_broken_by_queried_by_lexicographic() {
        let a = snap(100, "n1");
        let b = snap(100, "n2");
        assert!(b.supersedes(&a));
        assert!(!a.supersedes(&b));
    }

    #[test]
    fn age_ms_never_negative() {
        let future = snap(1_000_000, "n1");
        let now = DateTime::from_timestamp(0, 0).unwrap();
        assert_eq!(future.age_ms(now), 0);
    }

    #[test]
    fn filtered_to_line_is_case_insensitive() {
        let s = Snapshot::new(
            vec![LineRecord {
                id: "Central".into(),
                name: "Central".into(),
                status: "Good Service".into(),
                status_description: "Good Service".into(),
                disruptions: vec![],
            }],
            Utc::now(),
            "n1",
        );
        assert!(s.filtered_to_line("central").is_some());
        assert!(s.filtered_to_line("CENTRAL").is_some());
        assert!(s.filtered_to_line("victoria").is_none());
    }

    #[test]
    fn filtered_to_disruptions_drops_planned_only_lines() {
        let s = Snapshot::new(
            vec![
                LineRecord {
                    id: "central".into(),
                    name: "Central".into(),
                    status: "Good Service".into(),
                    status_description: "Good Service".into(),
                    disruptions: vec![],
                },
                LineRecord {
                    id: "victoria".into(),
                    name: "Victoria".into(),
                    status: "Minor Delays".into(),
                    status_description: "Minor Delays".into(),
                    disruptions: vec![Disruption {
                        category: "RealTime".into(),
                        description: "Signal failure".into(),
                        planned: false,
                    }],
                },
                LineRecord {
                    id: "jubilee".into(),
                    name: "Jubilee".into(),
                    status: "Planned Closure".into(),
                    status_description: "Planned Closure".into(),
                    disruptions: vec![Disruption {
                        category: "PlannedWork".into(),
                        description: "Engineering work".into(),
                        planned: true,
                    }],
                },
            ],
            Utc::now(),
            "n1",
        );

        let filtered = s.filtered_to_disruptions();
        assert_eq!(filtered.lines.len(), 1);
        assert_eq!(filtered.lines[0].id, "victoria");
    }
}
