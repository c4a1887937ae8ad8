//! Per-session attendance status cache.

use crate::types::{AttendanceStatus, PersonId, PersonSummary, RecognitionOutcome};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// Latest known state of one recognized person in this session.
#[derive(Debug, Clone, PartialEq)]
pub struct PersonEntry {
    pub person: PersonSummary,
    pub status: AttendanceStatus,
    pub last_seen_at: DateTime<Utc>,
}

/// What the screen should announce after merging one outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum Announcement {
    /// A genuinely new check-in for this session.
    JustMarked(PersonSummary),
    /// A repeat sighting; informational only.
    AlreadyMarked(PersonSummary),
    NotRecognized,
}

impl Announcement {
    pub fn message(&self) -> String {
        match self {
            Announcement::JustMarked(p) => format!("Attendance marked for {}", p.name),
            Announcement::AlreadyMarked(p) => format!("{} has already been marked today.", p.name),
            Announcement::NotRecognized => "User not recognized.".to_string(),
        }
    }
}

/// Keyed by person id. `marked` is always a subset of `entries`' keys.
#[derive(Debug, Default)]
pub struct PersonStatusCache {
    entries: HashMap<PersonId, PersonEntry>,
    marked: HashSet<PersonId>,
}

impl PersonStatusCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one recognition outcome into the cache.
    ///
    /// An outcome claiming `Marked`/`AlreadyMarked` without a person cannot be
    /// keyed and is treated as not recognized.
    pub fn merge(&mut self, outcome: RecognitionOutcome, now: DateTime<Utc>) -> Announcement {
        let person = match (outcome.status, outcome.person) {
            (AttendanceStatus::NotRecognized, _) | (_, None) => return Announcement::NotRecognized,
            (_, Some(person)) => person,
        };

        let id = person.id;
        self.entries.insert(
            id,
            PersonEntry {
                person: person.clone(),
                status: outcome.status,
                last_seen_at: now,
            },
        );
        let first_in_session = self.marked.insert(id);

        match outcome.status {
            AttendanceStatus::Marked if first_in_session => Announcement::JustMarked(person),
            _ => Announcement::AlreadyMarked(person),
        }
    }

    pub fn get(&self, id: PersonId) -> Option<&PersonEntry> {
        self.entries.get(&id)
    }

    pub fn is_marked(&self, id: PersonId) -> bool {
        self.marked.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries ordered by person id, for stable display.
    pub fn entries(&self) -> Vec<PersonEntry> {
        let mut out: Vec<PersonEntry> = self.entries.values().cloned().collect();
        out.sort_by_key(|e| e.person.id);
        out
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.marked.clear();
    }
}
