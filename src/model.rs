use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Overlapping, or sharing a boundary instant.
    pub fn touches(&self, other: &Span) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Lease status of a subject over an interval. The discriminants are the
/// persisted codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeaseStatus {
    NotLeased = 0,
    Leased = 1,
    Reserved = 2,
}

impl LeaseStatus {
    pub const ALL: [LeaseStatus; 3] = [LeaseStatus::NotLeased, LeaseStatus::Leased, LeaseStatus::Reserved];

    /// Unknown codes read as `NotLeased`.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => LeaseStatus::Leased,
            2 => LeaseStatus::Reserved,
            _ => LeaseStatus::NotLeased,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn label(self) -> &'static str {
        match self {
            LeaseStatus::NotLeased => "Not Leased",
            LeaseStatus::Leased => "Leased",
            LeaseStatus::Reserved => "Reserved",
        }
    }
}

impl std::fmt::Display for LeaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// One stored status record: `status` holds for the subject over `span`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInterval {
    pub id: Ulid,
    pub subject_id: Ulid,
    pub scope_id: Ulid,
    pub span: Span,
    pub status: LeaseStatus,
    pub comment: Option<String>,
}

impl StatusInterval {
    /// A not-yet-stored interval. The store assigns the identity on insert.
    pub fn candidate(
        subject_id: Ulid,
        scope_id: Ulid,
        span: Span,
        status: LeaseStatus,
        comment: Option<String>,
    ) -> Self {
        Self {
            id: Ulid::nil(),
            subject_id,
            scope_id,
            span,
            status,
            comment,
        }
    }
}

/// First violation found by [`SubjectState::check_partition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionFault {
    Overlap(Ulid, Ulid),
    Uncoalesced(Ulid, Ulid),
}

impl std::fmt::Display for PartitionFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionFault::Overlap(a, b) => write!(f, "intervals {a} and {b} overlap"),
            PartitionFault::Uncoalesced(a, b) => {
                write!(f, "intervals {a} and {b} are adjacent with equal status")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubjectState {
    pub id: Ulid,
    pub scope_id: Ulid,
    pub name: Option<String>,
    /// Status intervals, sorted by `span.start`.
    pub intervals: Vec<StatusInterval>,
}

impl SubjectState {
    pub fn new(id: Ulid, scope_id: Ulid, name: Option<String>) -> Self {
        Self {
            id,
            scope_id,
            name,
            intervals: Vec::new(),
        }
    }

    /// Insert interval maintaining sort order by span.start.
    pub fn insert_interval(&mut self, interval: StatusInterval) {
        let pos = self
            .intervals
            .binary_search_by_key(&interval.span.start, |i| i.span.start)
            .unwrap_or_else(|e| e);
        self.intervals.insert(pos, interval);
    }

    /// Remove interval by id.
    pub fn remove_interval(&mut self, id: Ulid) -> Option<StatusInterval> {
        let pos = self.position(id)?;
        Some(self.intervals.remove(pos))
    }

    /// Replace the stored interval with the same id. Returns false if absent.
    pub fn replace_interval(&mut self, interval: StatusInterval) -> bool {
        if self.remove_interval(interval.id).is_none() {
            return false;
        }
        self.insert_interval(interval);
        true
    }

    pub fn get_interval(&self, id: Ulid) -> Option<&StatusInterval> {
        self.position(id).map(|pos| &self.intervals[pos])
    }

    fn position(&self, id: Ulid) -> Option<usize> {
        self.intervals.iter().position(|i| i.id == id)
    }

    /// Return only intervals whose span overlaps the query window.
    /// Uses binary search to skip intervals starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &StatusInterval> {
        let right_bound = self
            .intervals
            .partition_point(|i| i.span.start < query.end);
        self.intervals[..right_bound]
            .iter()
            .filter(move |i| i.span.end > query.start)
    }

    /// Status in force at instant `t`, if any.
    pub fn status_at(&self, t: Ms) -> Option<LeaseStatus> {
        let idx = self.intervals.partition_point(|i| i.span.start <= t);
        let candidate = self.intervals[..idx].last()?;
        candidate.span.contains_instant(t).then_some(candidate.status)
    }

    /// Verify the stored set is a coalesced partition: no overlap, and no two
    /// touching intervals share a status.
    pub fn check_partition(&self) -> Result<(), PartitionFault> {
        for pair in self.intervals.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if a.span.end > b.span.start {
                return Err(PartitionFault::Overlap(a.id, b.id));
            }
            if a.span.end == b.span.start && a.status == b.status {
                return Err(PartitionFault::Uncoalesced(a.id, b.id));
            }
        }
        Ok(())
    }
}

/// A single mutation within one committed reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    Inserted(StatusInterval),
    Updated(StatusInterval),
    Deleted(Ulid),
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SubjectCreated {
        id: Ulid,
        scope_id: Ulid,
        name: Option<String>,
    },
    SubjectDeleted {
        id: Ulid,
    },
    /// Every mutation of one reconciliation, persisted as a single record.
    StatusReconciled {
        subject_id: Ulid,
        changes: Vec<Change>,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectInfo {
    pub id: Ulid,
    pub scope_id: Ulid,
    pub name: Option<String>,
    pub interval_count: usize,
}
