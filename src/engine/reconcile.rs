//! Inserting a status assertion into a subject's interval partition.
//!
//! A reconciliation fetches the stored records around the asserted range,
//! deletes the ones it fully covers and then handles the zero, one or two
//! partially overlapping *boundary* records. Equal-status records that merely
//! touch the range are treated as boundaries too, so equal runs coalesce.
//!
//! Planning is pure ([`plan`]); [`reconcile`] runs the plan against an
//! [`IntervalStore`]. Steps are ordered so that the store never holds two
//! overlapping records, even between steps.

use tracing::debug;
use ulid::Ulid;

use crate::model::*;

use super::error::EngineError;
use super::store::IntervalStore;

/// How the only boundary record relates to the asserted range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleBoundary {
    /// Same status: the record is widened to cover the asserted range.
    ContainsMatch,
    /// Different status, strictly encloses the range: split around it.
    ContainsDiffer,
    /// Different status, the range runs into the record's head.
    PrecedesOverlap,
    /// Different status, the record's tail runs into the range.
    FollowsOverlap,
}

/// Which of the left/right boundary records share the asserted status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoubleBoundary {
    /// Both match: the left record absorbs the range and the right record.
    BothMatch,
    /// Neither matches: both are trimmed back and the range is inserted.
    NeitherMatch,
    /// Only the left matches: it extends over the range, the right is trimmed.
    LeftMatch,
    /// Only the right matches: it extends back over the range, the left is trimmed.
    RightMatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileCase {
    /// No boundary records: the range is inserted as-is.
    Fresh,
    Single(SingleBoundary),
    Double(DoubleBoundary),
}

impl ReconcileCase {
    /// Short label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileCase::Fresh => "fresh",
            ReconcileCase::Single(SingleBoundary::ContainsMatch) => "contains_match",
            ReconcileCase::Single(SingleBoundary::ContainsDiffer) => "contains_differ",
            ReconcileCase::Single(SingleBoundary::PrecedesOverlap) => "precedes_overlap",
            ReconcileCase::Single(SingleBoundary::FollowsOverlap) => "follows_overlap",
            ReconcileCase::Double(DoubleBoundary::BothMatch) => "both_match",
            ReconcileCase::Double(DoubleBoundary::NeitherMatch) => "neither_match",
            ReconcileCase::Double(DoubleBoundary::LeftMatch) => "left_match",
            ReconcileCase::Double(DoubleBoundary::RightMatch) => "right_match",
        }
    }
}

/// One store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Delete(Ulid),
    Update(StatusInterval),
    Insert(StatusInterval),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub case: ReconcileCase,
    pub steps: Vec<Step>,
}

/// Position of a stored record that is not fully covered by the asserted range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    /// Starts before and ends after the range.
    Encloses,
    /// Starts before the range, ends inside it or at its start.
    Left,
    /// Starts inside the range or at its end, ends after it.
    Right,
}

/// `None` when `existing` lies entirely inside `range`.
fn side_of(existing: &Span, range: &Span) -> Option<Side> {
    if range.contains_span(existing) {
        None
    } else if existing.start < range.start && existing.end > range.end {
        Some(Side::Encloses)
    } else if existing.start < range.start {
        Some(Side::Left)
    } else {
        Some(Side::Right)
    }
}

/// Compute the store operations that assert `candidate` over `fetched`, the
/// stored records touching its range.
pub fn plan(candidate: &StatusInterval, mut fetched: Vec<StatusInterval>) -> Result<Plan, EngineError> {
    let range = candidate.span;
    let mut covered = Vec::new();
    let mut boundary: Vec<(StatusInterval, Side)> = Vec::with_capacity(2);

    fetched.sort_by_key(|i| i.span.start);
    for existing in fetched {
        if !existing.span.touches(&range) {
            continue;
        }
        let Some(side) = side_of(&existing.span, &range) else {
            covered.push(existing);
            continue;
        };
        // A different status that only shares an endpoint needs no change.
        if !existing.span.overlaps(&range) && existing.status != candidate.status {
            continue;
        }
        boundary.push((existing, side));
    }

    // With no boundary to absorb the range, a covered record of the same
    // status is stretched over it instead of being deleted and re-inserted.
    let reused = if boundary.is_empty() {
        covered
            .iter()
            .position(|c| c.status == candidate.status)
            .map(|pos| covered.remove(pos))
    } else {
        None
    };
    let mut steps: Vec<Step> = covered.iter().map(|c| Step::Delete(c.id)).collect();

    let case = match boundary.len() {
        0 => {
            match reused {
                Some(mut kept) => {
                    if kept.span != range || kept.comment != candidate.comment {
                        kept.span = range;
                        kept.comment = candidate.comment.clone();
                        steps.push(Step::Update(kept));
                    }
                }
                None => steps.push(Step::Insert(candidate.clone())),
            }
            ReconcileCase::Fresh
        }
        1 => {
            let (b0, side) = boundary.remove(0);
            ReconcileCase::Single(plan_single(candidate, b0, side, &mut steps))
        }
        2 => {
            let (b1, side1) = boundary.remove(1);
            let (b0, side0) = boundary.remove(0);
            if side0 != Side::Left || side1 != Side::Right {
                return Err(EngineError::PartitionViolated(candidate.subject_id));
            }
            ReconcileCase::Double(plan_double(candidate, b0, b1, &mut steps))
        }
        _ => return Err(EngineError::PartitionViolated(candidate.subject_id)),
    };

    Ok(Plan { case, steps })
}

fn plan_single(
    candidate: &StatusInterval,
    b0: StatusInterval,
    side: Side,
    steps: &mut Vec<Step>,
) -> SingleBoundary {
    let range = candidate.span;
    let kind = match (b0.status == candidate.status, side) {
        (true, _) => SingleBoundary::ContainsMatch,
        (false, Side::Encloses) => SingleBoundary::ContainsDiffer,
        (false, Side::Right) => SingleBoundary::PrecedesOverlap,
        (false, Side::Left) => SingleBoundary::FollowsOverlap,
    };

    match kind {
        SingleBoundary::ContainsMatch => {
            let mut widened = b0.clone();
            widened.span.start = b0.span.start.min(range.start);
            widened.span.end = b0.span.end.max(range.end);
            if widened.span != b0.span {
                steps.push(Step::Update(widened));
            }
        }
        SingleBoundary::ContainsDiffer => {
            let tail = StatusInterval::candidate(
                b0.subject_id,
                b0.scope_id,
                Span::new(range.end, b0.span.end),
                b0.status,
                b0.comment.clone(),
            );
            let mut head = b0;
            head.span.end = range.start;
            steps.push(Step::Update(head));
            steps.push(Step::Insert(tail));
            steps.push(Step::Insert(candidate.clone()));
        }
        SingleBoundary::PrecedesOverlap => {
            let mut rest = b0;
            rest.span.start = range.end;
            steps.push(Step::Update(rest));
            steps.push(Step::Insert(candidate.clone()));
        }
        SingleBoundary::FollowsOverlap => {
            let mut rest = b0;
            rest.span.end = range.start;
            steps.push(Step::Update(rest));
            steps.push(Step::Insert(candidate.clone()));
        }
    }
    kind
}

/// `b0` is the left boundary record, `b1` the right one.
fn plan_double(
    candidate: &StatusInterval,
    b0: StatusInterval,
    b1: StatusInterval,
    steps: &mut Vec<Step>,
) -> DoubleBoundary {
    let range = candidate.span;
    let match0 = b0.status == candidate.status;
    let match1 = b1.status == candidate.status;

    match (match0, match1) {
        (true, true) => {
            let mut merged = b0;
            merged.span.start = merged.span.start.min(range.start);
            merged.span.end = b1.span.end.max(range.end);
            steps.push(Step::Delete(b1.id));
            steps.push(Step::Update(merged));
            DoubleBoundary::BothMatch
        }
        (false, false) => {
            if b0.span.end > range.start {
                let mut left = b0;
                left.span.end = range.start;
                steps.push(Step::Update(left));
            }
            if b1.span.start < range.end {
                let mut right = b1;
                right.span.start = range.end;
                steps.push(Step::Update(right));
            }
            steps.push(Step::Insert(candidate.clone()));
            DoubleBoundary::NeitherMatch
        }
        (true, false) => {
            let mut right = b1;
            right.span.start = range.end;
            let mut left = b0;
            left.span.end = range.end;
            steps.push(Step::Update(right));
            steps.push(Step::Update(left));
            DoubleBoundary::LeftMatch
        }
        (false, true) => {
            let mut left = b0;
            left.span.end = range.start;
            let mut right = b1;
            right.span.start = range.start;
            steps.push(Step::Update(left));
            steps.push(Step::Update(right));
            DoubleBoundary::RightMatch
        }
    }
}

/// Assert `candidate.status` over `candidate.span` for its subject.
///
/// Aborts at the first failing store operation and returns its error
/// unchanged; earlier operations are not undone here. Run this inside one
/// store transaction and hold a lock on the subject for its duration.
pub async fn reconcile<S: IntervalStore + ?Sized>(
    store: &mut S,
    candidate: &StatusInterval,
) -> Result<ReconcileCase, EngineError> {
    let range = candidate.span;
    if range.start >= range.end {
        return Err(EngineError::InvalidRange {
            start: range.start,
            stop: range.end,
        });
    }

    // One extra millisecond on each side pulls in records that merely touch.
    let window = Span::new(range.start.saturating_sub(1), range.end.saturating_add(1));
    let fetched = store
        .query_by_range(candidate.subject_id, candidate.scope_id, window)
        .await?;
    let plan = plan(candidate, fetched)?;

    for step in &plan.steps {
        match step {
            Step::Delete(id) => store.delete(*id).await?,
            Step::Update(interval) => store.update(interval).await?,
            Step::Insert(interval) => {
                store.insert(interval.clone()).await?;
            }
        }
    }

    debug!(
        "reconciled {} [{}, {}) -> {}: {} ({} steps)",
        candidate.subject_id,
        range.start,
        range.end,
        candidate.status,
        plan.case.label(),
        plan.steps.len()
    );
    Ok(plan.case)
}
