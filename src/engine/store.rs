use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;

use super::error::{EngineError, WriteOp};

/// Persistence capability the reconciler runs against. Scoped to one
/// subject's intervals; every call may suspend on storage I/O.
///
/// Callers are expected to run a whole reconciliation inside one transaction
/// of the implementing store, so that the range query and every subsequent
/// mutation see one consistent snapshot and commit or roll back together.
#[async_trait]
pub trait IntervalStore: Send + Sync {
    /// Intervals of `(subject_id, scope_id)` intersecting `span`, ordered by start.
    async fn query_by_range(
        &self,
        subject_id: Ulid,
        scope_id: Ulid,
        span: Span,
    ) -> Result<Vec<StatusInterval>, EngineError>;

    /// Store a new interval. `interval.id` is ignored; the assigned identity is returned.
    async fn insert(&mut self, interval: StatusInterval) -> Result<Ulid, EngineError>;

    /// Overwrite the stored interval with the same identity.
    async fn update(&mut self, interval: &StatusInterval) -> Result<(), EngineError>;

    async fn delete(&mut self, id: Ulid) -> Result<(), EngineError>;
}

/// In-memory transaction over one subject. Mutations are staged on a private
/// copy of the subject's intervals and recorded as [`Change`]s; nothing is
/// visible outside until the engine commits the change list. Dropping a
/// `Txn` discards it.
pub struct Txn {
    staged: SubjectState,
    changes: Vec<Change>,
}

impl Txn {
    pub fn begin(base: &SubjectState) -> Self {
        Self {
            staged: base.clone(),
            changes: Vec::new(),
        }
    }

    /// The subject as it would look if committed now.
    pub fn staged(&self) -> &SubjectState {
        &self.staged
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn into_changes(self) -> Vec<Change> {
        self.changes
    }

    fn check_owner(&self, subject_id: Ulid, scope_id: Ulid) -> Result<(), EngineError> {
        if subject_id != self.staged.id || scope_id != self.staged.scope_id {
            return Err(EngineError::SubjectNotFound(subject_id));
        }
        Ok(())
    }
}

#[async_trait]
impl IntervalStore for Txn {
    async fn query_by_range(
        &self,
        subject_id: Ulid,
        scope_id: Ulid,
        span: Span,
    ) -> Result<Vec<StatusInterval>, EngineError> {
        self.check_owner(subject_id, scope_id)?;
        Ok(self.staged.overlapping(&span).cloned().collect())
    }

    async fn insert(&mut self, mut interval: StatusInterval) -> Result<Ulid, EngineError> {
        self.check_owner(interval.subject_id, interval.scope_id)?;
        interval.id = Ulid::new();
        let id = interval.id;
        self.staged.insert_interval(interval.clone());
        self.changes.push(Change::Inserted(interval));
        Ok(id)
    }

    async fn update(&mut self, interval: &StatusInterval) -> Result<(), EngineError> {
        self.check_owner(interval.subject_id, interval.scope_id)?;
        if !self.staged.replace_interval(interval.clone()) {
            return Err(EngineError::StoreWriteFailed {
                op: WriteOp::Update,
                id: interval.id,
                reason: "no such interval".into(),
            });
        }
        self.changes.push(Change::Updated(interval.clone()));
        Ok(())
    }

    async fn delete(&mut self, id: Ulid) -> Result<(), EngineError> {
        if self.staged.remove_interval(id).is_none() {
            return Err(EngineError::StoreWriteFailed {
                op: WriteOp::Delete,
                id,
                reason: "no such interval".into(),
            });
        }
        self.changes.push(Change::Deleted(id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> SubjectState {
        SubjectState::new(Ulid::new(), Ulid::new(), Some("Unit 4B".into()))
    }

    #[tokio::test]
    async fn insert_assigns_identity_and_stays_staged() {
        let base = subject();
        let mut txn = Txn::begin(&base);
        let draft = StatusInterval::candidate(base.id, base.scope_id, Span::new(0, 100), LeaseStatus::Leased, None);

        let id = txn.insert(draft).await.unwrap();
        assert_ne!(id, Ulid::nil());
        assert_eq!(txn.staged().intervals.len(), 1);
        assert_eq!(txn.staged().intervals[0].id, id);
        assert!(base.intervals.is_empty());
        assert!(matches!(&txn.changes()[0], Change::Inserted(i) if i.id == id));
    }

    #[tokio::test]
    async fn query_returns_intersecting_in_start_order() {
        let base = subject();
        let mut txn = Txn::begin(&base);
        for (s, e) in [(300, 400), (0, 100), (100, 200)] {
            let draft = StatusInterval::candidate(base.id, base.scope_id, Span::new(s, e), LeaseStatus::Leased, None);
            txn.insert(draft).await.unwrap();
        }
        let hits = txn.query_by_range(base.id, base.scope_id, Span::new(50, 350)).await.unwrap();
        let spans: Vec<Span> = hits.iter().map(|i| i.span).collect();
        assert_eq!(spans, vec![Span::new(0, 100), Span::new(100, 200), Span::new(300, 400)]);
    }

    #[tokio::test]
    async fn wrong_scope_is_subject_not_found() {
        let base = subject();
        let txn = Txn::begin(&base);
        let result = txn.query_by_range(base.id, Ulid::new(), Span::new(0, 1)).await;
        assert!(matches!(result, Err(EngineError::SubjectNotFound(id)) if id == base.id));
    }

    #[tokio::test]
    async fn update_and_delete_of_missing_identity_fail() {
        let base = subject();
        let mut txn = Txn::begin(&base);
        let mut ghost = StatusInterval::candidate(base.id, base.scope_id, Span::new(0, 10), LeaseStatus::Reserved, None);
        ghost.id = Ulid::new();

        let result = txn.update(&ghost).await;
        assert!(matches!(
            result,
            Err(EngineError::StoreWriteFailed { op: WriteOp::Update, id, .. }) if id == ghost.id
        ));
        let result = txn.delete(ghost.id).await;
        assert!(matches!(
            result,
            Err(EngineError::StoreWriteFailed { op: WriteOp::Delete, .. })
        ));
        assert!(txn.changes().is_empty());
    }

    #[tokio::test]
    async fn update_replaces_in_place() {
        let base = subject();
        let mut txn = Txn::begin(&base);
        let draft = StatusInterval::candidate(base.id, base.scope_id, Span::new(0, 100), LeaseStatus::Leased, None);
        let id = txn.insert(draft).await.unwrap();

        let mut widened = txn.staged().get_interval(id).unwrap().clone();
        widened.span = Span::new(0, 500);
        txn.update(&widened).await.unwrap();

        assert_eq!(txn.staged().intervals.len(), 1);
        assert_eq!(txn.staged().intervals[0].span, Span::new(0, 500));
        assert_eq!(txn.changes().len(), 2);
    }
}
