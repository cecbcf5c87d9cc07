use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{oneshot, RwLock};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::reconcile::{self, ReconcileCase};
use super::store::Txn;
use super::validate::{check_comment, check_name, checked_span, interval_count_after};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    pub async fn create_subject(
        &self,
        id: Ulid,
        scope_id: Ulid,
        name: Option<String>,
    ) -> Result<(), EngineError> {
        check_name(name.as_deref())?;
        let _gate = self.compact_gate.read().await;
        if self.state.len() >= MAX_SUBJECTS {
            return Err(EngineError::LimitExceeded("too many subjects"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::SubjectCreated { id, scope_id, name: name.clone() };
        self.wal_append(&event).await?;
        let ss = SubjectState::new(id, scope_id, name);
        self.state.insert(id, Arc::new(RwLock::new(ss)));
        self.notify.send(id, &event);
        metrics::gauge!(crate::observability::SUBJECTS_ACTIVE).set(self.state.len() as f64);
        Ok(())
    }

    pub async fn delete_subject(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compact_gate.read().await;
        let ss = self
            .get_subject_state(&id)
            .ok_or(EngineError::SubjectNotFound(id))?;
        let _guard = ss.write().await;

        let event = Event::SubjectDeleted { id };
        self.wal_append(&event).await?;
        self.state.remove(&id);
        self.notify.send(id, &event);
        self.notify.remove(&id);
        metrics::gauge!(crate::observability::SUBJECTS_ACTIVE).set(self.state.len() as f64);
        Ok(())
    }

    /// Assert `status` over `[start, stop)` for the subject, merging, truncating,
    /// splitting or deleting its existing intervals so the timeline stays a
    /// coalesced partition.
    ///
    /// Runs as one transaction under the subject's write lock: the staged
    /// mutations are committed as a single WAL record, or not at all.
    pub async fn reconcile(
        &self,
        subject_id: Ulid,
        scope_id: Ulid,
        start: Ms,
        stop: Ms,
        status: LeaseStatus,
        comment: Option<String>,
    ) -> Result<(), EngineError> {
        let started = Instant::now();
        let result = self
            .reconcile_txn(subject_id, scope_id, start, stop, status, comment)
            .await;
        metrics::histogram!(crate::observability::RECONCILE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(case) => {
                metrics::counter!(crate::observability::RECONCILE_TOTAL, "case" => case.label())
                    .increment(1);
                Ok(())
            }
            Err(e) => {
                metrics::counter!(crate::observability::RECONCILE_ERRORS_TOTAL).increment(1);
                tracing::warn!("reconcile {subject_id} [{start}, {stop}) -> {status} failed: {e}");
                Err(e)
            }
        }
    }

    async fn reconcile_txn(
        &self,
        subject_id: Ulid,
        scope_id: Ulid,
        start: Ms,
        stop: Ms,
        status: LeaseStatus,
        comment: Option<String>,
    ) -> Result<ReconcileCase, EngineError> {
        let span = checked_span(start, stop)?;
        check_comment(comment.as_deref())?;

        // Gate before subject lock, always in this order.
        let _gate = self.compact_gate.read().await;
        let ss = self
            .get_subject_state(&subject_id)
            .ok_or(EngineError::SubjectNotFound(subject_id))?;
        let mut guard = ss.write().await;
        // A delete (and maybe a re-create) may have run while we waited.
        let registered = self
            .state
            .get(&subject_id)
            .is_some_and(|e| Arc::ptr_eq(e.value(), &ss));
        if guard.scope_id != scope_id || !registered {
            return Err(EngineError::SubjectNotFound(subject_id));
        }

        let candidate = StatusInterval::candidate(subject_id, scope_id, span, status, comment);
        let mut txn = Txn::begin(&guard);
        let case = reconcile::reconcile(&mut txn, &candidate).await?;
        let changes = txn.into_changes();
        if changes.is_empty() {
            return Ok(case);
        }
        if interval_count_after(guard.intervals.len(), &changes) > MAX_INTERVALS_PER_SUBJECT {
            return Err(EngineError::LimitExceeded("too many intervals on subject"));
        }

        let event = Event::StatusReconciled { subject_id, changes };
        self.persist_and_apply(subject_id, &mut guard, &event).await?;
        Ok(case)
    }

    /// Set the lease status of a subject from `start` to `stop`.
    pub async fn set_lease_status(
        &self,
        subject_id: Ulid,
        scope_id: Ulid,
        status: LeaseStatus,
        start: Ms,
        stop: Ms,
    ) -> Result<(), EngineError> {
        self.reconcile(subject_id, scope_id, start, stop, status, None)
            .await
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.compact_gate.write().await;

        let mut subjects: Vec<_> = self.state.iter().map(|e| (*e.key(), e.value().clone())).collect();
        subjects.sort_by_key(|(id, _)| *id);

        let mut events = Vec::with_capacity(subjects.len() * 2);
        for (_, ss) in subjects {
            let guard = ss.read().await;
            events.push(Event::SubjectCreated {
                id: guard.id,
                scope_id: guard.scope_id,
                name: guard.name.clone(),
            });
            if !guard.intervals.is_empty() {
                events.push(Event::StatusReconciled {
                    subject_id: guard.id,
                    changes: guard.intervals.iter().cloned().map(Change::Inserted).collect(),
                });
            }
        }

        let event_count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;

        metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
        tracing::info!("WAL compacted to {event_count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
