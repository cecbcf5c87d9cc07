use ulid::Ulid;

use crate::model::*;

use super::validate::checked_span;
use super::{Engine, EngineError, SharedSubjectState};

impl Engine {
    /// Resolve a subject and check it belongs to `scope_id`.
    async fn scoped_subject(&self, subject_id: Ulid, scope_id: Ulid) -> Result<SharedSubjectState, EngineError> {
        let ss = self
            .get_subject_state(&subject_id)
            .ok_or(EngineError::SubjectNotFound(subject_id))?;
        if ss.read().await.scope_id != scope_id {
            return Err(EngineError::SubjectNotFound(subject_id));
        }
        Ok(ss)
    }

    /// Stored intervals intersecting `[start, stop)`, ordered by start.
    pub async fn lease_status_by_range(
        &self,
        subject_id: Ulid,
        scope_id: Ulid,
        start: Ms,
        stop: Ms,
    ) -> Result<Vec<StatusInterval>, EngineError> {
        let query = checked_span(start, stop)?;
        let ss = self.scoped_subject(subject_id, scope_id).await?;
        let guard = ss.read().await;
        Ok(guard.overlapping(&query).cloned().collect())
    }

    pub async fn lease_status_at(
        &self,
        subject_id: Ulid,
        scope_id: Ulid,
        at: Ms,
    ) -> Result<Option<LeaseStatus>, EngineError> {
        let ss = self.scoped_subject(subject_id, scope_id).await?;
        let guard = ss.read().await;
        Ok(guard.status_at(at))
    }

    pub async fn get_subject(&self, id: &Ulid) -> Option<SubjectInfo> {
        let ss = self.get_subject_state(id)?;
        let guard = ss.read().await;
        Some(subject_info(&guard))
    }

    /// All registered subjects, ordered by id.
    pub async fn list_subjects(&self) -> Vec<SubjectInfo> {
        let subjects: Vec<SharedSubjectState> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(subjects.len());
        for ss in subjects {
            out.push(subject_info(&*ss.read().await));
        }
        out.sort_by_key(|s| s.id);
        out
    }
}

fn subject_info(ss: &SubjectState) -> SubjectInfo {
    SubjectInfo {
        id: ss.id,
        scope_id: ss.scope_id,
        name: ss.name.clone(),
        interval_count: ss.intervals.len(),
    }
}
