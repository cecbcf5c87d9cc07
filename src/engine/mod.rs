mod error;
mod mutations;
mod queries;
pub mod reconcile;
pub mod store;
mod validate;

pub use error::{EngineError, WriteOp};
pub use reconcile::{DoubleBoundary, ReconcileCase, SingleBoundary};
pub use store::{IntervalStore, Txn};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use ulid::Ulid;

use crate::config::Config;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedSubjectState = Arc<RwLock<SubjectState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush the batch
                    }
                }

                flush_and_respond(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush of {} events failed: {e}", batch.len());
    }
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &mut [(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so partially buffered bytes
    // don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// Lease-status timelines for every registered subject, durable through the WAL.
///
/// Each subject sits behind its own `RwLock`: reconciliations of one subject
/// are serialized by its write lock, different subjects proceed in parallel,
/// and readers only ever see committed timelines.
pub struct Engine {
    pub state: DashMap<Ulid, SharedSubjectState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Shared by every mutation for its whole duration; compaction takes it
    /// exclusively so it never snapshots a half-committed subject.
    pub(super) compact_gate: RwLock<()>,
}

/// Apply a committed change list to a subject (caller holds the lock).
fn apply_changes(ss: &mut SubjectState, changes: &[Change]) {
    for change in changes {
        match change {
            Change::Inserted(interval) => ss.insert_interval(interval.clone()),
            Change::Updated(interval) => {
                ss.replace_interval(interval.clone());
            }
            Change::Deleted(id) => {
                ss.remove_interval(*id);
            }
        }
    }
}

fn apply_to_subject(ss: &mut SubjectState, event: &Event) {
    match event {
        Event::StatusReconciled { changes, .. } => apply_changes(ss, changes),
        // SubjectCreated/Deleted are handled at the DashMap level, not here
        Event::SubjectCreated { .. } | Event::SubjectDeleted { .. } => {}
    }
}

/// Fold replayed WAL events into the subjects they leave registered.
pub fn replay_subjects(events: &[Event]) -> HashMap<Ulid, SubjectState> {
    let mut subjects = HashMap::new();
    for event in events {
        match event {
            Event::SubjectCreated { id, scope_id, name } => {
                subjects.insert(*id, SubjectState::new(*id, *scope_id, name.clone()));
            }
            Event::SubjectDeleted { id } => {
                subjects.remove(id);
            }
            Event::StatusReconciled { subject_id, changes } => {
                if let Some(ss) = subjects.get_mut(subject_id) {
                    apply_changes(ss, changes);
                }
            }
        }
    }
    subjects
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let replay = Wal::replay_report(&wal_path)?;
        if replay.torn_tail {
            tracing::warn!(
                "truncating torn WAL tail at byte {} of {}",
                replay.valid_len,
                wal_path.display()
            );
            Wal::truncate(&wal_path, replay.valid_len)?;
        }
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let state: DashMap<Ulid, SharedSubjectState> = replay_subjects(&replay.events)
            .into_iter()
            .map(|(id, ss)| (id, Arc::new(RwLock::new(ss))))
            .collect();
        let engine = Self {
            state,
            wal_tx,
            notify,
            compact_gate: RwLock::new(()),
        };

        metrics::gauge!(crate::observability::SUBJECTS_ACTIVE).set(engine.state.len() as f64);
        tracing::info!(
            "replayed {} events, {} subjects loaded",
            replay.events.len(),
            engine.state.len()
        );
        Ok(engine)
    }

    /// Open the engine described by `config` and spawn its WAL compactor.
    pub fn open(config: &Config) -> io::Result<Arc<Self>> {
        std::fs::create_dir_all(&config.data_dir)?;
        let engine = Arc::new(Self::new(config.wal_path(), Arc::new(NotifyHub::new()))?);
        tokio::spawn(crate::compactor::run_compactor(
            engine.clone(),
            config.compact_threshold,
            config.compact_interval,
        ));
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_subject_state(&self, id: &Ulid) -> Option<SharedSubjectState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    /// WAL-append + apply + notify in one call.
    pub(super) async fn persist_and_apply(
        &self,
        subject_id: Ulid,
        ss: &mut SubjectState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_subject(ss, event);
        self.notify.send(subject_id, event);
        Ok(())
    }
}
