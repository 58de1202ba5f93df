mod availability;
mod conflict;
mod derive;
mod error;
mod mutations;
mod queries;
mod store;

pub use availability::{free_spans, merge_overlapping, subtract_intervals};
pub use conflict::{ConflictReport, check_conflicts, date_range_hint};
pub(crate) use conflict::validate_span;
pub use derive::{Derivation, derive};
pub use error::{BoxError, EngineError};
pub use store::{
    AppointmentCommit, AppointmentQuery, BlockedSlotQuery, InMemoryStore, SharedSchedule,
};

use std::io;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::appointment::Validator;
use crate::catalog::ActivityLookup;
use crate::config::{SchedulerConfig, SchedulingPolicy};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

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

/// Background task that owns the WAL. Appends that arrive together are
/// buffered and made durable with a single fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::warn!("WAL flush of {} event(s) failed: {e}", batch.len());
        }
        for (_, tx) in batch {
            let r = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            };
            let _ = tx.send(r);
        }

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so a partial batch can't leak into the next one.
    let flushed = wal.flush_sync();
    appended.and(flushed)
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

/// Reference scheduling service: the in-memory store as query collaborator, the WAL
/// as commit collaborator, and a per-provider lock held across validate-and-commit.
pub struct Scheduler {
    pub(super) store: InMemoryStore,
    pub(super) catalog: Arc<dyn ActivityLookup>,
    pub(super) policy: SchedulingPolicy,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    provider_locks: DashMap<Ulid, Arc<Mutex<()>>>,
    /// Shared by every WAL append + apply, exclusive while compacting, so a
    /// snapshot never misses an acknowledged event.
    pub(super) write_gate: RwLock<()>,
}

impl Scheduler {
    /// Replay the WAL at `config.wal_path` and start the background writer.
    /// Must be called inside a tokio runtime.
    pub async fn open(
        config: &SchedulerConfig,
        catalog: Arc<dyn ActivityLookup>,
        notify: Arc<NotifyHub>,
    ) -> io::Result<Self> {
        if let Some(dir) = config.wal_path.parent()
            && !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        let events = Wal::replay(&config.wal_path)?;
        let wal = Wal::open(&config.wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = InMemoryStore::new();
        for event in &events {
            let schedule = store.schedule_for(event.provider_id());
            let mut guard = schedule.write().await;
            store.apply_event(&mut guard, event);
        }
        tracing::info!(
            "replayed {} event(s) for {} provider(s) from {}",
            events.len(),
            store.provider_count(),
            config.wal_path.display()
        );

        Ok(Self {
            store,
            catalog,
            policy: config.policy.clone(),
            wal_tx,
            notify,
            provider_locks: DashMap::new(),
            write_gate: RwLock::new(()),
        })
    }

    pub fn policy(&self) -> &SchedulingPolicy {
        &self.policy
    }

    /// Collaborators for a validation pass against this scheduler's state.
    pub fn validator(&self) -> Validator<'_> {
        Validator {
            catalog: self.catalog.as_ref(),
            appointments: &self.store,
            blocked: &self.store,
            policy: &self.policy,
        }
    }

    /// Advisory lock serializing validate-and-commit per provider.
    pub(super) async fn lock_provider(&self, provider_id: Ulid) -> OwnedMutexGuard<()> {
        let lock = self
            .provider_locks
            .entry(provider_id)
            .or_default()
            .value()
            .clone();
        lock.lock_owned().await
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
            .map_err(|_| EngineError::collaborator("WAL writer shut down"))?;
        rx.await
            .map_err(|_| EngineError::collaborator("WAL writer dropped response"))?
            .map_err(EngineError::collaborator)
    }

    /// WAL-append + apply + notify.
    pub(super) async fn persist_and_apply(&self, event: &Event) -> Result<(), EngineError> {
        let _gate = self.write_gate.read().await;
        self.wal_append(event).await?;
        let provider_id = event.provider_id();
        let schedule = self.store.schedule_for(provider_id);
        {
            let mut guard = schedule.write().await;
            self.store.apply_event(&mut guard, event);
        }
        self.notify.send(provider_id, event);
        Ok(())
    }
}
