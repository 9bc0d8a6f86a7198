mod availability;
mod error;
mod expiry;
mod lifecycle;
mod mutations;
mod overlap;
mod payment;
mod queries;

pub use availability::{free_windows, merge_overlapping, subtract_intervals};
pub use error::EngineError;
pub use expiry::{derive_display_status, view};
pub use lifecycle::{next_status, Action};
pub use mutations::{NewReservation, ReservationPatch, StatusChange};
pub use overlap::check_overlap;
pub use payment::compute_snapshot;

use std::collections::HashMap;
use std::io;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::catalog::ResourceCatalog;
use crate::model::*;
use crate::wal::Wal;

pub type SharedDayLedger = Arc<RwLock<DayLedger>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    /// Persist `event`, apply it to `ledger`, then hand the guard back.
    Append {
        event: Event,
        ledger: LedgerWrite,
        response: oneshot::Sender<io::Result<LedgerWrite>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, LedgerWrite, oneshot::Sender<io::Result<LedgerWrite>>);

/// Owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain every Append already queued.
/// 4. One flush_sync for the whole batch.
/// 5. Apply every event in memory, then answer its sender.
///
/// Applying here rather than in the caller keeps memory and log in step even
/// when the caller stops waiting for the reply.
async fn wal_writer_loop(
    mut wal: Wal,
    index: Arc<DashMap<Ulid, SlotKey>>,
    mut rx: mpsc::Receiver<WalCommand>,
) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append {
                event,
                ledger,
                response,
            } => {
                let mut batch = vec![(event, ledger, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append {
                            event,
                            ledger,
                            response,
                        }) => batch.push((event, ledger, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                commit_batch(&mut wal, batch, &index);
                if let Some(cmd) = deferred {
                    handle_non_append(&mut wal, cmd, &index);
                }
            }
            other => handle_non_append(&mut wal, other, &index),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>, index: &DashMap<Ulid, SlotKey>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, &batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    match result {
        Ok(()) => {
            let mut population_changed = false;
            for (event, mut ledger, tx) in batch {
                apply_to_ledger(&mut ledger, &event, index);
                population_changed |= matches!(
                    event,
                    Event::ReservationCreated { .. } | Event::ReservationDeleted { .. }
                );
                // If the caller went away the send fails and the guard is released here.
                let _ = tx.send(Ok(ledger));
            }
            if population_changed {
                record_active(index);
            }
        }
        Err(e) => {
            tracing::error!(batch = batch.len(), "WAL flush failed: {e}");
            for (_, _, tx) in batch {
                let _ = tx.send(Err(io::Error::new(e.kind(), e.to_string())));
            }
        }
    }
}

/// All or nothing: on any failure the log is cut back to where the batch began.
fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mark = wal.mark()?;
    let mut result = Ok(());
    for (event, _, _) in batch {
        result = wal.append_buffered(event);
        if result.is_err() {
            break;
        }
    }
    if result.is_ok() {
        result = wal.flush_sync();
    }
    if result.is_err()
        && let Err(rollback_err) = wal.rollback(mark)
    {
        tracing::error!("WAL rollback failed: {rollback_err}");
    }
    result
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand, index: &DashMap<Ulid, SlotKey>) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append {
            event,
            ledger,
            response,
        } => commit_batch(wal, vec![(event, ledger, response)], index),
    }
}

fn record_active(index: &DashMap<Ulid, SlotKey>) {
    metrics::gauge!(crate::observability::RESERVATIONS_ACTIVE).set(index.len() as f64);
}

/// Apply an event to its day ledger. The caller holds the ledger's write lock.
fn apply_to_ledger(ledger: &mut DayLedger, event: &Event, index: &DashMap<Ulid, SlotKey>) {
    match event {
        Event::ReservationCreated { reservation } => {
            index.insert(reservation.id, ledger.key);
            ledger.insert(reservation.clone());
        }
        Event::ReservationEdited {
            id,
            span,
            attendees,
            notes,
            at,
        } => {
            // Re-insert so the ledger stays ordered by start time.
            if let Some(mut r) = ledger.remove(*id) {
                r.span = *span;
                r.attendees = *attendees;
                r.notes = notes.clone();
                r.updated_at = *at;
                ledger.insert(r);
            }
        }
        Event::ReservationApproved {
            id,
            payment,
            payment_status,
            at,
        } => {
            if let Some(r) = ledger.get_mut(*id) {
                r.status = ReservationStatus::Approved;
                r.payment = Some(payment.clone());
                r.payment_status = *payment_status;
                r.updated_at = *at;
            }
        }
        Event::ReservationRejected { id, reason, at } => {
            if let Some(r) = ledger.get_mut(*id) {
                r.status = ReservationStatus::Rejected;
                r.reason = Some(reason.clone());
                r.updated_at = *at;
            }
        }
        Event::ReservationCancelled { id, reason, at } => {
            if let Some(r) = ledger.get_mut(*id) {
                r.status = ReservationStatus::Cancelled;
                r.reason = reason.clone();
                r.updated_at = *at;
            }
        }
        Event::PaymentRecorded {
            id,
            payment_status,
            paid_at,
            at,
        } => {
            if let Some(r) = ledger.get_mut(*id) {
                r.payment_status = *payment_status;
                r.paid_at = *paid_at;
                r.updated_at = *at;
            }
        }
        Event::ReservationDeleted { id } => {
            ledger.remove(*id);
            index.remove(id);
        }
    }
}

/// Exclusive access to one day ledger for a validate → persist → apply sequence.
///
/// Also holds a shared commit gate so compaction can stop all writers at once.
pub(super) struct LedgerWrite {
    _gate: OwnedRwLockReadGuard<()>,
    ledger: OwnedRwLockWriteGuard<DayLedger>,
}

impl Deref for LedgerWrite {
    type Target = DayLedger;

    fn deref(&self) -> &DayLedger {
        &self.ledger
    }
}

impl DerefMut for LedgerWrite {
    fn deref_mut(&mut self) -> &mut DayLedger {
        &mut self.ledger
    }
}

/// The reservation admission engine.
///
/// Reservations live in day ledgers keyed by `(resource, date)`. Every write
/// locks exactly one ledger, so admission on one resource-day is serialized
/// while unrelated resource-days proceed in parallel.
pub struct Engine {
    pub(super) ledgers: DashMap<SlotKey, SharedDayLedger>,
    /// Reservation id → ledger key. Shared with the WAL writer, which applies events.
    pub(super) index: Arc<DashMap<Ulid, SlotKey>>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) catalog: Arc<dyn ResourceCatalog>,
    pub(super) currency: String,
    /// Shared by every mutation, taken exclusively by compaction.
    pub(super) commit_gate: Arc<RwLock<()>>,
}

impl Engine {
    /// Replay the log at `wal_path` and start the background writer.
    /// Must be called from within a Tokio runtime.
    pub fn new(
        wal_path: PathBuf,
        catalog: Arc<dyn ResourceCatalog>,
        currency: impl Into<String>,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;

        let index = Arc::new(DashMap::new());
        let mut ledgers: HashMap<SlotKey, DayLedger> = HashMap::new();
        for event in &events {
            let key = match event {
                Event::ReservationCreated { reservation } => reservation.slot_key(),
                other => match index.get(&other.reservation_id()) {
                    Some(key) => *key,
                    None => continue,
                },
            };
            let ledger = ledgers.entry(key).or_insert_with(|| DayLedger::new(key));
            apply_to_ledger(ledger, event, &index);
        }
        tracing::info!(
            events = events.len(),
            reservations = index.len(),
            path = %wal_path.display(),
            "replayed reservation log"
        );
        record_active(&index);

        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, index.clone(), wal_rx));

        Ok(Self {
            ledgers: ledgers
                .into_iter()
                .map(|(k, l)| (k, Arc::new(RwLock::new(l))))
                .collect(),
            index,
            wal_tx,
            catalog,
            currency: currency.into(),
            commit_gate: Arc::new(RwLock::new(())),
        })
    }

    pub fn reservation_count(&self) -> usize {
        self.index.len()
    }

    pub(super) fn get_ledger(&self, key: &SlotKey) -> Option<SharedDayLedger> {
        self.ledgers.get(key).map(|e| e.value().clone())
    }

    /// Write access to the ledger for `key`, creating it if this is its first booking.
    pub(super) async fn ledger_write(&self, key: SlotKey) -> LedgerWrite {
        let gate = self.commit_gate.clone().read_owned().await;
        let shared = self
            .ledgers
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(DayLedger::new(key))))
            .value()
            .clone();
        LedgerWrite {
            _gate: gate,
            ledger: shared.write_owned().await,
        }
    }

    /// Look up a reservation's ledger and lock it for writing.
    ///
    /// The id is checked again under the lock: a concurrent delete may have won.
    pub(super) async fn resolve_reservation_write(&self, id: Ulid) -> Result<LedgerWrite, EngineError> {
        let key = self
            .index
            .get(&id)
            .map(|e| *e.value())
            .ok_or_else(|| EngineError::reservation_not_found(id))?;
        let guard = self.ledger_write(key).await;
        if guard.get(id).is_none() {
            return Err(EngineError::reservation_not_found(id));
        }
        Ok(guard)
    }

    /// WAL append, then apply. The guard travels with the event and the writer
    /// applies it once durable, so memory cannot fall behind the log if this
    /// future is dropped. Memory is untouched if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        ledger: LedgerWrite,
        event: Event,
    ) -> Result<LedgerWrite, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event,
                ledger,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Wal(e.to_string()))
    }
}
