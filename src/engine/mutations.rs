use chrono::{NaiveDate, Utc};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{ADMISSIONS_TOTAL, TRANSITIONS_TOTAL, WAL_COMPACTIONS_TOTAL};

use super::lifecycle::{next_status, Action};
use super::overlap::{check_overlap, validate_interval};
use super::payment::compute_snapshot;
use super::{Engine, EngineError, WalCommand};

/// A booking request as submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReservation {
    pub resource_id: ResourceId,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub attendees: Option<u32>,
    pub notes: Option<String>,
    pub requested_by: Option<u64>,
    pub requester_name: String,
}

/// Partial edit of a pending reservation. `None` leaves a field unchanged;
/// `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReservationPatch {
    pub start_time: Option<TimeOfDay>,
    pub end_time: Option<TimeOfDay>,
    pub attendees: Option<Option<u32>>,
    pub notes: Option<Option<String>>,
}

/// Admin decision on a reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusChange {
    Approve,
    /// A non-blank reason is required.
    Reject { reason: Option<String> },
    Cancel { reason: Option<String> },
}

impl StatusChange {
    fn action(&self) -> Action {
        match self {
            StatusChange::Approve => Action::Approve,
            StatusChange::Reject { .. } => Action::Reject,
            StatusChange::Cancel { .. } => Action::Cancel,
        }
    }
}

/// Trim, turn blank into `None`, and bound the length.
fn optional_text(value: Option<String>, field: &str, max: usize) -> Result<Option<String>, EngineError> {
    let Some(value) = value else { return Ok(None) };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > max {
        return Err(EngineError::validation(format!("{field} exceeds {max} characters")));
    }
    Ok(Some(trimmed.to_string()))
}

fn check_attendees(attendees: Option<u32>) -> Result<(), EngineError> {
    match attendees {
        Some(n) if n > MAX_ATTENDEES => Err(EngineError::validation(format!(
            "attendees must be at most {MAX_ATTENDEES}"
        ))),
        _ => Ok(()),
    }
}

fn record_admission(outcome: &'static str) {
    metrics::counter!(ADMISSIONS_TOTAL, "outcome" => outcome).increment(1);
}

fn record_transition(action: &'static str) {
    metrics::counter!(TRANSITIONS_TOTAL, "action" => action).increment(1);
}

impl Engine {
    /// Admit a new reservation in `pending` status.
    pub async fn create_reservation(&self, req: NewReservation) -> Result<Reservation, EngineError> {
        let requester_name = optional_text(Some(req.requester_name), "requesterName", MAX_REQUESTER_NAME_LEN)?
            .ok_or_else(|| EngineError::validation("requesterName is required"))?;
        let notes = optional_text(req.notes, "notes", MAX_NOTES_LEN)?;
        check_attendees(req.attendees)?;
        validate_interval(req.start_time, req.end_time)?;

        let key = SlotKey {
            resource_id: req.resource_id,
            date: req.date,
        };
        let ledger = self.ledger_write(key).await;
        let active = ledger.reservations.iter().filter(|r| r.status.blocks_slot()).count();
        if active >= MAX_RESERVATIONS_PER_DAY {
            record_admission("rejected_limit");
            return Err(EngineError::validation(format!(
                "resource {} already has {MAX_RESERVATIONS_PER_DAY} active reservations on {}",
                key.resource_id, key.date
            )));
        }
        let span = check_overlap(&ledger, req.start_time, req.end_time, None).inspect_err(|e| {
            record_admission("conflict");
            debug!(resource_id = key.resource_id, date = %key.date, "create rejected: {e}");
        })?;

        let now = Utc::now();
        let reservation = Reservation {
            id: Ulid::new(),
            resource_id: key.resource_id,
            date: key.date,
            span,
            status: ReservationStatus::Pending,
            attendees: req.attendees,
            notes,
            reason: None,
            requested_by: req.requested_by,
            requester_name,
            created_at: now,
            updated_at: now,
            payment: None,
            payment_status: PaymentStatus::NotRequired,
            paid_at: None,
        };
        let event = Event::ReservationCreated {
            reservation: reservation.clone(),
        };
        self.persist_and_apply(ledger, event).await?;
        record_admission("admitted");
        info!(
            id = %reservation.id,
            resource_id = key.resource_id,
            date = %key.date,
            start = %span.start,
            end = %span.end,
            "reservation created"
        );
        Ok(reservation)
    }

    /// Change times, attendees or notes of a pending reservation.
    /// A new interval is re-admitted against everything except the reservation itself.
    pub async fn edit_reservation(&self, id: Ulid, patch: ReservationPatch) -> Result<Reservation, EngineError> {
        let notes = match patch.notes {
            Some(n) => Some(optional_text(n, "notes", MAX_NOTES_LEN)?),
            None => None,
        };
        if let Some(attendees) = patch.attendees {
            check_attendees(attendees)?;
        }

        let ledger = self.resolve_reservation_write(id).await?;
        let current = ledger
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::reservation_not_found(id))?;
        next_status(id, current.status, Action::Edit)?;

        let start = patch.start_time.unwrap_or(current.span.start);
        let end = patch.end_time.unwrap_or(current.span.end);
        let span = check_overlap(&ledger, start, end, Some(id)).inspect_err(|e| {
            record_admission("conflict");
            debug!(%id, "edit rejected: {e}");
        })?;

        let event = Event::ReservationEdited {
            id,
            span,
            attendees: patch.attendees.unwrap_or(current.attendees),
            notes: notes.unwrap_or(current.notes),
            at: Utc::now(),
        };
        let ledger = self.persist_and_apply(ledger, event).await?;
        record_admission("admitted");
        record_transition(Action::Edit.as_str());
        info!(%id, start = %span.start, end = %span.end, "reservation edited");
        ledger
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::reservation_not_found(id))
    }

    /// Approve, reject or cancel. Approval freezes the payment snapshot in the same event.
    pub async fn change_status(&self, id: Ulid, change: StatusChange) -> Result<Reservation, EngineError> {
        let change = match change {
            StatusChange::Reject { reason } => {
                let reason = optional_text(reason, "reason", MAX_REASON_LEN)?
                    .ok_or_else(|| EngineError::validation("reason is required when rejecting"))?;
                StatusChange::Reject { reason: Some(reason) }
            }
            StatusChange::Cancel { reason } => StatusChange::Cancel {
                reason: optional_text(reason, "reason", MAX_REASON_LEN)?,
            },
            StatusChange::Approve => StatusChange::Approve,
        };
        let action = change.action();

        let ledger = self.resolve_reservation_write(id).await?;
        let current = ledger
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::reservation_not_found(id))?;
        next_status(id, current.status, action)?;

        let at = Utc::now();
        let event = match change {
            StatusChange::Approve => {
                let rate = self.current_rate(current.resource_id).await;
                let (payment, payment_status) = compute_snapshot(rate, &current.span, &self.currency);
                Event::ReservationApproved {
                    id,
                    payment,
                    payment_status,
                    at,
                }
            }
            StatusChange::Reject { reason } => Event::ReservationRejected {
                id,
                reason: reason.unwrap_or_default(),
                at,
            },
            StatusChange::Cancel { reason } => Event::ReservationCancelled { id, reason, at },
        };
        let ledger = self.persist_and_apply(ledger, event).await?;
        record_transition(action.as_str());
        info!(%id, from = %current.status, action = action.as_str(), "reservation status changed");
        ledger
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::reservation_not_found(id))
    }

    /// Rate in effect right now. Unknown resources and unpriced ones are free.
    async fn current_rate(&self, resource_id: ResourceId) -> f64 {
        match self.catalog.resource(resource_id).await {
            Some(info) => info.hourly_rate.unwrap_or_else(|| {
                warn!(resource_id, "resource has no hourly rate, pricing at 0");
                0.0
            }),
            None => {
                warn!(resource_id, "resource not in catalog, pricing at 0");
                0.0
            }
        }
    }

    /// Record payment. Legal while payment is `pending` or `overdue`.
    pub async fn mark_paid(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let ledger = self.resolve_reservation_write(id).await?;
        let payment_status = ledger
            .get(id)
            .map(|r| r.payment_status)
            .ok_or_else(|| EngineError::reservation_not_found(id))?;
        if !payment_status.is_due() {
            return Err(EngineError::PaymentStateViolation { id, payment_status });
        }
        let at = Utc::now();
        let event = Event::PaymentRecorded {
            id,
            payment_status: PaymentStatus::Paid,
            paid_at: Some(at),
            at,
        };
        let ledger = self.persist_and_apply(ledger, event).await?;
        record_transition("pay");
        info!(%id, "payment recorded");
        ledger
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::reservation_not_found(id))
    }

    /// Flag a pending payment as overdue.
    pub async fn mark_overdue(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let ledger = self.resolve_reservation_write(id).await?;
        let payment_status = ledger
            .get(id)
            .map(|r| r.payment_status)
            .ok_or_else(|| EngineError::reservation_not_found(id))?;
        if payment_status != PaymentStatus::Pending {
            return Err(EngineError::PaymentStateViolation { id, payment_status });
        }
        let event = Event::PaymentRecorded {
            id,
            payment_status: PaymentStatus::Overdue,
            paid_at: None,
            at: Utc::now(),
        };
        let ledger = self.persist_and_apply(ledger, event).await?;
        record_transition("overdue");
        info!(%id, "payment marked overdue");
        ledger
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::reservation_not_found(id))
    }

    /// Remove a reservation regardless of its status.
    pub async fn delete_reservation(&self, id: Ulid) -> Result<(), EngineError> {
        let ledger = self.resolve_reservation_write(id).await?;
        self.persist_and_apply(ledger, Event::ReservationDeleted { id }).await?;
        record_transition("delete");
        info!(%id, "reservation deleted");
        Ok(())
    }

    /// Rewrite the log as one `ReservationCreated` per live reservation.
    /// Writers are held off for the duration. Returns the number of events written.
    pub async fn compact_wal(&self) -> Result<usize, EngineError> {
        let _gate = self.commit_gate.write().await;

        let ledgers: Vec<_> = self
            .ledgers
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        let mut events = Vec::with_capacity(self.index.len());
        let mut empty = Vec::new();
        for (key, shared) in ledgers {
            let ledger = shared.read().await;
            if ledger.reservations.is_empty() {
                empty.push(key);
            }
            events.extend(ledger.reservations.iter().map(|r| Event::ReservationCreated {
                reservation: r.clone(),
            }));
        }
        // ULIDs sort by creation time, so replay recreates in submission order.
        events.sort_by_key(Event::reservation_id);
        let written = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Wal(e.to_string()))?;

        for key in &empty {
            self.ledgers.remove(key);
        }
        metrics::counter!(WAL_COMPACTIONS_TOTAL).increment(1);
        info!(events = written, pruned_ledgers = empty.len(), "WAL compacted");
        Ok(written)
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
