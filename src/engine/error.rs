use ulid::Ulid;

use crate::model::{PaymentStatus, ReservationStatus};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("time slot overlaps reservation {conflicting_id}")]
    OverlapConflict { conflicting_id: Ulid },
    #[error("cannot {action} reservation {id} in status {status}")]
    TerminalStateViolation {
        id: Ulid,
        status: ReservationStatus,
        action: &'static str,
    },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("reservation {id} has payment status {payment_status}, no payment is due")]
    PaymentStateViolation {
        id: Ulid,
        payment_status: PaymentStatus,
    },
    #[error("WAL error: {0}")]
    Wal(String),
}

impl EngineError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub(crate) fn reservation_not_found(id: Ulid) -> Self {
        EngineError::NotFound(format!("reservation {id}"))
    }

    /// Short machine-readable kind, used for metrics labels and error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::OverlapConflict { .. } => "overlap_conflict",
            EngineError::TerminalStateViolation { .. } => "terminal_state_violation",
            EngineError::NotFound(_) => "not_found",
            EngineError::PaymentStateViolation { .. } => "payment_state_violation",
            EngineError::Wal(_) => "storage_error",
        }
    }
}
