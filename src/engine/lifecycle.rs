use ulid::Ulid;

use crate::model::ReservationStatus;

use super::EngineError;

/// Operations that move or modify a reservation's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Approve,
    Reject,
    Cancel,
    /// Changing date, times, attendees or notes.
    Edit,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Approve => "approve",
            Action::Reject => "reject",
            Action::Cancel => "cancel",
            Action::Edit => "edit",
        }
    }
}

/// Legal moves:
///
/// ```text
/// pending  --approve--> approved
/// pending  --reject---> rejected
/// pending  --cancel---> cancelled
/// approved --cancel---> cancelled
/// pending  --edit-----> pending
/// ```
///
/// Everything else is a `TerminalStateViolation`. Rejected and cancelled are terminal.
pub fn next_status(
    id: Ulid,
    current: ReservationStatus,
    action: Action,
) -> Result<ReservationStatus, EngineError> {
    use ReservationStatus::*;
    let next = match (current, action) {
        (Pending, Action::Approve) => Approved,
        (Pending, Action::Reject) => Rejected,
        (Pending | Approved, Action::Cancel) => Cancelled,
        (Pending, Action::Edit) => Pending,
        (status, action) => {
            return Err(EngineError::TerminalStateViolation {
                id,
                status,
                action: action.as_str(),
            });
        }
    };
    Ok(next)
}
