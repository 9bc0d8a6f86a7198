use ulid::Ulid;

use crate::model::*;

use super::EngineError;

pub(crate) fn validate_interval(start: TimeOfDay, end: TimeOfDay) -> Result<TimeSpan, EngineError> {
    TimeSpan::try_new(start, end).ok_or_else(|| {
        EngineError::validation(format!("start time {start} must be before end time {end}"))
    })
}

/// Admission check for a `[start, end)` slot on the ledger's resource and date.
///
/// Only `pending` and `approved` reservations block. An approved reservation whose
/// window has already elapsed still blocks: expiry is a read-side view only.
/// `exclude` lets an edit re-validate against everything but itself.
///
/// The caller must hold the ledger's write lock across this check and the write
/// that follows it, otherwise two requests can both pass against the same snapshot.
pub fn check_overlap(
    ledger: &DayLedger,
    start: TimeOfDay,
    end: TimeOfDay,
    exclude: Option<Ulid>,
) -> Result<TimeSpan, EngineError> {
    let span = validate_interval(start, end)?;
    let conflict = ledger
        .overlapping(&span)
        .find(|r| Some(r.id) != exclude && r.status.blocks_slot());
    match conflict {
        Some(r) => Err(EngineError::OverlapConflict {
            conflicting_id: r.id,
        }),
        None => Ok(span),
    }
}
