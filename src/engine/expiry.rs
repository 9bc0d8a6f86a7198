use chrono::NaiveDateTime;

use crate::model::*;

/// Status a reservation is presented with at `now`.
///
/// Approved reservations whose end instant is strictly before `now` read as
/// `expired`. Nothing is written back; the stored status stays `approved`.
pub fn derive_display_status(reservation: &Reservation, now: NaiveDateTime) -> DisplayStatus {
    match reservation.status {
        ReservationStatus::Approved if reservation.end_instant() < now => DisplayStatus::Expired,
        status => status.into(),
    }
}

pub fn view(reservation: Reservation, now: NaiveDateTime) -> ReservationView {
    let display_status = derive_display_status(&reservation, now);
    ReservationView {
        reservation,
        display_status,
    }
}
