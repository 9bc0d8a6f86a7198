use crate::model::*;

/// Price a booked span at `hourly_rate`.
///
/// `duration_hours` keeps its fractional part; only the total is rounded, to
/// two decimal places. A zero (or unusable) rate yields a free booking with
/// no payment due.
pub fn compute_snapshot(
    hourly_rate: f64,
    span: &TimeSpan,
    currency: &str,
) -> (PaymentSnapshot, PaymentStatus) {
    let hourly_rate = if hourly_rate.is_finite() && hourly_rate > 0.0 {
        hourly_rate
    } else {
        0.0
    };
    let duration_hours = f64::from(span.duration_minutes()) / 60.0;
    let total_amount = round_cents(hourly_rate * duration_hours);
    let snapshot = PaymentSnapshot {
        hourly_rate,
        duration_hours,
        total_amount,
        currency: currency.to_string(),
    };
    let status = if snapshot.payment_required() {
        PaymentStatus::Pending
    } else {
        PaymentStatus::NotRequired
    };
    (snapshot, status)
}

fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
