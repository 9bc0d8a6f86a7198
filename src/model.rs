use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

/// Catalog-owned identifier of a bookable common area.
pub type ResourceId = u64;

/// Audit timestamps are always UTC.
pub type Timestamp = DateTime<Utc>;

pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Time of day as minutes since midnight. `24:00` is accepted as an end bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid time of day {0:?} (expected HH:MM)")]
pub struct InvalidTimeOfDay(pub String);

impl TimeOfDay {
    pub const MIDNIGHT: TimeOfDay = TimeOfDay(0);
    pub const END_OF_DAY: TimeOfDay = TimeOfDay(MINUTES_PER_DAY);

    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if minute >= 60 {
            return None;
        }
        let total = hour.checked_mul(60)?.checked_add(minute)?;
        (total <= MINUTES_PER_DAY).then_some(Self(total))
    }

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes <= MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    /// The instant this time falls on for `date`; `24:00` rolls over to the next midnight.
    pub fn on(self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(NaiveTime::MIN) + chrono::Duration::minutes(i64::from(self.0))
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl FromStr for TimeOfDay {
    type Err = InvalidTimeOfDay;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || InvalidTimeOfDay(s.to_string());
        let mut parts = s.trim().split(':');
        let (Some(h), Some(m)) = (parts.next(), parts.next()) else {
            return Err(bad());
        };
        // Seconds are tolerated for clients that send `HH:MM:SS`, but must be zero.
        if let Some(sec) = parts.next()
            && sec.parse::<u16>().map_err(|_| bad())? != 0
        {
            return Err(bad());
        }
        if parts.next().is_some() || h.len() > 2 || m.len() != 2 {
            return Err(bad());
        }
        let hour = h.parse::<u16>().map_err(|_| bad())?;
        let minute = m.parse::<u16>().map_err(|_| bad())?;
        Self::from_hm(hour, minute).ok_or_else(bad)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Half-open interval `[start, end)` within a single day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: TimeOfDay,
    pub end: TimeOfDay,
}

impl TimeSpan {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        debug_assert!(start < end, "TimeSpan start must be before end");
        Self { start, end }
    }

    /// Returns `None` unless `start < end`.
    pub fn try_new(start: TimeOfDay, end: TimeOfDay) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end.minutes() - self.start.minutes()
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &TimeSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Persisted reservation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Approved => "approved",
            ReservationStatus::Rejected => "rejected",
            ReservationStatus::Cancelled => "cancelled",
        }
    }

    /// Whether a reservation in this status holds its slot against new bookings.
    pub fn blocks_slot(self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Approved)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status as presented on reads. `Expired` is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Expired,
}

impl DisplayStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayStatus::Pending => "pending",
            DisplayStatus::Approved => "approved",
            DisplayStatus::Rejected => "rejected",
            DisplayStatus::Cancelled => "cancelled",
            DisplayStatus::Expired => "expired",
        }
    }
}

impl From<ReservationStatus> for DisplayStatus {
    fn from(status: ReservationStatus) -> Self {
        match status {
            ReservationStatus::Pending => DisplayStatus::Pending,
            ReservationStatus::Approved => DisplayStatus::Approved,
            ReservationStatus::Rejected => DisplayStatus::Rejected,
            ReservationStatus::Cancelled => DisplayStatus::Cancelled,
        }
    }
}

impl FromStr for DisplayStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DisplayStatus::Pending),
            "approved" => Ok(DisplayStatus::Approved),
            "rejected" => Ok(DisplayStatus::Rejected),
            "cancelled" => Ok(DisplayStatus::Cancelled),
            "expired" => Ok(DisplayStatus::Expired),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[serde(rename = "none")]
    NotRequired,
    Pending,
    Paid,
    Overdue,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::NotRequired => "none",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Overdue => "overdue",
        }
    }

    /// Payment can be collected.
    pub fn is_due(self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Overdue)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price frozen at approval time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSnapshot {
    pub hourly_rate: f64,
    pub duration_hours: f64,
    pub total_amount: f64,
    pub currency: String,
}

impl PaymentSnapshot {
    pub fn payment_required(&self) -> bool {
        self.total_amount > 0.0
    }
}

/// A day ledger is keyed by resource and calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    pub resource_id: ResourceId,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub resource_id: ResourceId,
    pub date: NaiveDate,
    pub span: TimeSpan,
    pub status: ReservationStatus,
    pub attendees: Option<u32>,
    pub notes: Option<String>,
    pub reason: Option<String>,
    pub requested_by: Option<u64>,
    pub requester_name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Set exactly once, on approval.
    pub payment: Option<PaymentSnapshot>,
    pub payment_status: PaymentStatus,
    pub paid_at: Option<Timestamp>,
}

impl Reservation {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            resource_id: self.resource_id,
            date: self.date,
        }
    }

    pub fn end_instant(&self) -> NaiveDateTime {
        self.span.end.on(self.date)
    }

    pub fn payment_required(&self) -> bool {
        self.payment.as_ref().is_some_and(PaymentSnapshot::payment_required)
    }
}

/// All reservations of one resource on one date.
#[derive(Debug, Clone)]
pub struct DayLedger {
    pub key: SlotKey,
    /// Sorted by `span.start`; equal starts keep insertion order.
    pub reservations: Vec<Reservation>,
}

impl DayLedger {
    pub fn new(key: SlotKey) -> Self {
        Self {
            key,
            reservations: Vec::new(),
        }
    }

    pub fn insert(&mut self, reservation: Reservation) {
        let start = reservation.span.start;
        let pos = self.reservations.partition_point(|r| r.span.start <= start);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Reservations of any status whose span intersects `query`.
    pub fn overlapping(&self, query: &TimeSpan) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.end > query.start)
    }
}

/// WAL record format. Every variant except `ReservationCreated` is routed by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated {
        reservation: Reservation,
    },
    ReservationEdited {
        id: Ulid,
        span: TimeSpan,
        attendees: Option<u32>,
        notes: Option<String>,
        at: Timestamp,
    },
    ReservationApproved {
        id: Ulid,
        payment: PaymentSnapshot,
        payment_status: PaymentStatus,
        at: Timestamp,
    },
    ReservationRejected {
        id: Ulid,
        reason: String,
        at: Timestamp,
    },
    ReservationCancelled {
        id: Ulid,
        reason: Option<String>,
        at: Timestamp,
    },
    PaymentRecorded {
        id: Ulid,
        payment_status: PaymentStatus,
        paid_at: Option<Timestamp>,
        at: Timestamp,
    },
    ReservationDeleted {
        id: Ulid,
    },
}

impl Event {
    pub fn reservation_id(&self) -> Ulid {
        match self {
            Event::ReservationCreated { reservation } => reservation.id,
            Event::ReservationEdited { id, .. }
            | Event::ReservationApproved { id, .. }
            | Event::ReservationRejected { id, .. }
            | Event::ReservationCancelled { id, .. }
            | Event::PaymentRecorded { id, .. }
            | Event::ReservationDeleted { id } => *id,
        }
    }
}

// ── Query types ──────────────────────────────────────────────────

/// List filters, all optional and combined with AND.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReservationFilter {
    pub status: Option<DisplayStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub search: Option<String>,
    pub resource_id: Option<ResourceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based.
    pub page: usize,
    pub page_size: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: crate::limits::DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

/// A reservation paired with the status it is presented with at read time.
#[derive(Debug, Clone, PartialEq)]
pub struct ReservationView {
    pub reservation: Reservation,
    pub display_status: DisplayStatus,
}
