//! Wire shapes for the JSON API and their conversion to engine types.
//!
//! Every text field arrives as a string and is parsed here so malformed
//! input surfaces as a `ValidationError` body instead of a bare extractor rejection.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use ulid::Ulid;

use crate::engine::{EngineError, NewReservation, ReservationPatch, StatusChange};
use crate::limits::DEFAULT_PAGE_SIZE;
use crate::model::*;

// ── Parsing helpers ──────────────────────────────────────────────

fn invalid(field: &str, value: &str, expected: &str) -> EngineError {
    EngineError::Validation(format!("{field}: {value:?} is not {expected}"))
}

pub fn parse_date(field: &str, value: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| invalid(field, value, "a YYYY-MM-DD date"))
}

pub fn parse_time(field: &str, value: &str) -> Result<TimeOfDay, EngineError> {
    value.parse().map_err(|_| invalid(field, value, "an HH:MM time"))
}

pub fn parse_id(value: &str) -> Result<Ulid, EngineError> {
    Ulid::from_string(value.trim()).map_err(|_| invalid("id", value, "a reservation id"))
}

fn parse_attendees(value: i64) -> Result<u32, EngineError> {
    u32::try_from(value).map_err(|_| EngineError::validation("attendees must be a non-negative integer"))
}

/// Canonical status codes plus the Spanish labels shown in the console.
/// Blank means "no filter".
pub fn parse_status_filter(value: &str) -> Result<Option<DisplayStatus>, EngineError> {
    let status = match value.trim().to_lowercase().as_str() {
        "" => return Ok(None),
        "pending" | "pendiente" => DisplayStatus::Pending,
        "approved" | "aprobada" => DisplayStatus::Approved,
        "rejected" | "rechazada" => DisplayStatus::Rejected,
        "cancelled" | "cancelada" => DisplayStatus::Cancelled,
        "expired" | "expirada" => DisplayStatus::Expired,
        _ => return Err(invalid("status", value, "a reservation status")),
    };
    Ok(Some(status))
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// ── Requests ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationRequest {
    pub resource_id: ResourceId,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub attendees: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub requested_by: Option<u64>,
    #[serde(default)]
    pub requester_name: Option<String>,
}

impl TryFrom<CreateReservationRequest> for NewReservation {
    type Error = EngineError;

    fn try_from(req: CreateReservationRequest) -> Result<Self, Self::Error> {
        Ok(NewReservation {
            resource_id: req.resource_id,
            date: parse_date("date", &req.date)?,
            start_time: parse_time("startTime", &req.start_time)?,
            end_time: parse_time("endTime", &req.end_time)?,
            attendees: req.attendees.map(parse_attendees).transpose()?,
            notes: req.notes,
            requested_by: req.requested_by,
            requester_name: req
                .requester_name
                .ok_or_else(|| EngineError::validation("requesterName is required"))?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateReservationRequest {
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub attendees: Option<Option<i64>>,
    #[serde(default, deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
}

impl TryFrom<UpdateReservationRequest> for ReservationPatch {
    type Error = EngineError;

    fn try_from(req: UpdateReservationRequest) -> Result<Self, Self::Error> {
        Ok(ReservationPatch {
            start_time: req.start_time.as_deref().map(|v| parse_time("startTime", v)).transpose()?,
            end_time: req.end_time.as_deref().map(|v| parse_time("endTime", v)).transpose()?,
            attendees: match req.attendees {
                Some(Some(n)) => Some(Some(parse_attendees(n)?)),
                Some(None) => Some(None),
                None => None,
            },
            notes: req.notes,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

impl TryFrom<StatusRequest> for StatusChange {
    type Error = EngineError;

    /// Only the persisted vocabulary is accepted on writes.
    fn try_from(req: StatusRequest) -> Result<Self, Self::Error> {
        match req.status.trim() {
            "approved" => Ok(StatusChange::Approve),
            "rejected" => Ok(StatusChange::Reject { reason: req.reason }),
            "cancelled" => Ok(StatusChange::Cancel { reason: req.reason }),
            other => Err(invalid("status", other, "one of approved, rejected, cancelled")),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub status: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub search: Option<String>,
    pub resource_id: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

fn parse_count(field: &str, value: &str) -> Result<usize, EngineError> {
    value.trim().parse().map_err(|_| invalid(field, value, "a positive integer"))
}

impl ListParams {
    /// Blank parameters are treated as absent.
    pub fn into_query(self) -> Result<(ReservationFilter, PageRequest), EngineError> {
        let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let filter = ReservationFilter {
            status: match present(self.status) {
                Some(s) => parse_status_filter(&s)?,
                None => None,
            },
            date_from: present(self.date_from).map(|v| parse_date("dateFrom", &v)).transpose()?,
            date_to: present(self.date_to).map(|v| parse_date("dateTo", &v)).transpose()?,
            search: present(self.search),
            resource_id: present(self.resource_id)
                .map(|v| v.trim().parse().map_err(|_| invalid("resourceId", &v, "a resource id")))
                .transpose()?,
        };
        let page = PageRequest {
            page: present(self.page).map(|v| parse_count("page", &v)).transpose()?.unwrap_or(1),
            page_size: present(self.page_size)
                .map(|v| parse_count("pageSize", &v))
                .transpose()?
                .unwrap_or(DEFAULT_PAGE_SIZE),
        };
        Ok((filter, page))
    }
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityParams {
    pub date: Option<String>,
}

// ── Responses ────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResponse {
    pub id: String,
    pub resource_id: ResourceId,
    pub date: NaiveDate,
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    /// Displayed status; `expired` for elapsed approvals.
    pub status: DisplayStatus,
    pub attendees: Option<u32>,
    pub notes: Option<String>,
    pub reason: Option<String>,
    pub requested_by: Option<u64>,
    pub requester_name: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub hourly_rate_snapshot: Option<f64>,
    pub duration_hours: Option<f64>,
    pub total_amount: Option<f64>,
    pub currency: Option<String>,
    pub payment_required: bool,
    pub payment_status: PaymentStatus,
    pub paid_at: Option<Timestamp>,
}

impl From<ReservationView> for ReservationResponse {
    fn from(view: ReservationView) -> Self {
        let r = view.reservation;
        let payment_required = r.payment_required();
        let payment = r.payment;
        ReservationResponse {
            id: r.id.to_string(),
            resource_id: r.resource_id,
            date: r.date,
            start_time: r.span.start,
            end_time: r.span.end,
            status: view.display_status,
            attendees: r.attendees,
            notes: r.notes,
            reason: r.reason,
            requested_by: r.requested_by,
            requester_name: r.requester_name,
            created_at: r.created_at,
            updated_at: r.updated_at,
            hourly_rate_snapshot: payment.as_ref().map(|p| p.hourly_rate),
            duration_hours: payment.as_ref().map(|p| p.duration_hours),
            total_amount: payment.as_ref().map(|p| p.total_amount),
            currency: payment.map(|p| p.currency),
            payment_required,
            payment_status: r.payment_status,
            paid_at: r.paid_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationPage {
    pub items: Vec<ReservationResponse>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

impl From<Page<ReservationView>> for ReservationPage {
    fn from(page: Page<ReservationView>) -> Self {
        ReservationPage {
            total_pages: page.total.div_ceil(page.page_size.max(1)),
            items: page.items.into_iter().map(Into::into).collect(),
            total: page.total,
            page: page.page,
            page_size: page.page_size,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub resource_id: ResourceId,
    pub date: NaiveDate,
    pub windows: Vec<Window>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicting_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_filter_accepts_labels() {
        assert_eq!(parse_status_filter("expirada").unwrap(), Some(DisplayStatus::Expired));
        assert_eq!(parse_status_filter(" Aprobada ").unwrap(), Some(DisplayStatus::Approved));
        assert_eq!(parse_status_filter("cancelled").unwrap(), Some(DisplayStatus::Cancelled));
        assert_eq!(parse_status_filter("").unwrap(), None);
        assert!(parse_status_filter("done").is_err());
    }

    #[test]
    fn create_request_parses_and_validates() {
        let req: CreateReservationRequest = serde_json::from_str(
            r#"{"resourceId": 1, "date": "2024-06-01", "startTime": "10:00", "endTime": "12:00",
                "attendees": 15, "requesterName": "Ana"}"#,
        )
        .unwrap();
        let new = NewReservation::try_from(req).unwrap();
        assert_eq!(new.date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(new.start_time.to_string(), "10:00");
        assert_eq!(new.attendees, Some(15));

        for body in [
            r#"{"resourceId": 1, "date": "01/06/2024", "startTime": "10:00", "endTime": "12:00", "requesterName": "A"}"#,
            r#"{"resourceId": 1, "date": "2024-06-01", "startTime": "10h", "endTime": "12:00", "requesterName": "A"}"#,
            r#"{"resourceId": 1, "date": "2024-06-01", "startTime": "10:00", "endTime": "12:00", "attendees": -1, "requesterName": "A"}"#,
            r#"{"resourceId": 1, "date": "2024-06-01", "startTime": "10:00", "endTime": "12:00"}"#,
        ] {
            let req: CreateReservationRequest = serde_json::from_str(body).unwrap();
            assert!(matches!(NewReservation::try_from(req), Err(EngineError::Validation(_))), "{body}");
        }
    }

    #[test]
    fn patch_distinguishes_null_from_absent() {
        let req: UpdateReservationRequest = serde_json::from_str(r#"{"notes": null, "attendees": 4}"#).unwrap();
        let patch = ReservationPatch::try_from(req).unwrap();
        assert_eq!(patch.notes, Some(None));
        assert_eq!(patch.attendees, Some(Some(4)));
        assert_eq!(patch.start_time, None);

        let req: UpdateReservationRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(ReservationPatch::try_from(req).unwrap(), ReservationPatch::default());
    }

    #[test]
    fn patch_rejects_unknown_fields() {
        assert!(serde_json::from_str::<UpdateReservationRequest>(r#"{"date": "2024-06-01"}"#).is_err());
    }

    #[test]
    fn status_request_only_takes_write_vocabulary() {
        for status in ["pending", "expired", "aprobada", ""] {
            let req = StatusRequest {
                status: status.into(),
                reason: None,
            };
            assert!(StatusChange::try_from(req).is_err(), "{status}");
        }
        let req = StatusRequest {
            status: "rejected".into(),
            reason: Some("lluvia".into()),
        };
        assert_eq!(
            StatusChange::try_from(req).unwrap(),
            StatusChange::Reject {
                reason: Some("lluvia".into())
            }
        );
    }

    #[test]
    fn list_params_defaults_and_errors() {
        let (filter, page) = ListParams::default().into_query().unwrap();
        assert_eq!(filter, ReservationFilter::default());
        assert_eq!(page, PageRequest::default());

        let params = ListParams {
            status: Some("".into()),
            page: Some("3".into()),
            page_size: Some("25".into()),
            resource_id: Some("7".into()),
            ..Default::default()
        };
        let (filter, page) = params.into_query().unwrap();
        assert_eq!(filter.status, None);
        assert_eq!(filter.resource_id, Some(7));
        assert_eq!(page, PageRequest { page: 3, page_size: 25 });

        let params = ListParams {
            date_from: Some("yesterday".into()),
            ..Default::default()
        };
        assert!(matches!(params.into_query(), Err(EngineError::Validation(_))));
    }
}
