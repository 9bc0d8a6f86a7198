use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use chrono::{Duration, Local};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tower::ServiceExt;
use ulid::Ulid;

use areabook::catalog::{ResourceInfo, StaticCatalog};
use areabook::engine::Engine;
use areabook::http::{build_app, AppState};

// ── Test infrastructure ──────────────────────────────────────

fn test_wal_path() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("areabook_http_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("reservations.wal")
}

/// Resource 1: salón de eventos at 50/h, 2: free parrillero.
fn test_app() -> Router {
    let catalog = StaticCatalog::new();
    for (id, rate) in [(1, Some(50.0)), (2, None)] {
        catalog
            .upsert(ResourceInfo {
                id,
                name: format!("area {id}"),
                hourly_rate: rate,
                open_time: "08:00".parse().unwrap(),
                close_time: "22:00".parse().unwrap(),
                requires_approval: true,
            })
            .unwrap();
    }
    let engine = Engine::new(test_wal_path(), Arc::new(catalog), "BOB").unwrap();
    build_app(AppState {
        engine: Arc::new(engine),
    })
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    app.clone().oneshot(builder.body(body).unwrap()).await.unwrap()
}

async fn read_json<T: DeserializeOwned>(res: Response) -> T {
    let bytes = axum::body::to_bytes(res.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn booking(resource_id: u64, date: &str, start: &str, end: &str) -> Value {
    json!({
        "resourceId": resource_id,
        "date": date,
        "startTime": start,
        "endTime": end,
        "attendees": 20,
        "notes": "cumpleaños",
        "requestedBy": 7,
        "requesterName": "Lucía Mamani",
    })
}

/// Create a reservation and return its id.
async fn create(app: &Router, body: Value) -> String {
    let res = send(app, Method::POST, "/reservations", Some(body)).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = read_json(res).await;
    created["id"].as_str().unwrap().to_string()
}

async fn set_status(app: &Router, id: &str, body: Value) -> Response {
    send(app, Method::POST, &format!("/reservations/{id}/status"), Some(body)).await
}

const DAY: &str = "2099-03-10";

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn health_check() {
    let app = test_app();
    let res = send(&app, Method::GET, "/health", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(res.into_body(), 1024).await.unwrap();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn create_returns_pending_reservation() {
    let app = test_app();
    let res = send(
        &app,
        Method::POST,
        "/reservations",
        Some(booking(1, DAY, "10:00", "12:00")),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = read_json(res).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["resourceId"], 1);
    assert_eq!(body["date"], DAY);
    assert_eq!(body["startTime"], "10:00");
    assert_eq!(body["endTime"], "12:00");
    assert_eq!(body["requesterName"], "Lucía Mamani");
    assert_eq!(body["paymentRequired"], false);
    assert_eq!(body["paymentStatus"], "none");
    assert!(body["totalAmount"].is_null());

    let id = body["id"].as_str().unwrap();
    let res = send(&app, Method::GET, &format!("/reservations/{id}"), None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let fetched: Value = read_json(res).await;
    assert_eq!(fetched["id"], id);
}

#[tokio::test]
async fn overlapping_create_is_conflict() {
    let app = test_app();
    let first = create(&app, booking(1, DAY, "10:00", "12:00")).await;

    let res = send(
        &app,
        Method::POST,
        "/reservations",
        Some(booking(1, DAY, "11:00", "13:00")),
    )
    .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let body: Value = read_json(res).await;
    assert_eq!(body["error"], "overlap_conflict");
    assert_eq!(body["conflictingId"], first.as_str());

    // Touching intervals do not overlap.
    create(&app, booking(1, DAY, "12:00", "13:00")).await;
}

#[tokio::test]
async fn malformed_requests_are_validation_errors() {
    let app = test_app();
    let cases = [
        booking(1, DAY, "12:00", "10:00"),
        booking(1, DAY, "10:00", "10:00"),
        booking(1, "10/03/2099", "10:00", "12:00"),
        booking(1, DAY, "25:00", "26:00"),
        json!({ "resourceId": 1, "date": DAY, "startTime": "10:00", "endTime": "11:00" }),
        json!({ "resourceId": 1, "date": DAY, "startTime": "10:00", "endTime": "11:00",
                "requesterName": "Ana", "attendees": -3 }),
        json!({ "date": DAY }),
    ];
    for body in cases {
        let res = send(&app, Method::POST, "/reservations", Some(body.clone())).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{body}");
        let err: Value = read_json(res).await;
        assert_eq!(err["error"], "validation_error", "{body}");
        assert!(err["message"].as_str().is_some_and(|m| !m.is_empty()));
        assert!(err.get("conflictingId").is_none());
    }
}

#[tokio::test]
async fn approval_freezes_payment() {
    let app = test_app();
    let id = create(&app, booking(1, DAY, "10:00", "13:00")).await;

    let res = set_status(&app, &id, json!({ "status": "approved" })).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = read_json(res).await;
    assert_eq!(body["status"], "approved");
    assert_eq!(body["hourlyRateSnapshot"], 50.0);
    assert_eq!(body["durationHours"], 3.0);
    assert_eq!(body["totalAmount"], 150.0);
    assert_eq!(body["currency"], "BOB");
    assert_eq!(body["paymentRequired"], true);
    assert_eq!(body["paymentStatus"], "pending");

    // Approved is terminal for a second approval.
    let res = set_status(&app, &id, json!({ "status": "approved" })).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let err: Value = read_json(res).await;
    assert_eq!(err["error"], "terminal_state_violation");

    let res = send(&app, Method::POST, &format!("/reservations/{id}/pay"), None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let paid: Value = read_json(res).await;
    assert_eq!(paid["paymentStatus"], "paid");
    assert!(paid["paidAt"].is_string());

    let res = send(&app, Method::POST, &format!("/reservations/{id}/pay"), None).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let err: Value = read_json(res).await;
    assert_eq!(err["error"], "payment_state_violation");
}

#[tokio::test]
async fn free_area_cannot_be_paid() {
    let app = test_app();
    let id = create(&app, booking(2, DAY, "18:00", "20:00")).await;
    let res = set_status(&app, &id, json!({ "status": "approved" })).await;
    let body: Value = read_json(res).await;
    assert_eq!(body["paymentRequired"], false);
    assert_eq!(body["paymentStatus"], "none");

    let res = send(&app, Method::POST, &format!("/reservations/{id}/pay"), None).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn reject_requires_reason() {
    let app = test_app();
    let id = create(&app, booking(1, DAY, "10:00", "12:00")).await;

    let res = set_status(&app, &id, json!({ "status": "rejected" })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let res = set_status(&app, &id, json!({ "status": "rejected", "reason": "   " })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = set_status(
        &app,
        &id,
        json!({ "status": "rejected", "reason": "mantenimiento" }),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = read_json(res).await;
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["reason"], "mantenimiento");

    // The slot is free again.
    create(&app, booking(1, DAY, "10:00", "12:00")).await;
}

#[tokio::test]
async fn status_body_only_accepts_write_vocabulary() {
    let app = test_app();
    let id = create(&app, booking(1, DAY, "10:00", "12:00")).await;
    for status in ["pending", "expired", "aprobada", "paid"] {
        let res = set_status(&app, &id, json!({ "status": status })).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{status}");
    }
}

#[tokio::test]
async fn patch_edits_pending_only() {
    let app = test_app();
    let id = create(&app, booking(1, DAY, "10:00", "12:00")).await;
    let other = create(&app, booking(1, DAY, "14:00", "15:00")).await;
    let uri = format!("/reservations/{id}");

    let res = send(
        &app,
        Method::PATCH,
        &uri,
        Some(json!({ "startTime": "09:00", "notes": null })),
    )
    .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = read_json(res).await;
    assert_eq!(body["startTime"], "09:00");
    assert_eq!(body["endTime"], "12:00");
    assert!(body["notes"].is_null());
    assert_eq!(body["attendees"], 20);

    let res = send(&app, Method::PATCH, &uri, Some(json!({ "endTime": "14:30" }))).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
    let err: Value = read_json(res).await;
    assert_eq!(err["conflictingId"], other.as_str());

    let res = send(&app, Method::PATCH, &uri, Some(json!({ "date": "2099-03-11" }))).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    set_status(&app, &id, json!({ "status": "cancelled" })).await;
    let res = send(&app, Method::PATCH, &uri, Some(json!({ "attendees": 5 }))).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn delete_then_not_found() {
    let app = test_app();
    let id = create(&app, booking(1, DAY, "10:00", "12:00")).await;
    let uri = format!("/reservations/{id}");

    let res = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = send(&app, Method::GET, &uri, None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let err: Value = read_json(res).await;
    assert_eq!(err["error"], "not_found");

    let res = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_id_is_bad_request() {
    let app = test_app();
    let res = send(&app, Method::GET, "/reservations/not-an-id", None).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let res = send(&app, Method::POST, "/reservations/42/pay", None).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_filters_expired_by_either_label() {
    let app = test_app();
    let yesterday = (Local::now().date_naive() - Duration::days(1)).to_string();
    let tomorrow = (Local::now().date_naive() + Duration::days(1)).to_string();

    let elapsed = create(&app, booking(1, &yesterday, "10:00", "11:00")).await;
    let upcoming = create(&app, booking(1, &tomorrow, "10:00", "11:00")).await;
    create(&app, booking(2, &tomorrow, "10:00", "11:00")).await;
    for id in [&elapsed, &upcoming] {
        let res = set_status(&app, id, json!({ "status": "approved" })).await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    for label in ["expired", "expirada", "EXPIRADA"] {
        let res = send(&app, Method::GET, &format!("/reservations?status={label}"), None).await;
        assert_eq!(res.status(), StatusCode::OK);
        let page: Value = read_json(res).await;
        assert_eq!(page["total"], 1, "{label}");
        assert_eq!(page["items"][0]["id"], elapsed.as_str());
        assert_eq!(page["items"][0]["status"], "expired");
    }

    let res = send(&app, Method::GET, "/reservations?status=aprobada", None).await;
    let page: Value = read_json(res).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["id"], upcoming.as_str());

    let res = send(&app, Method::GET, "/reservations?status=pendiente&resourceId=2", None).await;
    let page: Value = read_json(res).await;
    assert_eq!(page["total"], 1);

    let res = send(&app, Method::GET, "/reservations?status=archived", None).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn list_paginates_in_chronological_order() {
    let app = test_app();
    for hour in (8..20).rev() {
        let start = format!("{hour:02}:00");
        let end = format!("{:02}:00", hour + 1);
        create(&app, booking(1, DAY, &start, &end)).await;
    }

    let res = send(&app, Method::GET, "/reservations?page=2&pageSize=5", None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let page: Value = read_json(res).await;
    assert_eq!(page["total"], 12);
    assert_eq!(page["page"], 2);
    assert_eq!(page["pageSize"], 5);
    assert_eq!(page["totalPages"], 3);
    let starts: Vec<&str> = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["startTime"].as_str().unwrap())
        .collect();
    assert_eq!(starts, ["13:00", "14:00", "15:00", "16:00", "17:00"]);

    let res = send(&app, Method::GET, "/reservations?page=9&pageSize=5", None).await;
    let page: Value = read_json(res).await;
    assert_eq!(page["items"].as_array().unwrap().len(), 0);
    assert_eq!(page["total"], 12);

    for query in ["page=0", "pageSize=0", "pageSize=101", "page=abc"] {
        let res = send(&app, Method::GET, &format!("/reservations?{query}"), None).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{query}");
    }
}

#[tokio::test]
async fn list_searches_requester_and_notes() {
    let app = test_app();
    create(&app, booking(1, DAY, "10:00", "11:00")).await;
    let mut other = booking(2, DAY, "10:00", "11:00");
    other["requesterName"] = json!("Jorge Rojas");
    other["notes"] = json!("reunión de directorio");
    create(&app, other).await;

    let res = send(&app, Method::GET, "/reservations?search=LUC", None).await;
    let page: Value = read_json(res).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["requesterName"], "Lucía Mamani");

    let res = send(&app, Method::GET, "/reservations?search=directorio", None).await;
    let page: Value = read_json(res).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["resourceId"], 2);

    let res = send(
        &app,
        Method::GET,
        "/reservations?dateFrom=2099-03-11&dateTo=2099-03-20",
        None,
    )
    .await;
    let page: Value = read_json(res).await;
    assert_eq!(page["total"], 0);
}

#[tokio::test]
async fn availability_subtracts_blocking_reservations() {
    let app = test_app();
    create(&app, booking(1, DAY, "10:00", "12:00")).await;
    let cancelled = create(&app, booking(1, DAY, "15:00", "16:00")).await;
    set_status(&app, &cancelled, json!({ "status": "cancelled" })).await;

    let uri = format!("/common-areas/1/availability?date={DAY}");
    let res = send(&app, Method::GET, &uri, None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = read_json(res).await;
    assert_eq!(body["resourceId"], 1);
    assert_eq!(
        body["windows"],
        json!([
            { "startTime": "08:00", "endTime": "10:00" },
            { "startTime": "12:00", "endTime": "22:00" },
        ])
    );

    let res = send(&app, Method::GET, "/common-areas/1/availability", None).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let uri = format!("/common-areas/99/availability?date={DAY}");
    let res = send(&app, Method::GET, &uri, None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn overdue_marks_pending_payment() {
    let app = test_app();
    let id = create(&app, booking(1, DAY, "10:00", "11:00")).await;
    let uri = format!("/reservations/{id}/overdue");

    // Nothing is owed before approval.
    let res = send(&app, Method::POST, &uri, None).await;
    assert_eq!(res.status(), StatusCode::CONFLICT);

    set_status(&app, &id, json!({ "status": "approved" })).await;
    let res = send(&app, Method::POST, &uri, None).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = read_json(res).await;
    assert_eq!(body["paymentStatus"], "overdue");

    let res = send(&app, Method::POST, &format!("/reservations/{id}/pay"), None).await;
    let body: Value = read_json(res).await;
    assert_eq!(body["paymentStatus"], "paid");
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let app = test_app();
    let res = send(&app, Method::GET, "/bookings", None).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
