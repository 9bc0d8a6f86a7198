//! JSON-over-HTTP surface of the reservation engine.

pub mod dto;
mod error;
mod handlers;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::observability::{route_label, HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

async fn track_metrics(req: Request, next: Next) -> Response {
    let route = route_label(req.extensions().get::<MatchedPath>().map(MatchedPath::as_str));
    let start = Instant::now();
    let response = next.run(req).await;
    metrics::counter!(
        HTTP_REQUESTS_TOTAL,
        "route" => route.clone(),
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);
    metrics::histogram!(HTTP_REQUEST_DURATION_SECONDS, "route" => route)
        .record(start.elapsed().as_secs_f64());
    response
}

pub fn build_app(state: AppState) -> Router {
    let reservations = Router::new()
        .route(
            "/",
            get(handlers::list_reservations).post(handlers::create_reservation),
        )
        .route(
            "/:id",
            get(handlers::get_reservation)
                .patch(handlers::update_reservation)
                .delete(handlers::delete_reservation),
        )
        .route("/:id/status", post(handlers::change_status))
        .route("/:id/pay", post(handlers::pay_reservation))
        .route("/:id/overdue", post(handlers::mark_overdue));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/reservations", reservations)
        .route("/common-areas/:id/availability", get(handlers::availability))
        .route_layer(middleware::from_fn(track_metrics))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
