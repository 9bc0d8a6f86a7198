use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: HTTP requests served. Labels: route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "areabook_http_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "areabook_http_request_duration_seconds";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: create/edit admission decisions. Labels: outcome.
pub const ADMISSIONS_TOTAL: &str = "areabook_admissions_total";

/// Counter: applied lifecycle and payment changes. Labels: action.
pub const TRANSITIONS_TOTAL: &str = "areabook_transitions_total";

/// Gauge: reservations currently held in memory.
pub const RESERVATIONS_ACTIVE: &str = "areabook_reservations_active";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "areabook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "areabook_wal_flush_batch_size";

/// Counter: completed compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "areabook_wal_compactions_total";

/// Install the Prometheus exporter on `bind:port`. No-op if port is None.
pub fn init(
    bind: std::net::IpAddr,
    port: Option<u16>,
) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr = SocketAddr::new(bind, port);
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://{addr}/metrics");
    Ok(())
}

/// Collapse a matched route template into a metrics label.
/// Unmatched paths share one label so 404 probing cannot blow up cardinality.
pub fn route_label(matched: Option<&str>) -> String {
    matched.unwrap_or("unmatched").to_string()
}
