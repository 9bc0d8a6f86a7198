use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use areabook::catalog::StaticCatalog;
use areabook::config::Config;
use areabook::engine::Engine;
use areabook::http::{build_app, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = Config::from_env()?;
    areabook::observability::init(cfg.bind, cfg.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&cfg.data_dir)?;

    let catalog = match &cfg.catalog_path {
        Some(path) => StaticCatalog::from_json_file(path)?,
        None => StaticCatalog::new(),
    };
    let resources = catalog.len();

    let engine = Arc::new(Engine::new(
        cfg.wal_path(),
        Arc::new(catalog),
        cfg.currency.clone(),
    )?);
    tokio::spawn(areabook::compactor::run_compactor(
        engine.clone(),
        cfg.compact_threshold,
        cfg.compact_interval,
    ));

    let addr = SocketAddr::new(cfg.bind, cfg.port);
    let listener = TcpListener::bind(addr).await?;
    info!("areabook listening on http://{addr}");
    info!("  data_dir: {}", cfg.data_dir.display());
    info!("  catalog: {resources} common areas");
    info!("  currency: {}", cfg.currency);
    info!(
        "  metrics: {}",
        cfg.metrics_port
            .map_or("disabled".to_string(), |p| format!("http://{}:{p}/metrics", cfg.bind))
    );

    axum::serve(listener, build_app(AppState { engine }))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("areabook stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM. In-flight requests drain before `serve` returns.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to register SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, draining requests");
}
