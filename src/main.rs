use std::sync::Arc;

use odds_tracker::config::Config;
use odds_tracker::decoder::Decoder;
use odds_tracker::history::HistoryStore;
use odds_tracker::http::build_router;
use odds_tracker::poller::Poller;
use odds_tracker::projector::Projector;
use odds_tracker::resolver::Resolver;
use odds_tracker::state::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .init();

    let resolver = Arc::new(Resolver::new(config.mapping_endpoint.clone()));
    let decoder = Decoder::new(resolver);

    let poller = Poller::new(config.odds_endpoint.clone(), config.odds_polling_interval_ms);

    let projector = Projector::new(decoder.clone());
    let history = HistoryStore::new(decoder);

    poller.add_listener(projector.clone()).await;
    poller.add_listener(history.clone()).await;
    poller.start().await;

    let state = AppState {
        poller: poller.clone(),
        projector,
        history,
    };
    let router = build_router(state);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %bind_addr, "server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    poller.stop().await;
    info!("server shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
