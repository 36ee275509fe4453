use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use atelier_studio::backend::PostgrestSource;
use atelier_studio::counters::{FileCounterStore, UsageCounters};
use atelier_studio::enqueue::JobEnqueuer;
use atelier_studio::sync::RealtimeFeed;
use atelier_studio::{StudioConfig, StudioContext};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier_api::config::ServerConfig;
use atelier_api::notifications::EventForwarder;
use atelier_api::registry::{self, SessionRegistry};
use atelier_api::router::build_app_router;
use atelier_api::state::AppState;
use atelier_api::ws;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let db_config = atelier_db::DbConfig::from_env();
    let studio_config = StudioConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- PostgREST ---
    let db = atelier_db::create_client(&db_config).expect("Failed to build PostgREST client");
    match atelier_db::health_check(&db).await {
        Ok(()) => tracing::info!("PostgREST health check passed"),
        // Sessions fail individually until PostgREST comes up.
        Err(e) => tracing::warn!(error = %e, "PostgREST health check failed"),
    }

    // --- Quota counters ---
    let counters = match &studio_config.counter_store_path {
        Some(path) => {
            let store = FileCounterStore::open(path).expect("Failed to open counter store");
            tracing::info!(path = %path.display(), "Quota counters persisted to file");
            UsageCounters::new(Arc::new(store))
        }
        None => {
            tracing::info!("Quota counters kept in memory");
            UsageCounters::in_memory()
        }
    };

    // --- Event bus ---
    let event_bus = Arc::new(atelier_events::EventBus::default());

    // --- Studio ---
    let mut studio = StudioContext::new(
        Arc::new(PostgrestSource::new(db.clone())),
        Arc::new(JobEnqueuer::postgrest(db.clone())),
        counters,
        Arc::clone(&event_bus),
    );

    let realtime_manager = if studio_config.realtime_enabled {
        let manager = atelier_realtime::RealtimeManager::start(
            atelier_realtime::RealtimeConfig::from_env(),
        );
        studio = studio.with_feed(Arc::new(RealtimeFeed::new(
            Arc::clone(&manager),
            db_config.tables.clone(),
        )));
        tracing::info!("Realtime manager started");
        Some(manager)
    } else {
        tracing::info!("Realtime disabled, views refresh on request only");
        None
    };

    let sessions = Arc::new(SessionRegistry::new(
        studio,
        Duration::from_secs(config.session_idle_secs),
    ));
    let sweeper_handle = registry::start_idle_sweeper(Arc::clone(&sessions));

    // --- WebSocket manager ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    // Forward studio events to the sockets of their session.
    let forwarder_handle = tokio::spawn(
        EventForwarder::new(Arc::clone(&ws_manager)).run(event_bus.subscribe()),
    );

    // --- App state ---
    let state = AppState {
        db,
        config: Arc::new(config.clone()),
        sessions: Arc::clone(&sessions),
        ws_manager: Arc::clone(&ws_manager),
        event_bus: Arc::clone(&event_bus),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let drain = Duration::from_secs(config.shutdown_timeout_secs);

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;
    heartbeat_handle.abort();

    sweeper_handle.abort();
    drop(sessions);

    if let Some(manager) = realtime_manager {
        if tokio::time::timeout(drain, manager.shutdown()).await.is_err() {
            tracing::warn!("Realtime manager did not shut down in time");
        } else {
            tracing::info!("Realtime manager shut down");
        }
    }

    // The forwarder exits once every bus handle is gone.
    drop(event_bus);
    let _ = tokio::time::timeout(Duration::from_secs(5), forwarder_handle).await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
