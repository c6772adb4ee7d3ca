use std::sync::Arc;

use anyhow::Context;
use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use tokio::{net::TcpListener, sync::mpsc};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use stockroom_api::{
    config::{self, AppConfig},
    db, events,
    events::EventSender,
    handlers, openapi, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_config = config::load_config().context("failed to load configuration")?;
    config::init_tracing(app_config.log_level(), app_config.log_json);

    info!(
        environment = %app_config.environment,
        "Starting stockroom-api v{}",
        env!("CARGO_PKG_VERSION")
    );

    let db_pool = Arc::new(
        db::establish_connection_from_app_config(&app_config)
            .await
            .context("failed to connect to database")?,
    );

    if app_config.auto_migrate {
        db::run_migrations(&db_pool)
            .await
            .context("failed to run migrations")?;
    }

    let (event_tx, event_rx) = mpsc::channel(app_config.event_channel_capacity);
    tokio::spawn(events::process_events(event_rx));
    let event_sender = Some(Arc::new(EventSender::new(event_tx)));

    let state = AppState::new(db_pool, app_config.clone(), event_sender);
    let app = build_router(state, &app_config)?;

    let addr = format!("{}:{}", app_config.host, app_config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

fn build_router(state: AppState, cfg: &AppConfig) -> anyhow::Result<Router> {
    let cors = cors_layer(cfg)?;

    let router = Router::new()
        .route("/", get(|| async { "stockroom-api is running" }))
        .nest("/health", handlers::health::router())
        .nest("/api/v1", stockroom_api::api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state);

    Ok(router)
}

fn cors_layer(cfg: &AppConfig) -> anyhow::Result<CorsLayer> {
    if let Some(origins) = &cfg.cors_allowed_origins {
        let parsed: Result<Vec<HeaderValue>, _> = origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(HeaderValue::from_str)
            .collect();
        let parsed = parsed.context("invalid CORS origin in configuration")?;

        // Wildcard methods/headers cannot be combined with credentials.
        let layer = if cfg.cors_allow_credentials {
            CorsLayer::new()
                .allow_origin(parsed)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE])
                .allow_credentials(true)
        } else {
            CorsLayer::new()
                .allow_origin(parsed)
                .allow_methods(Any)
                .allow_headers(Any)
        };
        return Ok(layer);
    }

    if cfg.should_allow_permissive_cors() {
        warn!("CORS is permissive; configure cors_allowed_origins for production");
        return Ok(CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any));
    }

    anyhow::bail!("cors_allowed_origins must be set outside development")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
