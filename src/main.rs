use std::sync::Arc;
use std::time::Duration;

use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing_subscriber::EnvFilter;

use clicker_backend::api::{self, AppState};
use clicker_backend::auth::AuthConfig;
use clicker_backend::config::{self, Config};
use clicker_backend::db::Database;
use clicker_backend::metrics;
use clicker_backend::rate_limit::RateLimiter;
use clicker_backend::sessions::{spawn_idle_sweeper, SessionRegistry};
use clicker_backend::sync::ProfileSync;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load();
    config::set_local_mode(config.local_mode);
    if config.local_mode {
        tracing::info!("Local mode: initData checks and rate limiting are off");
    } else if config.bot_token.is_none() {
        tracing::warn!("TELEGRAM_BOT_TOKEN is not set, initData checks are off");
    }
    metrics::register_metrics();

    let db = Database::new(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let db = Arc::new(db);

    let sessions = Arc::new(SessionRegistry::new(ProfileSync::new(
        db,
        config.gateway_timeout,
    )));
    let sweep_every = (config.session_idle / 4).max(Duration::from_secs(1));
    spawn_idle_sweeper(sessions.clone(), config.session_idle, sweep_every);

    let rate_limiter = RateLimiter::new();
    rate_limiter.spawn_pruner(Duration::from_secs(60));

    let state = AppState {
        sessions: sessions.clone(),
        rate_limiter,
        auth: AuthConfig::new(config.bot_token.clone()),
        leaderboard_limit: config.leaderboard_limit,
    };

    let mut app = api::router(state);
    if let Some(dir) = &config.static_dir {
        tracing::info!("Serving Mini App from {}", dir.display());
        app = app.fallback_service(ServeDir::new(dir));
    }
    let app = app.layer(CorsLayer::permissive());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to {addr}: {e}"));

    tracing::info!("Clicker backend listening on {addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Failed to start server");

    let flushed = sessions.flush_all().await;
    tracing::info!("Flushed {flushed} live sessions on shutdown");
}
