// HTTP API routes (profiles, server-side play, leaderboard, catalogs).

use axum::{
    extract::{rejection::JsonRejection, Json, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::auth::{AuthConfig, PlayerAuth};
use crate::config::MAX_LEADERBOARD_LIMIT;
use crate::db::Database;
use crate::engine::achievements::ACHIEVEMENTS;
use crate::engine::config::{MAX_CLICKS_PER_REQUEST, UPGRADES};
use crate::engine::profile::{AchievementSet, Upgrades};
use crate::engine::{GameError, Profile};
use crate::gateway::GatewayError;
use crate::metrics;
use crate::rate_limit::{RateLimitType, RateLimiter};
use crate::sessions::{PlayError, SessionRegistry};

// ── Request types ─────────────────────────────────────────────────────

/// Whole-record overwrite body. `level` is accepted but re-derived from `score`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveProfileRequest {
    pub score: u64,
    pub level: Option<u32>,
    pub high_score: u64,
    pub coins: u64,
    #[serde(default)]
    pub upgrades: Upgrades,
    #[serde(default)]
    pub achievements: AchievementSet,
    pub display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClickRequest {
    pub count: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardParams {
    pub limit: Option<u32>,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry<Database>>,
    pub rate_limiter: RateLimiter,
    pub auth: AuthConfig,
    pub leaderboard_limit: u32,
}

// ── Error helpers ─────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(json!({ "error": msg })))
}

fn gateway_error(e: GatewayError) -> Response {
    match e {
        GatewayError::Timeout(_) => {
            tracing::warn!("Profile store timed out: {e}");
            json_error(StatusCode::SERVICE_UNAVAILABLE, "Profile store timed out").into_response()
        }
        GatewayError::Unavailable(_) => {
            tracing::error!("Database error: {e}");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

fn game_error(e: GameError) -> Response {
    match e {
        GameError::InsufficientFunds {
            required,
            available,
        } => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": e.to_string(),
                "required": required,
                "available": available,
            })),
        )
            .into_response(),
        GameError::UnknownUpgrade(_) => {
            json_error(StatusCode::NOT_FOUND, &e.to_string()).into_response()
        }
    }
}

fn check_rate(
    state: &AppState,
    identity: &str,
    limit_type: RateLimitType,
    cost: usize,
) -> Result<(), Response> {
    state
        .rate_limiter
        .check_limit(identity, limit_type, cost)
        .map_err(|e| json_error(StatusCode::TOO_MANY_REQUESTS, &e.to_string()).into_response())
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    let auth = state.auth.clone();

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        // Profiles
        .route("/api/user/{identity}", get(get_user).post(save_user))
        .route("/api/user/{identity}/rank", get(get_rank))
        // Server-side play
        .route("/api/user/{identity}/session", get(get_session))
        .route("/api/user/{identity}/click", post(click))
        .route(
            "/api/user/{identity}/upgrades/{upgrade_id}",
            post(purchase_upgrade),
        )
        // Leaderboard
        .route("/api/leaderboard", get(leaderboard))
        // Catalogs
        .route("/api/upgrades", get(list_upgrades))
        .route("/api/achievements", get(list_achievements))
        .with_state(state)
        .layer(Extension(auth))
        .layer(axum::middleware::from_fn(metrics::track_requests))
}

// ── Service handlers ──────────────────────────────────────────────────

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "OK",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::gather_metrics(),
    )
}

// ── Profile handlers ──────────────────────────────────────────────────

/// Fetch-or-create. A live session's unsaved state takes precedence over the
/// stored row.
async fn get_user(
    State(state): State<AppState>,
    auth: PlayerAuth,
    Path(identity): Path<String>,
) -> impl IntoResponse {
    if let Err(rejection) = auth.check_identity(&identity) {
        return rejection.into_response();
    }
    if let Some(profile) = state.sessions.live_snapshot(&identity).await {
        return (StatusCode::OK, Json(json!(profile))).into_response();
    }
    let display_name = auth.display_name();
    match state
        .sessions
        .sync()
        .load_profile(&identity, display_name.as_deref())
        .await
    {
        Ok(profile) => (StatusCode::OK, Json(json!(profile))).into_response(),
        Err(e) => gateway_error(e),
    }
}

/// Whole-record overwrite from the client. The live server session for the
/// identity is replaced by one holding this record.
async fn save_user(
    State(state): State<AppState>,
    auth: PlayerAuth,
    Path(identity): Path<String>,
    body: Result<Json<SaveProfileRequest>, JsonRejection>,
) -> impl IntoResponse {
    if let Err(rejection) = auth.check_identity(&identity) {
        return rejection.into_response();
    }
    let req = match body {
        Ok(Json(req)) => req,
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.body_text()).into_response(),
    };
    if let Err(resp) = check_rate(&state, &identity, RateLimitType::ProfileWrites, 1) {
        return resp;
    }

    let sync = state.sessions.sync();
    let level = sync.rules().curve.level_for_score(req.score);
    if req.level.is_some_and(|sent| sent != level) {
        tracing::debug!(
            "Client level {:?} for {identity} disagrees with score {}, storing {level}",
            req.level,
            req.score
        );
    }
    let mut upgrades = req.upgrades;
    upgrades.retain_known(&identity);
    let profile = Profile {
        identity: identity.clone(),
        display_name: req.display_name.or_else(|| auth.display_name()),
        score: req.score,
        level,
        high_score: req.high_score,
        coins: req.coins,
        upgrades,
        achievements: req.achievements,
        last_updated: None,
    };

    match state.sessions.overwrite(profile).await {
        Ok(changes) => (
            StatusCode::OK,
            Json(json!({ "success": true, "changes": changes })),
        )
            .into_response(),
        Err(e) => gateway_error(e),
    }
}

async fn get_rank(State(state): State<AppState>, Path(identity): Path<String>) -> impl IntoResponse {
    match state.sessions.sync().rank_of(&identity).await {
        Ok(Some(rank)) => (StatusCode::OK, Json(json!({ "rank": rank }))).into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "Profile not found").into_response(),
        Err(e) => gateway_error(e),
    }
}

async fn leaderboard(
    State(state): State<AppState>,
    Query(params): Query<LeaderboardParams>,
) -> impl IntoResponse {
    let limit = params
        .limit
        .unwrap_or(state.leaderboard_limit)
        .clamp(1, MAX_LEADERBOARD_LIMIT);
    match state.sessions.sync().leaderboard(limit).await {
        Ok(entries) => (StatusCode::OK, Json(json!(entries))).into_response(),
        Err(e) => gateway_error(e),
    }
}

// ── Play handlers ─────────────────────────────────────────────────────

async fn get_session(
    State(state): State<AppState>,
    auth: PlayerAuth,
    Path(identity): Path<String>,
) -> impl IntoResponse {
    if let Err(rejection) = auth.check_identity(&identity) {
        return rejection.into_response();
    }
    let display_name = auth.display_name();
    match state
        .sessions
        .view(&identity, display_name.as_deref())
        .await
    {
        Ok(view) => (StatusCode::OK, Json(json!(view))).into_response(),
        Err(e) => gateway_error(e),
    }
}

async fn click(
    State(state): State<AppState>,
    auth: PlayerAuth,
    Path(identity): Path<String>,
    body: Result<Json<ClickRequest>, JsonRejection>,
) -> impl IntoResponse {
    if let Err(rejection) = auth.check_identity(&identity) {
        return rejection.into_response();
    }
    let req = match body {
        Ok(Json(req)) => req,
        // A bare POST is one click
        Err(JsonRejection::MissingJsonContentType(_)) => ClickRequest::default(),
        Err(e) => return json_error(StatusCode::BAD_REQUEST, &e.body_text()).into_response(),
    };
    let count = req.count.unwrap_or(1);
    if count == 0 || count > MAX_CLICKS_PER_REQUEST {
        return json_error(
            StatusCode::BAD_REQUEST,
            &format!("count must be between 1 and {MAX_CLICKS_PER_REQUEST}"),
        )
        .into_response();
    }
    if let Err(resp) = check_rate(&state, &identity, RateLimitType::Clicks, count as usize) {
        return resp;
    }

    let display_name = auth.display_name();
    match state
        .sessions
        .click(&identity, display_name.as_deref(), count)
        .await
    {
        // The save, if any, finishes in the background
        Ok(report) => (
            StatusCode::OK,
            Json(json!({ "session": report.view, "events": report.events })),
        )
            .into_response(),
        Err(e) => gateway_error(e),
    }
}

async fn purchase_upgrade(
    State(state): State<AppState>,
    auth: PlayerAuth,
    Path((identity, upgrade_id)): Path<(String, String)>,
) -> impl IntoResponse {
    if let Err(rejection) = auth.check_identity(&identity) {
        return rejection.into_response();
    }
    if let Err(resp) = check_rate(&state, &identity, RateLimitType::ProfileWrites, 1) {
        return resp;
    }

    let display_name = auth.display_name();
    match state
        .sessions
        .purchase(&identity, display_name.as_deref(), &upgrade_id)
        .await
    {
        Ok(report) => (
            StatusCode::OK,
            Json(json!({ "session": report.view, "event": report.event })),
        )
            .into_response(),
        Err(PlayError::Game(e)) => game_error(e),
        Err(PlayError::Gateway(e)) => gateway_error(e),
    }
}

// ── Catalog handlers ──────────────────────────────────────────────────

async fn list_upgrades() -> impl IntoResponse {
    Json(json!(UPGRADES))
}

async fn list_achievements() -> impl IntoResponse {
    Json(json!(ACHIEVEMENTS))
}
