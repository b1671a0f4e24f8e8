// Prometheus metrics definitions for the clicker backend.

use std::time::Instant;

use axum::{extract::MatchedPath, extract::Request, middleware::Next, response::Response};
use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Gauges ───────────────────────────────────────────────────────

    /// Game sessions currently held in memory.
    pub static ref LIVE_SESSIONS: IntGauge =
        IntGauge::new("clicker_live_sessions", "Game sessions held in memory").unwrap();

    // ── Counters ─────────────────────────────────────────────────────

    /// Clicks applied server-side.
    pub static ref CLICKS_TOTAL: IntCounter =
        IntCounter::new("clicker_clicks_total", "Clicks applied").unwrap();

    /// Level-ups reached across all sessions.
    pub static ref LEVEL_UPS_TOTAL: IntCounter =
        IntCounter::new("clicker_level_ups_total", "Levels gained").unwrap();

    /// Achievements unlocked, by achievement id.
    pub static ref ACHIEVEMENTS_UNLOCKED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clicker_achievements_unlocked_total", "Achievements unlocked"),
        &["achievement"],
    )
    .unwrap();

    /// Upgrades bought, by upgrade id.
    pub static ref UPGRADES_PURCHASED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clicker_upgrades_purchased_total", "Upgrades purchased"),
        &["upgrade"],
    )
    .unwrap();

    /// Profiles created on first contact.
    pub static ref PROFILES_CREATED_TOTAL: IntCounter =
        IntCounter::new("clicker_profiles_created_total", "Profiles created").unwrap();

    /// Session saves, by result (saved, superseded, failed).
    pub static ref PROFILE_SAVES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clicker_profile_saves_total", "Session saves"),
        &["result"],
    )
    .unwrap();

    /// Failed or timed-out profile store calls, by operation.
    pub static ref GATEWAY_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clicker_gateway_errors_total", "Failed profile store calls"),
        &["op"],
    )
    .unwrap();

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("clicker_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// Profile store call latency in seconds, by operation.
    pub static ref GATEWAY_CALL_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "clicker_gateway_call_duration_seconds",
            "Profile store call duration in seconds",
        )
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 3.0]),
        &["op"],
    )
    .unwrap();

    /// API request duration in seconds, by endpoint.
    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "clicker_api_request_duration_seconds",
            "API request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        &["endpoint"],
    )
    .unwrap();
}

/// Register all metrics with the custom registry. Safe to call more than once.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(LIVE_SESSIONS.clone()),
        Box::new(CLICKS_TOTAL.clone()),
        Box::new(LEVEL_UPS_TOTAL.clone()),
        Box::new(ACHIEVEMENTS_UNLOCKED_TOTAL.clone()),
        Box::new(UPGRADES_PURCHASED_TOTAL.clone()),
        Box::new(PROFILES_CREATED_TOTAL.clone()),
        Box::new(PROFILE_SAVES_TOTAL.clone()),
        Box::new(GATEWAY_ERRORS_TOTAL.clone()),
        Box::new(API_REQUESTS_TOTAL.clone()),
        Box::new(GATEWAY_CALL_DURATION_SECONDS.clone()),
        Box::new(API_REQUEST_DURATION_SECONDS.clone()),
    ];

    for c in collectors {
        match REGISTRY.register(c) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => tracing::warn!("Failed to register metric: {e}"),
        }
    }
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {e}");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Normalize a URL path for metric labels: replace the identity segment of
/// `/api/user/...` and any numeric segment with `:id`.
pub fn normalize_path(path: &str) -> String {
    let mut after_user = false;
    path.split('/')
        .map(|segment| {
            let replace = after_user || segment.parse::<i64>().is_ok();
            after_user = segment == "user";
            if replace && !segment.is_empty() {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Middleware recording request count and latency per route.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let endpoint = match req.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => normalize_path(req.uri().path()),
    };
    let started = Instant::now();

    let response = next.run(req).await;

    API_REQUEST_DURATION_SECONDS
        .with_label_values(&[&endpoint])
        .observe(started.elapsed().as_secs_f64());
    API_REQUESTS_TOTAL
        .with_label_values(&[&method, &endpoint, response.status().as_str()])
        .inc();
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_no_ids() {
        assert_eq!(normalize_path("/api/leaderboard"), "/api/leaderboard");
        assert_eq!(normalize_path("/health"), "/health");
    }

    #[test]
    fn test_normalize_path_with_ids() {
        assert_eq!(normalize_path("/api/user/42"), "/api/user/:id");
        assert_eq!(normalize_path("/api/user/alice/rank"), "/api/user/:id/rank");
        assert_eq!(
            normalize_path("/api/user/42/upgrades/yandexGo"),
            "/api/user/:id/upgrades/yandexGo"
        );
    }

    #[test]
    fn test_gather_metrics_returns_string() {
        register_metrics();
        register_metrics();
        CLICKS_TOTAL.inc();
        let output = gather_metrics();
        assert!(output.contains("clicker_clicks_total"));
    }

    #[test]
    fn test_metric_increments() {
        LIVE_SESSIONS.inc();
        LIVE_SESSIONS.dec();

        PROFILE_SAVES_TOTAL.with_label_values(&["saved"]).inc();
        GATEWAY_ERRORS_TOTAL.with_label_values(&["fetch"]).inc();
        UPGRADES_PURCHASED_TOTAL.with_label_values(&["yandexGo"]).inc();
        ACHIEVEMENTS_UNLOCKED_TOTAL
            .with_label_values(&["first_click"])
            .inc();

        GATEWAY_CALL_DURATION_SECONDS
            .with_label_values(&["overwrite"])
            .observe(0.002);
        API_REQUEST_DURATION_SECONDS
            .with_label_values(&["/api/leaderboard"])
            .observe(0.05);
        API_REQUESTS_TOTAL
            .with_label_values(&["GET", "/api/leaderboard", "200"])
            .inc();

        assert!(PROFILE_SAVES_TOTAL.with_label_values(&["saved"]).get() >= 1);
    }
}
