// Local mode turns off initData checks and rate limiting. Kept in its own
// test binary because the flag is process-global.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use clicker_backend::api::{router, AppState};
use clicker_backend::auth::AuthConfig;
use clicker_backend::config::{is_local_mode, set_local_mode};
use clicker_backend::db::Database;
use clicker_backend::rate_limit::RateLimiter;
use clicker_backend::sessions::SessionRegistry;
use clicker_backend::sync::ProfileSync;

#[tokio::test]
async fn test_local_mode_bypasses_auth_and_rate_limits() {
    set_local_mode(true);
    assert!(is_local_mode());

    let db = Arc::new(Database::new("sqlite::memory:").await.unwrap());
    let state = AppState {
        sessions: Arc::new(SessionRegistry::new(ProfileSync::new(
            db,
            Duration::from_secs(3),
        ))),
        rate_limiter: RateLimiter::new(),
        auth: AuthConfig::new(Some("123456:TEST-TOKEN".into())),
        leaderboard_limit: 10,
    };
    let app = router(state);

    let resp = app
        .clone()
        .oneshot(Request::get("/api/user/42").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    for _ in 0..3 {
        let resp = app
            .clone()
            .oneshot(
                Request::post("/api/user/42/click")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"count": 100}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
