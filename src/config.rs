// Application configuration, loaded from environment variables and CLI flags.

use std::path::PathBuf;
use std::time::Duration;

use crate::sync::DEFAULT_GATEWAY_TIMEOUT;

pub const MAX_LEADERBOARD_LIMIT: u32 = 100;

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Database URL (SQLite connection string).
    pub database_url: String,
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Whether to run in local mode (no initData checks, no rate limiting).
    pub local_mode: bool,
    /// Directory containing the built Mini App to serve.
    pub static_dir: Option<PathBuf>,
    /// Telegram bot token used to verify initData. Checks are off when unset.
    pub bot_token: Option<String>,
    /// Bound on every profile store call made by the sync layer.
    pub gateway_timeout: Duration,
    /// Live sessions idle longer than this are flushed and evicted.
    pub session_idle: Duration,
    /// Default leaderboard size.
    pub leaderboard_limit: u32,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `DATABASE_URL` - SQLite connection string (default: `sqlite:clicker.db?mode=rwc`)
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `STATIC_DIR` - Path to the Mini App build for static file serving
    /// - `TELEGRAM_BOT_TOKEN` - Bot token for initData verification
    /// - `CLICKER_LOCAL_MODE` - Set to `true` to enable local mode
    /// - `GATEWAY_TIMEOUT_MS` - Profile store call timeout (default: 3000)
    /// - `SESSION_IDLE_SECS` - Idle session eviction age (default: 300)
    /// - `LEADERBOARD_LIMIT` - Default leaderboard size (default: 10, max 100)
    ///
    /// CLI flags:
    /// - `--local` - Enable local mode (same as `CLICKER_LOCAL_MODE=true`)
    /// - `--port <PORT>` - Override the port
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    fn from_sources(args: &[String], env: impl Fn(&str) -> Option<String>) -> Self {
        let parsed = |key: &str| env(key).and_then(|v| v.parse::<u64>().ok());

        let database_url =
            env("DATABASE_URL").unwrap_or_else(|| "sqlite:clicker.db?mode=rwc".to_string());

        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| env("PORT").and_then(|v| v.parse().ok()))
            .unwrap_or(3000);

        let local_mode = args.iter().any(|a| a == "--local")
            || env("CLICKER_LOCAL_MODE")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false);

        let static_dir = env("STATIC_DIR").map(PathBuf::from);
        let bot_token = env("TELEGRAM_BOT_TOKEN").filter(|t| !t.is_empty());

        let gateway_timeout = parsed("GATEWAY_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_GATEWAY_TIMEOUT);
        let session_idle = Duration::from_secs(parsed("SESSION_IDLE_SECS").unwrap_or(300));
        let leaderboard_limit = parsed("LEADERBOARD_LIMIT")
            .map(|v| v.clamp(1, u64::from(MAX_LEADERBOARD_LIMIT)) as u32)
            .unwrap_or(10);

        Config {
            database_url,
            port,
            local_mode,
            static_dir,
            bot_token,
            gateway_timeout,
            session_idle,
            leaderboard_limit,
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }
}

/// Global flag indicating local mode is active.
/// This is set once at startup and read by the auth extractor and rate limiter.
static LOCAL_MODE: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Set the local mode flag (called once at startup).
pub fn set_local_mode(enabled: bool) {
    LOCAL_MODE.store(enabled, std::sync::atomic::Ordering::Relaxed);
}

/// Check if local mode is active.
pub fn is_local_mode() -> bool {
    LOCAL_MODE.load(std::sync::atomic::Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load_with(args: &[&str], vars: &[(&str, &str)]) -> Config {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_sources(&args, |key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load_with(&["clicker-backend"], &[]);
        assert_eq!(config.database_url, "sqlite:clicker.db?mode=rwc");
        assert_eq!(config.port, 3000);
        assert!(!config.local_mode);
        assert!(config.bot_token.is_none());
        assert_eq!(config.gateway_timeout, DEFAULT_GATEWAY_TIMEOUT);
        assert_eq!(config.session_idle, Duration::from_secs(300));
        assert_eq!(config.leaderboard_limit, 10);
    }

    #[test]
    fn test_cli_port_overrides_env() {
        let config = load_with(&["clicker-backend", "--port", "8080"], &[("PORT", "9000")]);
        assert_eq!(config.port, 8080);
        let config = load_with(&["clicker-backend"], &[("PORT", "9000")]);
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_local_mode_sources() {
        assert!(load_with(&["clicker-backend", "--local"], &[]).local_mode);
        assert!(load_with(&["clicker-backend"], &[("CLICKER_LOCAL_MODE", "TRUE")]).local_mode);
        assert!(!load_with(&["clicker-backend"], &[("CLICKER_LOCAL_MODE", "no")]).local_mode);
    }

    #[test]
    fn test_leaderboard_limit_is_capped() {
        let config = load_with(&["clicker-backend"], &[("LEADERBOARD_LIMIT", "5000")]);
        assert_eq!(config.leaderboard_limit, MAX_LEADERBOARD_LIMIT);
        let config = load_with(&["clicker-backend"], &[("LEADERBOARD_LIMIT", "0")]);
        assert_eq!(config.leaderboard_limit, 1);
    }

    #[test]
    fn test_empty_bot_token_is_unset() {
        let config = load_with(&["clicker-backend"], &[("TELEGRAM_BOT_TOKEN", "")]);
        assert!(config.bot_token.is_none());
    }
}
