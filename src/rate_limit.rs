// In-memory sliding-window rate limiter for player write endpoints.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Different rate limit types with their constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitType {
    /// Server-side clicks per second. A batch costs one event per click.
    Clicks,
    /// Whole-profile overwrites and upgrade purchases per minute.
    ProfileWrites,
}

impl RateLimitType {
    /// Maximum number of events allowed in the window.
    pub fn max_count(&self) -> usize {
        match self {
            RateLimitType::Clicks => 50,
            RateLimitType::ProfileWrites => 60,
        }
    }

    /// Time window for the rate limit.
    pub fn window(&self) -> Duration {
        match self {
            RateLimitType::Clicks => Duration::from_secs(1),
            RateLimitType::ProfileWrites => Duration::from_secs(60),
        }
    }
}

impl std::fmt::Display for RateLimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitType::Clicks => write!(f, "clicks per second"),
            RateLimitType::ProfileWrites => write!(f, "profile writes per minute"),
        }
    }
}

/// Error returned when a rate limit is exceeded.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Rate limit exceeded: max {max} {limit_type}")]
pub struct RateLimitError {
    pub limit_type: RateLimitType,
    pub max: usize,
}

/// Key for the rate limit map: (identity, limit_type).
type LimitKey = (String, RateLimitType);

/// Thread-safe in-memory rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<LimitKey, Vec<Instant>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record `cost` events for `identity` if they all fit in the window.
    /// Either all are recorded or none. Bypassed in local mode.
    pub fn check_limit(
        &self,
        identity: &str,
        limit_type: RateLimitType,
        cost: usize,
    ) -> Result<(), RateLimitError> {
        if crate::config::is_local_mode() {
            return Ok(());
        }
        let window = limit_type.window();
        let max = limit_type.max_count();
        let now = Instant::now();

        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let entries = map
            .entry((identity.to_string(), limit_type))
            .or_default();

        // Remove expired entries
        entries.retain(|t| now.duration_since(*t) < window);

        if entries.len() + cost > max {
            return Err(RateLimitError { limit_type, max });
        }

        entries.extend(std::iter::repeat(now).take(cost));
        Ok(())
    }

    /// Get the current count for an identity and limit type (for testing/diagnostics).
    pub fn current_count(&self, identity: &str, limit_type: RateLimitType) -> usize {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let window = limit_type.window();
        let now = Instant::now();

        match map.get_mut(&(identity.to_string(), limit_type)) {
            Some(entries) => {
                entries.retain(|t| now.duration_since(*t) < window);
                entries.len()
            }
            None => 0,
        }
    }

    /// Drop keys with no events left in their window.
    pub fn prune(&self) {
        let now = Instant::now();
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.retain(|(_, limit_type), entries| {
            let window = limit_type.window();
            entries.retain(|t| now.duration_since(*t) < window);
            !entries.is_empty()
        });
    }

    /// Periodically prune idle keys so the map does not grow with every
    /// identity ever seen.
    pub fn spawn_pruner(&self, every: Duration) -> tokio::task::JoinHandle<()> {
        let limiter = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(every).await;
                limiter.prune();
            }
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
