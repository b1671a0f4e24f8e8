// Persistence gateway: the profile store operations the game core consumes.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;

use crate::engine::Profile;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("profile store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
    #[error("profile store did not answer within {0:?}")]
    Timeout(Duration),
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub identity: String,
    pub high_score: u64,
    pub level: u32,
    pub coins: u64,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Key-value style profile store keyed by player identity.
///
/// Writes are whole-record and last-write-wins; there is no conflict
/// detection between sessions of the same identity.
pub trait ProfileGateway: Send + Sync + 'static {
    fn fetch_profile(
        &self,
        identity: &str,
    ) -> impl Future<Output = Result<Option<Profile>, GatewayError>> + Send;

    /// Create the profile if absent, otherwise return the existing one.
    /// Concurrent calls for one identity leave a single row and all observe it.
    fn create_profile(
        &self,
        identity: &str,
        display_name: Option<&str>,
    ) -> impl Future<Output = Result<Profile, GatewayError>> + Send;

    /// Replace the stored record. Returns the number of rows changed (0 when
    /// the identity has no profile).
    fn overwrite_profile(
        &self,
        identity: &str,
        profile: &Profile,
    ) -> impl Future<Output = Result<u64, GatewayError>> + Send;

    /// Highest `high_score` first, ties by creation order.
    fn list_top_profiles(
        &self,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<LeaderboardEntry>, GatewayError>> + Send;

    /// 1 + number of profiles with a strictly greater high score, or `None`
    /// for an unknown identity.
    fn rank_of(&self, identity: &str)
        -> impl Future<Output = Result<Option<u64>, GatewayError>> + Send;
}
