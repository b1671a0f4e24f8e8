// Sync protocol between live game sessions and the profile store.
//
// Loads are fetch-or-create. Saves push whole snapshots, are bounded by a
// timeout and are ordered per session by revision: a snapshot that is not
// newer than the last one written is dropped. A failed save never touches
// the in-memory session; it only marks the session for retry.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::engine::config::GameRules;
use crate::engine::{GameSession, Profile};
use crate::gateway::{GatewayError, LeaderboardEntry, ProfileGateway};
use crate::metrics;

pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(3);

/// Gateway access with a bound on every call.
pub struct ProfileSync<G> {
    gateway: Arc<G>,
    timeout: Duration,
    rules: GameRules,
}

impl<G> Clone for ProfileSync<G> {
    fn clone(&self) -> Self {
        Self {
            gateway: self.gateway.clone(),
            timeout: self.timeout,
            rules: self.rules,
        }
    }
}

impl<G: ProfileGateway> ProfileSync<G> {
    pub fn new(gateway: Arc<G>, timeout: Duration) -> Self {
        Self {
            gateway,
            timeout,
            rules: GameRules::default(),
        }
    }

    pub fn with_rules(mut self, rules: GameRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    async fn bounded<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, GatewayError> {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.timeout)),
        };
        metrics::GATEWAY_CALL_DURATION_SECONDS
            .with_label_values(&[op])
            .observe(started.elapsed().as_secs_f64());
        if result.is_err() {
            metrics::GATEWAY_ERRORS_TOTAL.with_label_values(&[op]).inc();
        }
        result
    }

    /// Fetch the profile, creating it on first contact.
    pub async fn load_profile(
        &self,
        identity: &str,
        display_name: Option<&str>,
    ) -> Result<Profile, GatewayError> {
        if let Some(profile) = self
            .bounded("fetch", self.gateway.fetch_profile(identity))
            .await?
        {
            return Ok(profile);
        }
        let profile = self
            .bounded("create", self.gateway.create_profile(identity, display_name))
            .await?;
        tracing::info!("Created profile for {identity}");
        metrics::PROFILES_CREATED_TOTAL.inc();
        Ok(profile)
    }

    /// Load a live session for `identity`.
    pub async fn load(
        &self,
        identity: &str,
        display_name: Option<&str>,
    ) -> Result<GameSession, GatewayError> {
        let profile = self.load_profile(identity, display_name).await?;
        Ok(GameSession::with_rules(profile, self.rules))
    }

    /// Write one snapshot now.
    pub async fn push(&self, snapshot: &Profile) -> Result<u64, GatewayError> {
        self.bounded(
            "overwrite",
            self.gateway.overwrite_profile(&snapshot.identity, snapshot),
        )
        .await
    }

    pub async fn leaderboard(&self, limit: u32) -> Result<Vec<LeaderboardEntry>, GatewayError> {
        self.bounded("leaderboard", self.gateway.list_top_profiles(limit))
            .await
    }

    pub async fn rank_of(&self, identity: &str) -> Result<Option<u64>, GatewayError> {
        self.bounded("rank", self.gateway.rank_of(identity)).await
    }

    /// Per-session saver. Create one per live session.
    pub fn saver(&self) -> SessionSaver<G> {
        SessionSaver {
            sync: self.clone(),
            ledger: Arc::new(SaveLedger::default()),
        }
    }
}

#[derive(Debug)]
pub enum SaveOutcome {
    Saved { revision: u64, changes: u64 },
    /// A newer snapshot was already written.
    Superseded { revision: u64 },
    /// The session was closed; its snapshots are no longer written.
    Discarded { revision: u64 },
    Failed { revision: u64, error: GatewayError },
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved { .. })
    }
}

#[derive(Default)]
struct SaveLedger {
    /// Highest revision written. Held for the whole write so saves run one at a time.
    written: Mutex<u64>,
    /// Highest revision whose save failed and has not been covered by a later
    /// success; 0 when nothing is outstanding. Only changed while `written` is held.
    failed: AtomicU64,
    /// Set by `close`; no save is written afterwards.
    closed: AtomicBool,
}

/// Ordered saver for one session.
pub struct SessionSaver<G> {
    sync: ProfileSync<G>,
    ledger: Arc<SaveLedger>,
}

impl<G> Clone for SessionSaver<G> {
    fn clone(&self) -> Self {
        Self {
            sync: self.sync.clone(),
            ledger: self.ledger.clone(),
        }
    }
}

impl<G: ProfileGateway> SessionSaver<G> {
    /// Save and wait for the outcome.
    pub async fn save(&self, revision: u64, snapshot: Profile) -> SaveOutcome {
        let mut written = self.ledger.written.lock().await;
        if self.ledger.closed.load(Ordering::Acquire) {
            metrics::PROFILE_SAVES_TOTAL.with_label_values(&["discarded"]).inc();
            return SaveOutcome::Discarded { revision };
        }
        if revision <= *written {
            metrics::PROFILE_SAVES_TOTAL.with_label_values(&["superseded"]).inc();
            return SaveOutcome::Superseded { revision };
        }

        match self.sync.push(&snapshot).await {
            Ok(changes) => {
                *written = revision;
                if self.ledger.failed.load(Ordering::Acquire) <= revision {
                    self.ledger.failed.store(0, Ordering::Release);
                }
                metrics::PROFILE_SAVES_TOTAL.with_label_values(&["saved"]).inc();
                tracing::debug!("Saved {} at revision {revision}", snapshot.identity);
                SaveOutcome::Saved { revision, changes }
            }
            Err(error) => {
                self.ledger.failed.fetch_max(revision, Ordering::AcqRel);
                metrics::PROFILE_SAVES_TOTAL.with_label_values(&["failed"]).inc();
                tracing::warn!(
                    "Save for {} at revision {revision} failed, will retry: {error}",
                    snapshot.identity
                );
                SaveOutcome::Failed { revision, error }
            }
        }
    }

    /// Fire-and-forget save on the tokio runtime. Dropping the handle detaches
    /// the task; `abort` cancels it.
    pub fn spawn_save(&self, revision: u64, snapshot: Profile) -> SaveHandle {
        let saver = self.clone();
        SaveHandle {
            task: tokio::spawn(async move { saver.save(revision, snapshot).await }),
        }
    }

    /// Whether an earlier save failed and nothing newer has been written since.
    pub fn needs_retry(&self) -> bool {
        self.ledger.failed.load(Ordering::Acquire) > 0
    }

    /// Stop writing. Waits for a save already in flight; every later save is
    /// discarded.
    pub async fn close(&self) {
        let _written = self.ledger.written.lock().await;
        self.ledger.closed.store(true, Ordering::Release);
    }

    /// Highest revision written so far.
    pub async fn written_revision(&self) -> u64 {
        *self.ledger.written.lock().await
    }
}

/// Handle to a spawned save.
pub struct SaveHandle {
    task: JoinHandle<SaveOutcome>,
}

impl SaveHandle {
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the save. `None` if it was cancelled.
    pub async fn outcome(self) -> Option<SaveOutcome> {
        self.task.await.ok()
    }
}
