// Live game sessions held in memory, one per identity.
//
// Server-side clicks and purchases mutate these sessions; saves are pushed
// through the sync layer in the background. Idle sessions are flushed and
// evicted by a periodic sweeper.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::engine::session::SessionView;
use crate::engine::{GameError, GameSession, Profile, SessionEvent};
use crate::gateway::{GatewayError, ProfileGateway};
use crate::metrics;
use crate::sync::{ProfileSync, SaveHandle, SaveOutcome, SessionSaver};

#[derive(Debug, thiserror::Error)]
pub enum PlayError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Game(#[from] GameError),
}

struct LiveSession<G> {
    session: GameSession,
    saver: SessionSaver<G>,
    last_active: Instant,
}

impl<G: ProfileGateway> LiveSession<G> {
    fn touch(&mut self) {
        self.last_active = Instant::now();
    }

    fn spawn_save(&self) -> SaveHandle {
        self.saver
            .spawn_save(self.session.revision(), self.session.snapshot())
    }

    /// Write the current state if anything changed since the last write.
    async fn flush(&self) -> Option<SaveOutcome> {
        if self.session.revision() <= self.saver.written_revision().await {
            return None;
        }
        Some(
            self.saver
                .save(self.session.revision(), self.session.snapshot())
                .await,
        )
    }
}

type SharedSession<G> = Arc<Mutex<LiveSession<G>>>;

/// Result of a click batch.
pub struct ClickReport {
    pub view: SessionView,
    pub events: Vec<SessionEvent>,
    /// Background save started by this batch, if it was save-worthy.
    pub save: Option<SaveHandle>,
}

pub struct PurchaseReport {
    pub view: SessionView,
    pub event: SessionEvent,
    pub save: SaveHandle,
}

/// Registry of live sessions keyed by identity.
pub struct SessionRegistry<G> {
    sync: ProfileSync<G>,
    live: StdMutex<HashMap<String, SharedSession<G>>>,
}

impl<G: ProfileGateway> SessionRegistry<G> {
    pub fn new(sync: ProfileSync<G>) -> Self {
        Self {
            sync,
            live: StdMutex::new(HashMap::new()),
        }
    }

    pub fn sync(&self) -> &ProfileSync<G> {
        &self.sync
    }

    fn map(&self) -> std::sync::MutexGuard<'_, HashMap<String, SharedSession<G>>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The live session for `identity`, loading it on first use.
    async fn checkout(
        &self,
        identity: &str,
        display_name: Option<&str>,
    ) -> Result<SharedSession<G>, GatewayError> {
        if let Some(live) = self.map().get(identity).cloned() {
            return Ok(live);
        }

        // Load outside the map lock; if two requests race, the first insert wins.
        let session = self.sync.load(identity, display_name).await?;
        let loaded = Arc::new(Mutex::new(LiveSession {
            session,
            saver: self.sync.saver(),
            last_active: Instant::now(),
        }));

        let mut map = self.map();
        let live = map
            .entry(identity.to_string())
            .or_insert(loaded)
            .clone();
        metrics::LIVE_SESSIONS.set(map.len() as i64);
        Ok(live)
    }

    /// Apply `count` clicks in order.
    pub async fn click(
        &self,
        identity: &str,
        display_name: Option<&str>,
        count: u32,
    ) -> Result<ClickReport, GatewayError> {
        let live = self.checkout(identity, display_name).await?;
        let mut live = live.lock().await;
        live.touch();

        let mut events = Vec::new();
        let mut save_worthy = false;
        for _ in 0..count {
            let outcome = live.session.apply_click();
            save_worthy |= outcome.save_worthy;
            events.extend(outcome.events);
        }

        metrics::CLICKS_TOTAL.inc_by(u64::from(count));
        for event in &events {
            match event {
                SessionEvent::LevelUp { .. } => metrics::LEVEL_UPS_TOTAL.inc(),
                SessionEvent::AchievementUnlocked { id, .. } => metrics::ACHIEVEMENTS_UNLOCKED_TOTAL
                    .with_label_values(&[*id])
                    .inc(),
                SessionEvent::UpgradePurchased { .. } => {}
            }
        }

        // A pending failure is retried on the next click
        let save = (save_worthy || live.saver.needs_retry()).then(|| live.spawn_save());

        Ok(ClickReport {
            view: live.session.view(),
            events,
            save,
        })
    }

    /// Buy one level of `upgrade_id`. A successful purchase is saved at once.
    pub async fn purchase(
        &self,
        identity: &str,
        display_name: Option<&str>,
        upgrade_id: &str,
    ) -> Result<PurchaseReport, PlayError> {
        let live = self.checkout(identity, display_name).await?;
        let mut live = live.lock().await;
        live.touch();

        let outcome = live.session.purchase_upgrade(upgrade_id)?;
        metrics::UPGRADES_PURCHASED_TOTAL
            .with_label_values(&[outcome.upgrade_id])
            .inc();
        tracing::info!(
            "{identity} bought {} level {} for {} coins",
            outcome.upgrade_id,
            outcome.level,
            outcome.cost
        );

        Ok(PurchaseReport {
            view: live.session.view(),
            event: outcome.event,
            save: live.spawn_save(),
        })
    }

    pub async fn view(
        &self,
        identity: &str,
        display_name: Option<&str>,
    ) -> Result<SessionView, GatewayError> {
        let live = self.checkout(identity, display_name).await?;
        let mut live = live.lock().await;
        live.touch();
        Ok(live.session.view())
    }

    /// Current state of a live session, if one is held. Includes changes not
    /// yet written.
    pub async fn live_snapshot(&self, identity: &str) -> Option<Profile> {
        let live = self.map().get(identity).cloned()?;
        let live = live.lock().await;
        Some(live.session.snapshot())
    }

    /// Whole-record write from outside the live session. A locked session
    /// built from `profile` takes the identity's slot for the duration, so a
    /// click arriving meanwhile waits and then plays on top of the new record
    /// instead of reloading the old row. The previous session is closed
    /// before the write. If nothing was written the slot is released and the
    /// next request loads from the store.
    pub async fn overwrite(&self, profile: Profile) -> Result<u64, GatewayError> {
        let identity = profile.identity.clone();
        let replacement = Arc::new(Mutex::new(LiveSession {
            session: GameSession::with_rules(profile.clone(), *self.sync.rules()),
            saver: self.sync.saver(),
            last_active: Instant::now(),
        }));
        let held = replacement.clone().lock_owned().await;

        let previous = self.map().insert(identity.clone(), replacement.clone());
        if let Some(previous) = previous {
            let saver = previous.lock().await.saver.clone();
            saver.close().await;
            tracing::debug!("Replaced live session for {identity}");
        }

        let result = self.sync.push(&profile).await;
        if !matches!(result, Ok(changes) if changes > 0) {
            held.saver.close().await;
            let mut map = self.map();
            if map
                .get(&identity)
                .is_some_and(|current| Arc::ptr_eq(current, &replacement))
            {
                map.remove(&identity);
            }
            metrics::LIVE_SESSIONS.set(map.len() as i64);
        } else {
            metrics::LIVE_SESSIONS.set(self.map().len() as i64);
        }
        drop(held);
        result
    }

    /// Flush and evict sessions idle for at least `max_idle`. Sessions whose
    /// flush fails stay live for the next sweep. Returns the number evicted.
    pub async fn sweep_idle(&self, max_idle: Duration) -> usize {
        let candidates: Vec<(String, SharedSession<G>)> = self
            .map()
            .iter()
            .filter(|(_, live)| {
                // A locked session is in use
                live.try_lock()
                    .map(|l| l.last_active.elapsed() >= max_idle)
                    .unwrap_or(false)
            })
            .map(|(identity, live)| (identity.clone(), live.clone()))
            .collect();

        let results = futures::future::join_all(candidates.into_iter().map(
            |(identity, live)| async move {
                let guard = live.lock().await;
                if guard.last_active.elapsed() < max_idle {
                    return false;
                }
                if let Some(SaveOutcome::Failed { .. }) = guard.flush().await {
                    return false;
                }
                let mut map = self.map();
                let still_ours = map
                    .get(&identity)
                    .is_some_and(|current| Arc::ptr_eq(current, &live));
                if still_ours {
                    map.remove(&identity);
                    metrics::LIVE_SESSIONS.set(map.len() as i64);
                }
                still_ours
            },
        ))
        .await;

        results.into_iter().filter(|evicted| *evicted).count()
    }

    /// Write every session with unsaved changes. Returns how many were written.
    pub async fn flush_all(&self) -> usize {
        let all: Vec<SharedSession<G>> = self.map().values().cloned().collect();
        let results = futures::future::join_all(all.iter().map(|live| async move {
            matches!(live.lock().await.flush().await, Some(SaveOutcome::Saved { .. }))
        }))
        .await;
        results.into_iter().filter(|saved| *saved).count()
    }

    pub fn live_count(&self) -> usize {
        self.map().len()
    }
}

/// Periodically flush and evict idle sessions.
pub fn spawn_idle_sweeper<G: ProfileGateway>(
    registry: Arc<SessionRegistry<G>>,
    max_idle: Duration,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = registry.sweep_idle(max_idle).await;
            if evicted > 0 {
                tracing::info!(
                    "Idle sweeper evicted {evicted} sessions, {} still live",
                    registry.live_count()
                );
            }
        }
    })
}
