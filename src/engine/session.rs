// Game session: one player's live, mutable progression state.
//
// Mutated only through `apply_click` and `purchase_upgrade`. Each mutation
// bumps `revision`, which the sync layer uses to order saves.

use serde::Serialize;

use super::achievements::{achievement_by_id, evaluate_achievements};
use super::config::{upgrade_spec, GameRules, UPGRADES};
use super::progression::{click_power, upgrade_cost, LevelProgress};
use super::Profile;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Insufficient funds: need {required} coins, have {available}")]
    InsufficientFunds { required: u64, available: u64 },
    #[error("Unknown upgrade '{0}'")]
    UnknownUpgrade(String),
}

/// Notifications produced by a mutation, in the order they happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    LevelUp {
        level: u32,
    },
    AchievementUnlocked {
        id: &'static str,
        name: &'static str,
        special: bool,
    },
    UpgradePurchased {
        id: &'static str,
        level: u32,
        cost: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickOutcome {
    pub points: u64,
    pub coins: u64,
    pub events: Vec<SessionEvent>,
    /// The caller should push a save (now or batched).
    pub save_worthy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOutcome {
    pub upgrade_id: &'static str,
    pub level: u32,
    pub cost: u64,
    pub click_power: u64,
    pub event: SessionEvent,
}

#[derive(Debug)]
pub struct GameSession {
    profile: Profile,
    rules: GameRules,
    // Derived display fields
    click_power: u64,
    progress: LevelProgress,
    revision: u64,
}

impl GameSession {
    pub fn new(profile: Profile) -> Self {
        Self::with_rules(profile, GameRules::default())
    }

    /// Wrap a loaded profile. The stored level is only a cache of the score,
    /// so it is re-derived here.
    pub fn with_rules(mut profile: Profile, rules: GameRules) -> Self {
        let derived = rules.curve.level_for_score(profile.score);
        if derived != profile.level {
            tracing::debug!(
                "Stored level {} for {} disagrees with score {}, using {derived}",
                profile.level,
                profile.identity,
                profile.score
            );
            profile.level = derived;
        }
        let click_power = click_power(&profile.upgrades);
        let progress = rules.curve.progress_within_level(profile.score, profile.level);
        Self {
            profile,
            rules,
            click_power,
            progress,
            revision: 0,
        }
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn identity(&self) -> &str {
        &self.profile.identity
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn click_power(&self) -> u64 {
        self.click_power
    }

    pub fn progress(&self) -> LevelProgress {
        self.progress
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Register one click.
    pub fn apply_click(&mut self) -> ClickOutcome {
        let points = self.click_power;
        let coins = self.rules.coins_per_click;
        self.profile.score = self.profile.score.saturating_add(points);
        self.profile.coins = self.profile.coins.saturating_add(coins);

        let mut events = Vec::new();

        let old_level = self.profile.level;
        let new_level = self.rules.curve.level_for_score(self.profile.score);
        if new_level > old_level {
            self.profile.level = new_level;
            self.click_power = click_power(&self.profile.upgrades);
            events.extend((old_level + 1..=new_level).map(|level| SessionEvent::LevelUp { level }));
        }

        for achievement in evaluate_achievements(&mut self.profile) {
            events.push(SessionEvent::AchievementUnlocked {
                id: achievement.id,
                name: achievement.name,
                special: achievement.special,
            });
        }

        self.refresh_progress();
        self.revision += 1;

        let every = self.rules.save_every_points;
        let on_threshold = every > 0 && self.profile.score > 0 && self.profile.score % every == 0;
        ClickOutcome {
            points,
            coins,
            save_worthy: on_threshold || !events.is_empty(),
            events,
        }
    }

    /// Buy the next level of `upgrade_id`. On any error nothing changes.
    pub fn purchase_upgrade(&mut self, upgrade_id: &str) -> Result<PurchaseOutcome, GameError> {
        let spec = upgrade_spec(upgrade_id)
            .ok_or_else(|| GameError::UnknownUpgrade(upgrade_id.to_string()))?;
        let owned = self.profile.upgrades.level_of(spec.id);
        let cost = upgrade_cost(spec, owned, self.rules.upgrade_cost_growth);
        if self.profile.coins < cost {
            return Err(GameError::InsufficientFunds {
                required: cost,
                available: self.profile.coins,
            });
        }

        self.profile.coins -= cost;
        let level = self.profile.upgrades.increment(spec.id);
        self.click_power = click_power(&self.profile.upgrades);
        self.revision += 1;

        Ok(PurchaseOutcome {
            upgrade_id: spec.id,
            level,
            cost,
            click_power: self.click_power,
            event: SessionEvent::UpgradePurchased {
                id: spec.id,
                level,
                cost,
            },
        })
    }

    /// The record to persist: current state with the high score raised to the
    /// score.
    pub fn snapshot(&self) -> Profile {
        let mut profile = self.profile.clone();
        profile.raise_high_score();
        profile
    }

    pub fn view(&self) -> SessionView {
        let coins = self.profile.coins;
        let upgrades = UPGRADES
            .iter()
            .map(|spec| {
                let level = self.profile.upgrades.level_of(spec.id);
                let next_cost = upgrade_cost(spec, level, self.rules.upgrade_cost_growth);
                UpgradeView {
                    id: spec.id,
                    name: spec.name,
                    description: spec.description,
                    level,
                    multiplier: spec.multiplier,
                    next_cost,
                    affordable: coins >= next_cost,
                }
            })
            .collect();
        let achievements = self
            .profile
            .achievements
            .iter()
            .map(|id| match achievement_by_id(id) {
                Some(a) => AchievementView {
                    id: id.to_string(),
                    name: a.name.to_string(),
                    special: a.special,
                },
                None => AchievementView {
                    id: id.to_string(),
                    name: id.to_string(),
                    special: false,
                },
            })
            .collect();

        SessionView {
            identity: self.profile.identity.clone(),
            display_name: self.profile.display_name.clone(),
            score: self.profile.score,
            high_score: self.profile.high_score.max(self.profile.score),
            level: self.profile.level,
            coins,
            click_power: self.click_power,
            progress: self.progress,
            upgrades,
            achievements,
        }
    }

    fn refresh_progress(&mut self) {
        self.progress = self
            .rules
            .curve
            .progress_within_level(self.profile.score, self.profile.level);
    }
}

// ── Display view ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub identity: String,
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub score: u64,
    pub high_score: u64,
    pub level: u32,
    pub coins: u64,
    pub click_power: u64,
    pub progress: LevelProgress,
    pub upgrades: Vec<UpgradeView>,
    pub achievements: Vec<AchievementView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpgradeView {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub level: u32,
    pub multiplier: u64,
    pub next_cost: u64,
    pub affordable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AchievementView {
    pub id: String,
    pub name: String,
    pub special: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::LevelCurve;
    use crate::engine::profile::Upgrades;

    fn fresh() -> GameSession {
        GameSession::new(Profile::new("7", None))
    }

    #[test]
    fn test_ten_clicks_reach_level_two() {
        let mut s = fresh();
        for _ in 0..10 {
            s.apply_click();
        }
        assert_eq!(s.profile().score, 10);
        assert_eq!(s.profile().coins, 10);
        assert_eq!(s.profile().level, 2);
        assert_eq!(s.progress(), LevelProgress { current: 0, required: 15 });
    }

    #[test]
    fn test_first_click_unlocks_and_is_save_worthy() {
        let mut s = fresh();
        let out = s.apply_click();
        assert_eq!(out.points, 1);
        assert_eq!(out.coins, 1);
        assert!(out.save_worthy);
        assert_eq!(
            out.events,
            vec![SessionEvent::AchievementUnlocked {
                id: "first_click",
                name: "First click",
                special: false,
            }]
        );
        // Second click: nothing new, not on a threshold
        let out = s.apply_click();
        assert!(out.events.is_empty());
        assert!(!out.save_worthy);
    }

    #[test]
    fn test_save_worthy_on_threshold() {
        let mut profile = Profile::new("7", None);
        profile.score = 18;
        profile.achievements.insert("first_click");
        profile.achievements.insert("ten_clicks");
        let mut s = GameSession::new(profile);
        assert!(!s.apply_click().save_worthy); // 19
        assert!(s.apply_click().save_worthy); // 20
    }

    #[test]
    fn test_multi_level_jump_notifies_each_level() {
        let mut profile = Profile::new("7", None);
        // Click power 1 + 50 = 51, from score 0 straight past level 3
        profile.upgrades = Upgrades::from([("yandexGo", 1)]);
        let mut s = GameSession::new(profile);
        let out = s.apply_click();
        let levels: Vec<u32> = out
            .events
            .iter()
            .filter_map(|e| match e {
                SessionEvent::LevelUp { level } => Some(*level),
                _ => None,
            })
            .collect();
        assert_eq!(levels, vec![2, 3, 4]);
        assert_eq!(s.profile().level, 4);
        // Level-ups come before unlocks
        assert!(matches!(out.events[0], SessionEvent::LevelUp { level: 2 }));
        assert!(matches!(
            out.events.last(),
            Some(SessionEvent::AchievementUnlocked { id: "first_upgrade", .. })
        ));
    }

    #[test]
    fn test_stored_level_is_rederived() {
        let mut profile = Profile::new("7", None);
        profile.score = 47;
        profile.level = 1;
        let s = GameSession::new(profile);
        assert_eq!(s.profile().level, 4);
    }

    #[test]
    fn test_purchase_insufficient_funds_changes_nothing() {
        let mut profile = Profile::new("7", None);
        profile.coins = 49;
        let mut s = GameSession::new(profile);
        let err = s.purchase_upgrade("yandexSearch").unwrap_err();
        assert_eq!(
            err,
            GameError::InsufficientFunds {
                required: 50,
                available: 49
            }
        );
        assert_eq!(s.profile().coins, 49);
        assert_eq!(s.profile().upgrades.level_of("yandexSearch"), 0);
        assert_eq!(s.revision(), 0);
    }

    #[test]
    fn test_purchase_deducts_and_raises_click_power() {
        let mut profile = Profile::new("7", None);
        profile.coins = 200;
        let mut s = GameSession::new(profile);
        let before = s.click_power();
        let out = s.purchase_upgrade("yandexSearch").unwrap();
        assert_eq!(out.cost, 50);
        assert_eq!(out.level, 1);
        assert_eq!(s.profile().coins, 150);
        assert!(s.click_power() > before);

        let out = s.purchase_upgrade("yandexSearch").unwrap();
        assert_eq!(out.cost, 75);
        assert_eq!(s.profile().coins, 75);
        assert_eq!(s.click_power(), 3);
        assert_eq!(s.revision(), 2);
    }

    #[test]
    fn test_purchase_unknown_upgrade() {
        let mut s = fresh();
        assert_eq!(
            s.purchase_upgrade("turbo").unwrap_err(),
            GameError::UnknownUpgrade("turbo".into())
        );
    }

    #[test]
    fn test_coin_yield_is_independent_of_click_power() {
        let mut profile = Profile::new("7", None);
        profile.upgrades = Upgrades::from([("yandexGPT", 3)]);
        let mut s = GameSession::new(profile);
        let out = s.apply_click();
        assert_eq!(out.points, 31);
        assert_eq!(out.coins, 1);
    }

    #[test]
    fn test_snapshot_raises_high_score() {
        let mut profile = Profile::new("7", None);
        profile.high_score = 3;
        let mut s = GameSession::new(profile);
        for _ in 0..5 {
            s.apply_click();
        }
        assert_eq!(s.snapshot().high_score, 5);
        assert_eq!(s.profile().high_score, 3);
    }

    #[test]
    fn test_custom_rules() {
        let rules = GameRules {
            curve: LevelCurve {
                base: 2,
                multiplier: 2.0,
            },
            coins_per_click: 5,
            save_every_points: 0,
            upgrade_cost_growth: 2.0,
        };
        let mut s = GameSession::with_rules(Profile::new("7", None), rules);
        s.apply_click();
        let out = s.apply_click();
        assert_eq!(s.profile().level, 2);
        assert_eq!(s.profile().coins, 10);
        assert!(out.events.contains(&SessionEvent::LevelUp { level: 2 }));
    }

    #[test]
    fn test_view_reports_shop_state() {
        let mut profile = Profile::new("7", Some("Ann"));
        profile.coins = 120;
        profile.achievements.insert("legacy_badge");
        let s = GameSession::new(profile);
        let view = s.view();
        assert_eq!(view.upgrades.len(), UPGRADES.len());
        let search = &view.upgrades[0];
        assert_eq!(search.id, "yandexSearch");
        assert!(search.affordable);
        assert!(!view.upgrades[2].affordable);
        assert_eq!(view.achievements[0].name, "legacy_badge");
    }
}
