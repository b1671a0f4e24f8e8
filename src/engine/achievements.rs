// Achievement catalog and evaluation.

use serde::Serialize;

use super::progression::click_power;
use super::Profile;

/// Predicate over a profile snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    ScoreAtLeast(u64),
    LevelAtLeast(u32),
    ClickPowerAtLeast(u64),
    UpgradeLevelsAtLeast(u64),
}

impl Condition {
    pub fn is_met(&self, profile: &Profile) -> bool {
        match *self {
            Condition::ScoreAtLeast(n) => profile.score >= n,
            Condition::LevelAtLeast(n) => profile.level >= n,
            Condition::ClickPowerAtLeast(n) => click_power(&profile.upgrades) >= n,
            Condition::UpgradeLevelsAtLeast(n) => profile.upgrades.total_levels() >= n,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Achievement {
    pub id: &'static str,
    pub name: &'static str,
    /// Rendered with the highlighted style.
    pub special: bool,
    #[serde(skip)]
    pub condition: Condition,
}

const fn achievement(id: &'static str, name: &'static str, condition: Condition) -> Achievement {
    Achievement {
        id,
        name,
        special: false,
        condition,
    }
}

const fn special(id: &'static str, name: &'static str, condition: Condition) -> Achievement {
    Achievement {
        id,
        name,
        special: true,
        condition,
    }
}

/// Evaluation order. Unlocks and their notifications follow this order.
pub const ACHIEVEMENTS: [Achievement; 10] = [
    achievement("first_click", "First click", Condition::ScoreAtLeast(1)),
    achievement("ten_clicks", "10 points", Condition::ScoreAtLeast(10)),
    achievement("hundred_clicks", "100 points", Condition::ScoreAtLeast(100)),
    achievement("thousand_clicks", "1000 points", Condition::ScoreAtLeast(1000)),
    achievement("level_5", "Level 5", Condition::LevelAtLeast(5)),
    achievement("level_10", "Level 10", Condition::LevelAtLeast(10)),
    special("level_20", "Level 20", Condition::LevelAtLeast(20)),
    special("mega_clicker", "Mega clicker", Condition::ClickPowerAtLeast(50)),
    achievement("first_upgrade", "First upgrade", Condition::UpgradeLevelsAtLeast(1)),
    special("upgrade_master", "Upgrade master", Condition::UpgradeLevelsAtLeast(10)),
];

pub fn achievement_by_id(id: &str) -> Option<&'static Achievement> {
    ACHIEVEMENTS.iter().find(|a| a.id == id)
}

/// Unlock every achievement whose condition now holds and that is not yet in
/// the profile's set. Returns the newly unlocked ones in catalog order; a
/// second call on an unchanged profile returns nothing.
pub fn evaluate_achievements(profile: &mut Profile) -> Vec<&'static Achievement> {
    let mut unlocked = Vec::new();
    for achievement in ACHIEVEMENTS.iter() {
        if profile.achievements.contains(achievement.id) || !achievement.condition.is_met(profile) {
            continue;
        }
        profile.achievements.insert(achievement.id);
        unlocked.push(achievement);
    }
    unlocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::profile::Upgrades;

    fn ids(list: &[&'static Achievement]) -> Vec<&'static str> {
        list.iter().map(|a| a.id).collect()
    }

    #[test]
    fn test_fresh_profile_unlocks_nothing() {
        let mut p = Profile::new("1", None);
        assert!(evaluate_achievements(&mut p).is_empty());
    }

    #[test]
    fn test_unlocks_in_catalog_order() {
        let mut p = Profile::new("1", None);
        p.score = 150;
        p.level = 5;
        let unlocked = evaluate_achievements(&mut p);
        assert_eq!(
            ids(&unlocked),
            vec!["first_click", "ten_clicks", "hundred_clicks", "level_5"]
        );
        let stored: Vec<&str> = p.achievements.iter().collect();
        assert_eq!(stored, ids(&unlocked));
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let mut p = Profile::new("1", None);
        p.score = 2000;
        p.level = 21;
        p.upgrades = Upgrades::from([("yandexGo", 1), ("yandexSearch", 9)]);
        let first = evaluate_achievements(&mut p);
        assert_eq!(first.len(), ACHIEVEMENTS.len());
        assert!(evaluate_achievements(&mut p).is_empty());
    }

    #[test]
    fn test_click_power_and_upgrade_conditions() {
        let mut p = Profile::new("1", None);
        p.upgrades = Upgrades::from([("yandexMarket", 2)]);
        let unlocked = evaluate_achievements(&mut p);
        assert_eq!(ids(&unlocked), vec!["mega_clicker", "first_upgrade"]);
    }

    #[test]
    fn test_unknown_stored_ids_are_kept() {
        let mut p = Profile::new("1", None);
        p.achievements.insert("legacy_badge");
        p.score = 1;
        evaluate_achievements(&mut p);
        assert!(p.achievements.contains("legacy_badge"));
        assert!(p.achievements.contains("first_click"));
    }

    #[test]
    fn test_special_flags() {
        assert!(achievement_by_id("level_20").unwrap().special);
        assert!(achievement_by_id("upgrade_master").unwrap().special);
        assert!(!achievement_by_id("first_click").unwrap().special);
    }
}
