// Player profile: the persisted per-player progression record and the text-blob
// codec for its upgrade and achievement collections.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::config::upgrade_spec;

/// Owned tier of one upgrade type. Stored blobs may carry extra keys
/// (older clients wrote `cost` and `multiplier` too); they are ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeLevel {
    #[serde(default)]
    pub level: u32,
}

/// Mapping from upgrade id to owned level. Levels only increase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Upgrades(BTreeMap<String, UpgradeLevel>);

impl Upgrades {
    pub fn new() -> Self {
        Self::default()
    }

    /// Owned level for `id`, 0 when never purchased.
    pub fn level_of(&self, id: &str) -> u32 {
        self.0.get(id).map(|u| u.level).unwrap_or(0)
    }

    /// Raise the owned level of `id` by one and return the new level.
    pub fn increment(&mut self, id: &str) -> u32 {
        let entry = self.0.entry(id.to_string()).or_default();
        entry.level = entry.level.saturating_add(1);
        entry.level
    }

    /// Sum of owned levels across every upgrade type.
    pub fn total_levels(&self) -> u64 {
        self.0.values().map(|u| u64::from(u.level)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(id, u)| (id.as_str(), u.level))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Drop ids that are not in the upgrade catalog.
    pub(crate) fn retain_known(&mut self, identity: &str) {
        self.0.retain(|id, _| {
            let known = upgrade_spec(id).is_some();
            if !known {
                tracing::debug!("Dropping unknown upgrade '{id}' for {identity}");
            }
            known
        });
    }
}

impl<const N: usize> From<[(&str, u32); N]> for Upgrades {
    fn from(levels: [(&str, u32); N]) -> Self {
        Self(
            levels
                .into_iter()
                .map(|(id, level)| (id.to_string(), UpgradeLevel { level }))
                .collect(),
        )
    }
}

/// Unlocked achievement ids in unlock order. Membership only grows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct AchievementSet(Vec<String>);

impl AchievementSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.iter().any(|a| a == id)
    }

    /// Add `id`; returns false if it was already unlocked.
    pub fn insert(&mut self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.0.push(id.to_string());
        true
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<Vec<String>> for AchievementSet {
    fn from(ids: Vec<String>) -> Self {
        let mut set = AchievementSet::new();
        for id in ids {
            set.insert(&id);
        }
        set
    }
}

impl From<AchievementSet> for Vec<String> {
    fn from(set: AchievementSet) -> Self {
        set.0
    }
}

/// Persisted progression record, one per player identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub identity: String,
    #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub score: u64,
    pub level: u32,
    pub high_score: u64,
    pub coins: u64,
    #[serde(default)]
    pub upgrades: Upgrades,
    #[serde(default)]
    pub achievements: AchievementSet,
    /// Set by the store on every successful write; `None` before the first one.
    #[serde(default)]
    pub last_updated: Option<String>,
}

impl Profile {
    /// A fresh profile as created on first contact.
    pub fn new(identity: &str, display_name: Option<&str>) -> Self {
        Self {
            identity: identity.to_string(),
            display_name: display_name.map(str::to_string),
            score: 0,
            level: 1,
            high_score: 0,
            coins: 0,
            upgrades: Upgrades::new(),
            achievements: AchievementSet::new(),
            last_updated: None,
        }
    }

    /// Raise `high_score` to `score` if the current run beat it.
    pub fn raise_high_score(&mut self) {
        self.high_score = self.high_score.max(self.score);
    }
}

// ── Stored blob codec ────────────────────────────────────────────────

/// Parse a stored upgrade blob. A blob that fails to parse degrades to an
/// empty mapping; unknown upgrade ids are dropped.
pub fn decode_upgrades(identity: &str, raw: &str) -> Upgrades {
    let raw = raw.trim();
    if raw.is_empty() || raw == "null" {
        return Upgrades::new();
    }
    match serde_json::from_str::<Upgrades>(raw) {
        Ok(mut upgrades) => {
            upgrades.retain_known(identity);
            upgrades
        }
        Err(e) => {
            tracing::warn!("Malformed stored upgrades for {identity}, defaulting to empty: {e}");
            Upgrades::new()
        }
    }
}

/// Parse a stored achievement blob, degrading to an empty set on failure.
pub fn decode_achievements(identity: &str, raw: &str) -> AchievementSet {
    let raw = raw.trim();
    if raw.is_empty() || raw == "null" {
        return AchievementSet::new();
    }
    match serde_json::from_str::<AchievementSet>(raw) {
        Ok(set) => set,
        Err(e) => {
            tracing::warn!("Malformed stored achievements for {identity}, defaulting to empty: {e}");
            AchievementSet::new()
        }
    }
}

pub fn encode_upgrades(upgrades: &Upgrades) -> String {
    // A string-keyed map of plain structs always serializes.
    serde_json::to_string(upgrades).unwrap_or_else(|_| "{}".to_string())
}

pub fn encode_achievements(achievements: &AchievementSet) -> String {
    serde_json::to_string(achievements).unwrap_or_else(|_| "[]".to_string())
}
