use serde::Serialize;

// Level curve
pub const BASE_POINTS_PER_LEVEL: u64 = 10;
pub const LEVEL_MULTIPLIER: f64 = 1.5;

// Economy
pub const COINS_PER_CLICK: u64 = 1;
pub const UPGRADE_COST_GROWTH: f64 = 1.5;
pub const MIN_CLICK_POWER: u64 = 1;

// A score that lands on a non-zero multiple of this is save-worthy
pub const SAVE_EVERY_POINTS: u64 = 10;

// Bounds for one server-side click batch
pub const MAX_CLICKS_PER_REQUEST: u32 = 100;

/// A purchasable upgrade type. Owned levels are unbounded; each level adds
/// `multiplier` to click power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpgradeSpec {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub base_cost: u64,
    pub multiplier: u64,
}

/// Shop order.
pub const UPGRADES: [UpgradeSpec; 8] = [
    UpgradeSpec {
        id: "yandexSearch",
        name: "Yandex Search",
        description: "Sharper search ranking for every tap",
        base_cost: 50,
        multiplier: 1,
    },
    UpgradeSpec {
        id: "yandexMaps",
        name: "Yandex Maps",
        description: "Geolocation for precise clicks",
        base_cost: 100,
        multiplier: 2,
    },
    UpgradeSpec {
        id: "yandexMusic",
        name: "Yandex Music",
        description: "A soundtrack that keeps you tapping",
        base_cost: 200,
        multiplier: 3,
    },
    UpgradeSpec {
        id: "yandexPlus",
        name: "Yandex Plus",
        description: "Premium perks",
        base_cost: 500,
        multiplier: 5,
    },
    UpgradeSpec {
        id: "yandexGPT",
        name: "YandexGPT",
        description: "An assistant that clicks along with you",
        base_cost: 1000,
        multiplier: 10,
    },
    UpgradeSpec {
        id: "yandexCloud",
        name: "Yandex Cloud",
        description: "Cloud storage for your clicks",
        base_cost: 2000,
        multiplier: 15,
    },
    UpgradeSpec {
        id: "yandexMarket",
        name: "Yandex Market",
        description: "Commercial-grade improvements",
        base_cost: 5000,
        multiplier: 25,
    },
    UpgradeSpec {
        id: "yandexGo",
        name: "Yandex Go",
        description: "Mobile optimisation",
        base_cost: 10000,
        multiplier: 50,
    },
];

/// Look up an upgrade type by id.
pub fn upgrade_spec(id: &str) -> Option<&'static UpgradeSpec> {
    UPGRADES.iter().find(|u| u.id == id)
}

/// Exponential level curve: level `n` needs `floor(base * multiplier^(n-1))` points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelCurve {
    pub base: u64,
    pub multiplier: f64,
}

impl LevelCurve {
    pub const STANDARD: LevelCurve = LevelCurve {
        base: BASE_POINTS_PER_LEVEL,
        multiplier: LEVEL_MULTIPLIER,
    };
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// The tunable rule set a session plays under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GameRules {
    pub curve: LevelCurve,
    pub coins_per_click: u64,
    pub save_every_points: u64,
    pub upgrade_cost_growth: f64,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            curve: LevelCurve::STANDARD,
            coins_per_click: COINS_PER_CLICK,
            save_every_points: SAVE_EVERY_POINTS,
            upgrade_cost_growth: UPGRADE_COST_GROWTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upgrade_ids_are_unique() {
        for (i, a) in UPGRADES.iter().enumerate() {
            for b in &UPGRADES[i + 1..] {
                assert_ne!(a.id, b.id);
            }
        }
    }

    #[test]
    fn test_upgrade_spec_lookup() {
        assert_eq!(upgrade_spec("yandexGPT").unwrap().multiplier, 10);
        assert!(upgrade_spec("googleSearch").is_none());
    }
}
