// Progression engine: score -> level, level progress, click power and upgrade
// pricing. Pure functions, no hidden state.

use serde::Serialize;

use super::config::{LevelCurve, UpgradeSpec, MIN_CLICK_POWER, UPGRADES};
use super::profile::Upgrades;

/// Points earned inside the current level and the points that level requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LevelProgress {
    pub current: u64,
    pub required: u64,
}

impl LevelCurve {
    /// Points required to clear `level`. Total for `level >= 1` (0 is treated
    /// as 1) and never below one point.
    pub fn points_required(&self, level: u32) -> u64 {
        let exponent = level.saturating_sub(1).min(i32::MAX as u32) as i32;
        let points = (self.base as f64 * self.multiplier.powi(exponent)).floor();
        // Float-to-int casts saturate, so huge levels pin at u64::MAX.
        (points as u64).max(1)
    }

    /// Sum of `points_required(1..=level)`, saturating at `u64::MAX`.
    pub fn cumulative_through(&self, level: u32) -> u64 {
        (1..=level).fold(0u64, |total, l| total.saturating_add(self.points_required(l)))
    }

    /// Largest level `L >= 1` with `cumulative_through(L - 1) <= score`.
    ///
    /// Summed level by level; the curve has no closed form in general.
    pub fn level_for_score(&self, score: u64) -> u32 {
        let mut level = 1u32;
        let mut reached = 0u64;
        loop {
            let Some(next) = reached.checked_add(self.points_required(level)) else {
                break;
            };
            if next > score || level == u32::MAX {
                break;
            }
            reached = next;
            level += 1;
        }
        level
    }

    /// Display progress for `score` while at `level`.
    pub fn progress_within_level(&self, score: u64, level: u32) -> LevelProgress {
        let required = self.points_required(level);
        let floor = self.cumulative_through(level.saturating_sub(1));
        LevelProgress {
            current: score.saturating_sub(floor).min(required),
            required,
        }
    }
}

/// Points per click: `max(1, 1 + sum(level * multiplier))` over owned upgrades.
pub fn click_power(upgrades: &Upgrades) -> u64 {
    let bonus = UPGRADES.iter().fold(0u64, |acc, spec| {
        acc.saturating_add(u64::from(upgrades.level_of(spec.id)).saturating_mul(spec.multiplier))
    });
    bonus.saturating_add(1).max(MIN_CLICK_POWER)
}

/// Price of the next level of `spec` when `current_level` are owned:
/// `floor(base_cost * growth^current_level)`.
pub fn upgrade_cost(spec: &UpgradeSpec, current_level: u32, growth: f64) -> u64 {
    let exponent = current_level.min(i32::MAX as u32) as i32;
    (spec.base_cost as f64 * growth.powi(exponent)).floor() as u64
}
