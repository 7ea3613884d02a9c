//! Weighted item-modification roll.
//!
//! A uniform draw in `[0, 100)` is shifted down by the item tier and any
//! bonus points, then bucketed by cumulative thresholds built from seven
//! per-rarity percentages. Common and Epic have a small chance to yield their
//! named modification instead of a generic one. Rolling Divine appends a
//! follow-up roll with extra bonus points.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::rarity::Rarity;
use crate::config::ConfigError;
use crate::numbers::unit_interval;

/// Upper bound on the adjusted roll so it stays inside `[0, 100)`.
pub const MAX_ADJUSTED_ROLL: f64 = 99.99;
pub const NAMED_BRANCH_CHANCE: f64 = 0.10;
/// Bonus points carried into the roll granted by Divine.
pub const DIVINE_REROLL_BONUS: i32 = 3;
/// Divine grants at most this many follow-up rolls per item.
pub const MAX_REROLL_CHAIN: u32 = 1;
const PERCENT_SUM_TOLERANCE: f64 = 0.01;

pub const DIVINE_ID: u8 = 24;
pub const MAGIC_FINGERS_ID: u8 = 29;
pub const MAGICAL_LAMP_ID: u8 = 31;

const SLOTS_PER_RARITY: u8 = 4;
const CATALOG: [[&str; 4]; 7] = [
    ["Worn", "Balanced", "Honed", "Sturdy"],
    ["Keen", "Reinforced", "Quickened", "Steady"],
    ["Vicious", "Warded", "Relentless", "Focused"],
    ["Bloodthirsty", "Unyielding", "Tempest", "Arcane"],
    ["Soulrend", "Aegis", "Eternal", "Stormcaller"],
    ["Worldbreaker", "Starforged", "Voidtouched", "Divine"],
    ["Ascendant", "Paradox", "Omniscient", "Infinite"],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Modification {
    pub id: u8,
    pub rarity: Rarity,
    pub name: &'static str,
}

impl Modification {
    fn generic(rarity: Rarity, slot: u8) -> Self {
        let slot = slot.min(SLOTS_PER_RARITY - 1);
        let tier = u8::try_from(rarity.index()).unwrap_or(0);
        Self {
            id: tier * SLOTS_PER_RARITY + slot + 1,
            rarity,
            name: CATALOG[rarity.index()][usize::from(slot)],
        }
    }

    const fn named(rarity: Rarity) -> Option<Self> {
        match rarity {
            Rarity::Common => Some(Self {
                id: MAGIC_FINGERS_ID,
                rarity,
                name: "Magic Fingers",
            }),
            Rarity::Epic => Some(Self {
                id: MAGICAL_LAMP_ID,
                rarity,
                name: "Magical Lamp",
            }),
            _ => None,
        }
    }

    #[must_use]
    pub const fn grants_reroll(&self) -> bool {
        self.id == DIVINE_ID
    }
}

pub type ModificationRoll = SmallVec<[Modification; 2]>;

/// Percentage of rolls landing in each bucket, plus roll-shift coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModificationRarityConfig {
    pub common: f64,
    pub uncommon: f64,
    pub rare: f64,
    pub epic: f64,
    pub legendary: f64,
    pub mythic: f64,
    pub transcendent: f64,
    #[serde(default = "ModificationRarityConfig::default_tier_bonus_per_level")]
    pub tier_bonus_per_level: f64,
    #[serde(default = "ModificationRarityConfig::default_bonus_point_effectiveness")]
    pub bonus_point_effectiveness: f64,
}

impl Default for ModificationRarityConfig {
    fn default() -> Self {
        Self {
            common: 35.0,
            uncommon: 25.0,
            rare: 20.0,
            epic: 12.0,
            legendary: 6.0,
            mythic: 1.8,
            transcendent: 0.2,
            tier_bonus_per_level: Self::default_tier_bonus_per_level(),
            bonus_point_effectiveness: Self::default_bonus_point_effectiveness(),
        }
    }
}

impl ModificationRarityConfig {
    const fn default_tier_bonus_per_level() -> f64 {
        1.5
    }
    const fn default_bonus_point_effectiveness() -> f64 {
        1.0
    }

    #[must_use]
    pub const fn percentage(&self, rarity: Rarity) -> f64 {
        match rarity {
            Rarity::Common => self.common,
            Rarity::Uncommon => self.uncommon,
            Rarity::Rare => self.rare,
            Rarity::Epic => self.epic,
            Rarity::Legendary => self.legendary,
            Rarity::Mythic => self.mythic,
            Rarity::Transcendent => self.transcendent,
        }
    }

    pub const fn percentage_mut(&mut self, rarity: Rarity) -> &mut f64 {
        match rarity {
            Rarity::Common => &mut self.common,
            Rarity::Uncommon => &mut self.uncommon,
            Rarity::Rare => &mut self.rare,
            Rarity::Epic => &mut self.epic,
            Rarity::Legendary => &mut self.legendary,
            Rarity::Mythic => &mut self.mythic,
            Rarity::Transcendent => &mut self.transcendent,
        }
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        Rarity::ALL.into_iter().map(|r| self.percentage(r)).sum()
    }

    /// Cumulative upper bounds, one per bucket in tier order.
    #[must_use]
    pub fn thresholds(&self) -> [f64; 7] {
        let mut cumulative = 0.0;
        Rarity::ALL.map(|rarity| {
            cumulative += self.percentage(rarity);
            cumulative
        })
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for rarity in Rarity::ALL {
            let value = self.percentage(rarity);
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::MinViolation {
                    field: format!("modifications.{}", rarity.key()),
                    min: 0.0,
                    value,
                });
            }
        }
        let sum = self.total();
        if (sum - 100.0).abs() > PERCENT_SUM_TOLERANCE {
            return Err(ConfigError::PercentageSum { sum });
        }
        for (field, value) in [
            ("modifications.tierBonusPerLevel", self.tier_bonus_per_level),
            (
                "modifications.bonusPointEffectiveness",
                self.bonus_point_effectiveness,
            ),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::MinViolation {
                    field: field.to_string(),
                    min: 0.0,
                    value,
                });
            }
        }
        Ok(())
    }
}

/// Shift a raw `[0, 100)` draw by tier and bonus points, clamped back into range.
#[must_use]
pub fn adjusted_roll(raw: f64, cfg: &ModificationRarityConfig, item_tier: u32, bonus: i32) -> f64 {
    let tier_bonus = (f64::from(item_tier.saturating_sub(1)) * cfg.tier_bonus_per_level).max(0.0);
    let bonus_shift = f64::from(bonus) * cfg.bonus_point_effectiveness;
    (raw - tier_bonus - bonus_shift).clamp(0.0, MAX_ADJUSTED_ROLL)
}

#[must_use]
pub fn bucket_for_roll(cfg: &ModificationRarityConfig, roll: f64) -> Rarity {
    Rarity::ALL
        .into_iter()
        .zip(cfg.thresholds())
        .find(|(_, threshold)| roll < *threshold)
        .map_or(Rarity::Transcendent, |(rarity, _)| rarity)
}

fn roll_single<R: Rng + ?Sized>(
    rng: &mut R,
    cfg: &ModificationRarityConfig,
    item_tier: u32,
    bonus: i32,
) -> Modification {
    let raw = unit_interval(rng.next_u32()) * 100.0;
    let bucket = bucket_for_roll(cfg, adjusted_roll(raw, cfg, item_tier, bonus));
    if let Some(named) = Modification::named(bucket) {
        if unit_interval(rng.next_u32()) < NAMED_BRANCH_CHANCE {
            return named;
        }
    }
    Modification::generic(bucket, rng.gen_range(0..SLOTS_PER_RARITY))
}

/// Roll one modification; Divine chains a single follow-up roll.
pub fn roll_modification<R: RngCore + ?Sized>(
    rng: &mut R,
    cfg: &ModificationRarityConfig,
    item_tier: u32,
    bonus: i32,
) -> ModificationRoll {
    let mut rolled = ModificationRoll::new();
    let mut bonus = bonus;
    let mut rerolls = 0;
    loop {
        let modification = roll_single(rng, cfg, item_tier, bonus);
        rolled.push(modification);
        if !modification.grants_reroll() || rerolls >= MAX_REROLL_CHAIN {
            break;
        }
        rerolls += 1;
        bonus = bonus.saturating_add(DIVINE_REROLL_BONUS);
    }
    rolled
}
