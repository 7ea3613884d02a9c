//! Item rarity tiers, weighted base selection and the cascading upgrade.
use std::fmt;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::numbers::unit_interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
    Mythic,
    Transcendent,
}

impl Rarity {
    pub const ALL: [Self; 7] = [
        Self::Common,
        Self::Uncommon,
        Self::Rare,
        Self::Epic,
        Self::Legendary,
        Self::Mythic,
        Self::Transcendent,
    ];

    /// Position in the tier ladder, Common = 0.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Common => Some(Self::Uncommon),
            Self::Uncommon => Some(Self::Rare),
            Self::Rare => Some(Self::Epic),
            Self::Epic => Some(Self::Legendary),
            Self::Legendary => Some(Self::Mythic),
            Self::Mythic => Some(Self::Transcendent),
            Self::Transcendent => None,
        }
    }

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Uncommon => "uncommon",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
            Self::Mythic => "mythic",
            Self::Transcendent => "transcendent",
        }
    }

    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|rarity| rarity.key().eq_ignore_ascii_case(key))
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Relative weights for the initial rarity draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RarityWeights {
    pub common: f64,
    pub uncommon: f64,
    pub rare: f64,
    pub epic: f64,
    pub legendary: f64,
    pub mythic: f64,
    pub transcendent: f64,
}

impl Default for RarityWeights {
    fn default() -> Self {
        Self {
            common: 500.0,
            uncommon: 250.0,
            rare: 120.0,
            epic: 60.0,
            legendary: 25.0,
            mythic: 8.0,
            transcendent: 2.0,
        }
    }
}

impl RarityWeights {
    #[must_use]
    pub const fn get(&self, rarity: Rarity) -> f64 {
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

    pub const fn get_mut(&mut self, rarity: Rarity) -> &mut f64 {
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
        Rarity::ALL.into_iter().map(|r| self.get(r)).sum()
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for rarity in Rarity::ALL {
            let weight = self.get(rarity);
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::MinViolation {
                    field: format!("loot.rarityWeights.{}", rarity.key()),
                    min: 0.0,
                    value: weight,
                });
            }
        }
        if self.total() <= 0.0 {
            return Err(ConfigError::MinViolation {
                field: "loot.rarityWeights".to_string(),
                min: f64::MIN_POSITIVE,
                value: 0.0,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RarityUpgradeConfig {
    #[serde(default = "RarityUpgradeConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "RarityUpgradeConfig::default_base_chance")]
    pub base_chance: f64,
    #[serde(default = "RarityUpgradeConfig::default_decay_per_tier")]
    pub decay_per_tier: f64,
    #[serde(default = "RarityUpgradeConfig::default_max_tiers")]
    pub max_tiers: u32,
    #[serde(default = "RarityUpgradeConfig::default_magic_find_bonus")]
    pub magic_find_bonus: f64,
}

impl RarityUpgradeConfig {
    const fn default_enabled() -> bool {
        true
    }
    const fn default_base_chance() -> f64 {
        0.05
    }
    const fn default_decay_per_tier() -> f64 {
        0.5
    }
    const fn default_max_tiers() -> u32 {
        6
    }
    const fn default_magic_find_bonus() -> f64 {
        0.0001
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("loot.rarityUpgrade.baseChance", self.base_chance),
            ("loot.rarityUpgrade.decayPerTier", self.decay_per_tier),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::RangeViolation {
                    field: field.to_string(),
                    min: 0.0,
                    max: 1.0,
                    value,
                });
            }
        }
        if !self.magic_find_bonus.is_finite() || self.magic_find_bonus < 0.0 {
            return Err(ConfigError::MinViolation {
                field: "loot.rarityUpgrade.magicFindBonus".to_string(),
                min: 0.0,
                value: self.magic_find_bonus,
            });
        }
        Ok(())
    }
}

impl Default for RarityUpgradeConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            base_chance: Self::default_base_chance(),
            decay_per_tier: Self::default_decay_per_tier(),
            max_tiers: Self::default_max_tiers(),
            magic_find_bonus: Self::default_magic_find_bonus(),
        }
    }
}

/// Drop-rate and rarity settings for generated loot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LootConfig {
    #[serde(default = "LootConfig::default_drop_chance")]
    pub drop_chance: f64,
    #[serde(default = "LootConfig::default_drop_chance_per_level")]
    pub drop_chance_per_level: f64,
    #[serde(default = "LootConfig::default_max_drop_chance")]
    pub max_drop_chance: f64,
    #[serde(default = "LootConfig::default_magic_find_effectiveness")]
    pub magic_find_effectiveness: f64,
    #[serde(default)]
    pub rarity_weights: RarityWeights,
    #[serde(default)]
    pub rarity_upgrade: RarityUpgradeConfig,
}

impl LootConfig {
    const LEVEL_BONUS_CAP: f64 = 0.3;

    const fn default_drop_chance() -> f64 {
        0.6
    }
    const fn default_drop_chance_per_level() -> f64 {
        0.05
    }
    const fn default_max_drop_chance() -> f64 {
        0.95
    }
    const fn default_magic_find_effectiveness() -> f64 {
        0.001
    }

    /// Drop chance for a kill, before the random draw.
    #[must_use]
    pub fn drop_probability(&self, enemy_level: u32, player_level: u32, magic_find: f64) -> f64 {
        let level_gap = f64::from(enemy_level) - f64::from(player_level);
        let level_bonus = (level_gap * self.drop_chance_per_level)
            .clamp(-Self::LEVEL_BONUS_CAP, Self::LEVEL_BONUS_CAP);
        let magic = magic_find.max(0.0) * self.magic_find_effectiveness;
        (self.drop_chance + level_bonus + magic).clamp(0.0, self.max_drop_chance)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("loot.dropChance", self.drop_chance),
            ("loot.dropChancePerLevel", self.drop_chance_per_level),
            ("loot.maxDropChance", self.max_drop_chance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::RangeViolation {
                    field: field.to_string(),
                    min: 0.0,
                    max: 1.0,
                    value,
                });
            }
        }
        if !self.magic_find_effectiveness.is_finite() || self.magic_find_effectiveness < 0.0 {
            return Err(ConfigError::MinViolation {
                field: "loot.magicFindEffectiveness".to_string(),
                min: 0.0,
                value: self.magic_find_effectiveness,
            });
        }
        self.rarity_weights.validate()?;
        self.rarity_upgrade.validate()
    }
}

impl Default for LootConfig {
    fn default() -> Self {
        Self {
            drop_chance: Self::default_drop_chance(),
            drop_chance_per_level: Self::default_drop_chance_per_level(),
            max_drop_chance: Self::default_max_drop_chance(),
            magic_find_effectiveness: Self::default_magic_find_effectiveness(),
            rarity_weights: RarityWeights::default(),
            rarity_upgrade: RarityUpgradeConfig::default(),
        }
    }
}

pub fn roll_loot_drop<R: RngCore + ?Sized>(
    rng: &mut R,
    loot: &LootConfig,
    enemy_level: u32,
    player_level: u32,
    magic_find: f64,
) -> bool {
    unit_interval(rng.next_u32()) < loot.drop_probability(enemy_level, player_level, magic_find)
}

/// Weighted initial tier draw. Falls back to Common when every weight is zero.
pub fn roll_base_rarity<R: Rng + ?Sized>(rng: &mut R, weights: &RarityWeights) -> Rarity {
    let total = weights.total();
    if total <= 0.0 {
        return Rarity::Common;
    }
    let mut roll = rng.gen_range(0.0..total);
    for rarity in Rarity::ALL {
        let weight = weights.get(rarity);
        if roll < weight {
            return rarity;
        }
        roll -= weight;
    }
    Rarity::Transcendent
}

/// Chance to cross tier boundary `step` (Common to Uncommon is step 0).
#[must_use]
pub fn upgrade_probability(cfg: &RarityUpgradeConfig, step: u32, magic_find: f64) -> f64 {
    let exponent = i32::try_from(step).unwrap_or(i32::MAX);
    let base = cfg.base_chance * cfg.decay_per_tier.powi(exponent);
    (base + magic_find.max(0.0) * cfg.magic_find_bonus).clamp(0.0, 1.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeResult {
    pub base: Rarity,
    pub rarity: Rarity,
    pub promotions: u32,
}

pub fn cascade_upgrade<R: RngCore + ?Sized>(
    rng: &mut R,
    cfg: &RarityUpgradeConfig,
    base: Rarity,
    magic_find: f64,
) -> UpgradeResult {
    let mut result = UpgradeResult {
        base,
        rarity: base,
        promotions: 0,
    };
    if !cfg.enabled {
        return result;
    }
    while result.promotions < cfg.max_tiers {
        let Some(next) = result.rarity.next() else {
            break;
        };
        let step = u32::try_from(result.rarity.index()).unwrap_or(u32::MAX);
        if unit_interval(rng.next_u32()) >= upgrade_probability(cfg, step, magic_find) {
            break;
        }
        result.rarity = next;
        result.promotions += 1;
    }
    result
}
