//! Tunable balance configuration.
//!
//! Every adjustable number the tuner may touch lives in [`TuningConfig`] and
//! is addressable by a dotted parameter path such as
//! `enemy.globalMultipliers.health` or `weapons.Sword.damage`. Path segments
//! are matched case-insensitively; [`TuningConfig::parameters`] lists the
//! canonical spelling of every leaf.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rolls::{LootConfig, ModificationRarityConfig, Rarity};

const DEFAULT_TUNING_DATA: &str = include_str!("../assets/tuning_defaults.json");

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown parameter path: {path}")]
    UnknownPath { path: String },
    #[error("{field} must be at least {min:.4} (got {value:.4})")]
    MinViolation { field: String, min: f64, value: f64 },
    #[error("{field} must be between {min:.4} and {max:.4} (got {value:.4})")]
    RangeViolation {
        field: String,
        min: f64,
        max: f64,
        value: f64,
    },
    #[error("{field} must be a whole number (got {value})")]
    NotWhole { field: String, value: f64 },
    #[error("modification percentages must total 100 (got {sum:.4})")]
    PercentageSum { sum: f64 },
    #[error("{what} must not be empty")]
    Empty { what: &'static str },
    #[error("failed to parse tuning configuration: {0}")]
    Parse(String),
    #[error("unknown preset '{name}' (expected one of: {expected})")]
    UnknownPreset { name: String, expected: String },
}

impl ConfigError {
    /// Parameter the error refers to, when it names one.
    #[must_use]
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::UnknownPath { path } => Some(path),
            Self::MinViolation { field, .. }
            | Self::RangeViolation { field, .. }
            | Self::NotWhole { field, .. } => Some(field),
            Self::PercentageSum { .. } => Some("modifications"),
            Self::Empty { what } => Some(what),
            Self::UnknownPreset { .. } => Some("preset"),
            Self::Parse(_) => None,
        }
    }
}

fn require_positive(field: impl Into<String>, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        return Ok(());
    }
    Err(ConfigError::MinViolation {
        field: field.into(),
        min: f64::MIN_POSITIVE,
        value,
    })
}

fn require_non_negative(field: impl Into<String>, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        return Ok(());
    }
    Err(ConfigError::MinViolation {
        field: field.into(),
        min: 0.0,
        value,
    })
}

macro_rules! stat_selector {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $key:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $key)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            #[must_use]
            pub const fn key(self) -> &'static str {
                match self {
                    $(Self::$variant => $key),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.key())
            }
        }

        impl FromStr for $name {
            type Err = ConfigError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|item| item.key().eq_ignore_ascii_case(value))
                    .ok_or_else(|| ConfigError::UnknownPath {
                        path: value.to_string(),
                    })
            }
        }
    };
}

stat_selector!(
    /// Enemy-wide multiplier applied on top of archetype stats.
    GlobalStat {
        Health => "health",
        Damage => "damage",
        Armor => "armor",
        Speed => "speed",
    }
);

stat_selector!(
    ArchetypeStat {
        Health => "health",
        Strength => "strength",
        Agility => "agility",
        Technique => "technique",
        Intelligence => "intelligence",
        Armor => "armor",
    }
);

stat_selector!(
    WeaponStat {
        Damage => "damage",
        AttackSpeed => "attackSpeed",
    }
);

stat_selector!(
    WeaponType {
        Sword => "Sword",
        Dagger => "Dagger",
        Mace => "Mace",
        Wand => "Wand",
    }
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalMultipliers {
    pub health: f64,
    pub damage: f64,
    pub armor: f64,
    pub speed: f64,
}

impl GlobalMultipliers {
    #[must_use]
    pub const fn get(&self, stat: GlobalStat) -> f64 {
        match stat {
            GlobalStat::Health => self.health,
            GlobalStat::Damage => self.damage,
            GlobalStat::Armor => self.armor,
            GlobalStat::Speed => self.speed,
        }
    }

    pub const fn get_mut(&mut self, stat: GlobalStat) -> &mut f64 {
        match stat {
            GlobalStat::Health => &mut self.health,
            GlobalStat::Damage => &mut self.damage,
            GlobalStat::Armor => &mut self.armor,
            GlobalStat::Speed => &mut self.speed,
        }
    }
}

impl Default for GlobalMultipliers {
    fn default() -> Self {
        Self {
            health: 1.0,
            damage: 1.0,
            armor: 1.0,
            speed: 1.0,
        }
    }
}

/// Named profile for the four enemy global multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Also accepted as `hard_mode`.
    AggressiveEnemies,
    TankyEnemies,
    FastEnemies,
    /// Also accepted as `default`.
    Baseline,
}

impl Preset {
    pub const ALL: [Self; 4] = [
        Self::AggressiveEnemies,
        Self::TankyEnemies,
        Self::FastEnemies,
        Self::Baseline,
    ];

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::AggressiveEnemies => "aggressive_enemies",
            Self::TankyEnemies => "tanky_enemies",
            Self::FastEnemies => "fast_enemies",
            Self::Baseline => "baseline",
        }
    }

    /// Multipliers the preset writes. Stats a preset does not emphasise are
    /// reset to 1.0.
    #[must_use]
    pub const fn multipliers(self) -> GlobalMultipliers {
        let (health, damage, armor, speed) = match self {
            Self::AggressiveEnemies => (1.2, 1.2, 1.0, 1.0),
            Self::TankyEnemies => (1.5, 0.9, 1.3, 1.0),
            Self::FastEnemies => (0.9, 1.0, 1.0, 1.3),
            Self::Baseline => (1.0, 1.0, 1.0, 1.0),
        };
        GlobalMultipliers {
            health,
            damage,
            armor,
            speed,
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let name = value.trim().to_ascii_lowercase().replace('-', "_");
        match name.as_str() {
            "aggressive_enemies" | "hard_mode" => Ok(Self::AggressiveEnemies),
            "tanky_enemies" => Ok(Self::TankyEnemies),
            "fast_enemies" => Ok(Self::FastEnemies),
            "baseline" | "default" => Ok(Self::Baseline),
            _ => Err(ConfigError::UnknownPreset {
                name: value.to_string(),
                expected: Self::ALL.map(Self::key).join(", "),
            }),
        }
    }
}

/// Level-1 enemy stats before archetype and global multipliers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineStats {
    pub health: f64,
    pub strength: f64,
    pub agility: f64,
    pub armor: f64,
}

impl Default for BaselineStats {
    fn default() -> Self {
        Self {
            health: 80.0,
            strength: 8.0,
            agility: 10.0,
            armor: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelScaling {
    pub health: f64,
    pub attributes: f64,
    pub armor: f64,
}

impl Default for LevelScaling {
    fn default() -> Self {
        Self {
            health: 12.0,
            attributes: 1.2,
            armor: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchetypeStats {
    pub health: f64,
    pub strength: f64,
    pub agility: f64,
    pub technique: f64,
    pub intelligence: f64,
    pub armor: f64,
}

impl ArchetypeStats {
    #[must_use]
    pub const fn new(
        health: f64,
        strength: f64,
        agility: f64,
        technique: f64,
        intelligence: f64,
        armor: f64,
    ) -> Self {
        Self {
            health,
            strength,
            agility,
            technique,
            intelligence,
            armor,
        }
    }

    #[must_use]
    pub const fn get(&self, stat: ArchetypeStat) -> f64 {
        match stat {
            ArchetypeStat::Health => self.health,
            ArchetypeStat::Strength => self.strength,
            ArchetypeStat::Agility => self.agility,
            ArchetypeStat::Technique => self.technique,
            ArchetypeStat::Intelligence => self.intelligence,
            ArchetypeStat::Armor => self.armor,
        }
    }

    pub const fn get_mut(&mut self, stat: ArchetypeStat) -> &mut f64 {
        match stat {
            ArchetypeStat::Health => &mut self.health,
            ArchetypeStat::Strength => &mut self.strength,
            ArchetypeStat::Agility => &mut self.agility,
            ArchetypeStat::Technique => &mut self.technique,
            ArchetypeStat::Intelligence => &mut self.intelligence,
            ArchetypeStat::Armor => &mut self.armor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnemyConfig {
    #[serde(default)]
    pub global_multipliers: GlobalMultipliers,
    #[serde(default)]
    pub baseline_stats: BaselineStats,
    #[serde(default)]
    pub scaling_per_level: LevelScaling,
    pub archetypes: BTreeMap<String, ArchetypeStats>,
}

impl EnemyConfig {
    /// Case-insensitive archetype lookup returning the stored key.
    #[must_use]
    pub fn archetype_key(&self, name: &str) -> Option<&str> {
        self.archetypes
            .keys()
            .find(|key| key.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for stat in GlobalStat::ALL {
            require_positive(
                format!("enemy.globalMultipliers.{stat}"),
                self.global_multipliers.get(*stat),
            )?;
        }
        require_positive("enemy.baselineStats.health", self.baseline_stats.health)?;
        require_positive("enemy.baselineStats.strength", self.baseline_stats.strength)?;
        require_positive("enemy.baselineStats.agility", self.baseline_stats.agility)?;
        require_non_negative("enemy.baselineStats.armor", self.baseline_stats.armor)?;
        require_non_negative("enemy.scalingPerLevel.health", self.scaling_per_level.health)?;
        require_non_negative(
            "enemy.scalingPerLevel.attributes",
            self.scaling_per_level.attributes,
        )?;
        require_non_negative("enemy.scalingPerLevel.armor", self.scaling_per_level.armor)?;
        if self.archetypes.is_empty() {
            return Err(ConfigError::Empty {
                what: "enemy.archetypes",
            });
        }
        for (name, stats) in &self.archetypes {
            for stat in ArchetypeStat::ALL {
                let field = format!("enemy.archetypes.{name}.{stat}");
                if *stat == ArchetypeStat::Armor {
                    require_non_negative(field, stats.get(*stat))?;
                } else {
                    require_positive(field, stats.get(*stat))?;
                }
            }
        }
        Ok(())
    }
}

impl Default for EnemyConfig {
    fn default() -> Self {
        let archetypes = [
            ("Assassin", ArchetypeStats::new(0.75, 1.15, 1.4, 1.25, 1.0, 0.6)),
            ("Berserker", ArchetypeStats::new(0.9, 1.3, 1.1, 1.0, 0.8, 0.7)),
            ("Brute", ArchetypeStats::new(1.3, 1.2, 0.75, 0.8, 0.7, 1.1)),
            ("Guardian", ArchetypeStats::new(1.4, 0.8, 0.8, 0.9, 0.9, 1.6)),
            ("Mage", ArchetypeStats::new(0.8, 0.9, 1.0, 1.1, 1.5, 0.6)),
        ]
        .into_iter()
        .map(|(name, stats)| (name.to_string(), stats))
        .collect();
        Self {
            global_multipliers: GlobalMultipliers::default(),
            baseline_stats: BaselineStats::default(),
            scaling_per_level: LevelScaling::default(),
            archetypes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerConfig {
    #[serde(default = "PlayerConfig::default_base_health")]
    pub base_health: f64,
    #[serde(default = "PlayerConfig::default_health_per_level")]
    pub health_per_level: f64,
    #[serde(default = "PlayerConfig::default_base_damage")]
    pub base_damage: f64,
    #[serde(default = "PlayerConfig::default_damage_per_level")]
    pub damage_per_level: f64,
    #[serde(default = "PlayerConfig::default_base_armor")]
    pub base_armor: f64,
}

impl PlayerConfig {
    const fn default_base_health() -> f64 {
        100.0
    }
    const fn default_health_per_level() -> f64 {
        10.0
    }
    const fn default_base_damage() -> f64 {
        10.0
    }
    const fn default_damage_per_level() -> f64 {
        1.5
    }
    const fn default_base_armor() -> f64 {
        5.0
    }

    fn validate(&self) -> Result<(), ConfigError> {
        require_positive("player.baseHealth", self.base_health)?;
        require_positive("player.baseDamage", self.base_damage)?;
        require_non_negative("player.healthPerLevel", self.health_per_level)?;
        require_non_negative("player.damagePerLevel", self.damage_per_level)?;
        require_non_negative("player.baseArmor", self.base_armor)
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            base_health: Self::default_base_health(),
            health_per_level: Self::default_health_per_level(),
            base_damage: Self::default_base_damage(),
            damage_per_level: Self::default_damage_per_level(),
            base_armor: Self::default_base_armor(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaponScaling {
    pub damage: f64,
    pub attack_speed: f64,
}

impl WeaponScaling {
    #[must_use]
    pub const fn get(&self, stat: WeaponStat) -> f64 {
        match stat {
            WeaponStat::Damage => self.damage,
            WeaponStat::AttackSpeed => self.attack_speed,
        }
    }

    pub const fn get_mut(&mut self, stat: WeaponStat) -> &mut f64 {
        match stat {
            WeaponStat::Damage => &mut self.damage,
            WeaponStat::AttackSpeed => &mut self.attack_speed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaponConfig {
    #[serde(default = "WeaponConfig::default_global_damage_multiplier")]
    pub global_damage_multiplier: f64,
    pub types: BTreeMap<WeaponType, WeaponScaling>,
}

impl WeaponConfig {
    const fn default_global_damage_multiplier() -> f64 {
        1.0
    }

    fn validate(&self) -> Result<(), ConfigError> {
        require_positive(
            "weapons.globalDamageMultiplier",
            self.global_damage_multiplier,
        )?;
        if self.types.is_empty() {
            return Err(ConfigError::Empty {
                what: "weapons.types",
            });
        }
        for (weapon, scaling) in &self.types {
            require_positive(format!("weapons.{weapon}.damage"), scaling.damage)?;
            require_positive(format!("weapons.{weapon}.attackSpeed"), scaling.attack_speed)?;
        }
        Ok(())
    }
}

impl Default for WeaponConfig {
    fn default() -> Self {
        let types = [
            (WeaponType::Sword, 1.0, 1.0),
            (WeaponType::Dagger, 0.7, 1.4),
            (WeaponType::Mace, 1.35, 0.75),
            (WeaponType::Wand, 0.85, 1.1),
        ]
        .into_iter()
        .map(|(weapon, damage, attack_speed)| {
            (
                weapon,
                WeaponScaling {
                    damage,
                    attack_speed,
                },
            )
        })
        .collect();
        Self {
            global_damage_multiplier: Self::default_global_damage_multiplier(),
            types,
        }
    }
}

/// Full tunable configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningConfig {
    #[serde(default)]
    pub enemy: EnemyConfig,
    #[serde(default)]
    pub player: PlayerConfig,
    #[serde(default)]
    pub weapons: WeaponConfig,
    #[serde(default)]
    pub loot: LootConfig,
    #[serde(default)]
    pub modifications: ModificationRarityConfig,
}

impl Default for TuningConfig {
    fn default() -> Self {
        serde_json::from_str(DEFAULT_TUNING_DATA).unwrap_or_else(|_| Self::builtin())
    }
}

enum Leaf<'a> {
    Value(&'a mut f64),
    Count(&'a mut u32),
    Flag(&'a mut bool),
}

impl Leaf<'_> {
    fn read(&self) -> f64 {
        match self {
            Self::Value(value) => **value,
            Self::Count(count) => f64::from(**count),
            Self::Flag(flag) => {
                if **flag {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    fn write(self, path: &str, value: f64) -> Result<(), ConfigError> {
        if !value.is_finite() {
            return Err(ConfigError::MinViolation {
                field: path.to_string(),
                min: 0.0,
                value,
            });
        }
        match self {
            Self::Value(slot) => *slot = value,
            Self::Count(slot) => {
                if value < 0.0 || value.fract() != 0.0 || value > f64::from(u32::MAX) {
                    return Err(ConfigError::NotWhole {
                        field: path.to_string(),
                        value,
                    });
                }
                *slot = num_traits::cast::<f64, u32>(value).unwrap_or(*slot);
            }
            Self::Flag(slot) => *slot = value != 0.0,
        }
        Ok(())
    }
}

impl TuningConfig {
    /// Built-in defaults used when the embedded document cannot be parsed.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            enemy: EnemyConfig::default(),
            player: PlayerConfig::default(),
            weapons: WeaponConfig::default(),
            loot: LootConfig::default(),
            modifications: ModificationRarityConfig::default(),
        }
    }

    /// Parse and validate a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and a validation
    /// error when any leaf is out of range.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Canonical pretty-printed document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if serialization fails.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Check every leaf against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.enemy.validate()?;
        self.player.validate()?;
        self.weapons.validate()?;
        self.loot.validate()?;
        self.modifications.validate()
    }

    /// Read a numeric leaf. Counts read as whole numbers and flags as 0 or 1.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownPath`] when the path names no leaf.
    pub fn get(&self, path: &str) -> Result<f64, ConfigError> {
        let mut scratch = self.clone();
        Ok(scratch.leaf(path)?.read())
    }

    /// Write a numeric leaf and return its previous value.
    ///
    /// The whole configuration is validated after the write; on failure the
    /// previous value is restored and the error returned.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownPath`] or the validation error raised by
    /// the new value.
    pub fn set(&mut self, path: &str, value: f64) -> Result<f64, ConfigError> {
        let old = self.leaf(path)?.read();
        self.leaf(path)?.write(path, value)?;
        if let Err(err) = self.validate() {
            self.leaf(path)?.write(path, old)?;
            return Err(err);
        }
        Ok(old)
    }

    /// Every numeric leaf with its canonical path, in a stable order.
    #[must_use]
    pub fn parameters(&self) -> Vec<(String, f64)> {
        let mut out = Vec::new();
        for stat in GlobalStat::ALL {
            out.push((
                paths::global_multiplier(*stat),
                self.enemy.global_multipliers.get(*stat),
            ));
        }
        let baseline = &self.enemy.baseline_stats;
        for (key, value) in [
            ("health", baseline.health),
            ("strength", baseline.strength),
            ("agility", baseline.agility),
            ("armor", baseline.armor),
        ] {
            out.push((format!("enemy.baselineStats.{key}"), value));
        }
        let scaling = &self.enemy.scaling_per_level;
        for (key, value) in [
            ("health", scaling.health),
            ("attributes", scaling.attributes),
            ("armor", scaling.armor),
        ] {
            out.push((format!("enemy.scalingPerLevel.{key}"), value));
        }
        for (name, stats) in &self.enemy.archetypes {
            for stat in ArchetypeStat::ALL {
                out.push((paths::archetype(name, *stat), stats.get(*stat)));
            }
        }
        let player = &self.player;
        for (key, value) in [
            ("baseHealth", player.base_health),
            ("healthPerLevel", player.health_per_level),
            ("baseDamage", player.base_damage),
            ("damagePerLevel", player.damage_per_level),
            ("baseArmor", player.base_armor),
        ] {
            out.push((format!("player.{key}"), value));
        }
        out.push((
            paths::WEAPON_GLOBAL_DAMAGE.to_string(),
            self.weapons.global_damage_multiplier,
        ));
        for (weapon, scaling) in &self.weapons.types {
            for stat in WeaponStat::ALL {
                out.push((paths::weapon(*weapon, *stat), scaling.get(*stat)));
            }
        }
        let loot = &self.loot;
        for (key, value) in [
            ("dropChance", loot.drop_chance),
            ("dropChancePerLevel", loot.drop_chance_per_level),
            ("maxDropChance", loot.max_drop_chance),
            ("magicFindEffectiveness", loot.magic_find_effectiveness),
        ] {
            out.push((format!("loot.{key}"), value));
        }
        for rarity in Rarity::ALL {
            out.push((paths::rarity_weight(rarity), loot.rarity_weights.get(rarity)));
        }
        out.push((
            paths::UPGRADE_BASE_CHANCE.to_string(),
            loot.rarity_upgrade.base_chance,
        ));
        out.push((
            paths::UPGRADE_DECAY.to_string(),
            loot.rarity_upgrade.decay_per_tier,
        ));
        out.push((
            "loot.rarityUpgrade.maxTiers".to_string(),
            f64::from(loot.rarity_upgrade.max_tiers),
        ));
        out.push((
            "loot.rarityUpgrade.magicFindBonus".to_string(),
            loot.rarity_upgrade.magic_find_bonus,
        ));
        for rarity in Rarity::ALL {
            out.push((
                format!("modifications.{}", rarity.key()),
                self.modifications.percentage(rarity),
            ));
        }
        out.push((
            "modifications.tierBonusPerLevel".to_string(),
            self.modifications.tier_bonus_per_level,
        ));
        out.push((
            "modifications.bonusPointEffectiveness".to_string(),
            self.modifications.bonus_point_effectiveness,
        ));
        out
    }

    fn leaf(&mut self, path: &str) -> Result<Leaf<'_>, ConfigError> {
        let unknown = || ConfigError::UnknownPath {
            path: path.to_string(),
        };
        let segments: Vec<String> = path
            .split('.')
            .map(|segment| segment.trim().to_ascii_lowercase())
            .collect();
        let parts: Vec<&str> = segments.iter().map(String::as_str).collect();

        let leaf = match parts.as_slice() {
            ["enemy", "globalmultipliers", stat] => {
                let stat = GlobalStat::from_str(stat).map_err(|_| unknown())?;
                Leaf::Value(self.enemy.global_multipliers.get_mut(stat))
            }
            ["enemy", "baselinestats", stat] => {
                let baseline = &mut self.enemy.baseline_stats;
                Leaf::Value(match *stat {
                    "health" => &mut baseline.health,
                    "strength" => &mut baseline.strength,
                    "agility" => &mut baseline.agility,
                    "armor" => &mut baseline.armor,
                    _ => return Err(unknown()),
                })
            }
            ["enemy", "scalingperlevel", stat] => {
                let scaling = &mut self.enemy.scaling_per_level;
                Leaf::Value(match *stat {
                    "health" => &mut scaling.health,
                    "attributes" => &mut scaling.attributes,
                    "armor" => &mut scaling.armor,
                    _ => return Err(unknown()),
                })
            }
            ["enemy", "archetypes", name, stat] => {
                let stat = ArchetypeStat::from_str(stat).map_err(|_| unknown())?;
                let key = self
                    .enemy
                    .archetype_key(name)
                    .map(str::to_string)
                    .ok_or_else(unknown)?;
                let stats = self.enemy.archetypes.get_mut(&key).ok_or_else(unknown)?;
                Leaf::Value(stats.get_mut(stat))
            }
            ["player", field] => {
                let player = &mut self.player;
                Leaf::Value(match *field {
                    "basehealth" => &mut player.base_health,
                    "healthperlevel" => &mut player.health_per_level,
                    "basedamage" => &mut player.base_damage,
                    "damageperlevel" => &mut player.damage_per_level,
                    "basearmor" => &mut player.base_armor,
                    _ => return Err(unknown()),
                })
            }
            ["weapons", "globaldamagemultiplier"] => {
                Leaf::Value(&mut self.weapons.global_damage_multiplier)
            }
            ["weapons", weapon, stat] => {
                let weapon = WeaponType::from_str(weapon).map_err(|_| unknown())?;
                let stat = WeaponStat::from_str(stat).map_err(|_| unknown())?;
                let scaling = self.weapons.types.get_mut(&weapon).ok_or_else(unknown)?;
                Leaf::Value(scaling.get_mut(stat))
            }
            ["loot", "rarityweights", rarity] => {
                let rarity = Rarity::from_key(rarity).ok_or_else(unknown)?;
                Leaf::Value(self.loot.rarity_weights.get_mut(rarity))
            }
            ["loot", "rarityupgrade", field] => {
                let upgrade = &mut self.loot.rarity_upgrade;
                match *field {
                    "basechance" => Leaf::Value(&mut upgrade.base_chance),
                    "decaypertier" => Leaf::Value(&mut upgrade.decay_per_tier),
                    "magicfindbonus" => Leaf::Value(&mut upgrade.magic_find_bonus),
                    "maxtiers" => Leaf::Count(&mut upgrade.max_tiers),
                    "enabled" => Leaf::Flag(&mut upgrade.enabled),
                    _ => return Err(unknown()),
                }
            }
            ["loot", field] => {
                let loot = &mut self.loot;
                Leaf::Value(match *field {
                    "dropchance" => &mut loot.drop_chance,
                    "dropchanceperlevel" => &mut loot.drop_chance_per_level,
                    "maxdropchance" => &mut loot.max_drop_chance,
                    "magicfindeffectiveness" => &mut loot.magic_find_effectiveness,
                    _ => return Err(unknown()),
                })
            }
            ["modifications", field] => {
                let mods = &mut self.modifications;
                if let Some(rarity) = Rarity::from_key(field) {
                    Leaf::Value(mods.percentage_mut(rarity))
                } else {
                    Leaf::Value(match *field {
                        "tierbonusperlevel" => &mut mods.tier_bonus_per_level,
                        "bonuspointeffectiveness" => &mut mods.bonus_point_effectiveness,
                        _ => return Err(unknown()),
                    })
                }
            }
            _ => return Err(unknown()),
        };
        Ok(leaf)
    }
}

/// Canonical parameter path builders.
pub mod paths {
    use super::{ArchetypeStat, GlobalStat, WeaponStat, WeaponType};
    use crate::rolls::Rarity;

    pub const WEAPON_GLOBAL_DAMAGE: &str = "weapons.globalDamageMultiplier";
    pub const DROP_CHANCE: &str = "loot.dropChance";
    pub const UPGRADE_BASE_CHANCE: &str = "loot.rarityUpgrade.baseChance";
    pub const UPGRADE_DECAY: &str = "loot.rarityUpgrade.decayPerTier";

    #[must_use]
    pub fn global_multiplier(stat: GlobalStat) -> String {
        format!("enemy.globalMultipliers.{stat}")
    }

    #[must_use]
    pub fn archetype(name: &str, stat: ArchetypeStat) -> String {
        format!("enemy.archetypes.{name}.{stat}")
    }

    #[must_use]
    pub fn weapon(weapon: WeaponType, stat: WeaponStat) -> String {
        format!("weapons.{weapon}.{stat}")
    }

    #[must_use]
    pub fn rarity_weight(rarity: Rarity) -> String {
        format!("loot.rarityWeights.{}", rarity.key())
    }
}
