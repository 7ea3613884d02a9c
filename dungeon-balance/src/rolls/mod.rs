//! Probabilistic primitives shared by combat and loot generation.

pub mod combo;
pub mod modification;
pub mod rarity;

pub use combo::{ComboOutcome, ComboRoll, continues_combo, roll_combo, roll_combo_continue};
pub use modification::{
    DIVINE_REROLL_BONUS, MAX_REROLL_CHAIN, Modification, ModificationRarityConfig,
    ModificationRoll, adjusted_roll, bucket_for_roll, roll_modification,
};
pub use rarity::{
    LootConfig, Rarity, RarityUpgradeConfig, RarityWeights, UpgradeResult, cascade_upgrade,
    roll_base_rarity, roll_loot_drop, upgrade_probability,
};
