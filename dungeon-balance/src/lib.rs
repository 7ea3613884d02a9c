//! Dungeon Balance Engine
//!
//! Stochastic balance tuning for a dungeon combat game. The crate simulates
//! weapon and enemy matchups, scores the outcome against target bands,
//! proposes configuration changes and drives a convergence loop that saves
//! the result as a named patch. It has no UI or process-level dependencies;
//! `balance-tuner` is the command-line front end.

pub mod analysis;
pub mod config;
pub mod constants;
pub mod error;
pub mod numbers;
pub mod oracle;
pub mod patch;
pub mod rolls;
pub mod scoring;
pub mod seed;
pub mod session;
pub mod store;
pub mod suggest;
pub mod sweep;
pub mod tuning_loop;
pub mod whatif;

// Re-export commonly used types
pub use analysis::{
    BalanceAnalysis, BaselineComparison, EngagementSummary, MatchupAnalysis, MatchupDelta,
    MatchupStatus, Snapshot, ValidationReport, analyze, compare, validate,
};
pub use config::{
    ArchetypeStat, ArchetypeStats, ConfigError, EnemyConfig, GlobalStat, PlayerConfig, Preset,
    TuningConfig, WeaponConfig, WeaponStat, WeaponType, paths,
};
pub use error::{EngineError, EngineResult, ErrorEnvelope, ErrorKind};
pub use oracle::{
    AggregateStatistics, BattleResolver, CancelToken, MatrixReport, MatrixRequest, Progress,
    ProgressSnapshot, RunControl, Simulator,
};
pub use patch::{Patch, PatchDraft, PatchMetadata, PatchStore, TestResultSummary};
pub use rolls::{
    ComboOutcome, ComboRoll, LootConfig, ModificationRarityConfig, Rarity, RarityUpgradeConfig,
    RarityWeights, cascade_upgrade, roll_base_rarity, roll_combo, roll_combo_continue,
    roll_loot_drop, roll_modification, upgrade_probability,
};
pub use scoring::{
    Axis, AxisScore, AxisStatus, Band, BalanceMetrics, QualityLabel, QualityScore,
    QualityWeights, TargetBands, score,
};
pub use session::{RarityDistribution, SessionOptions, SimulationSettings, TuningSession};
pub use store::{ConfigStore, ParameterChange};
pub use suggest::{Priority, TuningSuggestion, suggest};
pub use sweep::{SensitivityLevel, SensitivityResult, SweepRange, SweepRequest, sweep};
pub use tuning_loop::{
    DeviationCategory, FallbackRule, FallbackRules, LoopDriver, LoopPhase, LoopSettings,
    LoopState, SmokeReport, run_tuning_loop, smoke_check,
};
pub use whatif::{Persist, RiskLevel, Verdict, WhatIfRequest, WhatIfResult, what_if};
