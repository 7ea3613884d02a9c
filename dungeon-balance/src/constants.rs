//! Centralized engine constants.
//!
//! Tunable game numbers live in the configuration document; the values here
//! define how the engine itself measures, scores and iterates.

// Combat resolution --------------------------------------------------------
pub(crate) const TURN_CAP: u32 = 50;
pub(crate) const COMBO_DAMAGE_MULTIPLIER: f64 = 1.5;
pub(crate) const COMBO_CHAIN_STEP: f64 = 0.25;
pub(crate) const MAX_COMBO_CHAIN: u32 = 3;
pub(crate) const MIN_DAMAGE_FRACTION: f64 = 0.25;
pub(crate) const BASE_AGILITY: f64 = 10.0;
pub(crate) const COMEBACK_LOW_HEALTH: f64 = 0.30;
pub(crate) const COMEBACK_OPPONENT_HEALTH: f64 = 0.50;
pub(crate) const CLOSE_CALL_HEALTH: f64 = 0.10;
pub(crate) const ACTION_KIND_COUNT: u32 = 4;

// Simulation defaults ------------------------------------------------------
pub const DEFAULT_BATTLES_PER_COMBINATION: u32 = 25;
pub const DEFAULT_SEED: u64 = 1337;
pub(crate) const SMOKE_CHECK_ACTIONS: u32 = 5;

// Scoring --------------------------------------------------------------------
pub(crate) const WIN_RATE_FALLOFF: f64 = 15.0;
pub(crate) const DURATION_FALLOFF: f64 = 6.0;
pub(crate) const WEAPON_SPREAD_FALLOFF: f64 = 10.0;
pub(crate) const ENEMY_SPREAD_FALLOFF: f64 = 3.0;

// Suggestions ----------------------------------------------------------------
pub(crate) const MAX_ADJUSTMENT: f64 = 0.25;
pub(crate) const WIN_RATE_SEVERITY_UNIT: f64 = 5.0;
pub(crate) const DURATION_SEVERITY_UNIT: f64 = 3.0;
pub(crate) const WEAPON_SPREAD_SEVERITY_UNIT: f64 = 5.0;
pub(crate) const ENEMY_SPREAD_SEVERITY_UNIT: f64 = 2.0;

// Sensitivity and what-if ----------------------------------------------------
pub(crate) const HIGH_SENSITIVITY: f64 = 0.3;
pub(crate) const MODERATE_SENSITIVITY: f64 = 0.1;
pub(crate) const QUALITY_RISK_MEDIUM: f64 = 10.0;
pub(crate) const QUALITY_RISK_HIGH: f64 = 20.0;
pub(crate) const WIN_RATE_RISK_MEDIUM: f64 = 5.0;
pub(crate) const WIN_RATE_RISK_HIGH: f64 = 10.0;
pub(crate) const RECOMMEND_QUALITY_DELTA: f64 = 5.0;

// Convergence loop -----------------------------------------------------------
pub const DEFAULT_TARGET_WIN_RATE: f64 = 90.0;
pub const DEFAULT_TOLERANCE: f64 = 2.0;
pub const DEFAULT_MAX_ITERATIONS: u32 = 5;
pub(crate) const LOOP_PATCH_AUTHOR: &str = "AutomatedTuningLoop";
pub(crate) const LOOP_PATCH_TAGS: [&str; 3] = ["auto-tuned", "cycle", "automated"];

// Patches --------------------------------------------------------------------
pub const GAME_VERSION: &str = "1.0";
pub(crate) const PATCH_EXTENSION: &str = "json";
