//! Battle simulation oracle.
//!
//! Turn resolution is a black box behind [`BattleResolver`]. The
//! [`Simulator`] fans trials out over a bounded worker pool and reduces them
//! into [`BattleTally`] values that roll up into per-matchup, per-weapon,
//! per-enemy and overall [`AggregateStatistics`].

mod control;
mod duel;
mod simulator;
mod stats;

use rand::RngCore;

use crate::error::EngineResult;

pub use control::{CancelToken, Progress, ProgressSnapshot, RunControl};
pub use duel::{CombatantProfile, Duel, DuelResolver, MatchupProfiles};
pub use simulator::{CombinationResult, MatrixReport, MatrixRequest, SimulationRun, Simulator};
pub use stats::{ActionKinds, AggregateStatistics, BattleOutcome, BattleTally, Side};

/// Resolves a single battle between two combatants.
///
/// Implementations must be pure apart from the supplied RNG so trials can run
/// on any worker in any order.
pub trait BattleResolver: Send + Sync {
    /// # Errors
    ///
    /// Returns `ComputationFailure` when the battle cannot be resolved.
    fn resolve(&self, matchup: &MatchupProfiles, rng: &mut dyn RngCore)
    -> EngineResult<BattleOutcome>;
}
