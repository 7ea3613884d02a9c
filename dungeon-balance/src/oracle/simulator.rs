//! Weapon by archetype battle matrices on a bounded worker pool.
//!
//! Every battle draws from its own stream seeded by the run seed, the matchup
//! and the battle index, so a seeded run gives the same tallies for any
//! worker count. Per-combination tallies are merged into the per-weapon,
//! per-enemy and overall rollups.
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::BattleResolver;
use super::control::RunControl;
use super::duel::{DuelResolver, MatchupProfiles};
use super::stats::{AggregateStatistics, BattleOutcome, BattleTally};
use crate::config::{TuningConfig, WeaponType};
use crate::error::{EngineError, EngineResult};
use crate::seed::battle_rng;

const SINGLE_MATCHUP_TAG: &str = "matchup";

/// Which combinations a matrix run covers and how hard each is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixRequest {
    pub weapons: Vec<WeaponType>,
    pub archetypes: Vec<String>,
    pub battles_per_combination: u32,
    pub player_level: u32,
    pub enemy_level: u32,
}

impl MatrixRequest {
    /// Every configured weapon against every configured archetype.
    #[must_use]
    pub fn full(
        config: &TuningConfig,
        battles_per_combination: u32,
        player_level: u32,
        enemy_level: u32,
    ) -> Self {
        Self {
            weapons: config.weapons.types.keys().copied().collect(),
            archetypes: config.enemy.archetypes.keys().cloned().collect(),
            battles_per_combination,
            player_level,
            enemy_level,
        }
    }

    #[must_use]
    pub fn with_battles(&self, battles_per_combination: u32) -> Self {
        Self {
            battles_per_combination,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn total_battles(&self) -> u64 {
        let combinations = self.weapons.len().saturating_mul(self.archetypes.len());
        u64::try_from(combinations)
            .unwrap_or(u64::MAX)
            .saturating_mul(u64::from(self.battles_per_combination))
    }

    fn validate(&self) -> EngineResult<()> {
        if self.battles_per_combination == 0 {
            return Err(EngineError::validation(
                "battlesPerCombination",
                "must be at least 1",
            ));
        }
        if self.weapons.is_empty() {
            return Err(EngineError::validation("weapons", "no weapons selected"));
        }
        if self.archetypes.is_empty() {
            return Err(EngineError::validation("archetypes", "no enemies selected"));
        }
        if self.player_level == 0 || self.enemy_level == 0 {
            return Err(EngineError::validation("level", "levels start at 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinationResult {
    pub weapon: WeaponType,
    pub enemy: String,
    pub statistics: AggregateStatistics,
}

/// Weapon by enemy results with their rollups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixReport {
    pub seed: u64,
    pub request: MatrixRequest,
    pub overall: AggregateStatistics,
    pub per_weapon: BTreeMap<WeaponType, AggregateStatistics>,
    pub per_enemy: BTreeMap<String, AggregateStatistics>,
    pub combinations: Vec<CombinationResult>,
    /// Set when the run was cancelled and holds only the trials finished so far.
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRun {
    pub seed: u64,
    pub statistics: AggregateStatistics,
    pub cancelled: bool,
}

struct Combination {
    weapon: WeaponType,
    enemy: String,
    tag: String,
    profiles: MatchupProfiles,
}

pub struct Simulator {
    resolver: Arc<dyn BattleResolver>,
    pool: rayon::ThreadPool,
}

impl fmt::Debug for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("workers", &self.pool.current_num_threads())
            .finish_non_exhaustive()
    }
}

impl Simulator {
    /// Build a simulator with a dedicated pool of `workers` threads
    /// (0 picks one per core).
    ///
    /// # Errors
    ///
    /// Returns `ComputationFailure` when the pool cannot be started.
    pub fn new(resolver: Arc<dyn BattleResolver>, workers: usize) -> EngineResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("battle-worker-{index}"))
            .build()
            .map_err(|err| EngineError::computation(format!("worker pool: {err}")))?;
        log::debug!("simulator pool ready with {} workers", pool.current_num_threads());
        Ok(Self { resolver, pool })
    }

    /// # Errors
    ///
    /// Returns `ComputationFailure` when the pool cannot be started.
    pub fn with_duel_resolver(workers: usize) -> EngineResult<Self> {
        Self::new(Arc::new(DuelResolver::default()), workers)
    }

    /// Run `battles` independent trials of one matchup.
    ///
    /// # Errors
    ///
    /// Returns a validation error for zero battles and the resolver's error
    /// if any trial fails.
    pub fn simulate(
        &self,
        matchup: &MatchupProfiles,
        battles: u32,
        run_seed: u64,
        control: &RunControl,
    ) -> EngineResult<SimulationRun> {
        if battles == 0 {
            return Err(EngineError::validation("battles", "must be at least 1"));
        }
        control
            .progress
            .begin(u64::from(battles), "simulating matchup");
        let resolver = &self.resolver;
        let outcomes: Vec<Option<BattleOutcome>> = self.pool.install(|| {
            (0..battles)
                .into_par_iter()
                .map(|trial| {
                    if control.is_cancelled() {
                        return Ok(None);
                    }
                    let mut rng = battle_rng(run_seed, SINGLE_MATCHUP_TAG, trial);
                    let outcome = resolver.resolve(matchup, &mut rng)?;
                    control.progress.advance(1);
                    Ok(Some(outcome))
                })
                .collect::<EngineResult<Vec<_>>>()
        })?;
        let mut tally = BattleTally::default();
        outcomes.iter().flatten().for_each(|outcome| tally.record(outcome));
        let cancelled = tally.battles < u64::from(battles);
        control.progress.set_status(if cancelled { "cancelled" } else { "done" });
        Ok(SimulationRun {
            seed: run_seed,
            statistics: tally.statistics(),
            cancelled,
        })
    }

    /// Run every weapon and enemy pairing named by `request`.
    ///
    /// Combinations run in parallel; each is tallied before the serial
    /// rollup, so the overall figures weight every battle equally. Any
    /// resolver failure aborts the whole matrix.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty or zero-sized request,
    /// `NotFound` for unknown weapons or archetypes and the resolver's error
    /// if any trial fails.
    pub fn simulate_matrix(
        &self,
        config: &TuningConfig,
        request: &MatrixRequest,
        run_seed: u64,
        control: &RunControl,
    ) -> EngineResult<MatrixReport> {
        request.validate()?;
        let combinations = request
            .weapons
            .iter()
            .flat_map(|weapon| request.archetypes.iter().map(move |enemy| (*weapon, enemy)))
            .map(|(weapon, enemy)| {
                let profiles = MatchupProfiles::from_config(
                    config,
                    weapon,
                    enemy,
                    request.player_level,
                    request.enemy_level,
                )?;
                Ok(Combination {
                    weapon,
                    enemy: enemy.clone(),
                    tag: format!("{weapon}/{enemy}"),
                    profiles,
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        control
            .progress
            .begin(request.total_battles(), "simulating weapon x enemy matrix");
        let battles = request.battles_per_combination;
        let tallies: Vec<BattleTally> = self.pool.install(|| {
            combinations
                .par_iter()
                .map(|combo| self.run_combination(combo, battles, run_seed, control))
                .collect::<EngineResult<Vec<_>>>()
        })?;

        let mut overall = BattleTally::default();
        let mut per_weapon: BTreeMap<WeaponType, BattleTally> = BTreeMap::new();
        let mut per_enemy: BTreeMap<String, BattleTally> = BTreeMap::new();
        let mut results = Vec::with_capacity(combinations.len());
        for (combo, tally) in combinations.iter().zip(&tallies) {
            overall = overall.merge(tally);
            let weapon_entry = per_weapon.entry(combo.weapon).or_default();
            *weapon_entry = std::mem::take(weapon_entry).merge(tally);
            let enemy_entry = per_enemy.entry(combo.enemy.clone()).or_default();
            *enemy_entry = std::mem::take(enemy_entry).merge(tally);
            results.push(CombinationResult {
                weapon: combo.weapon,
                enemy: combo.enemy.clone(),
                statistics: tally.statistics(),
            });
        }

        let cancelled = overall.battles < request.total_battles();
        if cancelled {
            log::warn!(
                "matrix run cancelled after {} of {} battles",
                overall.battles,
                request.total_battles()
            );
        }
        control.progress.set_status(if cancelled { "cancelled" } else { "done" });
        Ok(MatrixReport {
            seed: run_seed,
            request: request.clone(),
            overall: overall.statistics(),
            per_weapon: per_weapon
                .into_iter()
                .map(|(weapon, tally)| (weapon, tally.statistics()))
                .collect(),
            per_enemy: per_enemy
                .into_iter()
                .map(|(enemy, tally)| (enemy, tally.statistics()))
                .collect(),
            combinations: results,
            cancelled,
        })
    }

    fn run_combination(
        &self,
        combo: &Combination,
        battles: u32,
        run_seed: u64,
        control: &RunControl,
    ) -> EngineResult<BattleTally> {
        let mut tally = BattleTally::default();
        for trial in 0..battles {
            if control.is_cancelled() {
                break;
            }
            let mut rng = battle_rng(run_seed, &combo.tag, trial);
            let outcome = self.resolver.resolve(&combo.profiles, &mut rng)?;
            tally.record(&outcome);
            control.progress.advance(1);
        }
        Ok(tally)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::stats::{ActionKinds, Side};
    use rand::RngCore;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Player wins whenever the first draw is even.
    struct CoinFlip;

    impl BattleResolver for CoinFlip {
        fn resolve(
            &self,
            _matchup: &MatchupProfiles,
            rng: &mut dyn RngCore,
        ) -> EngineResult<BattleOutcome> {
            let draw = rng.next_u32();
            Ok(BattleOutcome {
                winner: if draw % 2 == 0 { Side::Player } else { Side::Enemy },
                turns: 5 + draw % 10,
                player_damage: 1.0,
                enemy_damage: 1.0,
                actions: ActionKinds::default(),
                lead_changes: 0,
                comeback: false,
                close_call: false,
                timed_out: false,
            })
        }
    }

    /// Fails on the n-th call.
    struct Exploding {
        calls: AtomicU32,
        fail_at: u32,
    }

    impl BattleResolver for Exploding {
        fn resolve(
            &self,
            matchup: &MatchupProfiles,
            rng: &mut dyn RngCore,
        ) -> EngineResult<BattleOutcome> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.fail_at {
                return Err(EngineError::computation("turn resolution exploded"));
            }
            CoinFlip.resolve(matchup, rng)
        }
    }

    /// Cancels the shared token after the first resolved battle.
    struct CancelAfterFirst(RunControl);

    impl BattleResolver for CancelAfterFirst {
        fn resolve(
            &self,
            matchup: &MatchupProfiles,
            rng: &mut dyn RngCore,
        ) -> EngineResult<BattleOutcome> {
            self.0.cancel.cancel();
            CoinFlip.resolve(matchup, rng)
        }
    }

    fn request(config: &TuningConfig, battles: u32) -> MatrixRequest {
        MatrixRequest::full(config, battles, 1, 1)
    }

    #[test]
    fn matrix_rollups_cover_every_battle() {
        let config = TuningConfig::default();
        let simulator = Simulator::new(Arc::new(CoinFlip), 2).expect("pool");
        let report = simulator
            .simulate_matrix(&config, &request(&config, 10), 7, &RunControl::default())
            .expect("matrix");
        assert_eq!(report.combinations.len(), 4 * 5);
        assert_eq!(report.overall.total_battles, 200);
        assert_eq!(report.per_weapon.len(), 4);
        assert_eq!(report.per_enemy.len(), 5);
        assert!(report.per_weapon.values().all(|s| s.total_battles == 50));
        assert!(report.per_enemy.values().all(|s| s.total_battles == 40));
        let wins: u64 = report.combinations.iter().map(|c| c.statistics.player_wins).sum();
        assert_eq!(report.overall.player_wins, wins);
        assert!(!report.cancelled);
    }

    #[test]
    fn seeded_runs_are_reproducible_across_pool_sizes() {
        let config = TuningConfig::default();
        let narrow = Simulator::with_duel_resolver(1).expect("pool");
        let wide = Simulator::with_duel_resolver(4).expect("pool");
        let req = request(&config, 8);
        let a = narrow
            .simulate_matrix(&config, &req, 99, &RunControl::default())
            .expect("matrix");
        let b = wide
            .simulate_matrix(&config, &req, 99, &RunControl::default())
            .expect("matrix");
        assert_eq!(a, b);
    }

    #[test]
    fn resolver_failure_fails_the_whole_matrix() {
        let config = TuningConfig::default();
        let resolver = Exploding {
            calls: AtomicU32::new(0),
            fail_at: 30,
        };
        let simulator = Simulator::new(Arc::new(resolver), 2).expect("pool");
        let err = simulator
            .simulate_matrix(&config, &request(&config, 5), 1, &RunControl::default())
            .expect_err("oracle failure propagates");
        assert!(matches!(err, EngineError::ComputationFailure(_)));
    }

    #[test]
    fn cancellation_returns_partial_tally() {
        let config = TuningConfig::default();
        let control = RunControl::default();
        let simulator =
            Simulator::new(Arc::new(CancelAfterFirst(control.clone())), 1).expect("pool");
        let report = simulator
            .simulate_matrix(&config, &request(&config, 10), 3, &control)
            .expect("partial report");
        assert!(report.cancelled);
        assert!(report.overall.total_battles >= 1);
        assert!(report.overall.total_battles < 200);
        assert_eq!(
            control.progress.snapshot().completed,
            report.overall.total_battles
        );
    }

    #[test]
    fn single_matchup_counts_trials() {
        let config = TuningConfig::default();
        let simulator = Simulator::with_duel_resolver(2).expect("pool");
        let pair = MatchupProfiles::from_config(&config, WeaponType::Sword, "Brute", 1, 1)
            .expect("profiles");
        let control = RunControl::default();
        let run = simulator.simulate(&pair, 64, 5, &control).expect("run");
        assert_eq!(run.statistics.total_battles, 64);
        assert_eq!(control.progress.snapshot().completed, 64);
        assert!((0.0..=100.0).contains(&run.statistics.win_rate));
    }

    #[test]
    fn empty_requests_are_rejected() {
        let config = TuningConfig::default();
        let simulator = Simulator::new(Arc::new(CoinFlip), 1).expect("pool");
        let mut req = request(&config, 0);
        assert!(matches!(
            simulator.simulate_matrix(&config, &req, 1, &RunControl::default()),
            Err(EngineError::Validation { .. })
        ));
        req.battles_per_combination = 3;
        req.archetypes = vec!["Dragon".to_string()];
        assert!(matches!(
            simulator.simulate_matrix(&config, &req, 1, &RunControl::default()),
            Err(EngineError::NotFound { .. })
        ));
    }
}
