//! Operation surface of the engine.
//!
//! A [`TuningSession`] owns the live configuration store, the simulator, the
//! patch directory and the most recent simulation. Every operation returns
//! `Result<T, EngineError>`; callers convert errors into an
//! [`ErrorEnvelope`](crate::error::ErrorEnvelope) at their own boundary.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

use crate::analysis::{
    BalanceAnalysis, BaselineComparison, Snapshot, ValidationReport, analyze, compare, validate,
};
use crate::config::{
    ArchetypeStat, ConfigError, GlobalStat, Preset, TuningConfig, WeaponStat, WeaponType, paths,
};
use crate::constants::{DEFAULT_BATTLES_PER_COMBINATION, DEFAULT_SEED};
use crate::error::{EngineError, EngineResult};
use crate::oracle::{CancelToken, MatrixRequest, ProgressSnapshot, RunControl, Simulator};
use crate::patch::{Patch, PatchDraft, PatchMetadata, PatchStore, TestResultSummary};
use crate::rolls::{Rarity, cascade_upgrade, roll_base_rarity};
use crate::scoring::{QualityScore, TargetBands};
use crate::seed::{RunSeeds, derive_stream_seed};
use crate::store::{ConfigStore, ParameterChange};
use crate::suggest::{TuningSuggestion, suggest};
use crate::sweep::{SensitivityResult, SweepRange, SweepRequest, sweep};
use crate::tuning_loop::{
    LoopDriver, LoopSettings, LoopState, PhaseSnapshot, SmokeReport, run_tuning_loop, smoke_check,
};
use crate::whatif::{Persist, WhatIfRequest, WhatIfResult, what_if};

/// How a session is wired up.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Canonical configuration document; `None` keeps the configuration in
    /// memory only.
    pub config_path: Option<PathBuf>,
    pub patch_dir: PathBuf,
    pub seed: u64,
    /// Worker threads for battle trials; 0 lets rayon decide.
    pub workers: usize,
    pub targets: TargetBands,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            config_path: None,
            patch_dir: PathBuf::from("patches"),
            seed: DEFAULT_SEED,
            workers: 0,
            targets: TargetBands::default(),
        }
    }
}

/// Matrix shape used by [`TuningSession::run_battle_simulation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSettings {
    pub battles_per_combination: u32,
    pub player_level: u32,
    pub enemy_level: u32,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            battles_per_combination: DEFAULT_BATTLES_PER_COMBINATION,
            player_level: 1,
            enemy_level: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RarityDistribution {
    pub samples: u32,
    pub magic_find: f64,
    pub base: BTreeMap<Rarity, u32>,
    pub upgraded: BTreeMap<Rarity, u32>,
    pub promotions: u64,
}

impl RarityDistribution {
    /// Share of `rarity` after upgrades, as a percentage.
    #[must_use]
    pub fn percentage(&self, rarity: Rarity) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        f64::from(self.upgraded.get(&rarity).copied().unwrap_or(0)) * 100.0
            / f64::from(self.samples)
    }
}

#[derive(Debug)]
pub struct TuningSession {
    store: Arc<ConfigStore>,
    config_path: Option<PathBuf>,
    simulator: Simulator,
    targets: TargetBands,
    patches: PatchStore,
    seeds: RunSeeds,
    control: RunControl,
    last: Option<Snapshot>,
    baseline: Option<Snapshot>,
    last_sweep: Option<SensitivityResult>,
}

impl TuningSession {
    /// Open a session, loading (or creating) the configuration document.
    ///
    /// # Errors
    ///
    /// Returns an I/O or validation error for the configuration document, a
    /// validation error for malformed target bands and a computation error if
    /// the worker pool cannot be built.
    pub fn open(options: SessionOptions) -> EngineResult<Self> {
        let store = match &options.config_path {
            Some(path) => ConfigStore::load_or_default(path)?,
            None => ConfigStore::default(),
        };
        Self::with_store(Arc::new(store), options)
    }

    /// Build a session around an existing store.
    ///
    /// # Errors
    ///
    /// Returns a validation error for malformed target bands and a
    /// computation error if the worker pool cannot be built.
    pub fn with_store(store: Arc<ConfigStore>, options: SessionOptions) -> EngineResult<Self> {
        options.targets.validate()?;
        Ok(Self {
            store,
            config_path: options.config_path,
            simulator: Simulator::with_duel_resolver(options.workers)?,
            targets: options.targets,
            patches: PatchStore::new(options.patch_dir),
            seeds: RunSeeds::from_user_seed(options.seed),
            control: RunControl::default(),
            last: None,
            baseline: None,
            last_sweep: None,
        })
    }

    #[must_use]
    pub fn store(&self) -> &Arc<ConfigStore> {
        &self.store
    }

    #[must_use]
    pub const fn targets(&self) -> &TargetBands {
        &self.targets
    }

    #[must_use]
    pub fn progress(&self) -> ProgressSnapshot {
        self.control.progress.snapshot()
    }

    /// Handle that cancels the running operation from another thread.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.control.cancel.clone()
    }

    #[must_use]
    pub const fn last_simulation(&self) -> Option<&Snapshot> {
        self.last.as_ref()
    }

    #[must_use]
    pub const fn baseline(&self) -> Option<&Snapshot> {
        self.baseline.as_ref()
    }

    fn require_simulation(&self) -> EngineResult<&Snapshot> {
        self.last
            .as_ref()
            .ok_or_else(|| EngineError::precondition("no battle simulation has been run yet"))
    }

    fn begin_operation(&self) {
        self.control.cancel.reset();
    }

    /// Simulate every weapon against every archetype on a snapshot of the
    /// live configuration.
    ///
    /// A cancelled run is returned with `cancelled` set but never becomes the
    /// session's latest result.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed request and propagates
    /// simulation failures.
    pub fn run_battle_simulation(
        &mut self,
        settings: SimulationSettings,
    ) -> EngineResult<Snapshot> {
        self.begin_operation();
        let config = self.store.snapshot();
        let request = MatrixRequest::full(
            &config,
            settings.battles_per_combination,
            settings.player_level,
            settings.enemy_level,
        );
        let seed = self.seeds.next_seed();
        let snapshot = Snapshot::evaluate(
            &self.simulator,
            &config,
            &request,
            seed,
            &self.control,
            &self.targets,
        )?;
        if snapshot.report.cancelled {
            log::warn!("simulation cancelled; keeping the previous result");
        } else {
            log::info!(
                "simulated {} battles: win rate {:.1}%, quality {:.1} ({})",
                snapshot.report.overall.total_battles,
                snapshot.report.overall.win_rate,
                snapshot.score.overall,
                snapshot.score.label
            );
            self.last = Some(snapshot.clone());
        }
        Ok(snapshot)
    }

    /// # Errors
    ///
    /// Returns `StatePrecondition` before the first simulation.
    pub fn analyze_battle_results(&self) -> EngineResult<BalanceAnalysis> {
        Ok(analyze(&self.require_simulation()?.report, &self.targets))
    }

    /// # Errors
    ///
    /// Returns `StatePrecondition` before the first simulation.
    pub fn validate_balance(&self) -> EngineResult<ValidationReport> {
        Ok(validate(&self.require_simulation()?.report, &self.targets))
    }

    /// # Errors
    ///
    /// Returns `StatePrecondition` before the first simulation.
    pub fn get_balance_quality_score(&self) -> EngineResult<QualityScore> {
        Ok(self.require_simulation()?.score.clone())
    }

    /// # Errors
    ///
    /// Returns `StatePrecondition` before the first simulation.
    pub fn suggest_tuning(&self) -> EngineResult<Vec<TuningSuggestion>> {
        let last = self.require_simulation()?;
        suggest(&last.report, &last.score, &self.store.snapshot(), &self.targets)
    }

    /// Regenerate suggestions against the live configuration and apply the
    /// one with `id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no live suggestion carries `id`, which is the
    /// case for a suggestion that was already applied.
    pub fn apply_tuning_suggestion(&mut self, id: &str) -> EngineResult<ParameterChange> {
        let suggestion = self
            .suggest_tuning()?
            .into_iter()
            .find(|suggestion| suggestion.id == id)
            .ok_or_else(|| EngineError::not_found("suggestion", id))?;
        let change = self
            .store
            .set_parameter(&suggestion.parameter, suggestion.suggested_value)?;
        log::info!(
            "applied {id}: {} {:.4} -> {:.4}",
            change.parameter,
            change.old_value,
            change.new_value
        );
        Ok(change)
    }

    /// Keep the latest simulation as the comparison baseline.
    ///
    /// # Errors
    ///
    /// Returns `StatePrecondition` before the first simulation.
    pub fn set_baseline(&mut self) -> EngineResult<&Snapshot> {
        let snapshot = self.require_simulation()?.clone();
        Ok(self.baseline.insert(snapshot))
    }

    /// # Errors
    ///
    /// Returns `StatePrecondition` without a baseline or a simulation.
    pub fn compare_with_baseline(&self) -> EngineResult<BaselineComparison> {
        let baseline = self
            .baseline
            .as_ref()
            .ok_or_else(|| EngineError::precondition("no baseline has been set"))?;
        Ok(compare(baseline, self.require_simulation()?))
    }

    /// Sweep `parameter` over `±range_percent` of its current value.
    ///
    /// The live configuration is never modified; see
    /// [`apply_sensitivity_optimal`](Self::apply_sensitivity_optimal).
    ///
    /// # Errors
    ///
    /// Returns `StatePrecondition` before the first simulation, a validation
    /// error for a malformed sweep, and propagates simulation failures.
    pub fn analyze_parameter_sensitivity(
        &mut self,
        parameter: &str,
        range_percent: f64,
        test_points: u32,
        battles_per_point: u32,
    ) -> EngineResult<SensitivityResult> {
        if !(range_percent > 0.0 && range_percent < 100.0) {
            return Err(EngineError::validation(
                "rangePercent",
                "must be between 0 and 100 exclusive",
            ));
        }
        let template = self.require_simulation()?.report.request.clone();
        self.begin_operation();
        let request = SweepRequest {
            parameter: parameter.to_string(),
            range: SweepRange::from_percent(range_percent),
            test_points,
            battles_per_point,
        };
        let seed = self.seeds.next_seed();
        let result = sweep(
            &self.simulator,
            &self.store.snapshot(),
            &template,
            &request,
            seed,
            &self.control,
            &self.targets,
        )?;
        if !result.cancelled {
            self.last_sweep = Some(result.clone());
        }
        Ok(result)
    }

    /// Write the optimum of the last completed sweep. The sweep stays
    /// available when the write is rejected.
    ///
    /// # Errors
    ///
    /// Returns `StatePrecondition` when no sweep has completed.
    pub fn apply_sensitivity_optimal(&mut self) -> EngineResult<ParameterChange> {
        let sweep = self
            .last_sweep
            .as_ref()
            .ok_or_else(|| EngineError::precondition("no sensitivity analysis to apply"))?;
        let change = self.store.set_parameter(&sweep.parameter, sweep.optimal_value)?;
        self.last_sweep = None;
        Ok(change)
    }

    /// Evaluate one candidate value against the baseline, or against the
    /// latest simulation when no baseline is set.
    ///
    /// # Errors
    ///
    /// Returns `StatePrecondition` before the first simulation, a validation
    /// error for a rejected candidate, and propagates simulation failures.
    pub fn test_what_if(&mut self, request: &WhatIfRequest) -> EngineResult<WhatIfResult> {
        let before = self
            .baseline
            .as_ref()
            .or(self.last.as_ref())
            .ok_or_else(|| {
                EngineError::precondition("run a simulation or set a baseline before a what-if")
            })?
            .clone();
        self.begin_operation();
        let mut result = what_if(
            &self.simulator,
            &self.store.snapshot(),
            &before,
            request,
            &self.control,
            &self.targets,
        )?;
        if request.persist == Persist::Keep {
            self.store.set_parameter(&request.parameter, request.candidate)?;
            result.persisted = true;
        }
        Ok(result)
    }

    /// # Errors
    ///
    /// Returns a validation error and leaves the configuration untouched
    /// when the path is unknown or the value is out of range.
    pub fn adjust_parameter(&self, path: &str, value: f64) -> EngineResult<ParameterChange> {
        self.store.set_parameter(path, value)
    }

    /// # Errors
    ///
    /// See [`adjust_parameter`](Self::adjust_parameter).
    pub fn adjust_global_multiplier(
        &self,
        stat: GlobalStat,
        value: f64,
    ) -> EngineResult<ParameterChange> {
        self.adjust_parameter(&paths::global_multiplier(stat), value)
    }

    /// Archetype names match case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown archetype, otherwise see
    /// [`adjust_parameter`](Self::adjust_parameter).
    pub fn adjust_archetype_stat(
        &self,
        archetype: &str,
        stat: ArchetypeStat,
        value: f64,
    ) -> EngineResult<ParameterChange> {
        let config = self.store.snapshot();
        let name = config
            .enemy
            .archetype_key(archetype)
            .ok_or_else(|| EngineError::not_found("archetype", archetype))?;
        self.adjust_parameter(&paths::archetype(name, stat), value)
    }

    /// # Errors
    ///
    /// See [`adjust_parameter`](Self::adjust_parameter).
    pub fn adjust_weapon_scaling(
        &self,
        weapon: WeaponType,
        stat: WeaponStat,
        value: f64,
    ) -> EngineResult<ParameterChange> {
        self.adjust_parameter(&paths::weapon(weapon, stat), value)
    }

    /// # Errors
    ///
    /// See [`adjust_parameter`](Self::adjust_parameter).
    pub fn adjust_drop_rate(&self, value: f64) -> EngineResult<ParameterChange> {
        self.adjust_parameter(paths::DROP_CHANCE, value)
    }

    /// # Errors
    ///
    /// See [`adjust_parameter`](Self::adjust_parameter).
    pub fn adjust_rarity_weight(
        &self,
        rarity: Rarity,
        value: f64,
    ) -> EngineResult<ParameterChange> {
        self.adjust_parameter(&paths::rarity_weight(rarity), value)
    }

    /// Set the upgrade base chance and, optionally, the per-tier decay in one
    /// atomic write.
    ///
    /// # Errors
    ///
    /// Returns a validation error and changes nothing when either value is
    /// rejected.
    pub fn adjust_upgrade_chance(
        &self,
        base_chance: f64,
        decay_per_tier: Option<f64>,
    ) -> EngineResult<Vec<ParameterChange>> {
        self.store.update(|config| {
            let mut changes = vec![ParameterChange {
                parameter: paths::UPGRADE_BASE_CHANCE.to_string(),
                old_value: config.set(paths::UPGRADE_BASE_CHANCE, base_chance)?,
                new_value: base_chance,
            }];
            if let Some(decay) = decay_per_tier {
                changes.push(ParameterChange {
                    parameter: paths::UPGRADE_DECAY.to_string(),
                    old_value: config.set(paths::UPGRADE_DECAY, decay)?,
                    new_value: decay,
                });
            }
            Ok(changes)
        })
    }

    /// Write all four enemy global multipliers from `preset` in one update.
    ///
    /// # Errors
    ///
    /// Returns a validation error and changes nothing if the result does not
    /// validate.
    pub fn apply_preset(&self, preset: Preset) -> EngineResult<Vec<ParameterChange>> {
        let target = preset.multipliers();
        let changes = self.store.update(|config| {
            GlobalStat::ALL
                .iter()
                .map(|&stat| {
                    let parameter = paths::global_multiplier(stat);
                    let new_value = target.get(stat);
                    let old_value = config.set(&parameter, new_value)?;
                    Ok(ParameterChange {
                        parameter,
                        old_value,
                        new_value,
                    })
                })
                .collect::<Result<Vec<_>, ConfigError>>()
        })?;
        log::info!("applied preset {preset}");
        Ok(changes)
    }

    /// Save the live configuration as a named patch, attaching a summary of
    /// the latest simulation when there is one.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank or clashing name and an I/O
    /// error if the patch cannot be written.
    pub fn save_patch(&self, draft: PatchDraft) -> EngineResult<PatchMetadata> {
        let now = Utc::now();
        let test_results = self
            .last
            .as_ref()
            .map(|snapshot| TestResultSummary::from_snapshot(snapshot, now));
        let config = TuningConfig::clone(&self.store.snapshot());
        let patch = Patch::create(draft, config, test_results, now)?;
        self.patches.save(&patch)?;
        Ok(patch.metadata)
    }

    /// Replace the live configuration with the patch named by `key`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown patch and a validation error when
    /// the patch's configuration is out of range.
    pub fn load_patch(&self, key: &str) -> EngineResult<PatchMetadata> {
        let patch = self.patches.get(key)?;
        self.store.replace(patch.config)?;
        log::info!("loaded patch {} ({})", patch.metadata.name, patch.metadata.patch_id);
        Ok(patch.metadata)
    }

    /// # Errors
    ///
    /// Returns an I/O error if the patch directory cannot be read.
    pub fn list_patches(&self) -> EngineResult<Vec<PatchMetadata>> {
        self.patches.list()
    }

    /// # Errors
    ///
    /// Returns `NotFound` for an unknown patch.
    pub fn get_patch_info(&self, key: &str) -> EngineResult<Patch> {
        self.patches.get(key)
    }

    #[must_use]
    pub fn get_current_configuration(&self) -> Arc<TuningConfig> {
        self.store.snapshot()
    }

    /// Write the live configuration to `path`, or to the session's document.
    ///
    /// # Errors
    ///
    /// Returns `StatePrecondition` when neither path is known and an I/O
    /// error if writing fails.
    pub fn save_configuration(&self, path: Option<&Path>) -> EngineResult<PathBuf> {
        let target = path
            .or(self.config_path.as_deref())
            .ok_or_else(|| EngineError::precondition("no configuration path to save to"))?
            .to_path_buf();
        self.store.save_to(&target)?;
        log::info!("saved configuration to {}", target.display());
        Ok(target)
    }

    /// Run the convergence loop against the live configuration.
    ///
    /// # Errors
    ///
    /// Returns an error only for invalid settings or a failed initial
    /// analysis; later failures are recorded in the returned state.
    pub fn run_tuning_loop(
        &mut self,
        settings: &LoopSettings,
        simulation: SimulationSettings,
    ) -> EngineResult<LoopState> {
        let mut driver = SessionDriver {
            session: self,
            simulation,
        };
        run_tuning_loop(&mut driver, settings)
    }

    /// Sample base rarity draws followed by the upgrade cascade.
    ///
    /// # Errors
    ///
    /// Returns a validation error for zero samples or a negative magic find.
    pub fn get_rarity_distribution(
        &self,
        samples: u32,
        magic_find: f64,
        seed: u64,
    ) -> EngineResult<RarityDistribution> {
        if samples == 0 {
            return Err(EngineError::validation("samples", "must be at least 1"));
        }
        if !magic_find.is_finite() || magic_find < 0.0 {
            return Err(EngineError::validation("magicFind", "must be non-negative"));
        }
        let config = self.store.snapshot();
        let mut rng = SmallRng::seed_from_u64(derive_stream_seed(seed, b"rarity"));
        let mut distribution = RarityDistribution {
            samples,
            magic_find,
            base: Rarity::ALL.into_iter().map(|r| (r, 0)).collect(),
            upgraded: Rarity::ALL.into_iter().map(|r| (r, 0)).collect(),
            promotions: 0,
        };
        for _ in 0..samples {
            let base = roll_base_rarity(&mut rng, &config.loot.rarity_weights);
            let upgrade = cascade_upgrade(&mut rng, &config.loot.rarity_upgrade, base, magic_find);
            *distribution.base.entry(base).or_default() += 1;
            *distribution.upgraded.entry(upgrade.rarity).or_default() += 1;
            distribution.promotions += u64::from(upgrade.promotions);
        }
        Ok(distribution)
    }
}

/// Adapts a session to the loop's phase operations.
struct SessionDriver<'a> {
    session: &'a mut TuningSession,
    simulation: SimulationSettings,
}

impl LoopDriver for SessionDriver<'_> {
    fn evaluate(&mut self) -> EngineResult<PhaseSnapshot> {
        let snapshot = self.session.run_battle_simulation(self.simulation)?;
        if snapshot.report.cancelled {
            return Err(EngineError::computation("simulation was cancelled"));
        }
        Ok(PhaseSnapshot {
            validation: validate(&snapshot.report, &self.session.targets),
            suggestions: self.session.suggest_tuning()?,
            statistics: snapshot.report.overall,
            score: snapshot.score,
        })
    }

    fn read_parameter(&self, path: &str) -> EngineResult<f64> {
        Ok(self.session.store.snapshot().get(path)?)
    }

    fn write_parameter(&mut self, path: &str, value: f64) -> EngineResult<ParameterChange> {
        self.session.store.set_parameter(path, value)
    }

    fn smoke_check(&mut self) -> SmokeReport {
        let seed = self.session.seeds.next_seed();
        smoke_check(&self.session.store.snapshot(), seed)
    }

    fn save_patch(&mut self, draft: PatchDraft) -> EngineResult<PatchMetadata> {
        self.session.save_patch(draft)
    }

    fn cancelled(&self) -> bool {
        self.session.control.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn temp_dir(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "dungeon-balance-session-{label}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    fn session(label: &str) -> TuningSession {
        TuningSession::open(SessionOptions {
            patch_dir: temp_dir(label),
            seed: 7,
            workers: 2,
            ..SessionOptions::default()
        })
        .expect("session")
    }

    fn quick() -> SimulationSettings {
        SimulationSettings {
            battles_per_combination: 6,
            ..SimulationSettings::default()
        }
    }

    #[test]
    fn analysis_before_simulation_is_a_precondition_error() {
        let mut session = session("precondition");
        let kinds = [
            session.analyze_battle_results().map(|_| ()).unwrap_err().kind(),
            session.validate_balance().map(|_| ()).unwrap_err().kind(),
            session.get_balance_quality_score().map(|_| ()).unwrap_err().kind(),
            session.suggest_tuning().map(|_| ()).unwrap_err().kind(),
            session.set_baseline().map(|_| ()).unwrap_err().kind(),
            session
                .analyze_parameter_sensitivity(paths::DROP_CHANCE, 20.0, 3, 2)
                .map(|_| ())
                .unwrap_err()
                .kind(),
        ];
        assert!(kinds.iter().all(|kind| *kind == ErrorKind::StatePrecondition));
        let what_if = WhatIfRequest {
            parameter: paths::DROP_CHANCE.to_string(),
            candidate: 0.2,
            battles: 2,
            persist: Persist::Discard,
        };
        assert_eq!(
            session.test_what_if(&what_if).unwrap_err().kind(),
            ErrorKind::StatePrecondition
        );
    }

    #[test]
    fn simulation_feeds_scoring_and_analysis() {
        let mut session = session("flow");
        let snapshot = session.run_battle_simulation(quick()).expect("simulate");
        assert_eq!(snapshot.report.overall.total_battles, 4 * 5 * 6);
        let score = session.get_balance_quality_score().expect("score");
        assert_eq!(score, snapshot.score);
        let analysis = session.analyze_battle_results().expect("analysis");
        assert_eq!(analysis.matchups.len(), 20);
        let report = session.validate_balance().expect("validate");
        assert_eq!(report.total_checks, 6);
    }

    #[test]
    fn applying_a_suggestion_twice_is_not_found() {
        let mut session = session("apply");
        session
            .adjust_global_multiplier(GlobalStat::Health, 0.2)
            .expect("make enemies fragile");
        session.run_battle_simulation(quick()).expect("simulate");
        let suggestions = session.suggest_tuning().expect("suggest");
        let first = suggestions.first().expect("deviations produce suggestions");
        let change = session.apply_tuning_suggestion(&first.id).expect("apply");
        assert_eq!(change.parameter, first.parameter);
        let live = session.get_current_configuration().get(&first.parameter).expect("get");
        assert!((live - first.suggested_value).abs() < f64::EPSILON);
        let err = session.apply_tuning_suggestion(&first.id).expect_err("stale id");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn failed_adjustments_leave_configuration_unchanged() {
        let session = session("atomic");
        let before = session.get_current_configuration();
        let err = session
            .adjust_upgrade_chance(0.2, Some(1.5))
            .expect_err("decay above 1");
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(*session.get_current_configuration(), *before);
        let err = session
            .adjust_archetype_stat("Dragon", ArchetypeStat::Health, 2.0)
            .expect_err("unknown archetype");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let change = session
            .adjust_archetype_stat("brute", ArchetypeStat::Health, 2.0)
            .expect("case-insensitive archetype");
        assert_eq!(change.parameter, "enemy.archetypes.Brute.health");
    }

    #[test]
    fn malformed_targets_are_rejected_on_open() {
        let mut targets = TargetBands::default();
        targets.weights.win_rate = 2.0;
        let err = TuningSession::open(SessionOptions {
            patch_dir: temp_dir("bad-targets"),
            targets,
            ..SessionOptions::default()
        })
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn presets_write_every_global_multiplier() {
        let session = session("presets");
        let expected = [
            (Preset::AggressiveEnemies, [1.2, 1.2, 1.0, 1.0]),
            (Preset::TankyEnemies, [1.5, 0.9, 1.3, 1.0]),
            (Preset::FastEnemies, [0.9, 1.0, 1.0, 1.3]),
            (Preset::Baseline, [1.0, 1.0, 1.0, 1.0]),
        ];
        for (preset, values) in expected {
            let changes = session.apply_preset(preset).expect("preset");
            assert_eq!(changes.len(), 4);
            let config = session.get_current_configuration();
            for (stat, value) in GlobalStat::ALL.iter().copied().zip(values) {
                let live = config.get(&paths::global_multiplier(stat)).expect("get");
                assert!((live - value).abs() < f64::EPSILON, "{preset} {stat}");
            }
        }
    }

    #[test]
    fn preset_changes_report_previous_values() {
        let session = session("preset-changes");
        session.adjust_global_multiplier(GlobalStat::Speed, 2.0).expect("adjust");
        let changes = session.apply_preset(Preset::Baseline).expect("preset");
        let speed = changes
            .iter()
            .find(|c| c.parameter == "enemy.globalMultipliers.speed")
            .expect("speed change");
        assert!((speed.old_value - 2.0).abs() < f64::EPSILON);
        assert!((speed.new_value - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_preset_is_a_validation_error() {
        let err: EngineError = "nightmare".parse::<Preset>().unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn what_if_discards_unless_kept() {
        let mut session = session("whatif");
        session.run_battle_simulation(quick()).expect("simulate");
        let path = paths::weapon(WeaponType::Mace, WeaponStat::Damage);
        let original = session.get_current_configuration().get(&path).expect("get");
        let mut request = WhatIfRequest {
            parameter: path.clone(),
            candidate: original * 1.5,
            battles: 4,
            persist: Persist::Discard,
        };
        let result = session.test_what_if(&request).expect("discard");
        assert!(!result.persisted);
        let live = session.get_current_configuration().get(&path).expect("get");
        assert!((live - original).abs() < f64::EPSILON);

        request.persist = Persist::Keep;
        let result = session.test_what_if(&request).expect("keep");
        assert!(result.persisted);
        let kept = session.get_current_configuration().get(&path).expect("get");
        assert!((kept - original * 1.5).abs() < 1e-12);
    }

    #[test]
    fn sensitivity_is_non_destructive_until_applied() {
        let mut session = session("sweep");
        session.run_battle_simulation(quick()).expect("simulate");
        let before = session.get_current_configuration();
        let result = session
            .analyze_parameter_sensitivity(paths::WEAPON_GLOBAL_DAMAGE, 30.0, 3, 2)
            .expect("sweep");
        assert_eq!(result.points.len(), 3);
        assert_eq!(*session.get_current_configuration(), *before);
        let change = session.apply_sensitivity_optimal().expect("apply optimal");
        assert!((change.new_value - result.optimal_value).abs() < f64::EPSILON);
        assert_eq!(
            session.apply_sensitivity_optimal().unwrap_err().kind(),
            ErrorKind::StatePrecondition
        );
    }

    #[test]
    fn rejected_optimum_keeps_the_sweep() {
        let mut session = session("sweep-retained");
        session.run_battle_simulation(quick()).expect("simulate");
        session
            .analyze_parameter_sensitivity(paths::WEAPON_GLOBAL_DAMAGE, 30.0, 3, 2)
            .expect("sweep");
        let valid = session.last_sweep.as_ref().expect("cached").optimal_value;
        if let Some(sweep) = session.last_sweep.as_mut() {
            sweep.optimal_value = -1.0;
        }
        let err = session.apply_sensitivity_optimal().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(session.last_sweep.is_some());

        if let Some(sweep) = session.last_sweep.as_mut() {
            sweep.optimal_value = valid;
        }
        let change = session.apply_sensitivity_optimal().expect("apply");
        assert!((change.new_value - valid).abs() < f64::EPSILON);
        assert!(session.last_sweep.is_none());
    }

    #[test]
    fn patches_round_trip_through_the_session() {
        let mut session = session("patches");
        session.run_battle_simulation(quick()).expect("simulate");
        session.adjust_drop_rate(0.3).expect("adjust");
        let metadata = session
            .save_patch(PatchDraft {
                name: "Generous Loot".to_string(),
                author: "tester".to_string(),
                description: "more drops".to_string(),
                version: "1.0".to_string(),
                tags: Vec::new(),
            })
            .expect("save");
        assert!(metadata.test_results.is_some());
        session.adjust_drop_rate(0.1).expect("adjust again");
        session.load_patch("generous loot").expect("load by name");
        let live = session.get_current_configuration().get(paths::DROP_CHANCE).expect("get");
        assert!((live - 0.3).abs() < f64::EPSILON);
        assert_eq!(session.list_patches().expect("list").len(), 1);
        assert_eq!(
            session.get_patch_info("missing").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn baseline_comparison_needs_a_baseline() {
        let mut session = session("baseline");
        session.run_battle_simulation(quick()).expect("simulate");
        assert_eq!(
            session.compare_with_baseline().unwrap_err().kind(),
            ErrorKind::StatePrecondition
        );
        session.set_baseline().expect("baseline");
        session.run_battle_simulation(quick()).expect("simulate again");
        let comparison = session.compare_with_baseline().expect("compare");
        let baseline = session.baseline().expect("kept");
        assert!(
            (comparison.baseline_win_rate - baseline.report.overall.win_rate).abs()
                < f64::EPSILON
        );
        assert!(
            (comparison.win_rate_change
                - (comparison.current_win_rate - comparison.baseline_win_rate))
                .abs()
                < 1e-9
        );
    }

    #[test]
    fn rarity_distribution_counts_every_sample() {
        let session = session("rarity");
        let distribution = session.get_rarity_distribution(500, 0.0, 3).expect("distribution");
        assert_eq!(distribution.base.values().sum::<u32>(), 500);
        assert_eq!(distribution.upgraded.values().sum::<u32>(), 500);
        let total: f64 = Rarity::ALL.iter().map(|r| distribution.percentage(*r)).sum();
        assert!((total - 100.0).abs() < 1e-9);
        assert!(session.get_rarity_distribution(0, 0.0, 3).is_err());
    }

    #[test]
    fn tuning_loop_runs_end_to_end() {
        let mut session = session("loop");
        let settings = LoopSettings {
            max_iterations: 2,
            ..LoopSettings::default()
        };
        let state = session.run_tuning_loop(&settings, quick()).expect("loop");
        assert!(state.analysis.is_some());
        assert!(state.iterations.len() <= 2);
        assert!(matches!(
            state.phase,
            crate::tuning_loop::LoopPhase::Complete | crate::tuning_loop::LoopPhase::Failed
        ));
        if state.success {
            assert!(state.saved_patch.is_some());
            assert_eq!(session.list_patches().expect("list").len(), 1);
        }
    }
}
