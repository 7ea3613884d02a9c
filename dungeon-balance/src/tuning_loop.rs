//! Multi-phase convergence loop.
//!
//! `Init -> Analysis -> (Tuning -> Testing)* -> Gameplay -> Saving -> Complete`
//! with `Failed` reachable from every phase. Phases hand each other
//! structured statistics and scores; a failing phase is recorded in the
//! [`LoopState`] next to everything gathered before it.
use std::fmt;

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

use crate::analysis::ValidationReport;
use crate::config::{ArchetypeStat, GlobalStat, TuningConfig, paths};
use crate::constants::{
    DEFAULT_MAX_ITERATIONS, DEFAULT_TARGET_WIN_RATE, DEFAULT_TOLERANCE, LOOP_PATCH_AUTHOR,
    LOOP_PATCH_TAGS, SMOKE_CHECK_ACTIONS, TURN_CAP,
};
use crate::error::{EngineError, EngineResult};
use crate::oracle::{AggregateStatistics, Duel, MatchupProfiles};
use crate::patch::{PatchDraft, PatchMetadata};
use crate::rolls::{cascade_upgrade, roll_base_rarity, roll_modification};
use crate::scoring::{Axis, AxisStatus, QualityScore};
use crate::store::ParameterChange;
use crate::suggest::TuningSuggestion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopPhase {
    Init,
    Analysis,
    Tuning,
    Testing,
    Gameplay,
    Saving,
    Complete,
    Failed,
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Analysis => "analysis",
            Self::Tuning => "tuning",
            Self::Testing => "testing",
            Self::Gameplay => "gameplay",
            Self::Saving => "saving",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Structured result of one full-matrix evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSnapshot {
    pub statistics: AggregateStatistics,
    pub score: QualityScore,
    pub validation: ValidationReport,
    pub suggestions: Vec<TuningSuggestion>,
}

impl PhaseSnapshot {
    #[must_use]
    pub const fn win_rate(&self) -> f64 {
        self.statistics.win_rate
    }
}

/// Kind of gap the fallback table can close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviationCategory {
    WinRateHigh,
    WinRateLow,
    DurationLong,
    DurationShort,
    EnemiesTooSimilar,
}

impl DeviationCategory {
    /// Category of the gap between `win_rate` and the loop target, if any.
    #[must_use]
    pub fn for_win_rate(win_rate: f64, target: f64, tolerance: f64) -> Option<Self> {
        if win_rate > target + tolerance {
            Some(Self::WinRateHigh)
        } else if win_rate < target - tolerance {
            Some(Self::WinRateLow)
        } else {
            None
        }
    }

    const fn matches(self, axis: Axis, status: AxisStatus) -> bool {
        matches!(
            (self, axis, status),
            (Self::WinRateHigh, Axis::WinRate, AxisStatus::TooHigh)
                | (Self::WinRateLow, Axis::WinRate, AxisStatus::TooLow)
                | (Self::DurationLong, Axis::Duration, AxisStatus::TooHigh)
                | (Self::DurationShort, Axis::Duration, AxisStatus::TooLow)
                | (Self::EnemiesTooSimilar, Axis::EnemyVariance, AxisStatus::TooLow)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackRule {
    pub category: DeviationCategory,
    pub parameter: String,
    pub factor: f64,
}

/// Multiplicative nudges used when no live suggestion covers a deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackRules(pub Vec<FallbackRule>);

impl Default for FallbackRules {
    fn default() -> Self {
        let rule = |category, parameter: String, factor| FallbackRule {
            category,
            parameter,
            factor,
        };
        Self(vec![
            rule(
                DeviationCategory::WinRateHigh,
                paths::global_multiplier(GlobalStat::Health),
                1.05,
            ),
            rule(
                DeviationCategory::WinRateLow,
                paths::global_multiplier(GlobalStat::Damage),
                0.95,
            ),
            rule(
                DeviationCategory::DurationLong,
                paths::WEAPON_GLOBAL_DAMAGE.to_string(),
                1.05,
            ),
            rule(
                DeviationCategory::DurationShort,
                paths::WEAPON_GLOBAL_DAMAGE.to_string(),
                0.95,
            ),
            rule(
                DeviationCategory::EnemiesTooSimilar,
                paths::archetype("Assassin", ArchetypeStat::Agility),
                1.05,
            ),
        ])
    }
}

impl FallbackRules {
    #[must_use]
    pub fn rule(&self, category: DeviationCategory) -> Option<&FallbackRule> {
        self.0.iter().find(|rule| rule.category == category)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopSettings {
    #[serde(default = "LoopSettings::default_target_win_rate")]
    pub target_win_rate: f64,
    #[serde(default = "LoopSettings::default_tolerance")]
    pub tolerance: f64,
    #[serde(default = "LoopSettings::default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub fallback: FallbackRules,
}

impl LoopSettings {
    const fn default_target_win_rate() -> f64 {
        DEFAULT_TARGET_WIN_RATE
    }

    const fn default_tolerance() -> f64 {
        DEFAULT_TOLERANCE
    }

    const fn default_max_iterations() -> u32 {
        DEFAULT_MAX_ITERATIONS
    }

    fn validate(&self) -> EngineResult<()> {
        if !(0.0..=100.0).contains(&self.target_win_rate) {
            return Err(EngineError::validation(
                "targetWinRate",
                "must be a percentage between 0 and 100",
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(EngineError::validation("tolerance", "must be non-negative"));
        }
        if self.max_iterations == 0 {
            return Err(EngineError::validation("maxIterations", "must be at least 1"));
        }
        Ok(())
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            target_win_rate: Self::default_target_win_rate(),
            tolerance: Self::default_tolerance(),
            max_iterations: Self::default_max_iterations(),
            fallback: FallbackRules::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ActionSource {
    Suggestion { id: String },
    Fallback { category: DeviationCategory },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningAction {
    pub source: ActionSource,
    pub change: ParameterChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationRecord {
    pub iteration: u32,
    pub action: Option<TuningAction>,
    pub testing: Option<PhaseSnapshot>,
    pub within_tolerance: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmokeStep {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

/// Outcome of the gameplay smoke check; every step is kept, failed or not.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmokeReport {
    pub steps: Vec<SmokeStep>,
}

impl SmokeReport {
    pub fn record(&mut self, name: impl Into<String>, passed: bool, detail: impl Into<String>) {
        self.steps.push(SmokeStep {
            name: name.into(),
            passed,
            detail: detail.into(),
        });
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|step| step.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &SmokeStep> {
        self.steps.iter().filter(|step| !step.passed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseFailure {
    pub phase: LoopPhase,
    pub message: String,
}

/// Read-only record of a loop run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopState {
    pub phase: LoopPhase,
    pub iteration: u32,
    pub max_iterations: u32,
    pub target_win_rate: f64,
    pub tolerance: f64,
    pub analysis: Option<PhaseSnapshot>,
    pub iterations: Vec<IterationRecord>,
    pub gameplay: Option<SmokeReport>,
    pub saved_patch: Option<PatchMetadata>,
    pub converged: bool,
    pub success: bool,
    pub failure: Option<PhaseFailure>,
    pub log: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl LoopState {
    fn new(settings: &LoopSettings, started_at: DateTime<Utc>) -> Self {
        Self {
            phase: LoopPhase::Init,
            iteration: 0,
            max_iterations: settings.max_iterations,
            target_win_rate: settings.target_win_rate,
            tolerance: settings.tolerance,
            analysis: None,
            iterations: Vec::new(),
            gameplay: None,
            saved_patch: None,
            converged: false,
            success: false,
            failure: None,
            log: Vec::new(),
            started_at,
            finished_at: None,
        }
    }

    fn enter(&mut self, phase: LoopPhase) {
        self.phase = phase;
        self.note(format!("entering {phase}"));
    }

    fn note(&mut self, line: impl Into<String>) {
        let line = line.into();
        log::info!("tuning loop: {line}");
        self.log.push(line);
    }

    fn fail(mut self, message: impl Into<String>) -> Self {
        let message = message.into();
        let phase = self.phase;
        log::warn!("tuning loop failed during {phase}: {message}");
        self.log.push(format!("failed during {phase}: {message}"));
        self.failure = Some(PhaseFailure { phase, message });
        self.phase = LoopPhase::Failed;
        self.success = false;
        self.finished_at = Some(Utc::now());
        self
    }

    /// Win rate measured by the latest completed phase.
    #[must_use]
    pub fn latest_win_rate(&self) -> Option<f64> {
        self.iterations
            .iter()
            .rev()
            .find_map(|record| record.testing.as_ref())
            .or(self.analysis.as_ref())
            .map(PhaseSnapshot::win_rate)
    }
}

/// Operations the loop needs from its host session.
pub trait LoopDriver {
    /// Simulate the full matrix against the live configuration and score,
    /// validate and generate suggestions for it.
    ///
    /// # Errors
    ///
    /// Returns the simulation failure.
    fn evaluate(&mut self) -> EngineResult<PhaseSnapshot>;

    /// # Errors
    ///
    /// Returns a validation error for an unknown path.
    fn read_parameter(&self, path: &str) -> EngineResult<f64>;

    /// # Errors
    ///
    /// Returns a validation error and leaves the configuration untouched
    /// when the value is rejected.
    fn write_parameter(&mut self, path: &str, value: f64) -> EngineResult<ParameterChange>;

    fn smoke_check(&mut self) -> SmokeReport;

    /// # Errors
    ///
    /// Returns the patch store failure.
    fn save_patch(&mut self, draft: PatchDraft) -> EngineResult<PatchMetadata>;

    fn cancelled(&self) -> bool {
        false
    }
}

fn choose_action(
    driver: &mut dyn LoopDriver,
    latest: &PhaseSnapshot,
    category: DeviationCategory,
    fallback: &FallbackRules,
) -> EngineResult<TuningAction> {
    if let Some(suggestion) = latest
        .suggestions
        .iter()
        .find(|s| category.matches(s.category, s.status))
    {
        let change = driver.write_parameter(&suggestion.parameter, suggestion.suggested_value)?;
        return Ok(TuningAction {
            source: ActionSource::Suggestion {
                id: suggestion.id.clone(),
            },
            change,
        });
    }
    let rule = fallback.rule(category).ok_or_else(|| {
        EngineError::not_found("fallback rule", format!("{category:?}"))
    })?;
    let current = driver.read_parameter(&rule.parameter)?;
    let change = driver.write_parameter(&rule.parameter, current * rule.factor)?;
    Ok(TuningAction {
        source: ActionSource::Fallback { category },
        change,
    })
}

/// Drive the loop to completion or failure.
///
/// # Errors
///
/// Returns an error only for invalid settings or when the initial analysis
/// fails, since no partial state exists at that point. Later failures are
/// reported through [`LoopState::failure`].
pub fn run_tuning_loop(
    driver: &mut dyn LoopDriver,
    settings: &LoopSettings,
) -> EngineResult<LoopState> {
    settings.validate()?;
    let mut state = LoopState::new(settings, Utc::now());
    state.note(format!(
        "target win rate {:.1}% +/- {:.1}, up to {} iterations",
        settings.target_win_rate, settings.tolerance, settings.max_iterations
    ));

    state.enter(LoopPhase::Analysis);
    let analysis = driver.evaluate()?;
    state.note(format!(
        "analysis: win rate {:.1}%, quality {:.1} ({})",
        analysis.win_rate(),
        analysis.score.overall,
        analysis.score.label
    ));
    let mut latest = analysis.clone();
    state.analysis = Some(analysis);
    state.converged = DeviationCategory::for_win_rate(
        latest.win_rate(),
        settings.target_win_rate,
        settings.tolerance,
    )
    .is_none();

    for iteration in 1..=settings.max_iterations {
        if state.converged {
            break;
        }
        if driver.cancelled() {
            return Ok(state.fail("cancelled"));
        }
        let Some(category) = DeviationCategory::for_win_rate(
            latest.win_rate(),
            settings.target_win_rate,
            settings.tolerance,
        ) else {
            break;
        };
        state.iteration = iteration;
        state.enter(LoopPhase::Tuning);
        let action = match choose_action(driver, &latest, category, &settings.fallback) {
            Ok(action) => action,
            Err(err) => return Ok(state.fail(err.to_string())),
        };
        state.note(format!(
            "iteration {iteration}: {} {:.4} -> {:.4}",
            action.change.parameter, action.change.old_value, action.change.new_value
        ));
        state.iterations.push(IterationRecord {
            iteration,
            action: Some(action),
            testing: None,
            within_tolerance: false,
        });

        state.enter(LoopPhase::Testing);
        let testing = match driver.evaluate() {
            Ok(snapshot) => snapshot,
            Err(err) => return Ok(state.fail(err.to_string())),
        };
        let within = (testing.win_rate() - settings.target_win_rate).abs() <= settings.tolerance;
        state.note(format!(
            "iteration {iteration}: win rate {:.1}%, quality {:.1}{}",
            testing.win_rate(),
            testing.score.overall,
            if within { ", target reached" } else { "" }
        ));
        if let Some(record) = state.iterations.last_mut() {
            record.testing = Some(testing.clone());
            record.within_tolerance = within;
        }
        latest = testing;
        if within {
            state.converged = true;
        }
    }

    state.enter(LoopPhase::Gameplay);
    let smoke = driver.smoke_check();
    let smoke_passed = smoke.passed();
    let failures: Vec<String> = smoke
        .failures()
        .map(|step| format!("{}: {}", step.name, step.detail))
        .collect();
    state.gameplay = Some(smoke);
    if !smoke_passed {
        let detail = if failures.is_empty() {
            "no smoke steps ran".to_string()
        } else {
            failures.join("; ")
        };
        return Ok(state.fail(format!("smoke check failed: {detail}")));
    }

    state.enter(LoopPhase::Saving);
    let stamp = Utc::now();
    let draft = PatchDraft {
        name: format!("AutoTuned_{}", stamp.format("%Y%m%d_%H%M%S")),
        author: LOOP_PATCH_AUTHOR.to_string(),
        description: format!(
            "Automated balance tuning cycle - target {:.1}% win rate, {} iterations",
            settings.target_win_rate, state.iteration
        ),
        version: format!("1.{}", state.iteration),
        tags: LOOP_PATCH_TAGS.iter().map(ToString::to_string).collect(),
    };
    match driver.save_patch(draft) {
        Ok(metadata) => {
            state.note(format!("saved patch {}", metadata.name));
            state.saved_patch = Some(metadata);
        }
        Err(err) => return Ok(state.fail(err.to_string())),
    }

    state.enter(LoopPhase::Complete);
    state.success = true;
    state.finished_at = Some(Utc::now());
    Ok(state)
}

/// Play a few turns of every weapon against one archetype and exercise the
/// loot rolls, recording each step.
#[must_use]
pub fn smoke_check(config: &TuningConfig, seed: u64) -> SmokeReport {
    let mut report = SmokeReport::default();
    let mut rng = SmallRng::seed_from_u64(seed);
    let Some(archetype) = config.enemy.archetypes.keys().next() else {
        report.record("archetypes", false, "no enemy archetypes configured");
        return report;
    };
    for weapon in config.weapons.types.keys() {
        let name = format!("{weapon} vs {archetype}");
        let matchup = match MatchupProfiles::from_config(config, *weapon, archetype, 1, 1) {
            Ok(matchup) => matchup,
            Err(err) => {
                report.record(name, false, err.to_string());
                continue;
            }
        };
        let mut duel = match Duel::new(&matchup, TURN_CAP) {
            Ok(duel) => duel,
            Err(err) => {
                report.record(name, false, err.to_string());
                continue;
            }
        };
        let mut finished = false;
        for _ in 0..SMOKE_CHECK_ACTIONS {
            if duel.step(&mut rng).is_some() {
                finished = true;
                break;
            }
        }
        let (player, enemy) = duel.health_fractions();
        let sane = player.is_finite() && enemy.is_finite();
        let detail = format!(
            "{} turns, player {:.0}% enemy {:.0}%{}",
            duel.turn(),
            player * 100.0,
            enemy * 100.0,
            if finished { ", battle over" } else { "" }
        );
        report.record(name, sane, detail);
    }

    let base = roll_base_rarity(&mut rng, &config.loot.rarity_weights);
    let upgraded = cascade_upgrade(&mut rng, &config.loot.rarity_upgrade, base, 0.0);
    report.record(
        "loot roll",
        upgraded.rarity >= base,
        format!("{base} -> {}", upgraded.rarity),
    );
    let mods = roll_modification(&mut rng, &config.modifications, 1, 0);
    report.record(
        "modification roll",
        !mods.is_empty(),
        mods.iter().map(|m| m.name).collect::<Vec<_>>().join(", "),
    );
    report
}
