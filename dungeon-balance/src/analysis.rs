//! Hard-constraint validation, per-matchup analysis and baseline comparison
//! over a finished matrix run.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{TuningConfig, WeaponType};
use crate::error::EngineResult;
use crate::numbers::u64_to_f64;
use crate::oracle::{AggregateStatistics, MatrixReport, MatrixRequest, RunControl, Simulator};
use crate::scoring::{
    AxisStatus, BalanceMetrics, QualityLabel, QualityScore, TargetBands, score,
};

/// Matchups below this player win rate are critical regardless of the band.
const CRITICAL_WIN_RATE_FLOOR: f64 = 80.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub total_checks: u32,
    pub passed_checks: u32,
}

impl ValidationReport {
    fn check(&mut self, passed: bool) {
        self.total_checks += 1;
        self.passed_checks += u32::from(passed);
    }

    fn fail(&mut self, message: String) {
        self.valid = false;
        self.errors.push(message);
    }
}

/// Run the fixed set of balance checks against a matrix report.
#[must_use]
pub fn validate(report: &MatrixReport, targets: &TargetBands) -> ValidationReport {
    let mut out = ValidationReport {
        valid: true,
        ..ValidationReport::default()
    };
    let metrics = BalanceMetrics::from_report(report);
    let total = report.combinations.len();

    let off_rate: Vec<String> = report
        .combinations
        .iter()
        .filter(|c| !targets.win_rate.contains(c.statistics.win_rate))
        .map(|c| format!("{:.1}%", c.statistics.win_rate))
        .collect();
    out.check(off_rate.is_empty());
    if !off_rate.is_empty() {
        out.warnings.push(format!(
            "{}/{total} matchups have win rates outside target range ({}%)",
            off_rate.len(),
            targets.win_rate
        ));
        out.warnings
            .push(format!("Out of range: {}", off_rate.join(", ")));
    }

    let off_duration = report
        .combinations
        .iter()
        .filter(|c| !targets.duration.contains(c.statistics.average_turns))
        .count();
    out.check(off_duration == 0);
    if off_duration > 0 {
        out.warnings.push(format!(
            "{off_duration}/{total} matchups have combat duration outside target range ({} turns)",
            targets.duration
        ));
    }

    let soft_limit = targets.weapon_variance.max.map(|max| max / 2.0);
    match targets.weapon_variance.classify(metrics.weapon_spread) {
        AxisStatus::InRange => match soft_limit {
            Some(soft) if metrics.weapon_spread > soft => {
                out.check(false);
                out.warnings.push(format!(
                    "Weapon balance variance: {:.1}% (target: <{soft:.1}%)",
                    metrics.weapon_spread
                ));
            }
            _ => out.check(true),
        },
        _ => {
            out.check(false);
            out.fail(format!(
                "Weapon balance variance too high: {:.1}% difference between best and worst weapon",
                metrics.weapon_spread
            ));
        }
    }

    let enemy_ok = targets.enemy_variance.contains(metrics.enemy_spread);
    out.check(enemy_ok);
    if !enemy_ok {
        out.warnings.push(format!(
            "Enemies feel too similar: only {:.1}% win rate variance (target: {})",
            metrics.enemy_spread, targets.enemy_variance
        ));
    }

    let overall_ok = targets.win_rate.contains(metrics.win_rate);
    out.check(overall_ok);
    if !overall_ok {
        out.fail(format!(
            "Overall win rate {:.1}% is outside target range ({}%)",
            metrics.win_rate, targets.win_rate
        ));
    }

    let critical: Vec<String> = report
        .combinations
        .iter()
        .filter(|c| {
            c.statistics.win_rate < CRITICAL_WIN_RATE_FLOOR
                || targets.win_rate.classify(c.statistics.win_rate) == AxisStatus::TooHigh
        })
        .map(|c| {
            format!(
                "  {} vs {}: {:.1}% win rate",
                c.weapon, c.enemy, c.statistics.win_rate
            )
        })
        .collect();
    out.check(critical.is_empty());
    if !critical.is_empty() {
        out.fail(format!("{} critical matchup(s) detected:", critical.len()));
        out.errors.extend(critical);
    }

    if report.cancelled {
        out.warnings
            .push("Simulation was cancelled; results cover a partial matrix".to_string());
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchupStatus {
    Good,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchupAnalysis {
    pub weapon: WeaponType,
    pub enemy: String,
    pub win_rate: f64,
    pub average_turns: f64,
    pub status: MatchupStatus,
    pub issues: Vec<String>,
}

/// Lead changes, comebacks and close calls per battle for one group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementSummary {
    pub action_variety: f64,
    pub lead_changes_per_battle: f64,
    pub comeback_rate: f64,
    pub close_call_rate: f64,
}

impl EngagementSummary {
    #[must_use]
    pub fn from_statistics(statistics: &AggregateStatistics) -> Self {
        let battles = u64_to_f64(statistics.total_battles.max(1));
        Self {
            action_variety: statistics.action_variety,
            lead_changes_per_battle: u64_to_f64(statistics.lead_changes) / battles,
            comeback_rate: u64_to_f64(statistics.comebacks) / battles * 100.0,
            close_call_rate: u64_to_f64(statistics.close_calls) / battles * 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceAnalysis {
    pub metrics: BalanceMetrics,
    pub matchups: Vec<MatchupAnalysis>,
    pub strongest_weapon: Option<WeaponType>,
    pub weakest_weapon: Option<WeaponType>,
    pub hardest_enemy: Option<String>,
    pub easiest_enemy: Option<String>,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub engagement: EngagementSummary,
    pub weapon_engagement: BTreeMap<WeaponType, EngagementSummary>,
}

fn ranked<K: Clone>(groups: &BTreeMap<K, AggregateStatistics>) -> Vec<(K, f64)> {
    let mut out: Vec<(K, f64)> = groups
        .iter()
        .map(|(key, stats)| (key.clone(), stats.win_rate))
        .collect();
    out.sort_by(|a, b| b.1.total_cmp(&a.1));
    out
}

fn analyze_matchup(
    weapon: WeaponType,
    enemy: &str,
    statistics: &AggregateStatistics,
    targets: &TargetBands,
) -> MatchupAnalysis {
    let win_rate = statistics.win_rate;
    let turns = statistics.average_turns;
    let mut issues = Vec::new();
    let mut status = MatchupStatus::Good;
    if win_rate < CRITICAL_WIN_RATE_FLOOR {
        status = MatchupStatus::Critical;
        issues.push(format!(
            "Win rate {win_rate:.1}% is critically low (<{CRITICAL_WIN_RATE_FLOOR}%)"
        ));
    } else {
        match targets.win_rate.classify(win_rate) {
            AxisStatus::TooLow => {
                status = MatchupStatus::Warning;
                issues.push(format!(
                    "Win rate {win_rate:.1}% is below target ({}%)",
                    targets.win_rate
                ));
            }
            AxisStatus::TooHigh => {
                status = MatchupStatus::Warning;
                issues.push(format!(
                    "Win rate {win_rate:.1}% is above target ({}%), enemy too easy",
                    targets.win_rate
                ));
            }
            AxisStatus::InRange => {}
        }
    }
    match targets.duration.classify(turns) {
        AxisStatus::TooLow => issues.push(format!(
            "Combat too short: {turns:.1} turns (target: {})",
            targets.duration
        )),
        AxisStatus::TooHigh => issues.push(format!(
            "Combat too long: {turns:.1} turns (target: {})",
            targets.duration
        )),
        AxisStatus::InRange => {}
    }
    if status == MatchupStatus::Good && !issues.is_empty() {
        status = MatchupStatus::Warning;
    }
    MatchupAnalysis {
        weapon,
        enemy: enemy.to_string(),
        win_rate,
        average_turns: turns,
        status,
        issues,
    }
}

/// Break a matrix report down into matchup findings and group extremes.
#[must_use]
pub fn analyze(report: &MatrixReport, targets: &TargetBands) -> BalanceAnalysis {
    let metrics = BalanceMetrics::from_report(report);
    let matchups: Vec<MatchupAnalysis> = report
        .combinations
        .iter()
        .map(|c| analyze_matchup(c.weapon, &c.enemy, &c.statistics, targets))
        .collect();

    let weapons = ranked(&report.per_weapon);
    let enemies = ranked(&report.per_enemy);
    let strongest_weapon = weapons.first().map(|(w, _)| *w);
    let weakest_weapon = weapons.last().map(|(w, _)| *w);
    let easiest_enemy = enemies.first().map(|(e, _)| e.clone());
    let hardest_enemy = enemies.last().map(|(e, _)| e.clone());

    let mut issues: Vec<String> = matchups
        .iter()
        .filter(|m| m.status != MatchupStatus::Good)
        .flat_map(|m| {
            m.issues
                .iter()
                .map(move |issue| format!("{} vs {}: {issue}", m.weapon, m.enemy))
        })
        .collect();
    let mut recommendations = Vec::new();

    if targets.weapon_variance.classify(metrics.weapon_spread) != AxisStatus::InRange {
        issues.push(format!(
            "Weapon balance variance too high: {:.1}% difference between best and worst weapon",
            metrics.weapon_spread
        ));
        if let (Some(best), Some(worst)) = (strongest_weapon, weakest_weapon) {
            recommendations.push(format!(
                "Consider buffing {worst} or nerfing {best} to narrow the weapon spread"
            ));
        }
    }
    if targets.enemy_variance.classify(metrics.enemy_spread) != AxisStatus::InRange {
        issues.push(format!(
            "Enemies feel too similar: only {:.1}% win rate variance",
            metrics.enemy_spread
        ));
        recommendations
            .push("Increase archetype stat differences to make enemies feel distinct".to_string());
    }
    match targets.win_rate.classify(metrics.win_rate) {
        AxisStatus::TooHigh => recommendations
            .push("Raise enemy health or damage multipliers; fights are too easy".to_string()),
        AxisStatus::TooLow => recommendations
            .push("Lower enemy damage or raise player damage; fights are too hard".to_string()),
        AxisStatus::InRange => {}
    }

    BalanceAnalysis {
        metrics,
        matchups,
        strongest_weapon,
        weakest_weapon,
        hardest_enemy,
        easiest_enemy,
        issues,
        recommendations,
        engagement: EngagementSummary::from_statistics(&report.overall),
        weapon_engagement: report
            .per_weapon
            .iter()
            .map(|(weapon, stats)| (*weapon, EngagementSummary::from_statistics(stats)))
            .collect(),
    }
}

/// A matrix run together with its quality score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub report: MatrixReport,
    pub score: QualityScore,
}

impl Snapshot {
    /// Simulate `request` against `config` and score the result.
    ///
    /// # Errors
    ///
    /// Propagates simulation failures.
    pub fn evaluate(
        simulator: &Simulator,
        config: &TuningConfig,
        request: &MatrixRequest,
        seed: u64,
        control: &RunControl,
        targets: &TargetBands,
    ) -> EngineResult<Self> {
        let report = simulator.simulate_matrix(config, request, seed, control)?;
        Ok(Self::from_report(report, targets))
    }

    #[must_use]
    pub fn from_report(report: MatrixReport, targets: &TargetBands) -> Self {
        let score = score(&BalanceMetrics::from_report(&report), targets);
        Self { report, score }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchupDelta {
    pub weapon: WeaponType,
    pub enemy: String,
    pub baseline_win_rate: f64,
    pub current_win_rate: f64,
    pub change: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineComparison {
    pub baseline_win_rate: f64,
    pub current_win_rate: f64,
    pub win_rate_change: f64,
    pub baseline_turns: f64,
    pub current_turns: f64,
    pub turns_change: f64,
    pub baseline_score: f64,
    pub current_score: f64,
    pub score_change: f64,
    pub baseline_label: QualityLabel,
    pub current_label: QualityLabel,
    /// Matchups whose win rate moved by more than one point.
    pub significant_changes: Vec<MatchupDelta>,
}

const SIGNIFICANT_MATCHUP_CHANGE: f64 = 1.0;

#[must_use]
pub fn compare(baseline: &Snapshot, current: &Snapshot) -> BaselineComparison {
    let significant_changes = current
        .report
        .combinations
        .iter()
        .filter_map(|now| {
            let before = baseline
                .report
                .combinations
                .iter()
                .find(|c| c.weapon == now.weapon && c.enemy == now.enemy)?;
            let change = now.statistics.win_rate - before.statistics.win_rate;
            (change.abs() > SIGNIFICANT_MATCHUP_CHANGE).then(|| MatchupDelta {
                weapon: now.weapon,
                enemy: now.enemy.clone(),
                baseline_win_rate: before.statistics.win_rate,
                current_win_rate: now.statistics.win_rate,
                change,
            })
        })
        .collect();
    let before = &baseline.report.overall;
    let after = &current.report.overall;
    BaselineComparison {
        baseline_win_rate: before.win_rate,
        current_win_rate: after.win_rate,
        win_rate_change: after.win_rate - before.win_rate,
        baseline_turns: before.average_turns,
        current_turns: after.average_turns,
        turns_change: after.average_turns - before.average_turns,
        baseline_score: baseline.score.overall,
        current_score: current.score.overall,
        score_change: current.score.overall - baseline.score.overall,
        baseline_label: baseline.score.label,
        current_label: current.score.label,
        significant_changes,
    }
}
