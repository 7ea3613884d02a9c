//! Single-parameter what-if comparisons.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::analysis::Snapshot;
use crate::config::TuningConfig;
use crate::constants::{
    QUALITY_RISK_HIGH, QUALITY_RISK_MEDIUM, RECOMMEND_QUALITY_DELTA, WIN_RATE_RISK_HIGH,
    WIN_RATE_RISK_MEDIUM,
};
use crate::error::{EngineError, EngineResult};
use crate::oracle::{RunControl, Simulator};
use crate::scoring::{QualityLabel, TargetBands};

/// Whether a what-if candidate stays in the live configuration afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Persist {
    /// Evaluate only; the live value is untouched.
    #[default]
    Discard,
    /// Write the candidate to the live configuration after evaluating it.
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    fn classify(delta: f64, medium: f64, high: f64) -> Self {
        let magnitude = delta.abs();
        if magnitude > high {
            Self::High
        } else if magnitude > medium {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Higher of the quality-delta and win-rate-delta classes.
    #[must_use]
    pub fn assess(quality_delta: f64, win_rate_delta: f64) -> Self {
        Self::classify(quality_delta, QUALITY_RISK_MEDIUM, QUALITY_RISK_HIGH).max(
            Self::classify(win_rate_delta, WIN_RATE_RISK_MEDIUM, WIN_RATE_RISK_HIGH),
        )
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Recommended,
    Neutral,
    NotRecommended,
}

impl Verdict {
    #[must_use]
    pub fn for_quality_delta(delta: f64) -> Self {
        if delta > RECOMMEND_QUALITY_DELTA {
            Self::Recommended
        } else if delta < -RECOMMEND_QUALITY_DELTA {
            Self::NotRecommended
        } else {
            Self::Neutral
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatIfResult {
    pub parameter: String,
    pub current_value: f64,
    pub candidate_value: f64,
    pub quality_before: f64,
    pub quality_after: f64,
    pub quality_change: f64,
    pub label_before: QualityLabel,
    pub label_after: QualityLabel,
    pub win_rate_before: f64,
    pub win_rate_after: f64,
    pub win_rate_change: f64,
    pub duration_change: f64,
    pub player_damage_change: f64,
    pub enemy_damage_change: f64,
    pub risk: RiskLevel,
    pub verdict: Verdict,
    pub recommendation: String,
    pub persisted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatIfRequest {
    pub parameter: String,
    pub candidate: f64,
    /// Battles per weapon and enemy combination.
    pub battles: u32,
    #[serde(default)]
    pub persist: Persist,
}

/// Evaluate the candidate value on a copy of `config` and diff it against
/// `before`.
///
/// The copy is evaluated with the seed and levels of `before`. Persistence
/// is the caller's decision; the returned result always reports
/// `persisted: false`.
///
/// # Errors
///
/// Returns a validation error if the candidate is rejected by the
/// configuration or the battle count is zero, and propagates simulation
/// failures.
pub fn what_if(
    simulator: &Simulator,
    config: &TuningConfig,
    before: &Snapshot,
    request: &WhatIfRequest,
    control: &RunControl,
    targets: &TargetBands,
) -> EngineResult<WhatIfResult> {
    if request.battles == 0 {
        return Err(EngineError::validation("battleCount", "must be at least 1"));
    }
    let parameter = request.parameter.as_str();
    let candidate = request.candidate;
    let current_value = config.get(parameter)?;
    let mut trial = config.clone();
    trial.set(parameter, candidate)?;
    let request = before.report.request.with_battles(request.battles);
    let after = Snapshot::evaluate(
        simulator,
        &trial,
        &request,
        before.report.seed,
        control,
        targets,
    )?;
    if after.report.cancelled {
        return Err(EngineError::computation(
            "what-if evaluation was cancelled before completing",
        ));
    }

    let old = &before.report.overall;
    let new = &after.report.overall;
    let quality_change = after.score.overall - before.score.overall;
    let win_rate_change = new.win_rate - old.win_rate;
    let verdict = Verdict::for_quality_delta(quality_change);
    let trend = format!("Win rate: {:.1}% -> {:.1}%", old.win_rate, new.win_rate);
    let recommendation = match verdict {
        Verdict::Recommended => format!(
            "RECOMMENDED: improves quality score by {quality_change:.1} points. {trend}"
        ),
        Verdict::NotRecommended => format!(
            "NOT RECOMMENDED: degrades quality score by {:.1} points. {trend}",
            quality_change.abs()
        ),
        Verdict::Neutral => format!(
            "NEUTRAL: minimal impact, quality score change {quality_change:.1} points. {trend}"
        ),
    };
    Ok(WhatIfResult {
        parameter: parameter.to_string(),
        current_value,
        candidate_value: candidate,
        quality_before: before.score.overall,
        quality_after: after.score.overall,
        quality_change,
        label_before: before.score.label,
        label_after: after.score.label,
        win_rate_before: old.win_rate,
        win_rate_after: new.win_rate,
        win_rate_change,
        duration_change: new.average_turns - old.average_turns,
        player_damage_change: new.average_player_damage - old.average_player_damage,
        enemy_damage_change: new.average_enemy_damage - old.average_enemy_damage,
        risk: RiskLevel::assess(quality_change, win_rate_change),
        verdict,
        recommendation,
        persisted: false,
    })
}
