//! Target bands and the composite balance quality score.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DURATION_FALLOFF, ENEMY_SPREAD_FALLOFF, WEAPON_SPREAD_FALLOFF, WIN_RATE_FALLOFF,
};
use crate::error::{EngineError, EngineResult};
use crate::oracle::{AggregateStatistics, MatrixReport};

const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// Acceptable interval for one axis. Either side may be open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AxisStatus {
    InRange,
    TooLow,
    TooHigh,
}

impl Band {
    #[must_use]
    pub const fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    #[must_use]
    pub const fn ceiling(max: f64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    #[must_use]
    pub const fn floor(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    #[must_use]
    pub fn classify(&self, value: f64) -> AxisStatus {
        match (self.min, self.max) {
            (Some(min), _) if value < min => AxisStatus::TooLow,
            (_, Some(max)) if value > max => AxisStatus::TooHigh,
            _ => AxisStatus::InRange,
        }
    }

    /// Distance from `value` to the nearest edge, 0 inside the band.
    #[must_use]
    pub fn deviation(&self, value: f64) -> f64 {
        match self.classify(value) {
            AxisStatus::TooLow => self.min.map_or(0.0, |min| min - value),
            AxisStatus::TooHigh => self.max.map_or(0.0, |max| value - max),
            AxisStatus::InRange => 0.0,
        }
    }

    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.classify(value) == AxisStatus::InRange
    }

    /// Middle of a closed band, else whichever edge exists.
    #[must_use]
    pub fn midpoint(&self) -> Option<f64> {
        match (self.min, self.max) {
            (Some(min), Some(max)) => Some(f64::midpoint(min, max)),
            (min, max) => min.or(max),
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (Some(min), Some(max)) => write!(f, "{min}-{max}"),
            (Some(min), None) => write!(f, ">= {min}"),
            (None, Some(max)) => write!(f, "<= {max}"),
            (None, None) => f.write_str("any"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Axis {
    WinRate,
    Duration,
    WeaponVariance,
    EnemyVariance,
}

impl Axis {
    pub const ALL: [Self; 4] = [
        Self::WinRate,
        Self::Duration,
        Self::WeaponVariance,
        Self::EnemyVariance,
    ];

    #[must_use]
    pub const fn falloff(self) -> f64 {
        match self {
            Self::WinRate => WIN_RATE_FALLOFF,
            Self::Duration => DURATION_FALLOFF,
            Self::WeaponVariance => WEAPON_SPREAD_FALLOFF,
            Self::EnemyVariance => ENEMY_SPREAD_FALLOFF,
        }
    }

    /// Field name used in target documents.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::WinRate => "winRate",
            Self::Duration => "duration",
            Self::WeaponVariance => "weaponVariance",
            Self::EnemyVariance => "enemyVariance",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::WinRate => "win rate",
            Self::Duration => "combat duration",
            Self::WeaponVariance => "weapon balance",
            Self::EnemyVariance => "enemy differentiation",
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityWeights {
    #[serde(default = "QualityWeights::default_win_rate")]
    pub win_rate: f64,
    #[serde(default = "QualityWeights::default_duration")]
    pub duration: f64,
    #[serde(default = "QualityWeights::default_weapon_variance")]
    pub weapon_variance: f64,
    #[serde(default = "QualityWeights::default_enemy_variance")]
    pub enemy_variance: f64,
}

impl QualityWeights {
    const fn default_win_rate() -> f64 {
        0.40
    }

    const fn default_duration() -> f64 {
        0.25
    }

    const fn default_weapon_variance() -> f64 {
        0.20
    }

    const fn default_enemy_variance() -> f64 {
        0.15
    }

    #[must_use]
    pub const fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::WinRate => self.win_rate,
            Axis::Duration => self.duration,
            Axis::WeaponVariance => self.weapon_variance,
            Axis::EnemyVariance => self.enemy_variance,
        }
    }
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            win_rate: Self::default_win_rate(),
            duration: Self::default_duration(),
            weapon_variance: Self::default_weapon_variance(),
            enemy_variance: Self::default_enemy_variance(),
        }
    }
}

/// Target bands for every scored axis.
///
/// Win rate is the player's percentage over the whole matrix, duration is the
/// mean turn count, and the two variance axes are the spread (max minus min)
/// of per-weapon and per-enemy win rates in percentage points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetBands {
    #[serde(default = "TargetBands::default_win_rate")]
    pub win_rate: Band,
    #[serde(default = "TargetBands::default_duration")]
    pub duration: Band,
    #[serde(default = "TargetBands::default_weapon_variance")]
    pub weapon_variance: Band,
    #[serde(default = "TargetBands::default_enemy_variance")]
    pub enemy_variance: Band,
    #[serde(default)]
    pub weights: QualityWeights,
}

impl TargetBands {
    const fn default_win_rate() -> Band {
        Band::between(85.0, 98.0)
    }

    const fn default_duration() -> Band {
        Band::between(8.0, 15.0)
    }

    const fn default_weapon_variance() -> Band {
        Band::ceiling(10.0)
    }

    const fn default_enemy_variance() -> Band {
        Band::floor(3.0)
    }

    #[must_use]
    pub const fn band(&self, axis: Axis) -> Band {
        match axis {
            Axis::WinRate => self.win_rate,
            Axis::Duration => self.duration,
            Axis::WeaponVariance => self.weapon_variance,
            Axis::EnemyVariance => self.enemy_variance,
        }
    }

    /// Bands must be ordered and finite; weights non-negative and summing to 1.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the offending band or weight.
    pub fn validate(&self) -> EngineResult<()> {
        for axis in Axis::ALL {
            let field = format!("targets.{}", axis.key());
            let band = self.band(axis);
            if band.min.into_iter().chain(band.max).any(|v| !v.is_finite()) {
                return Err(EngineError::validation(field, "band limits must be finite"));
            }
            if let (Some(min), Some(max)) = (band.min, band.max)
                && min > max
            {
                return Err(EngineError::validation(
                    field,
                    format!("min {min} is above max {max}"),
                ));
            }
            let weight = self.weights.get(axis);
            if !weight.is_finite() || weight < 0.0 {
                return Err(EngineError::validation(
                    format!("targets.weights.{}", axis.key()),
                    format!("must be non-negative (got {weight})"),
                ));
            }
        }
        let sum: f64 = Axis::ALL.iter().map(|axis| self.weights.get(*axis)).sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_EPSILON {
            return Err(EngineError::validation(
                "targets.weights",
                format!("must sum to 1 (got {sum:.4})"),
            ));
        }
        Ok(())
    }
}

impl Default for TargetBands {
    fn default() -> Self {
        Self {
            win_rate: Self::default_win_rate(),
            duration: Self::default_duration(),
            weapon_variance: Self::default_weapon_variance(),
            enemy_variance: Self::default_enemy_variance(),
            weights: QualityWeights::default(),
        }
    }
}

/// The four scored measurements of one matrix run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceMetrics {
    pub win_rate: f64,
    pub average_turns: f64,
    pub weapon_spread: f64,
    pub enemy_spread: f64,
}

impl BalanceMetrics {
    #[must_use]
    pub fn from_report(report: &MatrixReport) -> Self {
        Self {
            win_rate: report.overall.win_rate,
            average_turns: report.overall.average_turns,
            weapon_spread: win_rate_spread(report.per_weapon.values()),
            enemy_spread: win_rate_spread(report.per_enemy.values()),
        }
    }

    /// Metrics for a single matchup, with no spread to measure.
    #[must_use]
    pub const fn from_statistics(statistics: &AggregateStatistics) -> Self {
        Self {
            win_rate: statistics.win_rate,
            average_turns: statistics.average_turns,
            weapon_spread: 0.0,
            enemy_spread: 0.0,
        }
    }

    #[must_use]
    pub const fn value(&self, axis: Axis) -> f64 {
        match axis {
            Axis::WinRate => self.win_rate,
            Axis::Duration => self.average_turns,
            Axis::WeaponVariance => self.weapon_spread,
            Axis::EnemyVariance => self.enemy_spread,
        }
    }
}

fn win_rate_spread<'a>(groups: impl Iterator<Item = &'a AggregateStatistics>) -> f64 {
    let (low, high) = groups.fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), s| {
        (low.min(s.win_rate), high.max(s.win_rate))
    });
    if high < low { 0.0 } else { high - low }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QualityLabel {
    Critical,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl QualityLabel {
    #[must_use]
    pub fn for_score(score: f64) -> Self {
        if score >= 90.0 {
            Self::Excellent
        } else if score >= 75.0 {
            Self::Good
        } else if score >= 60.0 {
            Self::Fair
        } else if score >= 40.0 {
            Self::Poor
        } else {
            Self::Critical
        }
    }
}

impl fmt::Display for QualityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Critical => "Critical",
            Self::Poor => "Poor",
            Self::Fair => "Fair",
            Self::Good => "Good",
            Self::Excellent => "Excellent",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisScore {
    pub axis: Axis,
    pub value: f64,
    pub band: Band,
    pub status: AxisStatus,
    pub deviation: f64,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityScore {
    pub overall: f64,
    pub label: QualityLabel,
    pub axes: Vec<AxisScore>,
    pub metrics: BalanceMetrics,
}

impl QualityScore {
    #[must_use]
    pub fn axis(&self, axis: Axis) -> Option<&AxisScore> {
        self.axes.iter().find(|entry| entry.axis == axis)
    }

    pub fn deviations(&self) -> impl Iterator<Item = &AxisScore> {
        self.axes
            .iter()
            .filter(|entry| entry.status != AxisStatus::InRange)
    }

    #[must_use]
    pub fn all_in_range(&self) -> bool {
        self.deviations().next().is_none()
    }
}

/// Score one axis: full marks inside the band, linear decay to zero at one
/// falloff width outside it.
#[must_use]
pub fn axis_score(axis: Axis, value: f64, band: Band) -> AxisScore {
    let deviation = band.deviation(value);
    let score = 100.0 * (1.0 - deviation / axis.falloff()).max(0.0);
    AxisScore {
        axis,
        value,
        band,
        status: band.classify(value),
        deviation,
        score,
    }
}

/// Composite quality of `metrics` against `targets`.
#[must_use]
pub fn score(metrics: &BalanceMetrics, targets: &TargetBands) -> QualityScore {
    let axes: Vec<AxisScore> = Axis::ALL
        .iter()
        .map(|&axis| axis_score(axis, metrics.value(axis), targets.band(axis)))
        .collect();
    let overall = axes
        .iter()
        .map(|entry| entry.score * targets.weights.get(entry.axis))
        .sum::<f64>()
        .clamp(0.0, 100.0);
    QualityScore {
        overall,
        label: QualityLabel::for_score(overall),
        axes,
        metrics: *metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn balanced() -> BalanceMetrics {
        BalanceMetrics {
            win_rate: 90.0,
            average_turns: 10.0,
            weapon_spread: 4.0,
            enemy_spread: 6.0,
        }
    }

    #[test]
    fn label_boundaries() {
        assert_eq!(QualityLabel::for_score(92.0), QualityLabel::Excellent);
        assert_eq!(QualityLabel::for_score(80.0), QualityLabel::Good);
        assert_eq!(QualityLabel::for_score(60.0), QualityLabel::Fair);
        assert_eq!(QualityLabel::for_score(45.0), QualityLabel::Poor);
        assert_eq!(QualityLabel::for_score(10.0), QualityLabel::Critical);
        assert_eq!(QualityLabel::for_score(90.0), QualityLabel::Excellent);
        assert_eq!(QualityLabel::for_score(39.999), QualityLabel::Critical);
    }

    #[test]
    fn in_range_metrics_score_full_marks() {
        let result = score(&balanced(), &TargetBands::default());
        assert!((result.overall - 100.0).abs() < 1e-9);
        assert_eq!(result.label, QualityLabel::Excellent);
        assert!(result.all_in_range());
    }

    #[test]
    fn composite_uses_fixed_weights() {
        let metrics = BalanceMetrics {
            win_rate: 100.0 - 0.5,
            ..balanced()
        };
        // 1.5 points above the band over a 15 point falloff costs 10% of 40%.
        let result = score(&metrics, &TargetBands::default());
        assert!((result.overall - 96.0).abs() < 1e-9);
        let axis = result.axis(Axis::WinRate).expect("win rate axis");
        assert_eq!(axis.status, AxisStatus::TooHigh);
        assert!((axis.deviation - 1.5).abs() < 1e-9);
    }

    #[test]
    fn far_outside_every_band_is_critical() {
        let metrics = BalanceMetrics {
            win_rate: 20.0,
            average_turns: 45.0,
            weapon_spread: 60.0,
            enemy_spread: 0.0,
        };
        let result = score(&metrics, &TargetBands::default());
        assert!(result.overall.abs() < 1e-9);
        assert_eq!(result.label, QualityLabel::Critical);
        assert_eq!(result.deviations().count(), 4);
        let enemy = result.axis(Axis::EnemyVariance).expect("enemy axis");
        assert_eq!(enemy.status, AxisStatus::TooLow);
    }

    #[test]
    fn scoring_is_pure() {
        let targets = TargetBands::default();
        let metrics = BalanceMetrics {
            win_rate: 80.0,
            ..balanced()
        };
        assert_eq!(score(&metrics, &targets), score(&metrics, &targets));
    }

    #[test]
    fn open_bands_classify_one_side() {
        let ceiling = Band::ceiling(10.0);
        assert_eq!(ceiling.classify(-50.0), AxisStatus::InRange);
        assert_eq!(ceiling.classify(10.5), AxisStatus::TooHigh);
        let floor = Band::floor(3.0);
        assert_eq!(floor.classify(2.0), AxisStatus::TooLow);
        assert!((floor.deviation(2.0) - 1.0).abs() < 1e-12);
        assert_eq!(Band::between(85.0, 98.0).midpoint(), Some(91.5));
    }

    #[test]
    fn targets_deserialize_with_defaults() {
        let targets: TargetBands =
            serde_json::from_str(r#"{"winRate":{"min":80.0,"max":95.0}}"#).expect("targets");
        assert_eq!(targets.win_rate, Band::between(80.0, 95.0));
        assert_eq!(targets.duration, Band::between(8.0, 15.0));
        assert!((targets.weights.win_rate - 0.40).abs() < f64::EPSILON);
    }

    #[test]
    fn default_targets_validate() {
        assert!(TargetBands::default().validate().is_ok());
    }

    #[test]
    fn inflated_weights_are_rejected() {
        let targets = TargetBands {
            weights: QualityWeights {
                win_rate: 1.0,
                duration: 1.0,
                weapon_variance: 0.5,
                enemy_variance: 0.5,
            },
            ..TargetBands::default()
        };
        let err = targets.validate().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ValidationError);
        assert!(err.to_string().contains("targets.weights"));
    }

    #[test]
    fn negative_weight_and_inverted_band_are_rejected() {
        let mut targets = TargetBands::default();
        targets.weights.duration = -0.25;
        targets.weights.win_rate = 0.90;
        assert!(targets.validate().unwrap_err().to_string().contains("duration"));

        let mut targets = TargetBands::default();
        targets.duration = Band::between(15.0, 8.0);
        assert!(targets.validate().unwrap_err().to_string().contains("targets.duration"));
    }
}
