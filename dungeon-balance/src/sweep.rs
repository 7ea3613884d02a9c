//! Parameter sensitivity sweeps.
//!
//! A sweep evaluates private copies of the configuration, so the live store
//! is never written and the swept parameter keeps its pre-sweep value however
//! the sweep ends.
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analysis::Snapshot;
use crate::config::TuningConfig;
use crate::constants::{HIGH_SENSITIVITY, MODERATE_SENSITIVITY};
use crate::error::{EngineError, EngineResult};
use crate::numbers::usize_to_f64;
use crate::oracle::{AggregateStatistics, MatrixRequest, Progress, RunControl, Simulator};
use crate::scoring::{QualityLabel, TargetBands};

/// Multipliers applied to the current value to span the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepRange {
    pub low: f64,
    pub high: f64,
}

impl SweepRange {
    /// Symmetric range of `percent` around the current value.
    #[must_use]
    pub fn from_percent(percent: f64) -> Self {
        let fraction = percent / 100.0;
        Self {
            low: 1.0 - fraction,
            high: 1.0 + fraction,
        }
    }

    fn validate(&self) -> EngineResult<()> {
        if !(self.low.is_finite() && self.high.is_finite()) || self.low <= 0.0 {
            return Err(EngineError::validation(
                "range",
                format!("low multiplier must be positive (got {})", self.low),
            ));
        }
        if self.low >= self.high {
            return Err(EngineError::validation(
                "range",
                format!("low {} must be below high {}", self.low, self.high),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepRequest {
    pub parameter: String,
    pub range: SweepRange,
    pub test_points: u32,
    pub battles_per_point: u32,
}

impl SweepRequest {
    fn validate(&self) -> EngineResult<()> {
        self.range.validate()?;
        if self.test_points < 2 {
            return Err(EngineError::validation("testPoints", "need at least 2 test points"));
        }
        if self.battles_per_point == 0 {
            return Err(EngineError::validation("battlesPerPoint", "must be at least 1"));
        }
        Ok(())
    }

    /// Evenly spaced values over `[current*low, current*high]`.
    #[must_use]
    pub fn values(&self, current: f64) -> Vec<f64> {
        let start = current * self.range.low;
        let end = current * self.range.high;
        let steps = f64::from(self.test_points - 1);
        (0..self.test_points)
            .map(|i| start + (end - start) * f64::from(i) / steps)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensitivityLevel {
    Low,
    Moderate,
    High,
}

impl SensitivityLevel {
    #[must_use]
    pub fn for_score(score: f64) -> Self {
        if score > HIGH_SENSITIVITY {
            Self::High
        } else if score > MODERATE_SENSITIVITY {
            Self::Moderate
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for SensitivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityPoint {
    pub value: f64,
    pub statistics: AggregateStatistics,
    pub quality_score: f64,
    pub label: QualityLabel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityResult {
    pub parameter: String,
    pub original_value: f64,
    pub min_value: f64,
    pub max_value: f64,
    pub points: Vec<SensitivityPoint>,
    /// Values the configuration rejected, e.g. a probability above 1.
    pub skipped: Vec<f64>,
    pub optimal_value: f64,
    pub optimal_score: f64,
    pub sensitivity_score: f64,
    pub level: SensitivityLevel,
    pub recommendation: String,
    pub cancelled: bool,
}

/// `(max - min) / mean` over the point scores, 0 when the mean is 0.
#[must_use]
pub fn sensitivity_score(scores: &[f64]) -> f64 {
    if scores.is_empty() {
        return 0.0;
    }
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
    let mean = scores.iter().sum::<f64>() / usize_to_f64(scores.len());
    if mean == 0.0 { 0.0 } else { (max - min) / mean }
}

fn recommendation(level: SensitivityLevel, current: f64, optimal: f64) -> String {
    match level {
        SensitivityLevel::High => format!(
            "High sensitivity parameter. Small changes have significant impact. Current value: {current:.2}, optimal: {optimal:.2}"
        ),
        SensitivityLevel::Moderate => format!(
            "Moderate sensitivity parameter. Changes have noticeable impact. Current value: {current:.2}, optimal: {optimal:.2}"
        ),
        SensitivityLevel::Low => format!(
            "Low sensitivity parameter. Changes have minimal impact. Current value: {current:.2}"
        ),
    }
}

/// Evaluate `request.parameter` across its range on copies of `base`.
///
/// Every point uses the same run seed, so score differences come from the
/// parameter rather than from sampling noise.
///
/// # Errors
///
/// Returns a validation error for a malformed request, an unknown parameter
/// or a range the configuration rejects at every point, and propagates
/// simulation failures.
pub fn sweep(
    simulator: &Simulator,
    base: &TuningConfig,
    template: &MatrixRequest,
    request: &SweepRequest,
    seed: u64,
    control: &RunControl,
    targets: &TargetBands,
) -> EngineResult<SensitivityResult> {
    request.validate()?;
    let original_value = base.get(&request.parameter)?;
    let values = request.values(original_value);
    let matrix = template.with_battles(request.battles_per_point);
    let per_point = matrix.total_battles();
    control.progress.begin(
        per_point.saturating_mul(u64::from(request.test_points)),
        format!("sweeping {}", request.parameter),
    );
    let point_control = RunControl {
        progress: Arc::new(Progress::default()),
        cancel: control.cancel.clone(),
    };

    let mut points = Vec::with_capacity(values.len());
    let mut skipped = Vec::new();
    let mut cancelled = false;
    for (index, value) in values.iter().copied().enumerate() {
        if control.is_cancelled() {
            cancelled = true;
            break;
        }
        control.progress.set_status(format!(
            "testing {}={value:.4} ({}/{})",
            request.parameter,
            index + 1,
            values.len()
        ));
        let mut candidate = base.clone();
        if let Err(err) = candidate.set(&request.parameter, value) {
            log::warn!("skipping sweep point {value}: {err}");
            skipped.push(value);
            control.progress.advance(per_point);
            continue;
        }
        let snapshot =
            Snapshot::evaluate(simulator, &candidate, &matrix, seed, &point_control, targets)?;
        control.progress.advance(per_point);
        if snapshot.report.cancelled {
            cancelled = true;
            break;
        }
        points.push(SensitivityPoint {
            value,
            statistics: snapshot.report.overall,
            quality_score: snapshot.score.overall,
            label: snapshot.score.label,
        });
    }

    if points.is_empty() && !cancelled {
        return Err(EngineError::validation(
            request.parameter.clone(),
            "no value in the requested range passes validation",
        ));
    }
    let optimal = points
        .iter()
        .max_by(|a, b| a.quality_score.total_cmp(&b.quality_score));
    let (optimal_value, optimal_score) =
        optimal.map_or((original_value, 0.0), |p| (p.value, p.quality_score));
    let scores: Vec<f64> = points.iter().map(|p| p.quality_score).collect();
    let sensitivity = sensitivity_score(&scores);
    let level = SensitivityLevel::for_score(sensitivity);
    control
        .progress
        .set_status(if cancelled { "cancelled" } else { "done" });
    log::info!(
        "sweep of {} finished: {} points, sensitivity {sensitivity:.3} ({level})",
        request.parameter,
        points.len()
    );
    Ok(SensitivityResult {
        parameter: request.parameter.clone(),
        original_value,
        min_value: values.first().copied().unwrap_or(original_value),
        max_value: values.last().copied().unwrap_or(original_value),
        points,
        skipped,
        optimal_value,
        optimal_score,
        sensitivity_score: sensitivity,
        level,
        recommendation: recommendation(level, original_value, optimal_value),
        cancelled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::paths;

    fn small_request(parameter: &str) -> SweepRequest {
        SweepRequest {
            parameter: parameter.to_string(),
            range: SweepRange::from_percent(20.0),
            test_points: 3,
            battles_per_point: 4,
        }
    }

    #[test]
    fn values_span_the_range_evenly() {
        let request = SweepRequest {
            test_points: 5,
            ..small_request(paths::DROP_CHANCE)
        };
        let values = request.values(1.0);
        assert_eq!(values.len(), 5);
        assert!((values[0] - 0.8).abs() < 1e-12);
        assert!((values[2] - 1.0).abs() < 1e-12);
        assert!((values[4] - 1.2).abs() < 1e-12);
    }

    #[test]
    fn sensitivity_formula_and_levels() {
        assert!((sensitivity_score(&[50.0, 100.0, 75.0]) - (50.0 / 75.0)).abs() < 1e-12);
        assert!(sensitivity_score(&[0.0, 0.0]).abs() < f64::EPSILON);
        assert!(sensitivity_score(&[]).abs() < f64::EPSILON);
        assert_eq!(SensitivityLevel::for_score(0.31), SensitivityLevel::High);
        assert_eq!(SensitivityLevel::for_score(0.3), SensitivityLevel::Moderate);
        assert_eq!(SensitivityLevel::for_score(0.1), SensitivityLevel::Low);
    }

    #[test]
    fn sweep_leaves_the_base_configuration_untouched() {
        let config = TuningConfig::default();
        let before = config.clone();
        let simulator = Simulator::with_duel_resolver(2).expect("pool");
        let template = MatrixRequest::full(&config, 4, 1, 1);
        let parameter = paths::WEAPON_GLOBAL_DAMAGE;
        let result = sweep(
            &simulator,
            &config,
            &template,
            &small_request(parameter),
            9,
            &RunControl::default(),
            &TargetBands::default(),
        )
        .expect("sweep");
        assert_eq!(config, before);
        assert_eq!(result.points.len(), 3);
        assert!((result.original_value - 1.0).abs() < f64::EPSILON);
        assert!(result.points.iter().any(|p| p.value == result.optimal_value));
    }

    #[test]
    fn out_of_range_points_are_skipped() {
        let config = TuningConfig::default();
        let simulator = Simulator::with_duel_resolver(1).expect("pool");
        let template = MatrixRequest::full(&config, 2, 1, 1);
        // Upgrade decay defaults to 0.5, so +150% pushes past 1.0.
        let request = SweepRequest {
            range: SweepRange { low: 0.5, high: 2.5 },
            ..small_request(paths::UPGRADE_DECAY)
        };
        let result = sweep(
            &simulator,
            &config,
            &template,
            &request,
            1,
            &RunControl::default(),
            &TargetBands::default(),
        )
        .expect("sweep");
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.points.len(), 2);
    }

    #[test]
    fn malformed_requests_fail_validation() {
        let config = TuningConfig::default();
        let simulator = Simulator::with_duel_resolver(1).expect("pool");
        let template = MatrixRequest::full(&config, 2, 1, 1);
        let run = |request: SweepRequest| {
            sweep(
                &simulator,
                &config,
                &template,
                &request,
                1,
                &RunControl::default(),
                &TargetBands::default(),
            )
        };
        let one_point = SweepRequest {
            test_points: 1,
            ..small_request(paths::DROP_CHANCE)
        };
        assert!(matches!(run(one_point), Err(EngineError::Validation { .. })));
        let inverted = SweepRequest {
            range: SweepRange { low: 1.2, high: 0.8 },
            ..small_request(paths::DROP_CHANCE)
        };
        assert!(matches!(run(inverted), Err(EngineError::Validation { .. })));
        assert!(matches!(
            run(small_request("enemy.nonsense")),
            Err(EngineError::Config(_))
        ));
    }
}
