//! Rule-based tuning suggestions.
//!
//! Every axis outside its band yields exactly one suggestion that names a
//! concrete configuration leaf. Adjustment size grows with the deviation and
//! saturates at [`MAX_ADJUSTMENT`](crate::constants) of the current value.
use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::config::{ArchetypeStat, GlobalStat, TuningConfig, WeaponStat, WeaponType, paths};
use crate::constants::{
    DURATION_SEVERITY_UNIT, ENEMY_SPREAD_SEVERITY_UNIT, MAX_ADJUSTMENT,
    WEAPON_SPREAD_SEVERITY_UNIT, WIN_RATE_SEVERITY_UNIT,
};
use crate::error::EngineResult;
use crate::oracle::{AggregateStatistics, MatrixReport};
use crate::scoring::{Axis, AxisScore, AxisStatus, QualityScore, TargetBands};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Priority for a deviation expressed in severity units of its axis.
    #[must_use]
    pub fn from_severity(severity: f64) -> Self {
        if severity >= 2.0 {
            Self::Critical
        } else if severity >= 1.0 {
            Self::High
        } else if severity >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TuningSuggestion {
    pub id: String,
    pub priority: Priority,
    pub category: Axis,
    pub status: AxisStatus,
    /// What the change is aimed at: "enemies", "weapons" or a single name.
    pub target: String,
    pub parameter: String,
    pub current_value: f64,
    pub suggested_value: f64,
    /// Relative change applied, in (0, 0.25].
    pub magnitude: f64,
    pub reason: String,
    pub expected_impact: String,
    pub affected_matchups: Vec<String>,
}

impl TuningSuggestion {
    #[must_use]
    pub fn change_percent(&self) -> f64 {
        if self.current_value == 0.0 {
            return 0.0;
        }
        (self.suggested_value / self.current_value - 1.0) * 100.0
    }
}

const fn severity_unit(axis: Axis) -> f64 {
    match axis {
        Axis::WinRate => WIN_RATE_SEVERITY_UNIT,
        Axis::Duration => DURATION_SEVERITY_UNIT,
        Axis::WeaponVariance => WEAPON_SPREAD_SEVERITY_UNIT,
        Axis::EnemyVariance => ENEMY_SPREAD_SEVERITY_UNIT,
    }
}

/// Relative adjustment for a deviation: strictly increasing, bounded by the
/// maximum step.
#[must_use]
pub fn adjustment_magnitude(axis: Axis, deviation: f64) -> f64 {
    MAX_ADJUSTMENT * (1.0 - (-deviation.max(0.0) / severity_unit(axis)).exp())
}

/// Deterministic id from the deviation and the change it implies.
fn suggestion_id(
    axis: Axis,
    status: AxisStatus,
    parameter: &str,
    current: f64,
    suggested: f64,
) -> String {
    let mut bytes = Vec::with_capacity(parameter.len() + 32);
    bytes.extend_from_slice(format!("{axis:?}|{status:?}|").as_bytes());
    bytes.extend_from_slice(parameter.to_ascii_lowercase().as_bytes());
    bytes.extend_from_slice(&current.to_bits().to_le_bytes());
    bytes.extend_from_slice(&suggested.to_bits().to_le_bytes());
    format!("sg-{:016x}", XxHash64::oneshot(0, &bytes))
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn matchup_label(weapon: WeaponType, enemy: &str) -> String {
    format!("{weapon} vs {enemy}")
}

fn extreme_by_win_rate<'a, K>(
    groups: impl Iterator<Item = (K, &'a AggregateStatistics)>,
    highest: bool,
) -> Option<K> {
    groups
        .max_by(|(_, a), (_, b)| {
            let ord = a.win_rate.partial_cmp(&b.win_rate).unwrap_or(Ordering::Equal);
            if highest { ord } else { ord.reverse() }
        })
        .map(|(key, _)| key)
}

struct Rule {
    target: String,
    parameter: String,
    raise: bool,
    reason: String,
    impact: &'static str,
    affected: Vec<String>,
}

fn rule_for(axis: &AxisScore, report: &MatrixReport, targets: &TargetBands) -> Option<Rule> {
    let too_high = axis.status == AxisStatus::TooHigh;
    match axis.axis {
        Axis::WinRate => {
            let band = targets.win_rate;
            let affected = report
                .combinations
                .iter()
                .filter(|c| band.classify(c.statistics.win_rate) == axis.status)
                .map(|c| matchup_label(c.weapon, &c.enemy))
                .collect();
            let (parameter, raise, impact) = if too_high {
                (
                    paths::global_multiplier(GlobalStat::Health),
                    true,
                    "enemies survive longer, lowering the player win rate",
                )
            } else {
                (
                    paths::global_multiplier(GlobalStat::Damage),
                    false,
                    "enemies hit softer, raising the player win rate",
                )
            };
            Some(Rule {
                target: "enemies".to_string(),
                parameter,
                raise,
                reason: format!(
                    "win rate {:.1}% is outside {band}%",
                    axis.value
                ),
                impact,
                affected,
            })
        }
        Axis::Duration => {
            let band = targets.duration;
            let affected = report
                .combinations
                .iter()
                .filter(|c| band.classify(c.statistics.average_turns) == axis.status)
                .map(|c| matchup_label(c.weapon, &c.enemy))
                .collect();
            let impact = if too_high {
                "player damage rises, shortening battles"
            } else {
                "player damage falls, lengthening battles"
            };
            Some(Rule {
                target: "weapons".to_string(),
                parameter: paths::WEAPON_GLOBAL_DAMAGE.to_string(),
                raise: too_high,
                reason: format!(
                    "average battle length {:.1} turns is outside {band} turns",
                    axis.value
                ),
                impact,
                affected,
            })
        }
        Axis::WeaponVariance => {
            let weapon = extreme_by_win_rate(
                report.per_weapon.iter().map(|(w, s)| (*w, s)),
                true,
            )?;
            let affected = report
                .combinations
                .iter()
                .filter(|c| c.weapon == weapon)
                .map(|c| matchup_label(c.weapon, &c.enemy))
                .collect();
            Some(Rule {
                target: weapon.to_string(),
                parameter: paths::weapon(weapon, WeaponStat::Damage),
                raise: !too_high,
                reason: format!(
                    "weapon win-rate spread {:.1} points is outside {}; {weapon} leads",
                    axis.value, targets.weapon_variance
                ),
                impact: if too_high {
                    "the strongest weapon loses ground, narrowing the spread"
                } else {
                    "the strongest weapon pulls ahead, widening the spread"
                },
                affected,
            })
        }
        Axis::EnemyVariance => {
            let enemy = extreme_by_win_rate(
                report.per_enemy.iter().map(|(e, s)| (e.as_str(), s)),
                false,
            )?;
            let affected = report
                .combinations
                .iter()
                .filter(|c| c.enemy == enemy)
                .map(|c| matchup_label(c.weapon, &c.enemy))
                .collect();
            Some(Rule {
                target: enemy.to_string(),
                parameter: paths::archetype(enemy, ArchetypeStat::Strength),
                raise: !too_high,
                reason: format!(
                    "enemy win-rate spread {:.1} points is outside {}; {enemy} is the hardest",
                    axis.value, targets.enemy_variance
                ),
                impact: if too_high {
                    "the hardest enemy softens, bringing archetypes closer"
                } else {
                    "the hardest enemy hits harder, separating archetypes"
                },
                affected,
            })
        }
    }
}

/// One suggestion per out-of-band axis, most urgent first.
///
/// # Errors
///
/// Returns a validation error if a rule names a parameter the configuration
/// does not have.
pub fn suggest(
    report: &MatrixReport,
    score: &QualityScore,
    config: &TuningConfig,
    targets: &TargetBands,
) -> EngineResult<Vec<TuningSuggestion>> {
    let mut suggestions = Vec::new();
    for axis in score.deviations() {
        let Some(rule) = rule_for(axis, report, targets) else {
            log::debug!("no rule applies to {} deviation", axis.axis);
            continue;
        };
        let current = config.get(&rule.parameter)?;
        let magnitude = adjustment_magnitude(axis.axis, axis.deviation);
        let factor = if rule.raise { 1.0 + magnitude } else { 1.0 - magnitude };
        let suggested = round4(current * factor);
        if suggested == current {
            continue;
        }
        suggestions.push(TuningSuggestion {
            id: suggestion_id(axis.axis, axis.status, &rule.parameter, current, suggested),
            priority: Priority::from_severity(axis.deviation / severity_unit(axis.axis)),
            category: axis.axis,
            status: axis.status,
            target: rule.target,
            parameter: rule.parameter,
            current_value: current,
            suggested_value: suggested,
            magnitude,
            reason: rule.reason,
            expected_impact: rule.impact.to_string(),
            affected_matchups: rule.affected,
        });
    }
    suggestions.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| b.magnitude.partial_cmp(&a.magnitude).unwrap_or(Ordering::Equal))
    });
    Ok(suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::{BattleTally, CombinationResult, MatrixRequest};
    use crate::scoring::{BalanceMetrics, score};
    use std::collections::BTreeMap;

    fn stats(win_rate: f64, turns: f64) -> AggregateStatistics {
        let mut base = BattleTally::default().statistics();
        base.total_battles = 100;
        base.win_rate = win_rate;
        base.average_turns = turns;
        base
    }

    fn report(rates: &[(WeaponType, &str, f64)], turns: f64) -> MatrixReport {
        let config = TuningConfig::default();
        let combinations: Vec<CombinationResult> = rates
            .iter()
            .map(|(weapon, enemy, rate)| CombinationResult {
                weapon: *weapon,
                enemy: (*enemy).to_string(),
                statistics: stats(*rate, turns),
            })
            .collect();
        let mut per_weapon: BTreeMap<WeaponType, Vec<f64>> = BTreeMap::new();
        let mut per_enemy: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for c in &combinations {
            per_weapon.entry(c.weapon).or_default().push(c.statistics.win_rate);
            per_enemy.entry(c.enemy.clone()).or_default().push(c.statistics.win_rate);
        }
        let avg = |v: &Vec<f64>| v.iter().sum::<f64>() / v.len() as f64;
        let all: Vec<f64> = combinations.iter().map(|c| c.statistics.win_rate).collect();
        MatrixReport {
            seed: 1,
            request: MatrixRequest::full(&config, 100, 1, 1),
            overall: stats(avg(&all), turns),
            per_weapon: per_weapon.iter().map(|(k, v)| (*k, stats(avg(v), turns))).collect(),
            per_enemy: per_enemy
                .iter()
                .map(|(k, v)| (k.clone(), stats(avg(v), turns)))
                .collect(),
            combinations,
            cancelled: false,
        }
    }

    fn run(report: &MatrixReport) -> Vec<TuningSuggestion> {
        let targets = TargetBands::default();
        let quality = score(&BalanceMetrics::from_report(report), &targets);
        suggest(report, &quality, &TuningConfig::default(), &targets).expect("suggestions")
    }

    #[test]
    fn magnitude_grows_with_deviation_and_saturates() {
        let mut previous = 0.0;
        for step in 1..40 {
            let m = adjustment_magnitude(Axis::WinRate, f64::from(step));
            assert!(m > previous);
            assert!(m <= MAX_ADJUSTMENT);
            previous = m;
        }
        assert!(adjustment_magnitude(Axis::Duration, 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn one_suggestion_per_deviating_axis() {
        // Win rate too high and the Mace far ahead of the Wand.
        let report = report(
            &[
                (WeaponType::Mace, "Brute", 100.0),
                (WeaponType::Mace, "Mage", 100.0),
                (WeaponType::Wand, "Brute", 97.0),
                (WeaponType::Wand, "Mage", 100.0),
            ],
            10.0,
        );
        let suggestions = run(&report);
        let categories: Vec<Axis> = suggestions.iter().map(|s| s.category).collect();
        assert_eq!(categories.len(), 2);
        assert!(categories.contains(&Axis::WinRate));
        assert!(categories.contains(&Axis::EnemyVariance));
        let win = suggestions
            .iter()
            .find(|s| s.category == Axis::WinRate)
            .expect("win rate suggestion");
        assert_eq!(win.parameter, "enemy.globalMultipliers.health");
        assert!(win.suggested_value > win.current_value);
    }

    #[test]
    fn weapon_spread_targets_the_strongest_weapon() {
        let report = report(
            &[
                (WeaponType::Sword, "Brute", 95.0),
                (WeaponType::Dagger, "Brute", 75.0),
                (WeaponType::Sword, "Mage", 97.0),
                (WeaponType::Dagger, "Mage", 80.0),
            ],
            10.0,
        );
        let suggestions = run(&report);
        let spread = suggestions
            .iter()
            .find(|s| s.category == Axis::WeaponVariance)
            .expect("weapon spread suggestion");
        assert_eq!(spread.parameter, "weapons.Sword.damage");
        assert!(spread.suggested_value < spread.current_value);
        assert_eq!(spread.affected_matchups.len(), 2);
    }

    #[test]
    fn ids_are_stable_and_order_is_by_priority() {
        let report = report(
            &[
                (WeaponType::Sword, "Brute", 40.0),
                (WeaponType::Sword, "Mage", 45.0),
            ],
            30.0,
        );
        let first = run(&report);
        let second = run(&report);
        assert_eq!(first, second);
        assert!(first.windows(2).all(|pair| pair[0].priority <= pair[1].priority));
        assert!(first.iter().all(|s| s.id.starts_with("sg-")));
    }

    #[test]
    fn balanced_report_yields_nothing() {
        let report = report(
            &[
                (WeaponType::Sword, "Brute", 88.0),
                (WeaponType::Sword, "Mage", 94.0),
                (WeaponType::Dagger, "Brute", 86.0),
                (WeaponType::Dagger, "Mage", 92.0),
            ],
            10.0,
        );
        assert!(run(&report).is_empty());
    }

    #[test]
    fn priority_thresholds() {
        assert_eq!(Priority::from_severity(2.5), Priority::Critical);
        assert_eq!(Priority::from_severity(1.0), Priority::High);
        assert_eq!(Priority::from_severity(0.6), Priority::Medium);
        assert_eq!(Priority::from_severity(0.1), Priority::Low);
        assert!(Priority::Critical < Priority::Low);
    }
}
