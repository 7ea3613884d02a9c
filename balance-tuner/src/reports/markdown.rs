use std::io::{self, Write};

use dungeon_balance::{
    BalanceAnalysis, BaselineComparison, ErrorEnvelope, LoopState, Patch, PatchMetadata,
    QualityScore, Rarity, RarityDistribution, Snapshot, TuningConfig, ValidationReport,
    WhatIfResult,
};

use super::{ChangeReport, MarkdownReport, PatchListing, SuggestionReport, SweepReport};

pub fn write_error(out: &mut dyn Write, envelope: &ErrorEnvelope) -> io::Result<()> {
    writeln!(out, "# Error\n")?;
    writeln!(out, "- **Kind**: {:?}", envelope.kind)?;
    writeln!(out, "- **Message**: {}", envelope.error)?;
    if let Some(detail) = &envelope.detail {
        writeln!(out, "- **Detail**: {detail}")?;
    }
    Ok(())
}

fn score_table(out: &mut dyn Write, score: &QualityScore) -> io::Result<()> {
    writeln!(out, "| Axis | Value | Target | Status | Score |")?;
    writeln!(out, "|------|------:|--------|--------|------:|")?;
    for axis in &score.axes {
        writeln!(
            out,
            "| {} | {:.2} | {} | {:?} | {:.1} |",
            axis.axis.label(),
            axis.value,
            axis.band,
            axis.status,
            axis.score
        )?;
    }
    writeln!(out)
}

impl MarkdownReport for QualityScore {
    fn write_markdown(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "# Balance Quality\n")?;
        writeln!(out, "**Overall**: {:.1} ({})\n", self.overall, self.label)?;
        score_table(out, self)
    }
}

impl MarkdownReport for Snapshot {
    fn write_markdown(&self, out: &mut dyn Write) -> io::Result<()> {
        let report = &self.report;
        writeln!(out, "# Battle Simulation\n")?;
        writeln!(out, "- **Seed**: {}", report.seed)?;
        writeln!(out, "- **Battles**: {}", report.overall.total_battles)?;
        writeln!(out, "- **Win rate**: {:.1}%", report.overall.win_rate)?;
        writeln!(out, "- **Average turns**: {:.1}", report.overall.average_turns)?;
        if report.cancelled {
            writeln!(out, "- **Cancelled**: partial results")?;
        }
        writeln!(out, "- **Quality**: {:.1} ({})\n", self.score.overall, self.score.label)?;

        writeln!(out, "## Matchups\n")?;
        writeln!(out, "| Weapon | Enemy | Win rate | Turns | Timeouts |")?;
        writeln!(out, "|--------|-------|---------:|------:|---------:|")?;
        for combination in &report.combinations {
            writeln!(
                out,
                "| {} | {} | {:.1}% | {:.1} | {} |",
                combination.weapon,
                combination.enemy,
                combination.statistics.win_rate,
                combination.statistics.average_turns,
                combination.statistics.timeouts
            )?;
        }
        writeln!(out)?;
        writeln!(out, "## Quality\n")?;
        score_table(out, &self.score)
    }
}

impl MarkdownReport for BalanceAnalysis {
    fn write_markdown(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "# Balance Analysis\n")?;
        writeln!(out, "- **Win rate**: {:.1}%", self.metrics.win_rate)?;
        writeln!(out, "- **Average turns**: {:.1}", self.metrics.average_turns)?;
        writeln!(out, "- **Weapon spread**: {:.1} pts", self.metrics.weapon_spread)?;
        writeln!(out, "- **Enemy spread**: {:.1} pts", self.metrics.enemy_spread)?;
        if let Some(weapon) = self.strongest_weapon {
            writeln!(out, "- **Strongest weapon**: {weapon}")?;
        }
        if let Some(enemy) = &self.hardest_enemy {
            writeln!(out, "- **Hardest enemy**: {enemy}")?;
        }
        writeln!(out)?;
        writeln!(out, "| Weapon | Enemy | Win rate | Turns | Status |")?;
        writeln!(out, "|--------|-------|---------:|------:|--------|")?;
        for matchup in &self.matchups {
            writeln!(
                out,
                "| {} | {} | {:.1}% | {:.1} | {:?} |",
                matchup.weapon,
                matchup.enemy,
                matchup.win_rate,
                matchup.average_turns,
                matchup.status
            )?;
        }
        writeln!(out)?;
        if !self.issues.is_empty() {
            writeln!(out, "## Issues\n")?;
            for issue in &self.issues {
                writeln!(out, "- {issue}")?;
            }
            writeln!(out)?;
        }
        if !self.recommendations.is_empty() {
            writeln!(out, "## Recommendations\n")?;
            for item in &self.recommendations {
                writeln!(out, "- {item}")?;
            }
        }
        Ok(())
    }
}

impl MarkdownReport for ValidationReport {
    fn write_markdown(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "# Balance Validation\n")?;
        let status = if self.valid { "✅ Valid" } else { "❌ Invalid" };
        writeln!(out, "- **Status**: {status}")?;
        writeln!(
            out,
            "- **Checks passed**: {}/{}\n",
            self.passed_checks, self.total_checks
        )?;
        if !self.errors.is_empty() {
            writeln!(out, "## Errors\n")?;
            for error in &self.errors {
                writeln!(out, "- {error}")?;
            }
            writeln!(out)?;
        }
        if !self.warnings.is_empty() {
            writeln!(out, "## Warnings\n")?;
            for warning in &self.warnings {
                writeln!(out, "- {warning}")?;
            }
        }
        Ok(())
    }
}

impl MarkdownReport for SuggestionReport {
    fn write_markdown(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "# Tuning Suggestions\n")?;
        writeln!(
            out,
            "Seed {}, win rate {:.1}%, quality {:.1}.\n",
            self.seed, self.win_rate, self.quality_score
        )?;
        if self.suggestions.is_empty() {
            return writeln!(out, "_No deviations._");
        }
        writeln!(out, "| Id | Priority | Axis | Parameter | Current | Suggested | Change |")?;
        writeln!(out, "|----|----------|------|-----------|--------:|----------:|-------:|")?;
        for s in &self.suggestions {
            writeln!(
                out,
                "| `{}` | {} | {} | `{}` | {:.4} | {:.4} | {:+.1}% |",
                s.id,
                s.priority,
                s.category,
                s.parameter,
                s.current_value,
                s.suggested_value,
                s.change_percent()
            )?;
        }
        writeln!(out)?;
        for s in &self.suggestions {
            writeln!(out, "- `{}`: {} {}", s.id, s.reason, s.expected_impact)?;
        }
        Ok(())
    }
}

impl MarkdownReport for ChangeReport {
    fn write_markdown(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "# Parameter Changes\n")?;
        if self.changes.is_empty() {
            writeln!(out, "_No parameters changed._")?;
        } else {
            writeln!(out, "| Parameter | Old | New |")?;
            writeln!(out, "|-----------|----:|----:|")?;
            for change in &self.changes {
                writeln!(
                    out,
                    "| `{}` | {:.4} | {:.4} |",
                    change.parameter, change.old_value, change.new_value
                )?;
            }
        }
        if let Some(path) = &self.saved_to {
            writeln!(out, "\nSaved to `{}`.", path.display())?;
        }
        Ok(())
    }
}

impl MarkdownReport for BaselineComparison {
    fn write_markdown(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "# Baseline Comparison\n")?;
        writeln!(out, "| Metric | Baseline | Current | Change |")?;
        writeln!(out, "|--------|---------:|--------:|-------:|")?;
        writeln!(
            out,
            "| Win rate | {:.1}% | {:.1}% | {:+.1} |",
            self.baseline_win_rate, self.current_win_rate, self.win_rate_change
        )?;
        writeln!(
            out,
            "| Turns | {:.1} | {:.1} | {:+.1} |",
            self.baseline_turns, self.current_turns, self.turns_change
        )?;
        writeln!(
            out,
            "| Quality | {:.1} ({}) | {:.1} ({}) | {:+.1} |\n",
            self.baseline_score,
            self.baseline_label,
            self.current_score,
            self.current_label,
            self.score_change
        )?;
        if !self.significant_changes.is_empty() {
            writeln!(out, "## Significant Matchup Changes\n")?;
            for delta in &self.significant_changes {
                writeln!(
                    out,
                    "- {} vs {}: {:.1}% -> {:.1}% ({:+.1})",
                    delta.weapon,
                    delta.enemy,
                    delta.baseline_win_rate,
                    delta.current_win_rate,
                    delta.change
                )?;
            }
        }
        Ok(())
    }
}

impl MarkdownReport for SweepReport {
    fn write_markdown(&self, out: &mut dyn Write) -> io::Result<()> {
        let result = &self.result;
        writeln!(out, "# Parameter Sensitivity: `{}`\n", result.parameter)?;
        writeln!(out, "- **Current value**: {:.4}", result.original_value)?;
        writeln!(
            out,
            "- **Optimal value**: {:.4} (quality {:.1})",
            result.optimal_value, result.optimal_score
        )?;
        writeln!(
            out,
            "- **Sensitivity**: {:.3} ({})\n",
            result.sensitivity_score, result.level
        )?;
        writeln!(out, "| Value | Win rate | Turns | Quality |")?;
        writeln!(out, "|------:|---------:|------:|--------:|")?;
        for point in &result.points {
            writeln!(
                out,
                "| {:.4} | {:.1}% | {:.1} | {:.1} ({}) |",
                point.value,
                point.statistics.win_rate,
                point.statistics.average_turns,
                point.quality_score,
                point.label
            )?;
        }
        writeln!(out, "\n{}", result.recommendation)?;
        if let Some(change) = &self.applied {
            writeln!(
                out,
                "\nApplied `{}`: {:.4} -> {:.4}.",
                change.parameter, change.old_value, change.new_value
            )?;
        }
        Ok(())
    }
}

impl MarkdownReport for WhatIfResult {
    fn write_markdown(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "# What-If: `{}`\n", self.parameter)?;
        writeln!(out, "| Metric | Before | After | Change |")?;
        writeln!(out, "|--------|-------:|------:|-------:|")?;
        writeln!(
            out,
            "| Value | {:.4} | {:.4} | |",
            self.current_value, self.candidate_value
        )?;
        writeln!(
            out,
            "| Quality | {:.1} ({}) | {:.1} ({}) | {:+.1} |",
            self.quality_before,
            self.label_before,
            self.quality_after,
            self.label_after,
            self.quality_change
        )?;
        writeln!(
            out,
            "| Win rate | {:.1}% | {:.1}% | {:+.1} |\n",
            self.win_rate_before, self.win_rate_after, self.win_rate_change
        )?;
        writeln!(out, "- **Risk**: {}", self.risk)?;
        writeln!(out, "- **Kept**: {}", self.persisted)?;
        writeln!(out, "\n{}", self.recommendation)
    }
}

fn patch_section(out: &mut dyn Write, metadata: &PatchMetadata) -> io::Result<()> {
    writeln!(out, "## {} v{}\n", metadata.name, metadata.version)?;
    writeln!(out, "- **Id**: `{}`", metadata.patch_id)?;
    writeln!(out, "- **Author**: {}", metadata.author)?;
    writeln!(out, "- **Created**: {}", metadata.created_date.to_rfc3339())?;
    if !metadata.description.is_empty() {
        writeln!(out, "- **Description**: {}", metadata.description)?;
    }
    if !metadata.tags.is_empty() {
        writeln!(out, "- **Tags**: {}", metadata.tags.join(", "))?;
    }
    if let Some(results) = &metadata.test_results {
        writeln!(
            out,
            "- **Tested**: {} battles, {:.1}% win rate, quality {:.1}",
            results.battles_tested, results.average_win_rate, results.quality_score
        )?;
    }
    writeln!(out)
}

impl MarkdownReport for PatchMetadata {
    fn write_markdown(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "# Patch\n")?;
        patch_section(out, self)
    }
}

impl MarkdownReport for PatchListing {
    fn write_markdown(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "# Patches\n")?;
        if self.0.is_empty() {
            return writeln!(out, "_No patches saved yet._");
        }
        for metadata in &self.0 {
            patch_section(out, metadata)?;
        }
        Ok(())
    }
}

impl MarkdownReport for Patch {
    fn write_markdown(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "# Patch\n")?;
        patch_section(out, &self.metadata)?;
        config_table(out, &self.config)
    }
}

fn config_table(out: &mut dyn Write, config: &TuningConfig) -> io::Result<()> {
    writeln!(out, "| Parameter | Value |")?;
    writeln!(out, "|-----------|------:|")?;
    for (path, value) in config.parameters() {
        writeln!(out, "| `{path}` | {value:.4} |")?;
    }
    Ok(())
}

impl MarkdownReport for TuningConfig {
    fn write_markdown(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "# Tuning Configuration\n")?;
        config_table(out, self)
    }
}

impl MarkdownReport for LoopState {
    fn write_markdown(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "# Tuning Loop\n")?;
        writeln!(out, "- **Phase**: {}", self.phase)?;
        writeln!(
            out,
            "- **Target**: {:.1}% ± {:.1}",
            self.target_win_rate, self.tolerance
        )?;
        writeln!(
            out,
            "- **Iterations**: {}/{}",
            self.iteration, self.max_iterations
        )?;
        writeln!(out, "- **Converged**: {}", self.converged)?;
        if let Some(failure) = &self.failure {
            writeln!(out, "- **Failed during**: {} ({})", failure.phase, failure.message)?;
        }
        if let Some(patch) = &self.saved_patch {
            writeln!(out, "- **Saved patch**: {} (`{}`)", patch.name, patch.patch_id)?;
        }
        writeln!(out)?;
        if !self.iterations.is_empty() {
            writeln!(out, "| # | Parameter | Old | New | Win rate |")?;
            writeln!(out, "|--:|-----------|----:|----:|---------:|")?;
            for record in &self.iterations {
                let (parameter, old, new) = record.action.as_ref().map_or(
                    (String::new(), String::new(), String::new()),
                    |action| {
                        (
                            format!("`{}`", action.change.parameter),
                            format!("{:.4}", action.change.old_value),
                            format!("{:.4}", action.change.new_value),
                        )
                    },
                );
                let win_rate = record
                    .testing
                    .as_ref()
                    .map_or_else(String::new, |t| format!("{:.1}%", t.statistics.win_rate));
                writeln!(
                    out,
                    "| {} | {parameter} | {old} | {new} | {win_rate} |",
                    record.iteration
                )?;
            }
            writeln!(out)?;
        }
        writeln!(out, "## Log\n")?;
        for line in &self.log {
            writeln!(out, "- {line}")?;
        }
        Ok(())
    }
}

impl MarkdownReport for RarityDistribution {
    fn write_markdown(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "# Rarity Distribution\n")?;
        writeln!(
            out,
            "{} drops at magic find {:.0}; {} promotions.\n",
            self.samples, self.magic_find, self.promotions
        )?;
        writeln!(out, "| Rarity | Base | Final | Share |")?;
        writeln!(out, "|--------|-----:|------:|------:|")?;
        for rarity in Rarity::ALL {
            writeln!(
                out,
                "| {rarity} | {} | {} | {:.2}% |",
                self.base.get(&rarity).copied().unwrap_or(0),
                self.upgraded.get(&rarity).copied().unwrap_or(0),
                self.percentage(rarity)
            )?;
        }
        Ok(())
    }
}
