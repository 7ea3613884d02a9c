use colored::{ColoredString, Colorize};
use std::io::{self, Write};

use dungeon_balance::{
    AxisStatus, BalanceAnalysis, BaselineComparison, ErrorEnvelope, LoopPhase, LoopState,
    MatchupStatus, Patch, PatchMetadata, QualityLabel, QualityScore, RarityDistribution, Rarity,
    RiskLevel, Snapshot, TuningConfig, ValidationReport, Verdict, WhatIfResult,
};

use super::{ChangeReport, ConsoleReport, PatchListing, SuggestionReport, SweepReport};

fn heading(out: &mut dyn Write, title: &str) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", title.bright_cyan().bold())?;
    writeln!(out, "{}", "=".repeat(title.chars().count()).cyan())
}

fn label(label: QualityLabel) -> ColoredString {
    let text = label.to_string();
    match label {
        QualityLabel::Excellent => text.bright_green().bold(),
        QualityLabel::Good => text.green(),
        QualityLabel::Fair => text.yellow(),
        QualityLabel::Poor => text.red(),
        QualityLabel::Critical => text.bright_red().bold(),
    }
}

fn signed(value: f64, unit: &str) -> ColoredString {
    let text = format!("{value:+.1}{unit}");
    if value > 0.0 {
        text.green()
    } else if value < 0.0 {
        text.red()
    } else {
        text.normal()
    }
}

pub fn write_error(out: &mut dyn Write, envelope: &ErrorEnvelope) -> io::Result<()> {
    writeln!(out, "{} {}", "❌ error:".red().bold(), envelope.error)?;
    if let Some(detail) = &envelope.detail {
        writeln!(out, "   {detail}")?;
    }
    Ok(())
}

impl ConsoleReport for QualityScore {
    fn write_console(&self, out: &mut dyn Write) -> io::Result<()> {
        heading(out, "🎯 Balance Quality")?;
        writeln!(out, "Overall: {:.1} ({})", self.overall, label(self.label))?;
        for axis in &self.axes {
            let status = match axis.status {
                AxisStatus::InRange => "in range".green(),
                AxisStatus::TooLow => "too low".yellow(),
                AxisStatus::TooHigh => "too high".yellow(),
            };
            writeln!(
                out,
                "  {:<22} {:>7.2}  target {:<12} score {:>5.1}  {status}",
                axis.axis.label(),
                axis.value,
                axis.band.to_string(),
                axis.score
            )?;
        }
        Ok(())
    }
}

impl ConsoleReport for Snapshot {
    fn write_console(&self, out: &mut dyn Write) -> io::Result<()> {
        let report = &self.report;
        heading(out, "⚔️  Battle Simulation")?;
        writeln!(
            out,
            "Battles: {} ({} per combination, player level {}, enemy level {}, seed {})",
            report.overall.total_battles,
            report.request.battles_per_combination,
            report.request.player_level,
            report.request.enemy_level,
            report.seed
        )?;
        if report.cancelled {
            writeln!(out, "{}", "⚠️  Cancelled: partial results".yellow())?;
        }
        writeln!(
            out,
            "Win rate: {:.1}%  Average turns: {:.1}  Timeouts: {}",
            report.overall.win_rate, report.overall.average_turns, report.overall.timeouts
        )?;

        writeln!(out)?;
        write!(out, "{:<10}", "")?;
        for enemy in &report.request.archetypes {
            write!(out, "{enemy:>11}")?;
        }
        writeln!(out)?;
        for weapon in &report.request.weapons {
            write!(out, "{:<10}", weapon.to_string())?;
            for enemy in &report.request.archetypes {
                let cell = report
                    .combinations
                    .iter()
                    .find(|c| c.weapon == *weapon && &c.enemy == enemy)
                    .map_or_else(|| "-".to_string(), |c| format!("{:.1}%", c.statistics.win_rate));
                write!(out, "{cell:>11}")?;
            }
            writeln!(out)?;
        }
        self.score.write_console(out)
    }
}

impl ConsoleReport for BalanceAnalysis {
    fn write_console(&self, out: &mut dyn Write) -> io::Result<()> {
        heading(out, "🔎 Balance Analysis")?;
        writeln!(
            out,
            "Win rate {:.1}%, {:.1} turns, weapon spread {:.1} pts, enemy spread {:.1} pts",
            self.metrics.win_rate,
            self.metrics.average_turns,
            self.metrics.weapon_spread,
            self.metrics.enemy_spread
        )?;
        if let (Some(strong), Some(weak)) = (self.strongest_weapon, self.weakest_weapon) {
            writeln!(
                out,
                "Strongest weapon: {}  Weakest: {}",
                strong.to_string().green(),
                weak.to_string().red()
            )?;
        }
        if let (Some(hard), Some(easy)) = (&self.hardest_enemy, &self.easiest_enemy) {
            writeln!(out, "Hardest enemy: {}  Easiest: {}", hard.red(), easy.green())?;
        }
        writeln!(
            out,
            "Engagement: variety {:.1}%, {:.2} lead changes/battle, comebacks {:.1}%, close calls {:.1}%",
            self.engagement.action_variety,
            self.engagement.lead_changes_per_battle,
            self.engagement.comeback_rate,
            self.engagement.close_call_rate
        )?;

        let flagged: Vec<_> = self
            .matchups
            .iter()
            .filter(|m| m.status != MatchupStatus::Good)
            .collect();
        if !flagged.is_empty() {
            writeln!(out)?;
            writeln!(out, "{}", "Flagged matchups:".bold())?;
            for matchup in flagged {
                let marker = match matchup.status {
                    MatchupStatus::Critical => "🔴".normal(),
                    _ => "🟡".normal(),
                };
                writeln!(
                    out,
                    "  {marker} {} vs {}: {:.1}% over {:.1} turns",
                    matchup.weapon, matchup.enemy, matchup.win_rate, matchup.average_turns
                )?;
            }
        }
        if !self.issues.is_empty() {
            writeln!(out)?;
            writeln!(out, "{}", "Issues:".bold())?;
            for issue in &self.issues {
                writeln!(out, "  • {}", issue.red())?;
            }
        }
        if !self.recommendations.is_empty() {
            writeln!(out)?;
            writeln!(out, "{}", "Recommendations:".bold())?;
            for item in &self.recommendations {
                writeln!(out, "  • {item}")?;
            }
        }
        Ok(())
    }
}

impl ConsoleReport for ValidationReport {
    fn write_console(&self, out: &mut dyn Write) -> io::Result<()> {
        heading(out, "✅ Balance Validation")?;
        let status = if self.valid {
            "✅ VALID".green()
        } else {
            "❌ INVALID".red()
        };
        writeln!(
            out,
            "{status}  {}/{} checks passed",
            self.passed_checks, self.total_checks
        )?;
        for error in &self.errors {
            writeln!(out, "  {} {}", "error:".red().bold(), error)?;
        }
        for warning in &self.warnings {
            writeln!(out, "  {} {}", "warning:".yellow(), warning)?;
        }
        Ok(())
    }
}

impl ConsoleReport for SuggestionReport {
    fn write_console(&self, out: &mut dyn Write) -> io::Result<()> {
        heading(out, "🛠️  Tuning Suggestions")?;
        writeln!(
            out,
            "Seed {}: win rate {:.1}%, quality {:.1}",
            self.seed, self.win_rate, self.quality_score
        )?;
        if self.suggestions.is_empty() {
            writeln!(out, "{}", "No deviations: nothing to suggest.".green())?;
            return Ok(());
        }
        for suggestion in &self.suggestions {
            writeln!(out)?;
            writeln!(
                out,
                "[{}] {} {}",
                suggestion.priority.to_string().bold(),
                suggestion.id.dimmed(),
                suggestion.category
            )?;
            writeln!(
                out,
                "   {}: {:.4} -> {:.4} ({})",
                suggestion.parameter,
                suggestion.current_value,
                suggestion.suggested_value,
                signed(suggestion.change_percent(), "%")
            )?;
            writeln!(out, "   {}", suggestion.reason)?;
            writeln!(out, "   Expected: {}", suggestion.expected_impact)?;
        }
        Ok(())
    }
}

impl ConsoleReport for ChangeReport {
    fn write_console(&self, out: &mut dyn Write) -> io::Result<()> {
        if self.changes.is_empty() {
            writeln!(out, "No parameters changed.")?;
        }
        for change in &self.changes {
            writeln!(
                out,
                "✏️  {}: {:.4} -> {}",
                change.parameter,
                change.old_value,
                format!("{:.4}", change.new_value).bold()
            )?;
        }
        if let Some(path) = &self.saved_to {
            writeln!(out, "💾 Saved configuration to {}", path.display())?;
        }
        Ok(())
    }
}

impl ConsoleReport for BaselineComparison {
    fn write_console(&self, out: &mut dyn Write) -> io::Result<()> {
        heading(out, "📈 Baseline Comparison")?;
        writeln!(
            out,
            "Win rate: {:.1}% -> {:.1}% ({})",
            self.baseline_win_rate,
            self.current_win_rate,
            signed(self.win_rate_change, " pts")
        )?;
        writeln!(
            out,
            "Turns:    {:.1} -> {:.1} ({:+.1})",
            self.baseline_turns, self.current_turns, self.turns_change
        )?;
        writeln!(
            out,
            "Quality:  {:.1} ({}) -> {:.1} ({}) ({})",
            self.baseline_score,
            label(self.baseline_label),
            self.current_score,
            label(self.current_label),
            signed(self.score_change, "")
        )?;
        if !self.significant_changes.is_empty() {
            writeln!(out)?;
            writeln!(out, "{}", "Significant matchup changes:".bold())?;
            for delta in &self.significant_changes {
                writeln!(
                    out,
                    "  {} vs {}: {:.1}% -> {:.1}% ({})",
                    delta.weapon,
                    delta.enemy,
                    delta.baseline_win_rate,
                    delta.current_win_rate,
                    signed(delta.change, " pts")
                )?;
            }
        }
        Ok(())
    }
}

impl ConsoleReport for SweepReport {
    fn write_console(&self, out: &mut dyn Write) -> io::Result<()> {
        let result = &self.result;
        heading(out, "📊 Parameter Sensitivity")?;
        writeln!(
            out,
            "{}: current {:.4}, range {:.4} to {:.4}",
            result.parameter.bold(),
            result.original_value,
            result.min_value,
            result.max_value
        )?;
        if result.cancelled {
            writeln!(out, "{}", "⚠️  Cancelled: partial sweep".yellow())?;
        }
        for point in &result.points {
            let marker = if (point.value - result.optimal_value).abs() < f64::EPSILON {
                "★".yellow()
            } else {
                " ".normal()
            };
            writeln!(
                out,
                " {marker} {:>10.4}  win {:>5.1}%  turns {:>5.1}  quality {:>5.1} ({})",
                point.value,
                point.statistics.win_rate,
                point.statistics.average_turns,
                point.quality_score,
                label(point.label)
            )?;
        }
        for value in &result.skipped {
            writeln!(out, "   {value:>10.4}  {}", "rejected by configuration".dimmed())?;
        }
        writeln!(
            out,
            "Sensitivity: {:.3} ({})",
            result.sensitivity_score, result.level
        )?;
        writeln!(out, "{}", result.recommendation)?;
        if let Some(change) = &self.applied {
            writeln!(
                out,
                "✏️  Applied optimum {}: {:.4} -> {:.4}",
                change.parameter, change.old_value, change.new_value
            )?;
        }
        Ok(())
    }
}

impl ConsoleReport for WhatIfResult {
    fn write_console(&self, out: &mut dyn Write) -> io::Result<()> {
        heading(out, "🧪 What-If")?;
        writeln!(
            out,
            "{}: {:.4} -> {:.4}",
            self.parameter.bold(),
            self.current_value,
            self.candidate_value
        )?;
        writeln!(
            out,
            "Quality:  {:.1} ({}) -> {:.1} ({}) ({})",
            self.quality_before,
            label(self.label_before),
            self.quality_after,
            label(self.label_after),
            signed(self.quality_change, "")
        )?;
        writeln!(
            out,
            "Win rate: {:.1}% -> {:.1}% ({})",
            self.win_rate_before,
            self.win_rate_after,
            signed(self.win_rate_change, " pts")
        )?;
        writeln!(
            out,
            "Turns {:+.2}, player damage {:+.2}, enemy damage {:+.2}",
            self.duration_change, self.player_damage_change, self.enemy_damage_change
        )?;
        let risk = match self.risk {
            RiskLevel::Low => self.risk.to_string().green(),
            RiskLevel::Medium => self.risk.to_string().yellow(),
            RiskLevel::High => self.risk.to_string().red(),
        };
        writeln!(out, "Risk: {risk}")?;
        let verdict = match self.verdict {
            Verdict::Recommended => self.recommendation.green(),
            Verdict::Neutral => self.recommendation.normal(),
            Verdict::NotRecommended => self.recommendation.red(),
        };
        writeln!(out, "{verdict}")?;
        if self.persisted {
            writeln!(out, "💾 Candidate kept in the live configuration")?;
        }
        Ok(())
    }
}

impl ConsoleReport for PatchMetadata {
    fn write_console(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(
            out,
            "📦 {} v{} [{}]",
            self.name.bold(),
            self.version,
            self.patch_id.dimmed()
        )?;
        writeln!(
            out,
            "   by {} on {}",
            self.author,
            self.created_date.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        if !self.description.is_empty() {
            writeln!(out, "   {}", self.description)?;
        }
        if !self.tags.is_empty() {
            writeln!(out, "   tags: {}", self.tags.join(", "))?;
        }
        if let Some(results) = &self.test_results {
            writeln!(
                out,
                "   tested: {} battles, win rate {:.1}%, {:.1} turns, quality {:.1}",
                results.battles_tested,
                results.average_win_rate,
                results.average_turns,
                results.quality_score
            )?;
        }
        Ok(())
    }
}

impl ConsoleReport for PatchListing {
    fn write_console(&self, out: &mut dyn Write) -> io::Result<()> {
        heading(out, "📦 Patches")?;
        if self.0.is_empty() {
            writeln!(out, "No patches saved yet.")?;
        }
        for metadata in &self.0 {
            metadata.write_console(out)?;
        }
        Ok(())
    }
}

impl ConsoleReport for Patch {
    fn write_console(&self, out: &mut dyn Write) -> io::Result<()> {
        self.metadata.write_console(out)?;
        writeln!(
            out,
            "   compatible with game version {}",
            self.metadata.compatible_game_version
        )?;
        self.config.write_console(out)
    }
}

impl ConsoleReport for TuningConfig {
    fn write_console(&self, out: &mut dyn Write) -> io::Result<()> {
        heading(out, "⚙️  Tuning Configuration")?;
        for (path, value) in self.parameters() {
            writeln!(out, "  {path:<48} {value:>10.4}")?;
        }
        Ok(())
    }
}

impl ConsoleReport for LoopState {
    fn write_console(&self, out: &mut dyn Write) -> io::Result<()> {
        heading(out, "🔁 Tuning Loop")?;
        writeln!(
            out,
            "Target {:.1}% ± {:.1}, {} of {} iterations used",
            self.target_win_rate, self.tolerance, self.iteration, self.max_iterations
        )?;
        if let Some(analysis) = &self.analysis {
            writeln!(
                out,
                "Analysis: win rate {:.1}%, quality {:.1} ({})",
                analysis.statistics.win_rate,
                analysis.score.overall,
                label(analysis.score.label)
            )?;
        }
        for record in &self.iterations {
            let change = record.action.as_ref().map_or_else(String::new, |action| {
                format!(
                    "{} {:.4} -> {:.4}",
                    action.change.parameter, action.change.old_value, action.change.new_value
                )
            });
            let tested = record.testing.as_ref().map_or_else(
                || "not tested".to_string(),
                |t| format!("win rate {:.1}%", t.statistics.win_rate),
            );
            let mark = if record.within_tolerance { "🎯" } else { "  " };
            writeln!(out, " {mark} #{}: {change}; {tested}", record.iteration)?;
        }
        if let Some(smoke) = &self.gameplay {
            let failed = smoke.steps.iter().filter(|s| !s.passed).count();
            writeln!(
                out,
                "Smoke check: {}/{} steps passed",
                smoke.steps.len() - failed,
                smoke.steps.len()
            )?;
        }
        if let Some(patch) = &self.saved_patch {
            writeln!(out, "💾 Saved patch {} ({})", patch.name.bold(), patch.patch_id)?;
        }
        match (&self.phase, &self.failure) {
            (LoopPhase::Failed, Some(failure)) => writeln!(
                out,
                "{} during {}: {}",
                "❌ Failed".red().bold(),
                failure.phase,
                failure.message
            ),
            _ if self.converged => writeln!(out, "{}", "✅ Converged".green().bold()),
            _ => writeln!(
                out,
                "{}",
                "⚠️  Finished without reaching the target".yellow()
            ),
        }
    }
}

impl ConsoleReport for RarityDistribution {
    fn write_console(&self, out: &mut dyn Write) -> io::Result<()> {
        heading(out, "💎 Rarity Distribution")?;
        writeln!(
            out,
            "{} drops, magic find {:.0}, {} promotions",
            self.samples, self.magic_find, self.promotions
        )?;
        for rarity in Rarity::ALL {
            let base = self.base.get(&rarity).copied().unwrap_or(0);
            let upgraded = self.upgraded.get(&rarity).copied().unwrap_or(0);
            writeln!(
                out,
                "  {:<13} base {base:>7}  final {upgraded:>7}  {:>6.2}%",
                rarity.to_string(),
                self.percentage(rarity)
            )?;
        }
        Ok(())
    }
}
