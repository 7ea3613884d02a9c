//! Report rendering for every command.
//!
//! Each payload renders as a colored console summary, a markdown document or
//! pretty JSON, selected with `--report`.
mod console;
mod json;
mod markdown;

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;

use dungeon_balance::{
    ConfigError, EngineError, ErrorEnvelope, ErrorKind, ParameterChange, PatchMetadata,
    SensitivityResult, TuningSuggestion,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Colored human-readable summary
    Console,
    /// Pretty-printed JSON
    Json,
    /// Markdown document
    Markdown,
}

pub trait ConsoleReport {
    fn write_console(&self, out: &mut dyn Write) -> io::Result<()>;
}

pub trait MarkdownReport {
    fn write_markdown(&self, out: &mut dyn Write) -> io::Result<()>;
}

/// Suggestions together with the run they were generated from.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionReport {
    pub seed: u64,
    pub win_rate: f64,
    pub quality_score: f64,
    pub suggestions: Vec<TuningSuggestion>,
}

/// Parameter writes performed by a command.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeReport {
    pub changes: Vec<ParameterChange>,
    pub saved_to: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub result: SensitivityResult,
    pub applied: Option<ParameterChange>,
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct PatchListing(pub Vec<PatchMetadata>);

pub fn write_report<R>(out: &mut dyn Write, format: ReportFormat, report: &R) -> Result<()>
where
    R: Serialize + ConsoleReport + MarkdownReport + ?Sized,
{
    match format {
        ReportFormat::Console => report.write_console(out)?,
        ReportFormat::Markdown => report.write_markdown(out)?,
        ReportFormat::Json => json::write_json(out, report)?,
    }
    Ok(())
}

/// Envelope for any command failure. Errors raised outside the engine are
/// argument or input problems unless an I/O error caused them.
pub fn error_envelope(err: &anyhow::Error) -> ErrorEnvelope {
    if let Some(engine) = err.downcast_ref::<EngineError>() {
        return engine.envelope();
    }
    if let Some(config) = err.downcast_ref::<ConfigError>() {
        return EngineError::from(config.clone()).envelope();
    }
    let kind = if err.chain().any(|cause| cause.is::<io::Error>()) {
        ErrorKind::ComputationFailure
    } else {
        ErrorKind::ValidationError
    };
    ErrorEnvelope {
        error: format!("{err:#}"),
        kind,
        detail: None,
    }
}

/// Render a command failure in the selected format.
pub fn write_error(out: &mut dyn Write, format: ReportFormat, err: &anyhow::Error) -> Result<()> {
    let envelope = error_envelope(err);
    match format {
        ReportFormat::Json => json::write_json(out, &envelope)?,
        ReportFormat::Console => console::write_error(out, &envelope)?,
        ReportFormat::Markdown => markdown::write_error(out, &envelope)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dungeon_balance::TuningConfig;

    fn render<R>(format: ReportFormat, report: &R) -> String
    where
        R: Serialize + ConsoleReport + MarkdownReport + ?Sized,
    {
        let mut buffer = Vec::new();
        write_report(&mut buffer, format, report).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn json_errors_use_the_envelope_shape() {
        let mut buffer = Vec::new();
        let err = anyhow::Error::from(EngineError::not_found("patch", "missing"));
        write_error(&mut buffer, ReportFormat::Json, &err).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(value["kind"], "not_found");
        assert!(value["error"].as_str().unwrap().contains("missing"));
    }

    #[test]
    fn argument_errors_are_validation_errors() {
        let err = anyhow::anyhow!("expected KEY=NUMBER, got 'speed'");
        let envelope = error_envelope(&err);
        assert_eq!(envelope.kind, ErrorKind::ValidationError);
        assert!(envelope.error.contains("KEY=NUMBER"));

        let parse: ConfigError = "luck".parse::<dungeon_balance::GlobalStat>().unwrap_err();
        let envelope = error_envelope(&anyhow::Error::from(parse));
        assert_eq!(envelope.kind, ErrorKind::ValidationError);
        assert!(envelope.detail.is_some());
    }

    #[test]
    fn unreadable_inputs_are_computation_failures() {
        let err = anyhow::Error::from(io::Error::new(io::ErrorKind::NotFound, "gone"))
            .context("failed to read targets from targets.json");
        assert_eq!(error_envelope(&err).kind, ErrorKind::ComputationFailure);
    }

    #[test]
    fn configuration_renders_in_every_format() {
        let config = TuningConfig::default();
        let console = render(ReportFormat::Console, &config);
        assert!(console.contains("weapons.globalDamageMultiplier"));
        let markdown = render(ReportFormat::Markdown, &config);
        assert!(markdown.starts_with("# Tuning Configuration"));
        let json: serde_json::Value =
            serde_json::from_str(&render(ReportFormat::Json, &config)).unwrap();
        assert!(json["enemy"]["archetypes"].is_object());
    }

    #[test]
    fn empty_change_report_says_so() {
        let console = render(ReportFormat::Console, &ChangeReport::default());
        assert!(console.contains("No parameters changed"));
    }

    #[test]
    fn empty_patch_listing_is_an_empty_array() {
        let json = render(ReportFormat::Json, &PatchListing(Vec::new()));
        assert_eq!(json.trim(), "[]");
    }
}
