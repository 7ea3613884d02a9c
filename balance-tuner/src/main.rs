mod reports;
mod util;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args as ClapArgs, Parser, Subcommand};
use colored::Colorize;
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::{Path, PathBuf};

use dungeon_balance::constants::{
    DEFAULT_BATTLES_PER_COMBINATION, DEFAULT_MAX_ITERATIONS, DEFAULT_SEED,
    DEFAULT_TARGET_WIN_RATE, DEFAULT_TOLERANCE,
};
use dungeon_balance::{
    EngineError, GlobalStat, LoopSettings, PatchDraft, Persist, Preset, Rarity, SessionOptions,
    SimulationSettings, TargetBands, TuningSession, WeaponType, WhatIfRequest,
};
use reports::{
    ChangeReport, PatchListing, ReportFormat, SuggestionReport, SweepReport, write_error,
    write_report,
};
use util::{parse_assignment, split_csv};

#[derive(Debug, Parser)]
#[command(name = "balance-tuner", version)]
#[command(about = "Simulate, score and tune dungeon combat balance")]
#[command(after_help = "Exit codes: 0 success, 1 failed validation or tuning run, 2 error")]
struct Args {
    /// Live configuration document (created from defaults if missing)
    #[arg(long, global = true, default_value = "balance_config.json")]
    config: PathBuf,

    /// Directory holding saved patches
    #[arg(long, global = true, default_value = "patches")]
    patch_dir: PathBuf,

    /// Optional JSON file overriding the target bands
    #[arg(long, global = true)]
    targets: Option<PathBuf>,

    /// Seed for simulation runs
    #[arg(long, global = true, default_value_t = DEFAULT_SEED)]
    seed: u64,

    /// Worker threads for battle trials (0 = one per core)
    #[arg(long, global = true, default_value_t = 0)]
    workers: usize,

    /// Battles per weapon and enemy combination
    #[arg(long, global = true, default_value_t = DEFAULT_BATTLES_PER_COMBINATION)]
    battles: u32,

    #[arg(long, global = true, default_value_t = 1)]
    player_level: u32,

    #[arg(long, global = true, default_value_t = 1)]
    enemy_level: u32,

    /// Output report format
    #[arg(long, global = true, value_enum, default_value_t = ReportFormat::Console)]
    report: ReportFormat,

    /// Optional path to write the report output instead of stdout
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Simulate every weapon against every enemy archetype
    Simulate,
    /// Simulate and analyze matchups, extremes and engagement
    Analyze,
    /// Simulate and run the balance validation checks (exit 1 when invalid)
    Validate,
    /// Simulate and print the quality score
    Score,
    /// Simulate and list tuning suggestions
    Suggest,
    /// Apply a suggestion and save the configuration
    Apply {
        /// Suggestion id as printed by `suggest` with the same seed
        #[arg(long, conflicts_with = "top")]
        id: Option<String>,
        /// Apply the highest-priority suggestion
        #[arg(long)]
        top: bool,
    },
    /// Compare the current configuration against the same run with changes applied
    Compare {
        /// Parameter changes to evaluate
        #[arg(long = "set", value_name = "PATH=VALUE", required = true)]
        set: Vec<String>,
        /// Save the changed configuration afterwards
        #[arg(long)]
        keep: bool,
    },
    /// Sweep one parameter and report how the quality score responds
    Sweep {
        #[arg(long)]
        parameter: String,
        /// Half-width of the range, in percent of the current value
        #[arg(long, default_value_t = 20.0)]
        range: f64,
        #[arg(long, default_value_t = 5)]
        points: u32,
        #[arg(long, default_value_t = 10)]
        battles_per_point: u32,
        /// Write the best value and save the configuration
        #[arg(long)]
        apply: bool,
    },
    /// Evaluate one candidate value against the current configuration
    WhatIf {
        #[arg(long)]
        parameter: String,
        #[arg(long)]
        value: f64,
        /// Battles per combination for the candidate run
        #[arg(long, default_value_t = 10)]
        trial_battles: u32,
        /// Keep the candidate and save the configuration
        #[arg(long)]
        keep: bool,
    },
    /// Set configuration parameters and save the configuration
    Adjust(AdjustArgs),
    /// Save, list, load and inspect patches
    #[command(subcommand)]
    Patch(PatchCommand),
    /// Run the automated tuning loop (exit 1 when it fails)
    Tune {
        #[arg(long, default_value_t = DEFAULT_TARGET_WIN_RATE)]
        target: f64,
        #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
        tolerance: f64,
        #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
        max_iterations: u32,
    },
    /// Show or save the live configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Sample loot rarities including upgrades
    Rarity {
        #[arg(long, default_value_t = 10_000)]
        samples: u32,
        #[arg(long, default_value_t = 0.0)]
        magic_find: f64,
    },
}

#[derive(Debug, Default, ClapArgs)]
struct AdjustArgs {
    /// Enemy multiplier preset applied before the other adjustments:
    /// aggressive_enemies (hard_mode), tanky_enemies, fast_enemies, baseline (default)
    #[arg(long, value_name = "NAME")]
    preset: Option<String>,
    /// Any parameter path
    #[arg(long = "set", value_name = "PATH=VALUE")]
    set: Vec<String>,
    /// Enemy global multiplier
    #[arg(long, value_name = "STAT=VALUE")]
    global: Vec<String>,
    /// Archetype stat, e.g. Brute.health=1.2
    #[arg(long, value_name = "NAME.STAT=VALUE")]
    archetype: Vec<String>,
    /// Weapon scaling, e.g. Sword.damage=1.1
    #[arg(long, value_name = "WEAPON.STAT=VALUE")]
    weapon: Vec<String>,
    /// Base rarity weight, e.g. rare=150
    #[arg(long, value_name = "TIER=VALUE")]
    rarity: Vec<String>,
    #[arg(long)]
    drop_rate: Option<f64>,
    #[arg(long)]
    upgrade_chance: Option<f64>,
    #[arg(long, requires = "upgrade_chance")]
    upgrade_decay: Option<f64>,
}

#[derive(Debug, Subcommand)]
enum PatchCommand {
    /// Save the live configuration as a named patch
    Save {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "balance-tuner")]
        author: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "1.0")]
        version: String,
        /// Tags (comma-separated)
        #[arg(long, default_value = "")]
        tags: String,
        /// Simulate first and attach the results
        #[arg(long)]
        with_results: bool,
    },
    /// List saved patches, newest first
    List,
    /// Load a patch by id or name and save it as the live configuration
    Load { key: String },
    /// Show a patch and its configuration
    Info { key: String },
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    /// Print the live configuration
    Show,
    /// Write the live configuration, optionally to another path
    Save {
        #[arg(long)]
        to: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    if args.report == ReportFormat::Console {
        eprintln!("{}", "⚔️  Dungeon Balance Tuner".bright_cyan().bold());
    }
    let mut output_target = OutputTarget::new(args.output.clone())?;
    match execute(&args, &mut output_target) {
        Ok(passed) => {
            output_target.flush_inner()?;
            if !passed {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(err) => {
            log::debug!("command failed: {err:?}");
            write_error(&mut output_target, args.report, &err)?;
            output_target.flush_inner()?;
            std::process::exit(2);
        }
    }
}

fn load_targets(path: Option<&Path>) -> Result<TargetBands> {
    let Some(path) = path else {
        return Ok(TargetBands::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read targets from {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid targets in {}", path.display()))
}

fn open_session(args: &Args) -> Result<TuningSession> {
    let session = TuningSession::open(SessionOptions {
        config_path: Some(args.config.clone()),
        patch_dir: args.patch_dir.clone(),
        seed: args.seed,
        workers: args.workers,
        targets: load_targets(args.targets.as_deref())?,
    })?;
    Ok(session)
}

const fn simulation_settings(args: &Args) -> SimulationSettings {
    SimulationSettings {
        battles_per_combination: args.battles,
        player_level: args.player_level,
        enemy_level: args.enemy_level,
    }
}

/// Run the selected command; `Ok(false)` marks a failed check.
fn execute(args: &Args, out: &mut dyn Write) -> Result<bool> {
    log::debug!("executing {:?} with seed {}", args.command, args.seed);
    let mut session = open_session(args)?;
    let format = args.report;
    let simulation = simulation_settings(args);
    match &args.command {
        Command::Simulate => {
            let snapshot = session.run_battle_simulation(simulation)?;
            write_report(out, format, &snapshot)?;
        }
        Command::Analyze => {
            session.run_battle_simulation(simulation)?;
            write_report(out, format, &session.analyze_battle_results()?)?;
        }
        Command::Validate => {
            session.run_battle_simulation(simulation)?;
            let report = session.validate_balance()?;
            write_report(out, format, &report)?;
            return Ok(report.valid);
        }
        Command::Score => {
            session.run_battle_simulation(simulation)?;
            write_report(out, format, &session.get_balance_quality_score()?)?;
        }
        Command::Suggest => {
            let snapshot = session.run_battle_simulation(simulation)?;
            let report = SuggestionReport {
                seed: snapshot.report.seed,
                win_rate: snapshot.report.overall.win_rate,
                quality_score: snapshot.score.overall,
                suggestions: session.suggest_tuning()?,
            };
            write_report(out, format, &report)?;
        }
        Command::Apply { id, top } => {
            session.run_battle_simulation(simulation)?;
            let id = match (id, top) {
                (Some(id), _) => id.clone(),
                (None, true) => session
                    .suggest_tuning()?
                    .into_iter()
                    .next()
                    .map(|s| s.id)
                    .ok_or_else(|| anyhow!("no suggestions: the balance is within every band"))?,
                (None, false) => bail!("pass --id <ID> or --top"),
            };
            let change = session.apply_tuning_suggestion(&id)?;
            let report = ChangeReport {
                changes: vec![change],
                saved_to: Some(session.save_configuration(None)?),
            };
            write_report(out, format, &report)?;
        }
        Command::Compare { set, keep } => {
            session.run_battle_simulation(simulation)?;
            session.set_baseline()?;
            for raw in set {
                let assignment = parse_assignment(raw)?;
                session.adjust_parameter(&assignment.key, assignment.value)?;
            }
            session.run_battle_simulation(simulation)?;
            write_report(out, format, &session.compare_with_baseline()?)?;
            if *keep {
                session.save_configuration(None)?;
            }
        }
        Command::Sweep {
            parameter,
            range,
            points,
            battles_per_point,
            apply,
        } => {
            session.run_battle_simulation(simulation)?;
            let result = session.analyze_parameter_sensitivity(
                parameter,
                *range,
                *points,
                *battles_per_point,
            )?;
            let applied = if *apply {
                let change = session.apply_sensitivity_optimal()?;
                session.save_configuration(None)?;
                Some(change)
            } else {
                None
            };
            write_report(out, format, &SweepReport { result, applied })?;
        }
        Command::WhatIf {
            parameter,
            value,
            trial_battles,
            keep,
        } => {
            session.run_battle_simulation(simulation)?;
            let request = WhatIfRequest {
                parameter: parameter.clone(),
                candidate: *value,
                battles: *trial_battles,
                persist: if *keep { Persist::Keep } else { Persist::Discard },
            };
            let result = session.test_what_if(&request)?;
            if result.persisted {
                session.save_configuration(None)?;
            }
            write_report(out, format, &result)?;
        }
        Command::Adjust(adjust) => {
            let report = run_adjust(&session, adjust)?;
            write_report(out, format, &report)?;
        }
        Command::Patch(command) => run_patch(&mut session, command, simulation, format, out)?,
        Command::Tune {
            target,
            tolerance,
            max_iterations,
        } => {
            let settings = LoopSettings {
                target_win_rate: *target,
                tolerance: *tolerance,
                max_iterations: *max_iterations,
                ..LoopSettings::default()
            };
            let state = session.run_tuning_loop(&settings, simulation)?;
            if state.success {
                session.save_configuration(None)?;
            }
            write_report(out, format, &state)?;
            return Ok(state.success);
        }
        Command::Config(ConfigCommand::Show) => {
            write_report(out, format, session.get_current_configuration().as_ref())?;
        }
        Command::Config(ConfigCommand::Save { to }) => {
            let path = session.save_configuration(to.as_deref())?;
            let report = ChangeReport {
                changes: Vec::new(),
                saved_to: Some(path),
            };
            write_report(out, format, &report)?;
        }
        Command::Rarity {
            samples,
            magic_find,
        } => {
            let distribution = session.get_rarity_distribution(*samples, *magic_find, args.seed)?;
            write_report(out, format, &distribution)?;
        }
    }
    Ok(true)
}

fn run_adjust(session: &TuningSession, adjust: &AdjustArgs) -> Result<ChangeReport> {
    let mut report = ChangeReport::default();
    if let Some(name) = &adjust.preset {
        let preset: Preset = name.parse().map_err(EngineError::from)?;
        report.changes.extend(session.apply_preset(preset)?);
    }
    for raw in &adjust.set {
        let a = parse_assignment(raw)?;
        report.changes.push(session.adjust_parameter(&a.key, a.value)?);
    }
    for raw in &adjust.global {
        let a = parse_assignment(raw)?;
        let stat: GlobalStat = a.key.parse()?;
        report.changes.push(session.adjust_global_multiplier(stat, a.value)?);
    }
    for raw in &adjust.archetype {
        let a = parse_assignment(raw)?;
        let (name, stat) = a.owner_and_stat()?;
        report
            .changes
            .push(session.adjust_archetype_stat(name, stat.parse()?, a.value)?);
    }
    for raw in &adjust.weapon {
        let a = parse_assignment(raw)?;
        let (weapon, stat) = a.owner_and_stat()?;
        let weapon: WeaponType = weapon.parse()?;
        report
            .changes
            .push(session.adjust_weapon_scaling(weapon, stat.parse()?, a.value)?);
    }
    for raw in &adjust.rarity {
        let a = parse_assignment(raw)?;
        let rarity =
            Rarity::from_key(&a.key).ok_or_else(|| anyhow!("unknown rarity tier '{}'", a.key))?;
        report.changes.push(session.adjust_rarity_weight(rarity, a.value)?);
    }
    if let Some(value) = adjust.drop_rate {
        report.changes.push(session.adjust_drop_rate(value)?);
    }
    if let Some(chance) = adjust.upgrade_chance {
        report
            .changes
            .extend(session.adjust_upgrade_chance(chance, adjust.upgrade_decay)?);
    }
    if report.changes.is_empty() {
        eprintln!("{}", "⚠️  No adjustments given".yellow());
        return Ok(report);
    }
    report.saved_to = Some(session.save_configuration(None)?);
    Ok(report)
}

fn run_patch(
    session: &mut TuningSession,
    command: &PatchCommand,
    simulation: SimulationSettings,
    format: ReportFormat,
    out: &mut dyn Write,
) -> Result<()> {
    match command {
        PatchCommand::Save {
            name,
            author,
            description,
            version,
            tags,
            with_results,
        } => {
            if *with_results {
                session.run_battle_simulation(simulation)?;
            }
            let metadata = session.save_patch(PatchDraft {
                name: name.clone(),
                author: author.clone(),
                description: description.clone(),
                version: version.clone(),
                tags: split_csv(tags),
            })?;
            write_report(out, format, &metadata)?;
        }
        PatchCommand::List => {
            write_report(out, format, &PatchListing(session.list_patches()?))?;
        }
        PatchCommand::Load { key } => {
            let metadata = session.load_patch(key)?;
            session.save_configuration(None)?;
            write_report(out, format, &metadata)?;
        }
        PatchCommand::Info { key } => {
            write_report(out, format, &session.get_patch_info(key)?)?;
        }
    }
    Ok(())
}

enum OutputTarget {
    Stdout(BufWriter<std::io::Stdout>),
    File(BufWriter<File>),
}

impl OutputTarget {
    fn new(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            let file = File::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Self::File(BufWriter::new(file)))
        } else {
            Ok(Self::Stdout(BufWriter::new(stdout())))
        }
    }

    fn writer(&mut self) -> &mut dyn Write {
        match self {
            Self::Stdout(w) => w,
            Self::File(w) => w,
        }
    }

    fn flush_inner(&mut self) -> std::io::Result<()> {
        match self {
            Self::Stdout(w) => w.flush(),
            Self::File(w) => w.flush(),
        }
    }
}

impl Write for OutputTarget {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.writer().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.flush_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "balance-tuner-{label}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        ))
    }

    fn base_args(label: &str, command: Command) -> Args {
        let dir = temp_path(label);
        Args {
            config: dir.join("config.json"),
            patch_dir: dir.join("patches"),
            targets: None,
            seed: 1337,
            workers: 2,
            battles: 4,
            player_level: 1,
            enemy_level: 1,
            report: ReportFormat::Json,
            output: None,
            command,
        }
    }

    fn run(args: &Args) -> (bool, serde_json::Value) {
        let mut buffer = Vec::new();
        let passed = execute(args, &mut buffer).unwrap();
        (passed, serde_json::from_slice(&buffer).unwrap())
    }

    #[test]
    fn simulate_reports_the_full_matrix() {
        let args = base_args("simulate", Command::Simulate);
        let (passed, json) = run(&args);
        assert!(passed);
        assert_eq!(json["report"]["combinations"].as_array().unwrap().len(), 20);
        assert_eq!(json["report"]["overall"]["totalBattles"], 80);
        assert!(args.config.exists(), "defaults are written on first use");
    }

    #[test]
    fn adjust_saves_every_change() {
        let adjust = AdjustArgs {
            global: vec!["health=1.1".to_string()],
            archetype: vec!["brute.armor=0.9".to_string()],
            weapon: vec!["Sword.damage=1.2".to_string()],
            rarity: vec!["rare=150".to_string()],
            drop_rate: Some(0.5),
            ..AdjustArgs::default()
        };
        let args = base_args("adjust", Command::Adjust(adjust));
        let (_, json) = run(&args);
        assert_eq!(json["changes"].as_array().unwrap().len(), 5);
        let saved = std::fs::read_to_string(&args.config).unwrap();
        let config = dungeon_balance::TuningConfig::from_json_str(&saved).unwrap();
        assert!((config.get("enemy.archetypes.Brute.armor").unwrap() - 0.9).abs() < f64::EPSILON);
        assert!((config.loot.drop_chance - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn adjust_with_unknown_stat_is_an_error() {
        let adjust = AdjustArgs {
            global: vec!["luck=2".to_string()],
            ..AdjustArgs::default()
        };
        let args = base_args("bad-adjust", Command::Adjust(adjust));
        let mut buffer = Vec::new();
        assert!(execute(&args, &mut buffer).is_err());
    }

    #[test]
    fn adjust_preset_writes_global_multipliers() {
        let adjust = AdjustArgs {
            preset: Some("tanky_enemies".to_string()),
            ..AdjustArgs::default()
        };
        let args = base_args("preset", Command::Adjust(adjust));
        let (_, json) = run(&args);
        assert_eq!(json["changes"].as_array().unwrap().len(), 4);
        let saved = std::fs::read_to_string(&args.config).unwrap();
        let config = dungeon_balance::TuningConfig::from_json_str(&saved).unwrap();
        let health = config.get("enemy.globalMultipliers.health").unwrap();
        let armor = config.get("enemy.globalMultipliers.armor").unwrap();
        assert!((health - 1.5).abs() < f64::EPSILON);
        assert!((armor - 1.3).abs() < f64::EPSILON);
    }

    #[test]
    fn adjust_unknown_preset_is_a_validation_error() {
        let adjust = AdjustArgs {
            preset: Some("nightmare".to_string()),
            ..AdjustArgs::default()
        };
        let args = base_args("bad-preset", Command::Adjust(adjust));
        let mut buffer = Vec::new();
        let err = execute(&args, &mut buffer).unwrap_err();
        let engine = err.downcast_ref::<EngineError>().unwrap();
        assert_eq!(engine.kind(), dungeon_balance::ErrorKind::ValidationError);
    }

    #[test]
    fn apply_without_a_choice_is_rejected() {
        let args = base_args(
            "apply",
            Command::Apply {
                id: None,
                top: false,
            },
        );
        let mut buffer = Vec::new();
        let err = execute(&args, &mut buffer).unwrap_err();
        assert!(err.to_string().contains("--top"));
    }

    #[test]
    fn engine_errors_surface_as_engine_errors() {
        let args = base_args(
            "missing-patch",
            Command::Patch(PatchCommand::Info {
                key: "nope".to_string(),
            }),
        );
        let mut buffer = Vec::new();
        let err = execute(&args, &mut buffer).unwrap_err();
        let engine = err.downcast_ref::<EngineError>().unwrap();
        assert_eq!(engine.kind(), dungeon_balance::ErrorKind::NotFound);
    }

    #[test]
    fn patch_save_then_list() {
        let save = base_args(
            "patch",
            Command::Patch(PatchCommand::Save {
                name: "First Pass".to_string(),
                author: "qa".to_string(),
                description: String::new(),
                version: "1.0".to_string(),
                tags: "manual, smoke".to_string(),
                with_results: false,
            }),
        );
        let (_, saved) = run(&save);
        assert_eq!(saved["name"], "First Pass");
        assert_eq!(saved["tags"].as_array().unwrap().len(), 2);
        let list = Args {
            command: Command::Patch(PatchCommand::List),
            ..save
        };
        let (_, listed) = run(&list);
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[test]
    fn rarity_counts_match_samples() {
        let args = base_args(
            "rarity",
            Command::Rarity {
                samples: 300,
                magic_find: 50.0,
            },
        );
        let (_, json) = run(&args);
        let total: u64 = json["upgraded"]
            .as_object()
            .unwrap()
            .values()
            .map(|v| v.as_u64().unwrap())
            .sum();
        assert_eq!(total, 300);
    }

    #[test]
    fn load_targets_defaults_without_a_file() {
        assert_eq!(load_targets(None).unwrap(), TargetBands::default());
        assert!(load_targets(Some(Path::new("/definitely/not/here.json"))).is_err());
    }

    #[test]
    fn output_target_stdout_writes() {
        let mut target = OutputTarget::new(None).unwrap();
        target.write_all(b"ok").unwrap();
        target.flush().unwrap();
    }
}
