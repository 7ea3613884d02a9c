use dungeon_balance::oracle::BattleTally;
use dungeon_balance::rolls::{ComboOutcome, roll_combo};
use dungeon_balance::tuning_loop::PhaseSnapshot;
use dungeon_balance::{
    BalanceMetrics, EngineError, EngineResult, ErrorKind, LoopDriver, LoopPhase, LoopSettings,
    ModificationRarityConfig, ParameterChange, PatchDraft, PatchMetadata, QualityLabel, Rarity,
    RarityUpgradeConfig, SessionOptions, SimulationSettings, SmokeReport, TargetBands,
    TuningSession, ValidationReport, cascade_upgrade, paths, roll_modification, run_tuning_loop,
    score, upgrade_probability,
};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::collections::VecDeque;

const SAMPLE_SIZE: u32 = 20_000;
const TOLERANCE: f64 = 0.01;

fn observed(hits: u32) -> f64 {
    f64::from(hits) / f64::from(SAMPLE_SIZE)
}

fn temp_dir(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "dungeon-balance-acceptance-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

fn session(label: &str, seed: u64) -> TuningSession {
    TuningSession::open(SessionOptions {
        patch_dir: temp_dir(label),
        seed,
        workers: 2,
        ..SessionOptions::default()
    })
    .expect("session opens")
}

const QUICK: SimulationSettings = SimulationSettings {
    battles_per_combination: 5,
    player_level: 1,
    enemy_level: 1,
};

#[test]
fn upgrade_chances_follow_the_decay_schedule() {
    let cfg = RarityUpgradeConfig {
        enabled: true,
        base_chance: 0.05,
        decay_per_tier: 0.5,
        max_tiers: 6,
        magic_find_bonus: 0.0,
    };
    let expected = [0.05, 0.025, 0.0125, 0.00625, 0.003_125, 0.001_562_5];
    for (step, want) in (0_u32..).zip(expected) {
        assert!((upgrade_probability(&cfg, step, 0.0) - want).abs() < 1e-12);
    }

    let mut rng = SmallRng::seed_from_u64(0xBA1A);
    let mut promoted = 0;
    for _ in 0..SAMPLE_SIZE {
        let result = cascade_upgrade(&mut rng, &cfg, Rarity::Common, 0.0);
        assert!(result.rarity >= result.base);
        if result.promotions > 0 {
            promoted += 1;
        }
    }
    assert!(
        (observed(promoted) - 0.05).abs() <= TOLERANCE,
        "first-step upgrade rate drifted: {:.4}",
        observed(promoted)
    );
}

#[test]
fn upgrades_never_demote_or_exceed_the_tier_cap() {
    let cfg = RarityUpgradeConfig {
        enabled: true,
        base_chance: 0.9,
        decay_per_tier: 0.9,
        max_tiers: 2,
        magic_find_bonus: 0.001,
    };
    let mut rng = SmallRng::seed_from_u64(17);
    for base in Rarity::ALL {
        for _ in 0..500 {
            let result = cascade_upgrade(&mut rng, &cfg, base, 150.0);
            assert!(result.rarity >= base);
            assert!(result.promotions <= 2);
            assert_eq!(
                result.rarity.index() - base.index(),
                result.promotions as usize
            );
        }
    }
}

#[test]
fn combo_bands_partition_the_roll_line() {
    for total in -40..=60 {
        let bands = [
            total <= 5,
            (6..=13).contains(&total),
            total >= 14,
        ];
        assert_eq!(bands.iter().filter(|hit| **hit).count(), 1, "total {total}");
        let expected = if bands[0] {
            ComboOutcome::Fail
        } else if bands[1] {
            ComboOutcome::Normal
        } else {
            ComboOutcome::Combo
        };
        assert_eq!(ComboOutcome::classify(total), expected);
    }
    let mut rng = SmallRng::seed_from_u64(5);
    for _ in 0..1_000 {
        let roll = roll_combo(&mut rng, 2);
        assert!((1..=20).contains(&roll.natural));
        assert_eq!(roll.total, roll.natural + 2);
    }
}

#[test]
fn modification_buckets_track_their_percentages() {
    let cfg = ModificationRarityConfig::default();
    assert!((cfg.total() - 100.0).abs() < 1e-9);
    let thresholds = cfg.thresholds();
    assert!(thresholds.windows(2).all(|pair| pair[0] <= pair[1]));

    let mut rng = SmallRng::seed_from_u64(99);
    let mut common = 0;
    for _ in 0..SAMPLE_SIZE {
        let rolled = roll_modification(&mut rng, &cfg, 1, 0);
        assert!(!rolled.is_empty() && rolled.len() <= 2);
        if rolled[0].rarity == Rarity::Common {
            common += 1;
        }
    }
    let want = cfg.common / 100.0;
    assert!(
        (observed(common) - want).abs() <= 2.5 * TOLERANCE,
        "common share drifted: {:.4} vs {want:.4}",
        observed(common)
    );
}

#[test]
fn quality_labels_at_documented_scores() {
    let cases = [
        (92.0, QualityLabel::Excellent),
        (80.0, QualityLabel::Good),
        (60.0, QualityLabel::Fair),
        (45.0, QualityLabel::Poor),
        (10.0, QualityLabel::Critical),
    ];
    for (value, label) in cases {
        assert_eq!(QualityLabel::for_score(value), label, "score {value}");
    }
}

#[test]
fn seeded_sessions_reproduce_their_simulations() {
    let mut first = session("repro-a", 2024);
    let mut second = session("repro-b", 2024);
    let a = first.run_battle_simulation(QUICK).expect("first");
    let b = second.run_battle_simulation(QUICK).expect("second");
    assert_eq!(a.report.combinations, b.report.combinations);
    assert_eq!(a.score, b.score);
}

#[test]
fn operations_before_simulation_report_state_preconditions() {
    let session = session("precondition", 1);
    let err = session.analyze_battle_results().expect_err("nothing simulated");
    assert_eq!(err.kind(), ErrorKind::StatePrecondition);
    let envelope = err.envelope();
    assert_eq!(
        serde_json::to_value(&envelope).expect("json")["kind"],
        "state_precondition"
    );
}

#[test]
fn sweep_leaves_the_live_parameter_untouched() {
    let mut session = session("sweep", 3);
    session.run_battle_simulation(QUICK).expect("simulate");
    let path = paths::global_multiplier(dungeon_balance::GlobalStat::Health);
    let before = session.get_current_configuration().get(&path).expect("get");
    let result = session
        .analyze_parameter_sensitivity(&path, 50.0, 4, 2)
        .expect("sweep");
    assert_eq!(result.points.len() + result.skipped.len(), 4);
    let after = session.get_current_configuration().get(&path).expect("get");
    assert!((before - after).abs() < f64::EPSILON);
    assert!((result.original_value - before).abs() < f64::EPSILON);
}

#[test]
fn applying_the_same_suggestion_twice_is_not_found() {
    let mut session = session("double-apply", 4);
    session
        .adjust_parameter(paths::WEAPON_GLOBAL_DAMAGE, 4.0)
        .expect("overpowered weapons");
    session.run_battle_simulation(QUICK).expect("simulate");
    let suggestions = session.suggest_tuning().expect("suggest");
    let id = suggestions.first().expect("a deviation").id.clone();
    session.apply_tuning_suggestion(&id).expect("first apply");
    let err = session.apply_tuning_suggestion(&id).expect_err("second apply");
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

struct Scripted {
    rates: VecDeque<f64>,
    evaluations: u32,
}

impl LoopDriver for Scripted {
    fn evaluate(&mut self) -> EngineResult<PhaseSnapshot> {
        self.evaluations += 1;
        let win_rate = self
            .rates
            .pop_front()
            .ok_or_else(|| EngineError::computation("script exhausted"))?;
        let mut statistics = BattleTally::default().statistics();
        statistics.win_rate = win_rate;
        let metrics = BalanceMetrics {
            win_rate,
            average_turns: 11.0,
            weapon_spread: 4.0,
            enemy_spread: 6.0,
        };
        Ok(PhaseSnapshot {
            statistics,
            score: score(&metrics, &TargetBands::default()),
            validation: ValidationReport::default(),
            suggestions: Vec::new(),
        })
    }

    fn read_parameter(&self, _path: &str) -> EngineResult<f64> {
        Ok(1.0)
    }

    fn write_parameter(&mut self, path: &str, value: f64) -> EngineResult<ParameterChange> {
        Ok(ParameterChange {
            parameter: path.to_string(),
            old_value: 1.0,
            new_value: value,
        })
    }

    fn smoke_check(&mut self) -> SmokeReport {
        let mut report = SmokeReport::default();
        report.record("scripted", true, "ok");
        report
    }

    fn save_patch(&mut self, draft: PatchDraft) -> EngineResult<PatchMetadata> {
        Ok(PatchMetadata {
            patch_id: "scripted".to_string(),
            name: draft.name,
            author: draft.author,
            description: draft.description,
            version: draft.version,
            created_date: chrono::Utc::now(),
            compatible_game_version: dungeon_balance::constants::GAME_VERSION.to_string(),
            tags: draft.tags,
            test_results: None,
        })
    }
}

#[test]
fn loop_stops_once_the_win_rate_is_inside_tolerance() {
    let mut driver = Scripted {
        rates: VecDeque::from([80.0, 91.5, 90.0]),
        evaluations: 0,
    };
    let state = run_tuning_loop(&mut driver, &LoopSettings::default()).expect("loop");
    assert_eq!(state.phase, LoopPhase::Complete);
    assert_eq!(state.iterations.len(), 1);
    assert!(state.iterations[0].within_tolerance);
    assert_eq!(driver.evaluations, 2);
    assert_eq!(driver.rates.len(), 1);
}
