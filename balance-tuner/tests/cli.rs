use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn temp_path(label: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "balance-tuner-cli-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

fn run_in(dir: &Path, args: &[&str]) -> Output {
    let exe = env!("CARGO_BIN_EXE_balance-tuner");
    Command::new(exe)
        .arg("--config")
        .arg(dir.join("balance_config.json"))
        .arg("--patch-dir")
        .arg(dir.join("patches"))
        .args(["--battles", "3", "--workers", "2"])
        .args(args)
        .output()
        .expect("run cli")
}

#[test]
fn cli_config_show_prints_json_and_creates_defaults() {
    let dir = temp_path("config");
    let output = run_in(&dir, &["--report", "json", "config", "show"]);
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json config");
    assert!(json["weapons"].is_object());
    assert!(dir.join("balance_config.json").exists());
}

#[test]
fn cli_simulate_writes_markdown_to_output_file() {
    let dir = temp_path("simulate");
    let output_path = dir.join("report.md");
    std::fs::create_dir_all(&dir).expect("create temp dir");
    let output = run_in(
        &dir,
        &[
            "--report",
            "markdown",
            "--output",
            output_path.to_str().expect("utf8 path"),
            "simulate",
        ],
    );
    assert!(output.status.success());
    let content = std::fs::read_to_string(output_path).expect("read output");
    assert!(content.starts_with("# Battle Simulation"));
}

#[test]
fn cli_patch_list_is_empty_for_a_fresh_directory() {
    let dir = temp_path("patches");
    let output = run_in(&dir, &["--report", "json", "patch", "list"]);
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "[]");
}

#[test]
fn cli_missing_patch_prints_error_envelope() {
    let dir = temp_path("missing");
    let output = run_in(&dir, &["--report", "json", "patch", "info", "missing"]);
    assert_eq!(output.status.code(), Some(2));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json envelope");
    assert_eq!(json["kind"], "not_found");
}

#[test]
fn cli_same_seed_gives_same_suggestions() {
    let dir = temp_path("seeded");
    let first = run_in(&dir, &["--report", "json", "--seed", "7", "suggest"]);
    let second = run_in(&dir, &["--report", "json", "--seed", "7", "suggest"]);
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn cli_rejects_malformed_assignment() {
    let dir = temp_path("assign");
    let output = run_in(
        &dir,
        &["--report", "json", "adjust", "--set", "weapons.globalDamageMultiplier"],
    );
    assert_eq!(output.status.code(), Some(2));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json envelope");
    assert_eq!(json["kind"], "validation_error");
}

#[test]
fn cli_adjust_preset_saves_the_configuration() {
    let dir = temp_path("preset");
    let output = run_in(&dir, &["--report", "json", "adjust", "--preset", "hard_mode"]);
    assert!(output.status.success());
    let saved = std::fs::read_to_string(dir.join("balance_config.json")).expect("saved config");
    let json: serde_json::Value = serde_json::from_str(&saved).expect("config json");
    assert_eq!(json["enemy"]["globalMultipliers"]["damage"], 1.2);
}
