//! End-to-end tests for the `mjc` binary.

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const TWO_STATE: &str = r#"{
  "generator": [[-1.0, 1.0], [1.0, -1.0]],
  "rewards": [0.0, 1.0],
  "labels": ["off", "on"]
}"#;

const THREE_STATE_NO_REWARDS: &str = r#"{
  "generator": [[-1.0, 1.0, 0.0], [2.0, -3.0, 1.0], [0.0, 0.5, -0.5]]
}"#;

/// Command isolated from any user configuration or log settings.
fn mjc(home: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("mjc");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env_remove("MJ_CONFIG")
        .env_remove("MJ_CONFIG_DIR")
        .env_remove("MJ_LOG")
        .env_remove("MJ_LOG_FORMAT")
        .env_remove("RUST_LOG");
    cmd
}

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn stdout_json(cmd: &mut Command) -> Value {
    let output = cmd.assert().success().get_output().stdout.clone();
    serde_json::from_slice(&output).unwrap()
}

// ============================================================================
// Help and argument errors
// ============================================================================

#[test]
fn help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    let assert = mjc(dir.path()).arg("--help").assert().success();
    let out = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    for sub in ["cprob", "pdf", "cdf", "jumps", "occupancy", "simulate"] {
        assert!(out.contains(sub), "help is missing {sub}");
    }
}

#[test]
fn version_flag_succeeds() {
    let dir = TempDir::new().unwrap();
    mjc(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mjc"));
}

#[test]
fn unknown_subcommand_is_args_error() {
    let dir = TempDir::new().unwrap();
    mjc(dir.path())
        .arg("nonexistent")
        .assert()
        .code(10)
        .stderr(predicate::str::contains("error"));
}

#[test]
fn malformed_transition_is_args_error() {
    let dir = TempDir::new().unwrap();
    let model = write(&dir, "m.json", TWO_STATE);
    mjc(dir.path())
        .args(["jumps", "-t", "1", "--transition", "0-1", "-m"])
        .arg(&model)
        .assert()
        .code(10);
}

// ============================================================================
// Queries
// ============================================================================

#[test]
fn cprob_reports_matrix() {
    let dir = TempDir::new().unwrap();
    let model = write(&dir, "m.json", TWO_STATE);
    let json = stdout_json(mjc(dir.path()).args(["cprob", "-t", "1", "-m"]).arg(&model));
    let p00 = json["probabilities"][0][0].as_f64().unwrap();
    assert!((p00 - 0.5 * (1.0 + (-2.0f64).exp())).abs() < 1e-10);
    assert_eq!(json["labels"][1], "on");
}

#[test]
fn pdf_and_cdf_blocks() {
    let dir = TempDir::new().unwrap();
    let model = write(&dir, "m.json", TWO_STATE);

    let pdf = stdout_json(
        mjc(dir.path())
            .args(["pdf", "-t", "1", "-x", "0.3,0.5", "-m"])
            .arg(&model),
    );
    let results = pdf["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    let d00 = results[0]["density"][0][0].as_f64().unwrap();
    assert!((d00 - 0.285518).abs() < 1e-6);

    let cdf = stdout_json(mjc(dir.path()).args(["cdf", "-t", "1", "-x", "0.5", "-m"]).arg(&model));
    let c00 = cdf["results"][0]["distribution"][0][0].as_f64().unwrap();
    assert!((c00 - 0.516714).abs() < 1e-6);
}

#[test]
fn reward_outside_range_exits_12() {
    let dir = TempDir::new().unwrap();
    let model = write(&dir, "m.json", TWO_STATE);
    mjc(dir.path())
        .args(["pdf", "-t", "1", "-x", "1.5", "-m"])
        .arg(&model)
        .assert()
        .code(12)
        .stderr(predicate::str::contains("\"category\":\"range\""));
}

#[test]
fn non_positive_time_is_range_error() {
    let dir = TempDir::new().unwrap();
    let model = write(&dir, "m.json", TWO_STATE);
    for sub in ["cprob", "occupancy", "jumps"] {
        let mut cmd = mjc(dir.path());
        cmd.args([sub, "-t", "0"]);
        if sub == "occupancy" {
            cmd.args(["-x", "0.3"]);
        }
        cmd.arg("-m")
            .arg(&model)
            .assert()
            .code(12)
            .stderr(predicate::str::contains("time must be positive"));
    }
}

#[test]
fn missing_rewards_exits_11() {
    let dir = TempDir::new().unwrap();
    let model = write(&dir, "m.json", THREE_STATE_NO_REWARDS);
    mjc(dir.path())
        .args(["cdf", "-t", "1", "-x", "0.5", "-m"])
        .arg(&model)
        .assert()
        .code(11);
}

#[test]
fn missing_model_file_exits_30() {
    let dir = TempDir::new().unwrap();
    mjc(dir.path())
        .args(["cprob", "-t", "1", "-m"])
        .arg(dir.path().join("absent.json"))
        .assert()
        .code(30);
}

#[test]
fn invalid_config_exits_11() {
    let dir = TempDir::new().unwrap();
    let model = write(&dir, "m.json", TWO_STATE);
    let config = write(&dir, "engine.toml", "[engine]\nepsilon = 2.0\n");
    mjc(dir.path())
        .args(["cprob", "-t", "1", "--config"])
        .arg(&config)
        .arg("-m")
        .arg(&model)
        .assert()
        .code(11)
        .stderr(predicate::str::contains("epsilon"));
}

#[test]
fn jumps_count_every_transition() {
    let dir = TempDir::new().unwrap();
    let model = write(&dir, "m.json", TWO_STATE);
    let json = stdout_json(
        mjc(dir.path())
            .args(["jumps", "-t", "1.5", "--joint", "-m"])
            .arg(&model),
    );
    let row: f64 = json["expectations"][0]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap())
        .sum();
    assert!((row - 1.5).abs() < 1e-10);
    assert_eq!(json["conditional"], false);

    let single = stdout_json(
        mjc(dir.path())
            .args(["jumps", "-t", "1", "--transition", "0:1", "-m"])
            .arg(&model),
    );
    // 0 -> 1 needs at least one 0:1 jump
    assert!(single["expectations"][0][1].as_f64().unwrap() >= 1.0 - 1e-12);
    assert_eq!(single["conditional"], true);
}

#[test]
fn occupancy_matches_series() {
    let dir = TempDir::new().unwrap();
    let model = write(&dir, "m.json", TWO_STATE);
    let json = stdout_json(
        mjc(dir.path())
            .args(["occupancy", "-t", "1", "-x", "0.3", "-m"])
            .arg(&model),
    );
    let d = json["density"][0].as_f64().unwrap();
    assert!((d - 0.285518).abs() < 1e-6);
    assert!((json["atom_at_zero"].as_f64().unwrap() - (-1.0f64).exp()).abs() < 1e-15);
}

#[test]
fn simulate_is_reproducible_and_conditioned() {
    let dir = TempDir::new().unwrap();
    let model = write(&dir, "m.json", THREE_STATE_NO_REWARDS);
    let args = [
        "simulate", "-t", "2", "--start", "0", "--end", "2", "-n", "5", "--seed", "11", "-m",
    ];
    let a = stdout_json(mjc(dir.path()).args(args).arg(&model));
    let b = stdout_json(mjc(dir.path()).args(args).arg(&model));
    assert_eq!(a, b);

    let paths = a["paths"].as_array().unwrap();
    assert_eq!(paths.len(), 5);
    for path in paths {
        let events = path["history"]["events"].as_array().unwrap();
        assert_eq!(events.last().unwrap()["state"], 2);
        assert!(path["annotation"].as_str().unwrap().starts_with('{'));
    }
}

#[test]
fn jsonl_logs_stay_on_stderr() {
    let dir = TempDir::new().unwrap();
    let model = write(&dir, "m.json", TWO_STATE);
    let assert = mjc(dir.path())
        .args(["--log-format", "jsonl", "-vv", "cprob", "-t", "1", "-m"])
        .arg(&model)
        .assert()
        .success();
    let output = assert.get_output();
    serde_json::from_slice::<Value>(&output.stdout).unwrap();
    let stderr = String::from_utf8_lossy(&output.stderr);
    let first = stderr.lines().next().expect("debug logs expected");
    let event: Value = serde_json::from_str(first).unwrap();
    assert!(event["target"].as_str().unwrap().starts_with("mj_core"));
}
