//! Smoke tests -- verify the binary runs and the subcommands are wired up.

use assert_cmd::Command;
use predicates::prelude::*;

fn bin() -> Command {
    let mut cmd = Command::cargo_bin("silicon-rca").unwrap();
    cmd.env_remove("SILICON_RCA_CONFIG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_cli_help() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("root-cause analysis"));
}

#[test]
fn test_cli_version() {
    bin()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("silicon-rca"));
}

#[test]
fn test_subcommands_exist() {
    for sub in ["run", "rca", "simulate"] {
        bin().args([sub, "--help"]).assert().success();
    }
}

#[test]
fn test_simulate_then_run_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("fleet");
    let out = dir.path().join("out");

    bin()
        .current_dir(dir.path())
        .args(["simulate", "--hosts", "4", "--duration-sec", "600", "--seed", "3", "--out"])
        .arg(&data)
        .assert()
        .success()
        .stdout(predicate::str::contains("Fleet telemetry generated"));
    assert!(data.join("counters.csv").exists());
    assert!(data.join("logs.jsonl").exists());

    bin()
        .current_dir(dir.path())
        .args(["run", "--json", "--parallel", "--data"])
        .arg(&data)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("Artifacts written"));
    for file in [
        "incidents.csv",
        "rca_results.csv",
        "results.json",
        "report.md",
        "severity_hist.png",
        "root_cause_counts.png",
    ] {
        assert!(out.join(file).exists(), "{file} missing");
    }

    let report = std::fs::read_to_string(out.join("report.md")).unwrap();
    assert!(report.contains("# Post-Silicon Failure RCA Report"));

    bin()
        .current_dir(dir.path())
        .args(["rca", "--json", "--incidents"])
        .arg(out.join("incidents.csv"))
        .assert()
        .success();
}

#[test]
fn test_non_positive_min_points_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");

    bin()
        .current_dir(dir.path())
        .args(["run", "--min-points", "0", "--data"])
        .arg(dir.path().join("missing"))
        .arg("--out")
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("min_points must be positive"));
    assert!(!out.exists());
}

#[test]
fn test_missing_counters_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    bin()
        .current_dir(dir.path())
        .args(["run", "--data"])
        .arg(dir.path().join("nowhere"))
        .arg("--out")
        .arg(dir.path().join("out"))
        .assert()
        .failure();
}
