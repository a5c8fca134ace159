use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

mod common;

fn volset() -> Command {
    Command::cargo_bin("volset").unwrap()
}

#[test]
fn runs() {
    volset().assert().success();
}

#[test]
fn outputs_tool_name() {
    let mut cmd = volset();
    cmd.arg("-V");
    cmd.assert().success().stdout("volset 0.1.0\n");
}

// Merge subcommand tests

#[test]
fn merge_reports_joint_table() {
    let dir = TempDir::new().unwrap();
    let config = common::write_config(dir.path(), &[1, 2, 3]);

    let mut cmd = volset();
    cmd.arg("merge").arg(&config);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("Merged 2 manifest(s)"))
        .stdout(predicates::str::contains("Joint table: 3 row(s)"));
}

#[test]
fn merge_json_output_format() {
    let dir = TempDir::new().unwrap();
    let config = common::write_config(dir.path(), &[1, 2, 3]);
    common::write_manifest(dir.path(), "seg", &[2, 3]);

    let mut cmd = volset();
    cmd.arg("merge").arg(&config).args(["--output", "json"]);
    let output = cmd.assert().success().get_output().stdout.clone();

    let report: serde_json::Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(report["joined_rows"], 2);
    assert_eq!(report["inputs"].as_array().unwrap().len(), 2);
    assert_eq!(report["issues"][0]["severity"], "warning");
    assert_eq!(report["issues"][0]["code"], "RowsNotMatched");
    assert_eq!(report["issues"][0]["modality"], "seg");
}

#[test]
fn merge_single_field() {
    let dir = TempDir::new().unwrap();
    let config = common::write_config(dir.path(), &[1, 2]);
    common::write_manifest(dir.path(), "seg", &[2]);

    let mut cmd = volset();
    cmd.arg("merge").arg(&config).args(["--field", "image", "--strict"]);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("Merged 1 manifest(s)"))
        .stdout(predicates::str::contains("Joint table: 2 row(s)"));
}

#[test]
fn merge_unknown_field_fails() {
    let dir = TempDir::new().unwrap();
    let config = common::write_config(dir.path(), &[1]);

    let mut cmd = volset();
    cmd.arg("merge").arg(&config).args(["--field", "weight"]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("'weight' is not declared"));
}

#[test]
fn merge_field_without_modalities_is_an_empty_field_set() {
    let dir = TempDir::new().unwrap();
    common::write_manifest(dir.path(), "T1", &[1, 2]);
    let config = dir.path().join("reader.yaml");
    std::fs::write(
        &config,
        "modalities:\n  T1: { csv_file: T1.csv }\ntask:\n  image: [T1]\n  weight: []\n",
    )
    .unwrap();

    let mut cmd = volset();
    cmd.arg("merge").arg(&config).args(["--field", "weight"]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("No active fields"))
        .stderr(predicates::str::contains("Empty joint table").not());
}

#[test]
fn merge_strict_fails_on_dropped_subjects() {
    let dir = TempDir::new().unwrap();
    let config = common::write_config(dir.path(), &[1, 2, 3]);
    common::write_manifest(dir.path(), "seg", &[1, 3]);

    let mut cmd = volset();
    cmd.arg("merge").arg(&config).arg("--strict");
    cmd.assert()
        .failure()
        .stdout(predicates::str::contains("RowsNotMatched"))
        .stderr(predicates::str::contains("1 warning(s)"));
}

#[test]
fn merge_without_strict_succeeds_on_dropped_subjects() {
    let dir = TempDir::new().unwrap();
    let config = common::write_config(dir.path(), &[1, 2, 3]);
    common::write_manifest(dir.path(), "seg", &[1, 3]);

    let mut cmd = volset();
    cmd.arg("merge").arg(&config);
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("[WARN]"));
}

#[test]
fn merge_disjoint_manifests_fails() {
    let dir = TempDir::new().unwrap();
    let config = common::write_config(dir.path(), &[1, 2]);
    common::write_manifest(dir.path(), "seg", &[5]);

    let mut cmd = volset();
    cmd.arg("merge").arg(&config);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("Empty joint table"));
}

#[test]
fn merge_writes_joint_csv() {
    let dir = TempDir::new().unwrap();
    let config = common::write_config(dir.path(), &[4, 5]);
    let out = dir.path().join("joint.csv");

    let mut cmd = volset();
    cmd.arg("merge").arg(&config).arg("--write-csv").arg(&out);
    cmd.assert().success();

    let written = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = written.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "subject_id,T1,seg");
    assert!(lines[1].starts_with("s4,"));
    assert!(lines[2].starts_with("s5,"));
}

#[test]
fn merge_missing_config_fails() {
    let mut cmd = volset();
    cmd.args(["merge", "nonexistent_config.yaml"]);
    cmd.assert().failure();
}

#[test]
fn merge_unsupported_output_fails() {
    let dir = TempDir::new().unwrap();
    let config = common::write_config(dir.path(), &[1]);

    let mut cmd = volset();
    cmd.arg("merge").arg(&config).args(["--output", "xml"]);
    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("Unsupported format"));
}
