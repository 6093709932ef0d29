//! CLI integration tests using assert_cmd.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const ANSWER_KEY: &str = "../../fixtures/answer-keys/grade7.toml";
const ANSWER_KEY_DIR: &str = "../../fixtures/answer-keys";
const THRESHOLDS: &str = "../../fixtures/thresholds/northfield.toml";

fn admitscore() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("admitscore").unwrap();
    cmd.env_remove("ADMITSCORE_ANTHROPIC_KEY")
        .env_remove("ADMITSCORE_OPENAI_KEY")
        .env("RUST_LOG", "admitscore=warn");
    cmd
}

/// An empty config so tests never pick up a developer's own settings.
fn empty_config(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("admitscore.toml");
    std::fs::write(&path, "parallelism = 2\n").unwrap();
    path
}

fn payload(name: &str) -> String {
    format!("../../fixtures/payloads/{name}")
}

fn score_offline(dir: &TempDir, payload_name: &str, answer_key: &str) -> assert_cmd::assert::Assert {
    let config = empty_config(dir.path());
    admitscore()
        .arg("score")
        .arg("--payload")
        .arg(payload(payload_name))
        .arg("--answer-key")
        .arg(answer_key)
        .arg("--thresholds")
        .arg(THRESHOLDS)
        .arg("--output")
        .arg(dir.path().join("out"))
        .arg("--config")
        .arg(config)
        .arg("--no-ai")
        .assert()
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn validate_fixture_answer_key() {
    admitscore()
        .arg("validate")
        .arg("--answer-key")
        .arg(ANSWER_KEY)
        .arg("--thresholds")
        .arg(THRESHOLDS)
        .assert()
        .success()
        .stdout(predicate::str::contains("grade 7, form 2024-v3"))
        .stdout(predicate::str::contains("15 questions"))
        .stdout(predicate::str::contains("All answer keys valid"));
}

#[test]
fn validate_reports_problems() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(
        &path,
        r#"
[answer_key]
grade = "9"

[[questions]]
label = "eng_q1"
domain = "english"
construct = "vocabulary"
question_type = "mcq"
question_number = 1
question_text = "Pick one"
correct_answer = "E"
option_a = "Yes"
option_b = "No"
"#,
    )
    .unwrap();

    admitscore()
        .arg("validate")
        .arg("--answer-key")
        .arg(&path)
        .arg("--thresholds")
        .arg(THRESHOLDS)
        .assert()
        .success()
        .stdout(predicate::str::contains("[eng_q1] WARNING"))
        .stdout(predicate::str::contains("no threshold for english at grade '9'"))
        .stdout(predicate::str::contains("warning(s) found"));
}

#[test]
fn validate_nonexistent_file() {
    admitscore()
        .arg("validate")
        .arg("--answer-key")
        .arg("nonexistent.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn init_creates_files() {
    let dir = TempDir::new().unwrap();

    admitscore()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created admitscore.toml"))
        .stdout(predicate::str::contains("Created answer-keys/example.toml"))
        .stdout(predicate::str::contains("Created thresholds/example.toml"));

    assert!(dir.path().join("admitscore.toml").exists());

    // The generated files are accepted by the other commands.
    admitscore()
        .current_dir(dir.path())
        .arg("validate")
        .arg("--answer-key")
        .arg("answer-keys")
        .arg("--thresholds")
        .arg("thresholds/example.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("All answer keys valid"));
}

#[test]
fn init_skips_existing() {
    let dir = TempDir::new().unwrap();

    admitscore().current_dir(dir.path()).arg("init").assert().success();

    admitscore()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn score_offline_writes_result_and_report_input() {
    let dir = TempDir::new().unwrap();

    score_offline(&dir, "v1_labels.json", ANSWER_KEY)
        .success()
        .stderr(predicate::str::contains("Recommendation: Ready to admit"))
        .stderr(predicate::str::contains("Manual review required"));

    let out = dir.path().join("out");
    let result = read_json(&out.join("result-sub-v1-0001.json"));
    assert_eq!(result["recommendation"]["band"], "ready_to_admit");
    assert_eq!(result["executive_summary"]["source"], "fallback");
    assert_eq!(result["schema"], "v1_labels");

    let report = read_json(&out.join("report-input-sub-v1-0001.json"));
    assert_eq!(report["student_name"], "Amira Haddad");
    assert_eq!(report["band_label"], "Ready to admit");
    assert!(!report["manual_review"].as_array().unwrap().is_empty());
}

#[test]
fn score_selects_answer_key_from_directory() {
    let dir = TempDir::new().unwrap();

    score_offline(&dir, "v3_question_text.json", ANSWER_KEY_DIR).success();

    let result = read_json(&dir.path().join("out/result-sub-v3-0003.json"));
    assert_eq!(result["form_version"], "2024-v3");
    assert_eq!(result["schema"], "v3_question_text");
}

#[test]
fn score_without_provider_requires_no_ai() {
    let dir = TempDir::new().unwrap();
    let config = empty_config(dir.path());

    admitscore()
        .arg("score")
        .arg("--payload")
        .arg(payload("v1_labels.json"))
        .arg("--answer-key")
        .arg(ANSWER_KEY)
        .arg("--thresholds")
        .arg(THRESHOLDS)
        .arg("--output")
        .arg(dir.path())
        .arg("--config")
        .arg(config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--no-ai"));
}

#[test]
fn recommend_with_stricter_thresholds() {
    let dir = TempDir::new().unwrap();
    score_offline(&dir, "v2_domain_numbered.json", ANSWER_KEY).success();

    let strict = dir.path().join("strict.toml");
    std::fs::write(
        &strict,
        r#"
[thresholds]
school = "Strict"

[thresholds.grades."7"]
english = 99.0
mathematics = 99.0
reasoning = 99.0
"#,
    )
    .unwrap();

    let result_path = dir.path().join("out/result-sub-v2-0002.json");
    admitscore()
        .arg("recommend")
        .arg("--result")
        .arg(&result_path)
        .arg("--thresholds")
        .arg(&strict)
        .arg("--config")
        .arg(empty_config(dir.path()))
        .assert()
        .success()
        .stderr(predicate::str::contains("Not yet ready"));

    let result = read_json(&result_path);
    assert_eq!(result["recommendation"]["band"], "not_yet_ready");
    assert_eq!(result["recommendation"]["domains"][0]["threshold"], 99.0);
}

#[test]
fn help_output() {
    admitscore()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Admissions-test scoring and recommendation pipeline",
        ));
}

#[test]
fn version_output() {
    admitscore()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("admitscore"));
}
