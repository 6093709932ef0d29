//! Loaders for answer keys, threshold tables, and submission payloads.
//!
//! Answer keys and thresholds are TOML; submissions are JSON as delivered by
//! the form tool.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{
    normalize_grade, AnswerKey, AnswerKeySet, Domain, QuestionType, Submission, ThresholdTable,
};

/// Intermediate TOML structure for answer-key files.
#[derive(Debug, Deserialize)]
struct TomlAnswerKeyFile {
    answer_key: TomlAnswerKeyHeader,
    #[serde(default)]
    questions: Vec<AnswerKey>,
}

#[derive(Debug, Deserialize)]
struct TomlAnswerKeyHeader {
    grade: String,
    #[serde(default = "default_form_version")]
    form_version: String,
}

fn default_form_version() -> String {
    "unversioned".to_string()
}

#[derive(Debug, Deserialize)]
struct TomlThresholdFile {
    thresholds: ThresholdTable,
}

/// Parse a single TOML file into an `AnswerKeySet`.
pub fn parse_answer_key(path: &Path) -> Result<AnswerKeySet> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read answer key: {}", path.display()))?;

    parse_answer_key_str(&content, path)
}

/// Parse a TOML string into an `AnswerKeySet` (useful for testing).
pub fn parse_answer_key_str(content: &str, source_path: &Path) -> Result<AnswerKeySet> {
    let parsed: TomlAnswerKeyFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    Ok(AnswerKeySet {
        grade: parsed.answer_key.grade,
        form_version: parsed.answer_key.form_version,
        questions: parsed.questions,
    })
}

/// Recursively load all `.toml` answer keys from a directory.
pub fn load_answer_key_directory(dir: &Path) -> Result<Vec<AnswerKeySet>> {
    let mut sets = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            sets.extend(load_answer_key_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_answer_key(&path) {
                Ok(set) => sets.push(set),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(sets)
}

/// Load answer keys from a file or a directory of files.
pub fn load_answer_keys(path: &Path) -> Result<Vec<AnswerKeySet>> {
    if path.is_dir() {
        load_answer_key_directory(path)
    } else {
        Ok(vec![parse_answer_key(path)?])
    }
}

/// Pick the answer key for a submission's grade. A single key is used
/// regardless of grade; among several, the grades are compared after
/// normalisation ("Grade 7" matches "7").
pub fn select_answer_key<'a>(keys: &'a [AnswerKeySet], grade: &str) -> Option<&'a AnswerKeySet> {
    if let [only] = keys {
        return Some(only);
    }
    let wanted = normalize_grade(grade);
    keys.iter().find(|k| normalize_grade(&k.grade) == wanted)
}

/// Parse a threshold table from a TOML file.
pub fn parse_thresholds(path: &Path) -> Result<ThresholdTable> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read thresholds: {}", path.display()))?;
    parse_thresholds_str(&content, path)
}

pub fn parse_thresholds_str(content: &str, source_path: &Path) -> Result<ThresholdTable> {
    let parsed: TomlThresholdFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;
    Ok(parsed.thresholds)
}

/// Parse a submission payload from a JSON file.
pub fn parse_submission(path: &Path) -> Result<Submission> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read submission: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse submission JSON: {}", path.display()))
}

/// A validation warning for an answer key.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question label (if applicable).
    pub label: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate an answer key for common issues.
pub fn validate_answer_key(set: &AnswerKeySet) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let warn = |label: &AnswerKey, message: String| ValidationWarning {
        label: Some(label.label.clone()),
        message,
    };

    let mut seen_labels = HashSet::new();
    let mut seen_numbers: HashMap<(Domain, QuestionType, u32), &str> = HashMap::new();

    for q in &set.questions {
        if !seen_labels.insert(q.label.to_lowercase()) {
            warnings.push(warn(q, format!("duplicate label: {}", q.label)));
        }

        if q.question_number > 0 {
            let slot = (q.domain, q.question_type, q.question_number);
            if let Some(other) = seen_numbers.insert(slot, &q.label) {
                warnings.push(warn(
                    q,
                    format!(
                        "{} question number {} already used by '{}'",
                        q.domain, q.question_number, other
                    ),
                ));
            }
        }

        if q.question_text.trim().is_empty() {
            warnings.push(warn(q, "question text is empty".into()));
        }

        if q.is_mcq() {
            let options = q.options().count();
            if options < 2 {
                warnings.push(warn(
                    q,
                    format!("multiple-choice question has {options} non-empty option(s), needs at least 2"),
                ));
            }
            if q.correct_letter().is_none() {
                warnings.push(warn(
                    q,
                    format!(
                        "correct answer '{}' is neither a letter with an option nor an option's text",
                        q.correct_answer
                    ),
                ));
            }
        }
    }

    for domain in Domain::ACADEMIC {
        if !set.questions.iter().any(|q| q.domain == domain) {
            warnings.push(ValidationWarning {
                label: None,
                message: format!("no questions configured for {domain}; it will be reported as not assessed"),
            });
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[answer_key]
grade = "7"
form_version = "2024-v3"

[[questions]]
label = "eng_q1"
domain = "english"
construct = "vocabulary"
question_type = "mcq"
question_number = 1
question_text = "Which word is closest in meaning to 'rapid'?"
correct_answer = "B"
option_a = "Slow"
option_b = "Quick"
option_c = "Heavy"
option_d = "Quiet"

[[questions]]
label = "eng_w1"
domain = "english"
question_type = "writing"
question_number = 5
question_text = "Describe a place that is important to you."
"#;

    #[test]
    fn parse_valid_toml() {
        let set = parse_answer_key_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(set.grade, "7");
        assert_eq!(set.form_version, "2024-v3");
        assert_eq!(set.questions.len(), 2);
        assert_eq!(set.questions[0].domain, Domain::English);
        assert!(set.questions[0].is_mcq());
        assert!(!set.questions[1].is_mcq());
        assert!(set.questions[1].construct.is_empty());
    }

    #[test]
    fn parse_missing_form_version() {
        let toml = r#"
[answer_key]
grade = "8"
"#;
        let set = parse_answer_key_str(toml, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(set.form_version, "unversioned");
        assert!(set.questions.is_empty());
    }

    #[test]
    fn validate_flags_bad_mcq_keys() {
        let toml = r#"
[answer_key]
grade = "7"

[[questions]]
label = "m1"
domain = "mathematics"
question_type = "mcq"
question_number = 1
question_text = "2 + 2?"
correct_answer = "C"
option_a = "4"

[[questions]]
label = "M1"
domain = "mathematics"
question_type = "mcq"
question_number = 1
question_text = ""
correct_answer = "A"
option_a = "4"
option_b = "5"
"#;
        let set = parse_answer_key_str(toml, &PathBuf::from("test.toml")).unwrap();
        let warnings = validate_answer_key(&set);
        let messages: Vec<&str> = warnings.iter().map(|w| w.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("needs at least 2")));
        assert!(messages.iter().any(|m| m.contains("correct answer 'C'")));
        assert!(messages.iter().any(|m| m.contains("duplicate label")));
        assert!(messages.iter().any(|m| m.contains("already used by 'm1'")));
        assert!(messages.iter().any(|m| m.contains("question text is empty")));
        assert!(messages.iter().any(|m| m.contains("english")));
    }

    #[test]
    fn fixture_answer_key_is_clean() {
        let set = crate::test_support::fixture_answer_key();
        assert_eq!(set.questions.len(), 15);
        let warnings = validate_answer_key(&set);
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn parse_thresholds_table() {
        let toml = r#"
[thresholds]
school = "Northfield"

[thresholds.grades."7"]
english = 55
mathematics = 60.5
"#;
        let table = parse_thresholds_str(toml, &PathBuf::from("t.toml")).unwrap();
        assert_eq!(table.school, "Northfield");
        assert_eq!(table.threshold("7", Domain::English), Some(55.0));
        assert_eq!(table.threshold("7", Domain::Mathematics), Some(60.5));
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        let result = parse_answer_key_str(bad, &PathBuf::from("bad.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("g7.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("broken.toml"), "not toml {").unwrap();

        let sets = load_answer_key_directory(dir.path()).unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].grade, "7");
    }

    #[test]
    fn parse_submission_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub.json");
        std::fs::write(
            &path,
            r#"{"submission_id": "s1", "student_name": "Ana", "answers": {"x_eng_q1": "B"}}"#,
        )
        .unwrap();
        let sub = parse_submission(&path).unwrap();
        assert_eq!(sub.locale, "en");
        assert_eq!(sub.answers.len(), 1);
    }

    #[test]
    fn selects_answer_key_by_normalised_grade() {
        let mut seven = parse_answer_key_str(VALID_TOML, Path::new("a.toml")).unwrap();
        seven.grade = "7".into();
        let mut eight = seven.clone();
        eight.grade = "Grade 8".into();
        let keys = vec![seven, eight];

        assert_eq!(select_answer_key(&keys, "Year 8").unwrap().grade, "Grade 8");
        assert_eq!(select_answer_key(&keys, "G7").unwrap().grade, "7");
        assert!(select_answer_key(&keys, "9").is_none());
        assert_eq!(select_answer_key(&keys[..1], "9").unwrap().grade, "7");
        assert!(select_answer_key(&[], "7").is_none());
    }
}
