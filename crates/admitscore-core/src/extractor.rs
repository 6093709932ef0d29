//! Writing extractor: finds extended-response answers in a submission.
//!
//! Two sources feed it. Fields the resolver mapped onto a writing-type label
//! become tasks directly. Fields the resolver skipped are scanned for
//! free-text markers (suffix words such as `writing` or `essay`, or a tagged
//! value whose kind is a long-text widget); those need a single inferable
//! domain, and each domain is claimed at most once.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::ScoringIssue;
use crate::model::{AnswerKeySet, Domain, RawValue, Submission, WritingTask};
use crate::observer::ScoringObserver;
use crate::resolver::{strip_prefix, Resolution};
use crate::text;

/// Suffix words that mark a free-text field.
const WRITING_MARKERS: &[&str] = &[
    "writing", "essay", "extended", "composition", "freetext", "narrative", "explain",
];

/// Tagged-value kinds used by long-text widgets across form versions.
const LONG_TEXT_KINDS: &[&str] = &["textarea", "long_text", "longtext", "paragraph", "essay", "free_text"];

/// Whether a raw field looks like an extended response.
pub fn is_writing_field(key: &str, value: &RawValue) -> bool {
    if value
        .kind()
        .is_some_and(|k| LONG_TEXT_KINDS.contains(&k.trim().to_lowercase().as_str()))
    {
        return true;
    }
    let tokens = text::tokenize(strip_prefix(key));
    tokens.iter().any(|t| WRITING_MARKERS.contains(&t.as_str()))
}

/// Collect writing tasks, ordered by domain then source key.
pub fn extract_writing(
    submission: &Submission,
    resolution: &Resolution,
    answer_key: &AnswerKeySet,
    observer: &dyn ScoringObserver,
) -> Vec<WritingTask> {
    let task = |domain: Domain, label: Option<String>, key: &str, prompt: &str, response: String| {
        WritingTask {
            domain,
            label,
            source_key: key.to_string(),
            prompt_text: prompt.to_string(),
            student_response: response,
            grade: submission.grade.clone(),
            locale: submission.locale.clone(),
            programme: submission.programme.clone(),
        }
    };

    let mut tasks = Vec::new();
    let mut claimed: BTreeSet<Domain> = BTreeSet::new();

    for question in answer_key.writing() {
        let Some(field) = resolution.fields.get(&question.label) else {
            continue;
        };
        let Some(response) = field.text.clone() else {
            continue;
        };
        claimed.insert(question.domain);
        tasks.push(task(
            question.domain,
            Some(question.label.clone()),
            field.source_key.as_str(),
            question.question_text.as_str(),
            response,
        ));
    }

    // Heuristic pass over fields the resolver could not place.
    let mut by_domain: BTreeMap<Domain, Vec<(&str, String)>> = BTreeMap::new();
    for skipped in &resolution.skipped {
        let Some(value) = submission.answers.get(&skipped.key) else {
            continue;
        };
        if !is_writing_field(&skipped.key, value) {
            continue;
        }
        let Some(response) = value.text() else {
            continue;
        };
        let tokens = text::tokenize(strip_prefix(&skipped.key));
        match Domain::infer_from_tokens(&tokens) {
            Some(domain) => by_domain
                .entry(domain)
                .or_default()
                .push((skipped.key.as_str(), response)),
            None => tracing::debug!(key = %skipped.key, "writing field has no inferable domain"),
        }
    }

    for (domain, mut fields) in by_domain {
        if claimed.contains(&domain) || fields.len() > 1 {
            for (key, _) in &fields {
                observer.on_issue(&ScoringIssue::ResolutionAmbiguity {
                    key: key.to_string(),
                    candidates: vec![domain.to_string()],
                });
            }
            continue;
        }
        let (key, response) = fields.remove(0);
        claimed.insert(domain);
        match answer_key.sole_writing_key(domain) {
            Some(q) => tasks.push(task(domain, Some(q.label.clone()), key, q.question_text.as_str(), response)),
            None => tasks.push(task(domain, None, key, "", response)),
        }
    }

    tasks.sort_by(|a, b| (a.domain, &a.source_key).cmp(&(b.domain, &b.source_key)));
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{NoopObserver, RecordingObserver};
    use crate::resolver::resolve;
    use crate::test_support::{fixture_answer_key, fixture_submission};

    fn extract(name: &str) -> Vec<WritingTask> {
        let key = fixture_answer_key();
        let sub = fixture_submission(name);
        let res = resolve(&sub, &key, &NoopObserver);
        extract_writing(&sub, &res, &key, &NoopObserver)
    }

    #[test]
    fn labelled_writing_fields_become_tasks() {
        let tasks = extract("v1_labels.json");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].domain, Domain::English);
        assert_eq!(tasks[0].label.as_deref(), Some("eng_w1"));
        assert!(tasks[0].prompt_text.starts_with("Describe a place"));
        assert!(tasks[0].student_response.contains("grandmother"));
        assert_eq!(tasks[0].grade, "Grade 7");
        assert_eq!(tasks[1].domain, Domain::Mathematics);
    }

    #[test]
    fn unlabelled_fields_use_markers_and_domain_prompt() {
        let tasks = extract("v2_domain_numbered.json");
        let keys: Vec<&str> = tasks.iter().map(|t| t.source_key.as_str()).collect();
        assert_eq!(keys, vec!["a81d_englishWriting", "a81d_mathsWriting"]);
        assert_eq!(tasks[1].label.as_deref(), Some("math_w1"));
        assert!(tasks[1].prompt_text.contains("12 pens"));
    }

    #[test]
    fn short_responses_are_still_extracted() {
        let tasks = extract("v3_question_text.json");
        let english = tasks.iter().find(|t| t.domain == Domain::English).unwrap();
        assert_eq!(english.student_response, "Nice.");
        assert_eq!(tasks.len(), 2);
    }

    #[test]
    fn second_claim_on_a_domain_is_rejected() {
        let key = fixture_answer_key();
        let mut sub = fixture_submission("v1_labels.json");
        sub.answers.insert(
            "old_englishEssay".into(),
            RawValue::Text("An older copy of the essay answer.".into()),
        );
        let observer = RecordingObserver::new();
        let res = resolve(&sub, &key, &NoopObserver);
        let tasks = extract_writing(&sub, &res, &key, &observer);

        assert_eq!(tasks.len(), 2);
        assert!(tasks.iter().all(|t| t.source_key != "old_englishEssay"));
        assert_eq!(
            observer.issues(),
            vec![ScoringIssue::ResolutionAmbiguity {
                key: "old_englishEssay".into(),
                candidates: vec!["english".into()],
            }]
        );
    }

    #[test]
    fn missing_prompt_is_left_empty() {
        let mut key = fixture_answer_key();
        key.questions.retain(|q| q.label != "math_w1");
        let sub = fixture_submission("v2_domain_numbered.json");
        let res = resolve(&sub, &key, &NoopObserver);
        let tasks = extract_writing(&sub, &res, &key, &NoopObserver);

        let maths = tasks.iter().find(|t| t.domain == Domain::Mathematics).unwrap();
        assert_eq!(maths.label, None);
        assert_eq!(maths.prompt_text, "");
    }

    #[test]
    fn writing_markers() {
        let text = RawValue::Text("x".into());
        assert!(is_writing_field("ab_englishWriting", &text));
        assert!(is_writing_field("ab_extended_response_maths", &text));
        assert!(!is_writing_field("ab_englishQuestion1", &text));
        let tagged: RawValue =
            serde_json::from_str(r#"{"type": "Textarea", "value": "x"}"#).unwrap();
        assert!(is_writing_field("ab_q9", &tagged));
    }
}
