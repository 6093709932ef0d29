//! Field resolver: maps opaque, versioned payload keys onto answer-key labels.
//!
//! Payload keys look like `<opaque-prefix>_<semantic-suffix>`. The suffix
//! convention changed across form-schema versions, so resolution runs an
//! ordered chain of [`MatchStrategy`] objects selected per detected
//! [`SchemaVersion`]:
//!
//! 1. [`ExactLabel`]: the suffix (or whole key) equals a configured label.
//! 2. [`DomainKeyword`]: a domain keyword plus a question number in the suffix.
//! 3. [`QuestionText`]: suffix words overlap one question's configured text.
//!
//! Strategies run as passes over every still-unresolved field, strongest
//! first. A label is claimed at most once per resolution; a label hit by two
//! fields in the same pass claims neither. Ambiguous or unmatched fields are
//! skipped and reported, never guessed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::ScoringIssue;
use crate::model::{AnswerKey, AnswerKeySet, Domain, RawValue, Submission};
use crate::observer::ScoringObserver;
use crate::text;

/// Minimum share of suffix words a question text must cover.
const MIN_TEXT_OVERLAP: f64 = 0.75;
/// Minimum number of meaningful suffix words for text inference.
const MIN_TEXT_TOKENS: usize = 2;

const STOPWORDS: &[&str] = &[
    "the", "a", "an", "of", "is", "are", "what", "which", "to", "in", "and", "for", "q", "qn",
    "question", "how", "many", "do", "does", "i", "you", "it", "on", "at",
];

/// Historical payload key conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaVersion {
    /// `<prefix>_<label>`, e.g. `f3a9c1_eng_q1`.
    V1Labels,
    /// `<prefix>_<domain><Question><n>`, e.g. `a81d_englishQuestion1`.
    V2DomainNumbered,
    /// `<prefix>_<question text slug>`, e.g. `77c2_mainIdeaCoralReefs`.
    V3QuestionText,
    /// No convention dominates.
    Mixed,
}

/// Which strategy resolved a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    ExactLabel,
    DomainKeyword,
    QuestionText,
}

/// Outcome of one strategy for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Match {
    Unique(String),
    Ambiguous(Vec<String>),
    NoMatch,
}

/// A swappable label-matching strategy.
pub trait MatchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Match one field against the answer key.
    fn find(&self, key: &str, suffix: &str, answer_key: &AnswerKeySet) -> Match;
}

/// The suffix or the full key equals a label, ignoring case.
pub struct ExactLabel;

impl MatchStrategy for ExactLabel {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ExactLabel
    }

    fn find(&self, key: &str, suffix: &str, answer_key: &AnswerKeySet) -> Match {
        let hit = |candidate: &str| {
            answer_key
                .questions
                .iter()
                .find(|q| q.label.trim().eq_ignore_ascii_case(candidate.trim()))
                .map(|q| q.label.clone())
        };
        match hit(suffix).or_else(|| hit(key)) {
            Some(label) => Match::Unique(label),
            None => Match::NoMatch,
        }
    }
}

/// A single domain keyword plus a question number in the suffix.
pub struct DomainKeyword;

impl MatchStrategy for DomainKeyword {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DomainKeyword
    }

    fn find(&self, _key: &str, suffix: &str, answer_key: &AnswerKeySet) -> Match {
        let tokens = text::tokenize(suffix);
        let Some(number) = question_number(&tokens) else {
            return Match::NoMatch;
        };
        let domains: Vec<Domain> = Domain::ALL
            .into_iter()
            .filter(|d| d.keywords().iter().any(|k| tokens.iter().any(|t| t == k)))
            .collect();

        let candidates: Vec<String> = answer_key
            .questions
            .iter()
            .filter(|q| domains.contains(&q.domain) && q.question_number == number)
            .map(|q| q.label.clone())
            .collect();

        to_match(candidates)
    }
}

/// Suffix words overlap one configured question text (or construct) clearly
/// better than any other.
pub struct QuestionText;

impl MatchStrategy for QuestionText {
    fn kind(&self) -> StrategyKind {
        StrategyKind::QuestionText
    }

    fn find(&self, _key: &str, suffix: &str, answer_key: &AnswerKeySet) -> Match {
        let wanted = content_tokens(suffix);
        if wanted.len() < MIN_TEXT_TOKENS {
            return Match::NoMatch;
        }

        let mut scored: Vec<(f64, &AnswerKey)> = answer_key
            .questions
            .iter()
            .map(|q| {
                let mut have = content_tokens(&q.question_text);
                have.extend(content_tokens(&q.construct));
                let hits = wanted.iter().filter(|t| have.contains(*t)).count();
                (hits as f64 / wanted.len() as f64, q)
            })
            .filter(|(overlap, _)| *overlap >= MIN_TEXT_OVERLAP)
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        match scored.as_slice() {
            [] => Match::NoMatch,
            [(_, only)] => Match::Unique(only.label.clone()),
            [(best, q), (second, _), ..] if best > second => Match::Unique(q.label.clone()),
            [(best, _), ..] => Match::Ambiguous(
                scored
                    .iter()
                    .filter(|(s, _)| s == best)
                    .map(|(_, q)| q.label.clone())
                    .collect(),
            ),
        }
    }
}

fn to_match(mut candidates: Vec<String>) -> Match {
    match candidates.len() {
        0 => Match::NoMatch,
        1 => Match::Unique(candidates.remove(0)),
        _ => Match::Ambiguous(candidates),
    }
}

/// The question number in a token list: the only numeric token, or the one
/// right after a `q`/`question`/`item` marker.
pub fn question_number(tokens: &[String]) -> Option<u32> {
    let numeric: Vec<(usize, u32)> = tokens
        .iter()
        .enumerate()
        .filter_map(|(i, t)| t.parse::<u32>().ok().map(|n| (i, n)))
        .collect();
    match numeric.as_slice() {
        [] => None,
        [(_, n)] => Some(*n),
        _ => numeric
            .iter()
            .find(|(i, _)| {
                *i > 0 && matches!(tokens[i - 1].as_str(), "q" | "qn" | "question" | "item")
            })
            .map(|(_, n)| *n),
    }
}

fn content_tokens(s: &str) -> BTreeSet<String> {
    text::tokenize(s)
        .into_iter()
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .filter(|t| t.len() >= 2 || t.chars().all(|c| c.is_ascii_digit()))
        .collect()
}

/// Strip the opaque prefix from a payload key.
pub fn strip_prefix(key: &str) -> &str {
    match key.split_once('_') {
        Some((_, suffix)) if !suffix.is_empty() => suffix,
        _ => key,
    }
}

/// Guess which historical convention a payload follows.
pub fn detect_schema(submission: &Submission, answer_key: &AnswerKeySet) -> SchemaVersion {
    let (mut v1, mut v2, mut v3) = (0usize, 0usize, 0usize);
    for key in submission.answers.keys() {
        let suffix = strip_prefix(key);
        if matches!(ExactLabel.find(key, suffix, answer_key), Match::Unique(_)) {
            v1 += 1;
            continue;
        }
        let tokens = text::tokenize(suffix);
        if Domain::infer_from_tokens(&tokens).is_some() && question_number(&tokens).is_some() {
            v2 += 1;
        } else {
            v3 += 1;
        }
    }

    let total = v1 + v2 + v3;
    if total == 0 {
        return SchemaVersion::Mixed;
    }
    let dominant = |n: usize| n * 2 > total;
    if dominant(v1) {
        SchemaVersion::V1Labels
    } else if dominant(v2) {
        SchemaVersion::V2DomainNumbered
    } else if dominant(v3) {
        SchemaVersion::V3QuestionText
    } else {
        SchemaVersion::Mixed
    }
}

/// The ordered strategy chain for a schema version.
pub fn chain_for(schema: SchemaVersion) -> Vec<Box<dyn MatchStrategy>> {
    match schema {
        SchemaVersion::V1Labels => vec![Box::new(ExactLabel)],
        SchemaVersion::V2DomainNumbered => vec![Box::new(ExactLabel), Box::new(DomainKeyword)],
        SchemaVersion::V3QuestionText | SchemaVersion::Mixed => vec![
            Box::new(ExactLabel),
            Box::new(DomainKeyword),
            Box::new(QuestionText),
        ],
    }
}

/// A payload field mapped to a canonical label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedField {
    pub label: String,
    pub source_key: String,
    pub text: Option<String>,
    pub strategy: StrategyKind,
}

/// A payload field that was not mapped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedField {
    pub key: String,
    /// Labels the field was ambiguous between; empty when nothing matched.
    pub candidates: Vec<String>,
}

/// Result of resolving one submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolution {
    pub schema: SchemaVersion,
    /// Label → resolved field.
    pub fields: BTreeMap<String, ResolvedField>,
    pub skipped: Vec<SkippedField>,
}

impl Resolution {
    /// Resolved answer text for a label.
    pub fn answer(&self, label: &str) -> Option<&str> {
        self.fields.get(label).and_then(|f| f.text.as_deref())
    }
}

/// Resolve a submission using the chain for its detected schema version.
pub fn resolve(
    submission: &Submission,
    answer_key: &AnswerKeySet,
    observer: &dyn ScoringObserver,
) -> Resolution {
    let schema = detect_schema(submission, answer_key);
    resolve_with(submission, answer_key, schema, &chain_for(schema), observer)
}

/// Resolve a submission with an explicit strategy chain.
pub fn resolve_with(
    submission: &Submission,
    answer_key: &AnswerKeySet,
    schema: SchemaVersion,
    chain: &[Box<dyn MatchStrategy>],
    observer: &dyn ScoringObserver,
) -> Resolution {
    let mut pending: Vec<(&String, &RawValue)> = submission.answers.iter().collect();
    let mut fields: BTreeMap<String, ResolvedField> = BTreeMap::new();
    let mut ambiguous: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for strategy in chain {
        let mut hits: BTreeMap<String, Vec<(&String, &RawValue)>> = BTreeMap::new();
        let mut still_pending = Vec::new();

        for (key, value) in pending {
            match strategy.find(key, strip_prefix(key), answer_key) {
                Match::Unique(label) if fields.contains_key(&label) => {
                    ambiguous.insert(key.clone(), vec![label]);
                }
                Match::Unique(label) => hits.entry(label).or_default().push((key, value)),
                Match::Ambiguous(candidates) => {
                    ambiguous.insert(key.clone(), candidates);
                }
                Match::NoMatch => still_pending.push((key, value)),
            }
        }

        for (label, claimants) in hits {
            if let [(key, value)] = claimants.as_slice() {
                fields.insert(
                    label.clone(),
                    ResolvedField {
                        label,
                        source_key: (*key).clone(),
                        text: value.text(),
                        strategy: strategy.kind(),
                    },
                );
            } else {
                for (key, _) in claimants {
                    ambiguous.insert(key.clone(), vec![label.clone()]);
                }
            }
        }
        pending = still_pending;
    }

    let mut skipped = Vec::new();
    for (key, candidates) in ambiguous {
        observer.on_issue(&ScoringIssue::ResolutionAmbiguity {
            key: key.clone(),
            candidates: candidates.clone(),
        });
        skipped.push(SkippedField { key, candidates });
    }
    for (key, _) in pending {
        observer.on_issue(&ScoringIssue::UnmatchedField { key: key.clone() });
        skipped.push(SkippedField {
            key: key.clone(),
            candidates: Vec::new(),
        });
    }
    skipped.sort_by(|a, b| a.key.cmp(&b.key));

    Resolution {
        schema,
        fields,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::{NoopObserver, RecordingObserver};
    use crate::test_support::{fixture_answer_key, fixture_submission};

    #[test]
    fn strip_prefix_keeps_suffix() {
        assert_eq!(strip_prefix("f3a9c1_eng_q1"), "eng_q1");
        assert_eq!(strip_prefix("noprefix"), "noprefix");
        assert_eq!(strip_prefix("trailing_"), "trailing_");
    }

    #[test]
    fn question_number_prefers_marker() {
        let t = |s: &str| text::tokenize(s);
        assert_eq!(question_number(&t("englishQuestion3")), Some(3));
        assert_eq!(question_number(&t("y7_maths_q12")), Some(12));
        assert_eq!(question_number(&t("2024_9")), None);
        assert_eq!(question_number(&t("englishWriting")), None);
    }

    #[test]
    fn v1_fixture_resolves_by_exact_label() {
        let key = fixture_answer_key();
        let sub = fixture_submission("v1_labels.json");
        let observer = RecordingObserver::new();
        let res = resolve(&sub, &key, &observer);

        assert_eq!(res.schema, SchemaVersion::V1Labels);
        assert_eq!(res.fields.len(), 15);
        assert!(res
            .fields
            .values()
            .all(|f| f.strategy == StrategyKind::ExactLabel));
        assert_eq!(res.answer("eng_q1"), Some("B) Quick"));
        // The consent checkbox is not a question and must not be guessed.
        assert_eq!(res.skipped.len(), 1);
        assert_eq!(res.skipped[0].key, "f3a9c1_consent");
        assert_eq!(
            observer.issues(),
            vec![ScoringIssue::UnmatchedField {
                key: "f3a9c1_consent".into()
            }]
        );
    }

    #[test]
    fn v2_fixture_resolves_by_domain_keyword() {
        let key = fixture_answer_key();
        let sub = fixture_submission("v2_domain_numbered.json");
        let res = resolve(&sub, &key, &NoopObserver);

        assert_eq!(res.schema, SchemaVersion::V2DomainNumbered);
        assert_eq!(res.fields.len(), 13);
        assert_eq!(res.fields["math_q3"].source_key, "a81d_mathsQuestion3");
        assert_eq!(res.fields["math_q3"].strategy, StrategyKind::DomainKeyword);
        assert_eq!(res.answer("eng_q2"), Some("Reefs are threatened by warming seas"));
        // Writing fields carry no number; they are left for the extractor.
        let skipped: Vec<&str> = res.skipped.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(skipped, vec!["a81d_englishWriting", "a81d_mathsWriting"]);
    }

    #[test]
    fn v3_fixture_resolves_by_question_text() {
        let key = fixture_answer_key();
        let sub = fixture_submission("v3_question_text.json");
        let res = resolve(&sub, &key, &NoopObserver);

        assert_eq!(res.schema, SchemaVersion::V3QuestionText);
        assert_eq!(res.fields["eng_q2"].source_key, "77c2_mainIdeaCoralReefs");
        assert_eq!(res.fields["math_q1"].source_key, "77c2_whatIs3_4Of12");
        assert_eq!(res.fields["reas_q3"].source_key, "77c2_whichNumberIsMissing");
        assert_eq!(res.fields["eng_w1"].source_key, "77c2_describeAPlaceImportantToYou");
        assert!(res
            .fields
            .values()
            .all(|f| f.strategy == StrategyKind::QuestionText));
        // "solveForX" has a single meaningful word: too little to infer from.
        assert!(!res.fields.contains_key("math_q4"));
        assert!(res.skipped.iter().any(|s| s.key == "77c2_solveForX"));
    }

    #[test]
    fn competing_conventions_claim_a_label_once() {
        let key = fixture_answer_key();
        let mut sub = fixture_submission("v1_labels.json");
        // A legacy duplicate of eng_q1 in the V2 style.
        sub.answers.insert(
            "zz_englishQuestion1".into(),
            RawValue::Text("A) Slow".into()),
        );
        let chain = chain_for(SchemaVersion::Mixed);
        let res = resolve_with(&sub, &key, SchemaVersion::Mixed, &chain, &NoopObserver);

        assert_eq!(res.fields["eng_q1"].source_key, "f3a9c1_eng_q1");
        let dup = res
            .skipped
            .iter()
            .find(|s| s.key == "zz_englishQuestion1")
            .unwrap();
        assert_eq!(dup.candidates, vec!["eng_q1".to_string()]);
    }

    #[test]
    fn two_fields_hitting_one_label_in_a_pass_claim_nothing() {
        let key = fixture_answer_key();
        let mut sub = fixture_submission("v2_domain_numbered.json");
        sub.answers.insert(
            "b99_engQuestion1".into(),
            RawValue::Text("Slow".into()),
        );
        let observer = RecordingObserver::new();
        let res = resolve(&sub, &key, &observer);

        assert!(!res.fields.contains_key("eng_q1"));
        let ambiguous = observer
            .issues()
            .into_iter()
            .filter(|i| matches!(i, ScoringIssue::ResolutionAmbiguity { .. }))
            .count();
        assert_eq!(ambiguous, 2);
    }

    #[test]
    fn resolution_is_deterministic() {
        let key = fixture_answer_key();
        let sub = fixture_submission("v3_question_text.json");
        let a = resolve(&sub, &key, &NoopObserver);
        let b = resolve(&sub, &key, &NoopObserver);
        assert_eq!(a.fields, b.fields);
        assert_eq!(a.skipped, b.skipped);
    }
}
