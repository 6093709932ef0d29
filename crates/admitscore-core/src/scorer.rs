//! MCQ scorer: infers the selected option letter for each resolved answer and
//! aggregates correctness per domain and per construct.
//!
//! Scoring is a pure function of (submission, answer key). Letter inference
//! never guesses: a strategy that finds more than one candidate defers to the
//! next, and an answer no strategy can place scores incorrect with no letter.

use std::collections::BTreeMap;

use crate::error::ScoringIssue;
use crate::model::{
    AnswerKey, AnswerKeySet, ConstructScore, Domain, DomainScore, Letter, LetterMatch,
    QuestionResult,
};
use crate::observer::ScoringObserver;
use crate::resolver::Resolution;
use crate::text;

/// Shortest normalized text allowed to participate in containment matching.
const MIN_CONTAINMENT_CHARS: usize = 2;

/// Infer which option a free-text answer selects.
///
/// Strategies, in order:
/// 1. exact match after case/whitespace normalization;
/// 2. bidirectional containment on word boundaries;
/// 3. a leading letter pattern such as `B) …`, `B. …`, `B: …` or `(B) …`;
/// 4. the whole answer is a single A–D letter.
pub fn infer_letter(answer: &str, key: &AnswerKey) -> Option<(Letter, LetterMatch)> {
    let student = text::normalize(answer);
    if student.is_empty() {
        return None;
    }
    let options: Vec<(Letter, String)> = key
        .options()
        .map(|(l, opt)| (l, text::normalize(opt)))
        .collect();

    let exact: Vec<Letter> = options
        .iter()
        .filter(|(_, opt)| *opt == student)
        .map(|(l, _)| *l)
        .collect();
    if let [letter] = exact.as_slice() {
        return Some((*letter, LetterMatch::ExactText));
    }

    let contained: Vec<Letter> = options
        .iter()
        .filter(|(_, opt)| {
            let forward = opt.chars().count() >= MIN_CONTAINMENT_CHARS
                && text::contains_word(&student, opt);
            let backward = student.chars().count() >= MIN_CONTAINMENT_CHARS
                && text::contains_word(opt, &student);
            forward || backward
        })
        .map(|(l, _)| *l)
        .collect();
    if let [letter] = contained.as_slice() {
        return Some((*letter, LetterMatch::Containment));
    }

    if let Some(letter) = leading_letter(answer) {
        if options.iter().any(|(l, _)| *l == letter) {
            return Some((letter, LetterMatch::LeadingLetter));
        }
    }

    let trimmed = answer.trim();
    let mut chars = trimmed.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if let Some(letter) = Letter::from_char(c) {
            if options.iter().any(|(l, _)| *l == letter) {
                return Some((letter, LetterMatch::SingleLetter));
            }
        }
    }

    None
}

/// Parse `B) …`, `B. …`, `B: …` or `(B) …`.
fn leading_letter(answer: &str) -> Option<Letter> {
    let trimmed = answer.trim();
    let (letter_char, rest) = if let Some(inner) = trimmed.strip_prefix('(') {
        let mut chars = inner.chars();
        let c = chars.next()?;
        (c, chars.as_str().strip_prefix(')')?)
    } else {
        let mut chars = trimmed.chars();
        let c = chars.next()?;
        let rest = chars.as_str();
        let rest = rest
            .strip_prefix(')')
            .or_else(|| rest.strip_prefix('.'))
            .or_else(|| rest.strip_prefix(':'))?;
        (c, rest)
    };
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Letter::from_char(letter_char)
}

/// Output of scoring one submission's MCQ items.
#[derive(Debug, Clone, PartialEq)]
pub struct McqScores {
    pub questions: Vec<QuestionResult>,
    pub domains: Vec<DomainScore>,
    pub constructs: Vec<ConstructScore>,
}

impl McqScores {
    pub fn domain(&self, domain: Domain) -> Option<&DomainScore> {
        self.domains.iter().find(|d| d.domain == domain)
    }
}

/// Score every MCQ item in the answer key against the resolved answers.
pub fn score_mcq(
    resolution: &Resolution,
    answer_key: &AnswerKeySet,
    observer: &dyn ScoringObserver,
) -> McqScores {
    let mut questions: Vec<QuestionResult> = Vec::new();

    for key in answer_key.mcq() {
        let student_answer = resolution.answer(&key.label).map(str::to_string);
        let correct_answer = key.correct_letter();
        if correct_answer.is_none() {
            observer.on_issue(&ScoringIssue::MissingConfiguration {
                domain: key.domain,
                detail: format!("'{}' has no usable correct answer", key.label),
            });
        }

        let inferred = student_answer
            .as_deref()
            .and_then(|answer| infer_letter(answer, key));
        if let (Some(answer), None) = (&student_answer, inferred) {
            observer.on_issue(&ScoringIssue::NoAnswerMatch {
                label: key.label.clone(),
                answer: answer.clone(),
            });
        }

        let inferred_letter = inferred.map(|(l, _)| l);
        let is_correct = matches!((inferred_letter, correct_answer), (Some(a), Some(b)) if a == b);

        questions.push(QuestionResult {
            label: key.label.clone(),
            question_number: key.question_number,
            domain: key.domain,
            construct: key.construct.clone(),
            student_answer,
            inferred_letter,
            letter_match: inferred.map(|(_, m)| m),
            correct_answer,
            is_correct,
        });
    }

    questions.sort_by(|a, b| {
        (a.domain, a.question_number, &a.label).cmp(&(b.domain, b.question_number, &b.label))
    });

    let domains = aggregate_domains(&questions, answer_key, observer);
    let constructs = aggregate_constructs(&questions);

    McqScores {
        questions,
        domains,
        constructs,
    }
}

/// Percentage with one decimal; zero when there is nothing to score.
pub fn pct(correct: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    text::round1(correct as f64 / total as f64 * 100.0)
}

/// Correct and total counts over the items that have a usable correct answer.
/// Misconfigured items are reported separately and never count against the
/// student.
fn tally<'a>(items: impl Iterator<Item = &'a QuestionResult>) -> (u32, u32) {
    items
        .filter(|q| q.correct_answer.is_some())
        .fold((0, 0), |(c, t), q| (c + u32::from(q.is_correct), t + 1))
}

fn aggregate_domains(
    questions: &[QuestionResult],
    answer_key: &AnswerKeySet,
    observer: &dyn ScoringObserver,
) -> Vec<DomainScore> {
    Domain::ALL
        .into_iter()
        .filter(|d| {
            d.is_academic()
                || *d == Domain::Mindset
                || answer_key.questions.iter().any(|q| q.domain == *d)
        })
        .filter_map(|domain| {
            let has_writing = answer_key.writing().any(|q| q.domain == domain);
            let has_mcq = questions.iter().any(|q| q.domain == domain);
            let (correct, total) = tally(questions.iter().filter(|q| q.domain == domain));
            if !has_mcq && has_writing {
                // Writing-only domain: no MCQ score to report.
                return None;
            }
            if !has_mcq && (domain.is_academic() || domain == Domain::Mindset) {
                observer.on_issue(&ScoringIssue::MissingConfiguration {
                    domain,
                    detail: "no multiple-choice items configured".into(),
                });
            }
            let scaled = (domain == Domain::Mindset && total > 0)
                .then(|| text::round1(correct as f64 / total as f64 * 4.0));
            Some(DomainScore {
                domain,
                correct,
                total,
                pct: pct(correct, total),
                assessed: total > 0,
                scaled,
            })
        })
        .collect()
}

fn aggregate_constructs(questions: &[QuestionResult]) -> Vec<ConstructScore> {
    let mut grouped: BTreeMap<(Domain, &str), Vec<&QuestionResult>> = BTreeMap::new();
    for q in questions {
        let construct = if q.construct.trim().is_empty() {
            "general"
        } else {
            q.construct.as_str()
        };
        grouped.entry((q.domain, construct)).or_default().push(q);
    }
    grouped
        .into_iter()
        .filter_map(|((domain, construct), items)| {
            let (correct, total) = tally(items.into_iter());
            (total > 0).then(|| ConstructScore {
                domain,
                construct: construct.to_string(),
                correct,
                total,
                pct: pct(correct, total),
            })
        })
        .collect()
}
