//! Executive summary generator.
//!
//! Asks the generative service for a short narrative that opens with the
//! student's name, checks that it does, and otherwise falls back to a
//! template sentence built from the overall percentage and band.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::analyser::McqAnalysis;
use crate::error::ScoringIssue;
use crate::model::{DomainScore, EvaluationSource, WritingEvaluation};
use crate::observer::ScoringObserver;
use crate::recommendation::{RecommendationBand, RecommendationResult};
use crate::retry::{complete, AiSettings};
use crate::traits::LlmProvider;

const MIN_SENTENCES: usize = 3;
const MAX_SENTENCES: usize = 4;

/// Opening of the name used when a payload carries no student name.
const STAND_IN_PREFIX: &str = "Student ";

const SYSTEM_PROMPT: &str = "You write concise executive summaries of admissions test \
results for school staff. Write in the third person, in plain prose with no headings, \
lists or markdown.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveSummary {
    pub text: String,
    pub source: EvaluationSource,
    #[serde(default)]
    pub needs_manual_review: bool,
}

/// The evidence the summary is written from.
pub struct SummaryContext<'a> {
    pub student_name: &'a str,
    pub submission_id: &'a str,
    pub grade: &'a str,
    pub domain_scores: &'a [DomainScore],
    pub evaluations: &'a [WritingEvaluation],
    pub analyses: &'a [McqAnalysis],
    pub recommendation: &'a RecommendationResult,
}

impl SummaryContext<'_> {
    /// The name the summary must open with.
    pub fn display_name(&self) -> String {
        display_name(self.student_name, self.submission_id)
    }
}

/// The student's name, or a stable stand-in when the payload has none.
pub fn display_name(student_name: &str, submission_id: &str) -> String {
    let name = student_name.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.is_empty() {
        format!("{STAND_IN_PREFIX}{submission_id}")
    } else {
        name
    }
}

pub struct SummaryGenerator {
    provider: Option<Arc<dyn LlmProvider>>,
    settings: AiSettings,
}

impl SummaryGenerator {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>, settings: AiSettings) -> Self {
        Self { provider, settings }
    }

    pub async fn generate(
        &self,
        context: &SummaryContext<'_>,
        observer: &dyn ScoringObserver,
    ) -> ExecutiveSummary {
        let name = context.display_name();
        let request = self
            .settings
            .request(SYSTEM_PROMPT, build_prompt(context, &name), false);
        let reply = complete(self.provider.as_deref(), &request, &self.settings.retry, "summary")
            .await
            .and_then(|content| {
                validate_summary(&content, &name).map_err(|reason| {
                    ScoringIssue::MalformedAiResponse {
                        task: "summary".into(),
                        reason,
                    }
                })
            });

        match reply {
            Ok(text) => ExecutiveSummary {
                text,
                source: EvaluationSource::Ai,
                needs_manual_review: false,
            },
            Err(issue) => {
                observer.on_issue(&issue);
                ExecutiveSummary {
                    text: template_summary(
                        &name,
                        context.recommendation.overall_academic_pct,
                        context.recommendation.band,
                    ),
                    source: EvaluationSource::Fallback,
                    needs_manual_review: true,
                }
            }
        }
    }
}

fn build_prompt(context: &SummaryContext<'_>, name: &str) -> String {
    let rec = context.recommendation;
    let mut prompt = format!(
        "Student: {name}\nGrade: {}\nRecommendation: {}\nOverall academic score: {:.1}%\n\nDomain results:\n",
        context.grade, rec.band, rec.overall_academic_pct
    );
    for outcome in &rec.domains {
        match (outcome.combined_pct, outcome.threshold, outcome.delta) {
            (Some(pct), Some(t), Some(d)) => prompt.push_str(&format!(
                "- {}: {pct:.1}% (threshold {t:.1}%, {d:+.1})\n",
                outcome.domain.display_name()
            )),
            _ => prompt.push_str(&format!(
                "- {}: not assessed\n",
                outcome.domain.display_name()
            )),
        }
    }
    for score in context.domain_scores.iter().filter(|d| !d.domain.is_academic()) {
        if let Some(scaled) = score.scaled {
            prompt.push_str(&format!(
                "- {}: {scaled:.1} out of 4\n",
                score.domain.display_name()
            ));
        }
    }
    if !context.evaluations.is_empty() {
        prompt.push_str("\nWriting:\n");
        for e in context.evaluations {
            prompt.push_str(&format!(
                "- {}: {} ({:.1}/4). {}\n",
                e.domain.display_name(),
                e.band,
                e.score,
                e.content_narrative
            ));
        }
    }
    if !context.analyses.is_empty() {
        prompt.push_str("\nDiagnostic notes:\n");
        for a in context.analyses {
            prompt.push_str(&format!("- {}: {}\n", a.domain.display_name(), a.narrative));
        }
    }
    prompt.push_str(&format!(
        "\nWrite a three to four sentence executive summary. The first words must be \
         \"{name}\". Cover overall performance, the clearest strength, the main area for \
         support, and the recommendation."
    ));
    prompt
}

/// Check a generated summary. Returns the cleaned text or the reason it was
/// rejected.
pub fn validate_summary(reply: &str, name: &str) -> Result<String, String> {
    let text = reply
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\u{201c}' || c == '\u{201d}')
        .trim()
        .to_string();
    if text.is_empty() {
        return Err("empty summary".into());
    }

    let lower = text.to_lowercase();
    let full = name.to_lowercase();
    // A stand-in name only counts in full; a real name may be shortened to its
    // first word.
    let first = (!name.starts_with(STAND_IN_PREFIX))
        .then(|| full.split_whitespace().next())
        .flatten();
    if !(opens_with(&lower, &full) || first.is_some_and(|first| opens_with(&lower, first))) {
        return Err(format!("summary does not open with the student's name ({name})"));
    }

    let sentences = count_sentences(&text);
    if !(MIN_SENTENCES..=MAX_SENTENCES).contains(&sentences) {
        return Err(format!("summary has {sentences} sentences"));
    }
    Ok(text)
}

/// `text` starts with the word (or words) `prefix`, not merely its letters.
fn opens_with(text: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return false;
    }
    text.strip_prefix(prefix)
        .is_some_and(|rest| rest.chars().next().map_or(true, |c| !c.is_alphanumeric()))
}

fn count_sentences(text: &str) -> usize {
    let chars: Vec<char> = text.chars().collect();
    let ends = chars
        .iter()
        .enumerate()
        .filter(|&(i, &c)| {
            matches!(c, '.' | '!' | '?')
                && chars.get(i + 1).map_or(true, |next| next.is_whitespace())
        })
        .count();
    // A final sentence without closing punctuation still counts.
    match chars.last() {
        Some(&c) if !matches!(c, '.' | '!' | '?') => ends + 1,
        _ => ends,
    }
}

/// Deterministic summary used when no valid narrative is available.
pub fn template_summary(name: &str, overall_pct: f64, band: RecommendationBand) -> String {
    format!(
        "{name} achieved an overall academic score of {overall_pct:.1}%, \
         giving a recommendation of \"{band}\"."
    )
}
