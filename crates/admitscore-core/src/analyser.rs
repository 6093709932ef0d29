//! MCQ analyser: diagnostic narrative for the pattern of missed questions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ScoringIssue;
use crate::model::{AnswerKeySet, ConstructScore, Domain, EvaluationSource, QuestionResult};
use crate::observer::ScoringObserver;
use crate::retry::{complete, AiSettings};
use crate::scorer::McqScores;
use crate::traits::LlmProvider;

/// Domains with fewer scored items than this get no narrative.
pub const MIN_ANALYSIS_ITEMS: u32 = 2;

const SYSTEM_PROMPT: &str = "You are an educational diagnostician writing for admissions \
staff. Explain what a student's pattern of right and wrong answers reveals about their \
skills. Do not simply restate the percentages. Reply in plain prose, no headings or lists.";

/// Construct-level diagnosis for one academic domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McqAnalysis {
    pub domain: Domain,
    /// Constructs ordered weakest first.
    pub constructs: Vec<ConstructScore>,
    /// Labels of incorrectly answered items.
    pub missed: Vec<String>,
    pub narrative: String,
    #[serde(default)]
    pub needs_manual_review: bool,
    pub source: EvaluationSource,
}

/// Constructs of `domain`, weakest accuracy first, ties by name.
pub fn weakest_first(domain: Domain, constructs: &[ConstructScore]) -> Vec<ConstructScore> {
    let mut ordered: Vec<ConstructScore> = constructs
        .iter()
        .filter(|c| c.domain == domain)
        .cloned()
        .collect();
    ordered.sort_by(|a, b| a.pct.total_cmp(&b.pct).then_with(|| a.construct.cmp(&b.construct)));
    ordered
}

pub struct McqAnalyser {
    provider: Option<Arc<dyn LlmProvider>>,
    settings: AiSettings,
}

impl McqAnalyser {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>, settings: AiSettings) -> Self {
        Self { provider, settings }
    }

    /// Analyse one academic domain. `None` when the domain is not academic
    /// or has too few items to support a diagnosis.
    pub async fn analyse(
        &self,
        domain: Domain,
        scores: &McqScores,
        answer_key: &AnswerKeySet,
        observer: &dyn ScoringObserver,
    ) -> Option<McqAnalysis> {
        if !domain.is_academic() {
            return None;
        }
        let total = scores.domain(domain).map_or(0, |d| d.total);
        if total < MIN_ANALYSIS_ITEMS {
            tracing::debug!(%domain, total, "too few items for analysis");
            return None;
        }

        let constructs = weakest_first(domain, &scores.constructs);
        let missed: Vec<&QuestionResult> = scores
            .questions
            .iter()
            .filter(|q| q.domain == domain && q.correct_answer.is_some() && !q.is_correct)
            .collect();

        let task = format!("analysis:{domain}");
        let request = self.settings.request(
            SYSTEM_PROMPT,
            build_prompt(domain, &constructs, &missed, answer_key),
            false,
        );
        let reply = complete(self.provider.as_deref(), &request, &self.settings.retry, &task)
            .await
            .and_then(|content| {
                let narrative = clean_narrative(&content);
                if narrative.is_empty() {
                    Err(ScoringIssue::MalformedAiResponse {
                        task: task.clone(),
                        reason: "empty narrative".into(),
                    })
                } else {
                    Ok(narrative)
                }
            });

        let (narrative, needs_manual_review, source) = match reply {
            Ok(narrative) => (narrative, false, EvaluationSource::Ai),
            Err(issue) => {
                observer.on_issue(&issue);
                (fallback_narrative(domain, &constructs), true, EvaluationSource::Fallback)
            }
        };

        Some(McqAnalysis {
            domain,
            missed: missed.iter().map(|q| q.label.clone()).collect(),
            constructs,
            narrative,
            needs_manual_review,
            source,
        })
    }
}

fn build_prompt(
    domain: Domain,
    constructs: &[ConstructScore],
    missed: &[&QuestionResult],
    answer_key: &AnswerKeySet,
) -> String {
    let mut prompt = format!(
        "Domain: {}\n\nAccuracy by construct (weakest first):\n",
        domain.display_name()
    );
    for c in constructs {
        prompt.push_str(&format!(
            "- {}: {}/{} ({:.1}%)\n",
            c.construct, c.correct, c.total, c.pct
        ));
    }

    if missed.is_empty() {
        prompt.push_str("\nNo questions were missed.\n");
    } else {
        prompt.push_str("\nMissed questions:\n");
        for q in missed {
            let key = answer_key.get(&q.label);
            let text = key.map_or("", |k| k.question_text.as_str());
            let correct = match (q.correct_answer, key) {
                (Some(letter), Some(k)) => format!("{letter}) {}", k.option(letter)),
                _ => "unknown".to_string(),
            };
            let given = q.student_answer.as_deref().unwrap_or("no answer");
            prompt.push_str(&format!(
                "- [{}] {text} Student answered: \"{given}\". Correct: {correct}.\n",
                q.construct
            ));
        }
    }

    prompt.push_str(
        "\nIn two or three sentences, describe the pattern these results reveal about the \
         student's strengths and gaps, and name the construct most in need of support.",
    );
    prompt
}

/// Trim the reply and drop any code fence wrapper.
fn clean_narrative(reply: &str) -> String {
    reply
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn fallback_narrative(domain: Domain, constructs: &[ConstructScore]) -> String {
    let mut narrative = format!(
        "Automated analysis of {} was unavailable; manual review required.",
        domain.display_name()
    );
    if let Some(weakest) = constructs.first() {
        narrative.push_str(&format!(
            " The weakest construct was {} ({}/{}, {:.1}%).",
            weakest.construct, weakest.correct, weakest.total, weakest.pct
        ));
    }
    narrative
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::observer::{NoopObserver, RecordingObserver};
    use crate::resolver::resolve;
    use crate::retry::RetryPolicy;
    use crate::scorer::score_mcq;
    use crate::test_support::{fixture_answer_key, fixture_submission, ScriptedProvider};

    fn scores() -> (McqScores, AnswerKeySet) {
        let key = fixture_answer_key();
        let sub = fixture_submission("v1_labels.json");
        let res = resolve(&sub, &key, &NoopObserver);
        (score_mcq(&res, &key, &NoopObserver), key)
    }

    fn analyser(provider: Arc<ScriptedProvider>) -> McqAnalyser {
        let settings = AiSettings {
            retry: RetryPolicy::immediate(1),
            ..AiSettings::default()
        };
        McqAnalyser::new(Some(provider), settings)
    }

    #[test]
    fn constructs_sorted_weakest_first() {
        let (scores, _) = scores();
        let ordered = weakest_first(Domain::English, &scores.constructs);
        let names: Vec<&str> = ordered.iter().map(|c| c.construct.as_str()).collect();
        assert_eq!(names, vec!["reading comprehension", "grammar", "vocabulary"]);
        assert!(ordered.windows(2).all(|w| w[0].pct <= w[1].pct));
    }

    #[tokio::test]
    async fn narrative_from_service_includes_missed_questions_in_prompt() {
        let (scores, key) = scores();
        let provider = Arc::new(ScriptedProvider::replying(
            "Amira decodes vocabulary confidently but struggles to infer an author's purpose.",
        ));
        let analysis = analyser(provider.clone())
            .analyse(Domain::English, &scores, &key, &NoopObserver)
            .await
            .unwrap();

        assert_eq!(analysis.source, EvaluationSource::Ai);
        assert_eq!(analysis.missed, vec!["eng_q4".to_string()]);
        assert!(analysis.narrative.starts_with("Amira decodes"));
        let prompt = &provider.prompts()[0];
        assert!(prompt.contains("Why did the author mention the storm?"));
        assert!(prompt.contains("Correct: A) To build suspense"));
    }

    #[tokio::test]
    async fn failure_yields_flagged_fallback() {
        let (scores, key) = scores();
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::ApiError {
                status: 503,
                message: "down".into(),
            }),
            Err(ProviderError::ApiError {
                status: 503,
                message: "down".into(),
            }),
        ]));
        let observer = RecordingObserver::new();
        let analysis = analyser(provider)
            .analyse(Domain::Reasoning, &scores, &key, &observer)
            .await
            .unwrap();

        assert!(analysis.needs_manual_review);
        assert_eq!(analysis.source, EvaluationSource::Fallback);
        assert!(analysis.narrative.contains("manual review"));
        assert!(analysis.narrative.contains("sequences"));
        assert_eq!(observer.issues().len(), 1);
    }

    #[tokio::test]
    async fn too_few_items_produce_no_narrative() {
        let (scores, mut key) = scores();
        key.questions.retain(|q| q.domain != Domain::Reasoning || q.label == "reas_q1");
        let sub = fixture_submission("v1_labels.json");
        let res = resolve(&sub, &key, &NoopObserver);
        let thin = score_mcq(&res, &key, &NoopObserver);
        let provider = Arc::new(ScriptedProvider::replying("unused"));

        let analyser = analyser(provider.clone());
        assert!(analyser
            .analyse(Domain::Reasoning, &thin, &key, &NoopObserver)
            .await
            .is_none());
        assert!(analyser
            .analyse(Domain::Mindset, &scores, &key, &NoopObserver)
            .await
            .is_none());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn blank_reply_is_malformed() {
        let (scores, key) = scores();
        let provider = Arc::new(ScriptedProvider::replying("```\n\n```"));
        let observer = RecordingObserver::new();
        let analysis = analyser(provider)
            .analyse(Domain::Mathematics, &scores, &key, &observer)
            .await
            .unwrap();
        assert_eq!(analysis.source, EvaluationSource::Fallback);
        assert!(matches!(
            observer.issues().as_slice(),
            [ScoringIssue::MalformedAiResponse { .. }]
        ));
    }
}
