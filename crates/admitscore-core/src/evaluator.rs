//! Writing evaluator: rubric-based qualitative scoring of extended responses.
//!
//! The generative service returns separate content and prose scores; the
//! final 0–4 score is recombined here with per-domain rubric weights so that
//! reasoning content always outweighs prose in quantitative domains. Any
//! failure degrades to a fixed mid-scale fallback flagged for manual review.

use std::sync::Arc;

use serde_json::Value;

use crate::error::ScoringIssue;
use crate::model::{Domain, EvaluationSource, WritingBand, WritingEvaluation, WritingTask};
use crate::observer::ScoringObserver;
use crate::retry::{complete, AiSettings};
use crate::text::round1;
use crate::traits::{extract_json_block, LlmProvider};

/// Default minimum trimmed length for a response to be worth evaluating.
pub const DEFAULT_MIN_RESPONSE_CHARS: usize = 20;

const FALLBACK_SCORE: f64 = 2.0;
const MANUAL_REVIEW_NOTE: &str = "Automated evaluation was unavailable; manual review required.";

const SYSTEM_PROMPT: &str = "You are an experienced admissions assessor evaluating a \
student's extended written response. Reply with a single JSON object and nothing else.";

/// How content and prose combine into a domain's writing score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rubric {
    pub content_weight: f64,
    pub prose_weight: f64,
}

impl Rubric {
    pub fn for_domain(domain: Domain) -> Rubric {
        if domain.is_language() {
            Rubric {
                content_weight: 0.5,
                prose_weight: 0.5,
            }
        } else if domain.is_quantitative() {
            Rubric {
                content_weight: 0.85,
                prose_weight: 0.15,
            }
        } else {
            Rubric {
                content_weight: 0.7,
                prose_weight: 0.3,
            }
        }
    }

    pub fn combine(&self, content: f64, prose: f64) -> f64 {
        clamp_score(content) * self.content_weight + clamp_score(prose) * self.prose_weight
    }

    fn guidance(domain: Domain) -> &'static str {
        if domain.is_language() {
            "Judge content (ideas, relevance, development) and prose (organisation, \
             vocabulary, grammar, spelling) with equal importance."
        } else if domain.is_quantitative() {
            "Judge content on the soundness of the mathematical or logical reasoning and \
             whether the method reaches a correct conclusion. Note prose quality only \
             lightly: spelling and grammar must not lower a response whose reasoning is sound."
        } else {
            "Judge content on the depth and sincerity of reflection; prose is secondary."
        }
    }
}

fn clamp_score(score: f64) -> f64 {
    score.clamp(0.0, 4.0)
}

/// Evaluates writing tasks against the generative service.
pub struct WritingEvaluator {
    provider: Option<Arc<dyn LlmProvider>>,
    settings: AiSettings,
    min_response_chars: usize,
}

impl WritingEvaluator {
    pub fn new(
        provider: Option<Arc<dyn LlmProvider>>,
        settings: AiSettings,
        min_response_chars: usize,
    ) -> Self {
        Self {
            provider,
            settings,
            min_response_chars,
        }
    }

    /// Evaluate one task. Never fails; problems are reported to `observer`
    /// and yield a fallback evaluation.
    pub async fn evaluate(
        &self,
        task: &WritingTask,
        observer: &dyn ScoringObserver,
    ) -> WritingEvaluation {
        let length = task.student_response.trim().chars().count();
        if length < self.min_response_chars {
            return too_short(task.domain, length);
        }

        let label = format!("writing:{}", task.domain);
        let request = self.settings.request(SYSTEM_PROMPT, build_prompt(task), true);
        let reply = complete(
            self.provider.as_deref(),
            &request,
            &self.settings.retry,
            &label,
        )
        .await;

        let parsed = reply.and_then(|content| {
            parse_evaluation(task.domain, &content).map_err(|reason| {
                ScoringIssue::MalformedAiResponse {
                    task: label.clone(),
                    reason,
                }
            })
        });

        match parsed {
            Ok(evaluation) => evaluation,
            Err(issue) => {
                observer.on_issue(&issue);
                fallback(task.domain)
            }
        }
    }
}

/// Build the user instruction for one task.
pub fn build_prompt(task: &WritingTask) -> String {
    let mut prompt = format!(
        "Domain: {}\nGrade: {}\nLocale: {}\n",
        task.domain.display_name(),
        task.grade,
        task.locale
    );
    if !task.programme.is_empty() {
        prompt.push_str(&format!("Programme: {}\n", task.programme));
    }
    if task.prompt_text.is_empty() {
        prompt.push_str("Question: (not available; judge the response on its own terms)\n");
    } else {
        prompt.push_str(&format!("Question: {}\n", task.prompt_text));
    }
    prompt.push_str(&format!(
        "\nStudent response:\n\"\"\"\n{}\n\"\"\"\n\nRubric: {}\n\n",
        task.student_response.trim(),
        Rubric::guidance(task.domain)
    ));
    prompt.push_str(
        "Return JSON with these fields:\n\
         - content_score: number from 0 to 4\n\
         - writing_score: number from 0 to 4\n\
         - band: one of Excellent, Good, Developing, Emerging, Insufficient\n\
         - content_narrative: two sentences on the substance of the answer\n\
         - writing_narrative: one or two sentences on the prose\n\
         - threshold_comment: one sentence relating the work to grade expectations\n",
    );
    prompt
}

/// Parse and normalise a reply. `Err` carries the reason it was rejected.
pub fn parse_evaluation(domain: Domain, reply: &str) -> Result<WritingEvaluation, String> {
    let block = extract_json_block(reply).ok_or("no JSON object in reply")?;
    let value: Value =
        serde_json::from_str(&block).map_err(|e| format!("invalid JSON: {e}"))?;
    let Value::Object(fields) = value else {
        return Err("reply is not a JSON object".to_string());
    };

    let content = number(&fields, "content_score")?;
    let prose = number(&fields, "writing_score")?;
    let overall = number(&fields, "score")?;
    let band = fields
        .get("band")
        .and_then(Value::as_str)
        .and_then(WritingBand::normalize);

    // Quantitative rubrics only hold when the weights are applied here, so a
    // single overall score or band is not enough for them.
    if domain.is_quantitative() && (content.is_none() || prose.is_none()) {
        return Err(format!(
            "{domain} reply must carry both content_score and writing_score"
        ));
    }

    let (score, band) = match (content, prose, overall, band) {
        (Some(c), Some(p), _, _) => {
            let score = round1(Rubric::for_domain(domain).combine(c, p));
            (score, WritingBand::for_score(score))
        }
        (_, _, Some(s), band) => {
            let score = round1(clamp_score(s));
            (score, band.unwrap_or_else(|| WritingBand::for_score(score)))
        }
        (_, _, None, Some(band)) => (band.nominal_score(), band),
        _ => return Err("reply carries neither scores nor a recognised band".to_string()),
    };

    let text = |key: &str| {
        fields
            .get(key)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    Ok(WritingEvaluation {
        domain,
        band,
        score,
        content_narrative: text("content_narrative"),
        writing_narrative: text("writing_narrative"),
        threshold_comment: text("threshold_comment"),
        needs_manual_review: false,
        source: EvaluationSource::Ai,
    })
}

/// A finite number under `key`, accepting numeric strings. Absent or null is
/// `Ok(None)`; anything else unusable is an error.
fn number(fields: &serde_json::Map<String, Value>, key: &str) -> Result<Option<f64>, String> {
    let parsed = match fields.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match parsed {
        Some(n) if n.is_finite() => Ok(Some(n)),
        _ => Err(format!("field '{key}' is not a number")),
    }
}

fn too_short(domain: Domain, length: usize) -> WritingEvaluation {
    WritingEvaluation {
        domain,
        band: WritingBand::Insufficient,
        score: 0.0,
        content_narrative: format!(
            "The response ({length} characters) is too short to show evidence of the skills assessed."
        ),
        writing_narrative: String::new(),
        threshold_comment: String::new(),
        needs_manual_review: false,
        source: EvaluationSource::TooShort,
    }
}

/// Mid-scale evaluation used whenever the service cannot be relied on.
pub fn fallback(domain: Domain) -> WritingEvaluation {
    WritingEvaluation {
        domain,
        band: WritingBand::Developing,
        score: FALLBACK_SCORE,
        content_narrative: MANUAL_REVIEW_NOTE.to_string(),
        writing_narrative: MANUAL_REVIEW_NOTE.to_string(),
        threshold_comment: String::new(),
        needs_manual_review: true,
        source: EvaluationSource::Fallback,
    }
}
