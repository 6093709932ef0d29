//! Persisted scoring results and the report-renderer boundary.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analyser::McqAnalysis;
use crate::error::ScoringIssue;
use crate::model::{
    ConstructScore, Domain, DomainScore, QuestionResult, ThresholdTable, WritingEvaluation,
    WritingTask,
};
use crate::observer::{RecordingObserver, ScoringObserver};
use crate::recommendation::{
    calculate, DomainOutcome, RecommendationBand, RecommendationConfig, RecommendationInput,
    RecommendationResult, MISSING_THRESHOLD,
};
use crate::resolver::{SchemaVersion, SkippedField};
use crate::summary::{display_name, template_summary, ExecutiveSummary};

/// Everything computed for one submission. Keyed by `submission_id`; a later
/// run for the same submission replaces the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringResult {
    /// Unique identifier of the scoring run.
    pub run_id: Uuid,
    pub scored_at: DateTime<Utc>,
    pub submission_id: String,
    pub student_name: String,
    pub grade: String,
    pub form_version: String,
    pub schema: SchemaVersion,
    pub question_results: Vec<QuestionResult>,
    pub domain_scores: Vec<DomainScore>,
    pub construct_scores: Vec<ConstructScore>,
    #[serde(default)]
    pub skipped_fields: Vec<SkippedField>,
    /// Tasks and their evaluations, index-aligned.
    pub writing_tasks: Vec<WritingTask>,
    pub writing_evaluations: Vec<WritingEvaluation>,
    pub mcq_analyses: Vec<McqAnalysis>,
    pub recommendation: RecommendationResult,
    pub executive_summary: ExecutiveSummary,
    #[serde(default)]
    pub issues: Vec<ScoringIssue>,
    /// Wall-clock duration of the run in milliseconds.
    pub duration_ms: u64,
}

/// Outcome of recomputing a recommendation against new thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationChange {
    pub previous_band: RecommendationBand,
    pub band: RecommendationBand,
    pub previous_overall_pct: f64,
    pub overall_pct: f64,
}

impl RecommendationChange {
    pub fn band_changed(&self) -> bool {
        self.previous_band != self.band
    }
}

impl ScoringResult {
    /// File name used when the result is written to an output directory.
    pub fn file_name(&self) -> String {
        result_file_name(&self.submission_id)
    }

    /// Save the result as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        write_json(self, path, "result")
    }

    /// Load a result from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read result from {}", path.display()))?;
        let result: ScoringResult =
            serde_json::from_str(&content).context("failed to parse result JSON")?;
        Ok(result)
    }

    /// Recompute the recommendation from the stored scores and evaluations,
    /// without calling the generative service. When the band or overall
    /// percentage moves, the executive summary is replaced by the template
    /// sentence and flagged, since the old narrative describes the old band.
    pub fn recompute_recommendation(
        &mut self,
        thresholds: &ThresholdTable,
        config: &RecommendationConfig,
        observer: &dyn ScoringObserver,
    ) -> RecommendationChange {
        let input =
            RecommendationInput::from_scores(&self.grade, &self.domain_scores, &self.writing_evaluations);
        let record = RecordingObserver::new();
        let recommendation = calculate(&input, thresholds, config, &record);

        let change = RecommendationChange {
            previous_band: self.recommendation.band,
            band: recommendation.band,
            previous_overall_pct: self.recommendation.overall_academic_pct,
            overall_pct: recommendation.overall_academic_pct,
        };

        self.issues.retain(|issue| {
            !matches!(issue, ScoringIssue::MissingConfiguration { detail, .. }
                if detail.starts_with(MISSING_THRESHOLD))
        });
        for issue in record.issues() {
            observer.on_issue(&issue);
            self.issues.push(issue);
        }
        self.recommendation = recommendation;

        if change.band_changed() || change.previous_overall_pct != change.overall_pct {
            self.executive_summary = ExecutiveSummary {
                text: template_summary(
                    &display_name(&self.student_name, &self.submission_id),
                    change.overall_pct,
                    change.band,
                ),
                source: crate::model::EvaluationSource::Fallback,
                needs_manual_review: true,
            };
        }
        change
    }

    /// Whether anything in this result needs a human to look at it.
    pub fn needs_manual_review(&self) -> bool {
        !self.manual_review_reasons().is_empty()
    }

    /// Human-readable reasons this result should be reviewed.
    pub fn manual_review_reasons(&self) -> Vec<String> {
        let mut reasons: Vec<String> = self
            .issues
            .iter()
            .filter(|i| i.needs_manual_review())
            .map(ToString::to_string)
            .collect();

        for outcome in self.recommendation.domains.iter().filter(|d| !d.assessed) {
            reasons.push(format!("{} was not assessed", outcome.domain.display_name()));
        }

        let unused: Vec<&str> = self
            .skipped_fields
            .iter()
            .filter(|s| !self.writing_tasks.iter().any(|t| t.source_key == s.key))
            .map(|s| s.key.as_str())
            .collect();
        if !unused.is_empty() {
            reasons.push(format!(
                "{} payload field(s) could not be mapped: {}",
                unused.len(),
                unused.join(", ")
            ));
        }

        reasons.dedup();
        reasons
    }

    /// Build the structure handed to the external report renderer.
    pub fn to_report_input(&self) -> ReportInput {
        let domains = Domain::ALL
            .into_iter()
            .filter_map(|domain| {
                let mcq = self.domain_scores.iter().find(|d| d.domain == domain).cloned();
                let outcome = self.recommendation.domain(domain).cloned();
                let writing: Vec<WritingEvaluation> = self
                    .writing_evaluations
                    .iter()
                    .filter(|e| e.domain == domain)
                    .cloned()
                    .collect();
                if mcq.is_none() && outcome.is_none() && writing.is_empty() {
                    return None;
                }
                Some(ReportDomain {
                    domain,
                    display_name: domain.display_name().to_string(),
                    mcq,
                    outcome,
                    constructs: self
                        .construct_scores
                        .iter()
                        .filter(|c| c.domain == domain)
                        .cloned()
                        .collect(),
                    writing,
                    analysis: self
                        .mcq_analyses
                        .iter()
                        .find(|a| a.domain == domain)
                        .map(|a| a.narrative.clone()),
                })
            })
            .collect();

        ReportInput {
            submission_id: self.submission_id.clone(),
            student_name: display_name(&self.student_name, &self.submission_id),
            grade: self.grade.clone(),
            form_version: self.form_version.clone(),
            scored_at: self.scored_at,
            band: self.recommendation.band,
            band_label: self.recommendation.band.to_string(),
            overall_academic_pct: self.recommendation.overall_academic_pct,
            executive_summary: self.executive_summary.text.clone(),
            recommendation_narrative: self.recommendation.narrative.clone(),
            domains,
            mindset_score: self.recommendation.mindset_score,
            manual_review: self.manual_review_reasons(),
        }
    }
}

/// Input for the external report renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportInput {
    pub submission_id: String,
    pub student_name: String,
    pub grade: String,
    pub form_version: String,
    pub scored_at: DateTime<Utc>,
    pub band: RecommendationBand,
    pub band_label: String,
    pub overall_academic_pct: f64,
    pub executive_summary: String,
    pub recommendation_narrative: String,
    pub domains: Vec<ReportDomain>,
    pub mindset_score: Option<f64>,
    /// Empty when nothing needs a human.
    pub manual_review: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDomain {
    pub domain: Domain,
    pub display_name: String,
    pub mcq: Option<DomainScore>,
    pub outcome: Option<DomainOutcome>,
    pub constructs: Vec<ConstructScore>,
    pub writing: Vec<WritingEvaluation>,
    pub analysis: Option<String>,
}

impl ReportInput {
    pub fn file_name(&self) -> String {
        format!("report-input-{}.json", file_stem(&self.submission_id))
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        write_json(self, path, "report input")
    }
}

/// File name of the persisted result for a submission. Re-scoring the same
/// submission overwrites it.
pub fn result_file_name(submission_id: &str) -> String {
    format!("result-{}.json", file_stem(submission_id))
}

/// Paths for a result and its report input inside `dir`.
pub fn output_paths(dir: &Path, result: &ScoringResult) -> (PathBuf, PathBuf) {
    (
        dir.join(result.file_name()),
        dir.join(format!("report-input-{}.json", file_stem(&result.submission_id))),
    )
}

fn file_stem(submission_id: &str) -> String {
    submission_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn write_json<T: Serialize>(value: &T, path: &Path, what: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(value).with_context(|| format!("failed to serialize {what}"))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)
        .with_context(|| format!("failed to write {what} to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{PipelineConfig, ScoringPipeline};
    use crate::model::EvaluationSource;
    use crate::observer::NoopObserver;
    use crate::test_support::{fixture_answer_key, fixture_submission, fixture_thresholds};

    async fn offline_result() -> ScoringResult {
        let pipeline = ScoringPipeline::new(None, PipelineConfig::default());
        pipeline
            .score(
                &fixture_submission("v1_labels.json"),
                &fixture_answer_key(),
                &fixture_thresholds(),
                None,
                &NoopObserver,
            )
            .await
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let result = offline_result().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(result.file_name());
        result.save_json(&path).unwrap();

        let loaded = ScoringResult::load_json(&path).unwrap();
        assert_eq!(loaded.run_id, result.run_id);
        assert_eq!(loaded.domain_scores, result.domain_scores);
        assert_eq!(loaded.recommendation, result.recommendation);
        assert_eq!(loaded.issues, result.issues);
        assert_eq!(result.file_name(), "result-sub-v1-0001.json");
    }

    #[tokio::test]
    async fn raising_thresholds_lowers_band_without_ai() {
        let mut result = offline_result().await;
        let before = result.recommendation.band;

        let mut strict = fixture_thresholds();
        for domains in strict.grades.values_mut() {
            for t in domains.values_mut() {
                *t = 95.0;
            }
        }
        let change = result.recompute_recommendation(&strict, &RecommendationConfig::default(), &NoopObserver);

        assert_eq!(change.previous_band, before);
        assert_eq!(change.band, RecommendationBand::NotYetReady);
        assert_eq!(result.recommendation.band, RecommendationBand::NotYetReady);
        if change.band_changed() {
            assert_eq!(result.executive_summary.source, EvaluationSource::Fallback);
            assert!(result.executive_summary.text.contains("Not yet ready"));
        }
    }

    #[tokio::test]
    async fn missing_threshold_issues_are_replaced_on_recompute() {
        let mut result = offline_result().await;
        let empty = ThresholdTable::default();
        result.recompute_recommendation(&empty, &RecommendationConfig::default(), &NoopObserver);
        let count = |r: &ScoringResult| {
            r.issues
                .iter()
                .filter(|i| matches!(i, ScoringIssue::MissingConfiguration { .. }))
                .count()
        };
        assert_eq!(count(&result), 3);

        result.recompute_recommendation(&fixture_thresholds(), &RecommendationConfig::default(), &NoopObserver);
        assert_eq!(count(&result), 0);
    }

    #[tokio::test]
    async fn report_input_rolls_up_manual_review() {
        let result = offline_result().await;
        let input = result.to_report_input();

        assert_eq!(input.student_name, "Amira Haddad");
        assert_eq!(input.file_name(), "report-input-sub-v1-0001.json");
        // Offline: every AI step fell back.
        assert!(input
            .manual_review
            .iter()
            .any(|r| r.contains("AI service unavailable for writing:english")));
        assert!(input
            .manual_review
            .iter()
            .any(|r| r.contains("f3a9c1_consent")));
        let english = input.domains.iter().find(|d| d.domain == Domain::English).unwrap();
        assert_eq!(english.constructs.len(), 3);
        assert_eq!(english.writing.len(), 1);
        assert!(english.analysis.is_some());
        assert!(input.domains.iter().all(|d| d.domain != Domain::Values));
    }

    #[test]
    fn file_stem_sanitises_ids() {
        assert_eq!(file_stem("sub/../9 x"), "sub____9_x");
    }
}
