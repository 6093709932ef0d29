//! Central scoring pipeline orchestrator.
//!
//! Runs the stages for one submission in order, fanning the independent
//! generative calls (writing evaluations and per-domain analyses) out under a
//! semaphore. No stage can abort the run: every failure becomes an issue on
//! the result and a fallback value downstream.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::analyser::{McqAnalyser, McqAnalysis};
use crate::evaluator::{WritingEvaluator, DEFAULT_MIN_RESPONSE_CHARS};
use crate::extractor::extract_writing;
use crate::model::{
    AnswerKeySet, Domain, EvaluationSource, Submission, ThresholdTable, WritingEvaluation,
    WritingTask,
};
use crate::observer::{ScoringObserver, Stage, Tee};
use crate::recommendation::{calculate, RecommendationConfig, RecommendationInput};
use crate::report::ScoringResult;
use crate::resolver::resolve;
use crate::retry::AiSettings;
use crate::scorer::score_mcq;
use crate::summary::{SummaryContext, SummaryGenerator};
use crate::traits::LlmProvider;

/// Configuration for the scoring pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model, sampling, and retry settings for generative calls.
    pub ai: AiSettings,
    /// Maximum concurrent generative calls.
    pub parallelism: usize,
    /// Responses shorter than this (trimmed characters) are not sent out.
    pub min_response_chars: usize,
    pub recommendation: RecommendationConfig,
    /// Re-evaluate writing even when a previous evaluation can be reused.
    pub force_rescore: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ai: AiSettings::default(),
            parallelism: 4,
            min_response_chars: DEFAULT_MIN_RESPONSE_CHARS,
            recommendation: RecommendationConfig::default(),
            force_rescore: false,
        }
    }
}

/// The scoring pipeline. Without a provider every generative step uses its
/// deterministic fallback.
pub struct ScoringPipeline {
    evaluator: WritingEvaluator,
    analyser: McqAnalyser,
    summariser: SummaryGenerator,
    config: PipelineConfig,
}

impl ScoringPipeline {
    pub fn new(provider: Option<Arc<dyn LlmProvider>>, config: PipelineConfig) -> Self {
        Self {
            evaluator: WritingEvaluator::new(
                provider.clone(),
                config.ai.clone(),
                config.min_response_chars,
            ),
            analyser: McqAnalyser::new(provider.clone(), config.ai.clone()),
            summariser: SummaryGenerator::new(provider, config.ai.clone()),
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Score one submission end to end.
    ///
    /// `previous` is the last persisted result for the same submission; its
    /// writing evaluations are reused for unchanged responses unless
    /// `force_rescore` is set.
    #[tracing::instrument(skip_all, fields(submission_id = %submission.submission_id))]
    pub async fn score(
        &self,
        submission: &Submission,
        answer_key: &AnswerKeySet,
        thresholds: &ThresholdTable,
        previous: Option<&ScoringResult>,
        observer: &dyn ScoringObserver,
    ) -> ScoringResult {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let tee = Tee::new(observer);
        let grade = if submission.grade.trim().is_empty() {
            answer_key.grade.clone()
        } else {
            submission.grade.clone()
        };
        tracing::info!(%run_id, form_version = %answer_key.form_version, "scoring submission");

        let resolution = timed(&tee, Stage::Resolve, || resolve(submission, answer_key, &tee));
        let mcq = timed(&tee, Stage::ScoreMcq, || score_mcq(&resolution, answer_key, &tee));
        let tasks = timed(&tee, Stage::ExtractWriting, || {
            extract_writing(submission, &resolution, answer_key, &tee)
        });

        let semaphore = Semaphore::new(self.config.parallelism.max(1));
        let (permits, sink, scores) = (&semaphore, &tee, &mcq);
        let evaluations = timed_async(
            &tee,
            Stage::EvaluateWriting,
            join_all(tasks.iter().map(|task| async move {
                if let Some(cached) = self.reusable(task, previous) {
                    tracing::debug!(source_key = %task.source_key, "reusing cached writing evaluation");
                    return cached;
                }
                let _permit = permits.acquire().await.ok();
                self.evaluator.evaluate(task, sink).await
            })),
        );
        let analyses = timed_async(
            &tee,
            Stage::AnalyseMcq,
            join_all(Domain::ACADEMIC.into_iter().map(|domain| async move {
                let _permit = permits.acquire().await.ok();
                self.analyser.analyse(domain, scores, answer_key, sink).await
            })),
        );
        let (evaluations, analyses) = futures::join!(evaluations, analyses);
        let analyses: Vec<McqAnalysis> = analyses.into_iter().flatten().collect();

        let recommendation = timed(&tee, Stage::Recommend, || {
            let input = RecommendationInput::from_scores(&grade, &mcq.domains, &evaluations);
            calculate(&input, thresholds, &self.config.recommendation, &tee)
        });

        let summary_start = Instant::now();
        let executive_summary = self
            .summariser
            .generate(
                &SummaryContext {
                    student_name: &submission.student_name,
                    submission_id: &submission.submission_id,
                    grade: &grade,
                    domain_scores: &mcq.domains,
                    evaluations: &evaluations,
                    analyses: &analyses,
                    recommendation: &recommendation,
                },
                &tee,
            )
            .await;
        tee.on_stage_complete(Stage::Summarise, summary_start.elapsed());

        let issues = tee.record.issues();
        tracing::info!(
            band = %recommendation.band,
            overall = recommendation.overall_academic_pct,
            issues = issues.len(),
            "scoring complete"
        );

        ScoringResult {
            run_id,
            scored_at: chrono::Utc::now(),
            submission_id: submission.submission_id.clone(),
            student_name: submission.student_name.clone(),
            grade,
            form_version: answer_key.form_version.clone(),
            schema: resolution.schema,
            question_results: mcq.questions,
            domain_scores: mcq.domains,
            construct_scores: mcq.constructs,
            skipped_fields: resolution.skipped,
            writing_tasks: tasks,
            writing_evaluations: evaluations,
            mcq_analyses: analyses,
            recommendation,
            executive_summary,
            issues,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// A previous evaluation for the same field and identical response text.
    /// Fallbacks are never reused so a recovered service gets another chance.
    fn reusable(&self, task: &WritingTask, previous: Option<&ScoringResult>) -> Option<WritingEvaluation> {
        if self.config.force_rescore {
            return None;
        }
        let previous = previous?;
        previous
            .writing_tasks
            .iter()
            .zip(&previous.writing_evaluations)
            .find(|(old, _)| {
                old.domain == task.domain
                    && old.source_key == task.source_key
                    && old.student_response == task.student_response
            })
            .map(|(_, evaluation)| evaluation)
            .filter(|evaluation| evaluation.source != EvaluationSource::Fallback)
            .cloned()
    }
}

fn timed<T>(observer: &dyn ScoringObserver, stage: Stage, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    observer.on_stage_complete(stage, start.elapsed());
    out
}

async fn timed_async<T>(
    observer: &dyn ScoringObserver,
    stage: Stage,
    fut: impl Future<Output = T>,
) -> T {
    let start = Instant::now();
    let out = fut.await;
    observer.on_stage_complete(stage, start.elapsed());
    out
}
