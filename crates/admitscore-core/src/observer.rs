//! Observability sink passed into each pipeline component.
//!
//! Components report issues and stage timings here instead of logging
//! directly, which keeps the scoring functions pure and lets tests assert on
//! exactly what was reported.

use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ScoringIssue;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolve,
    ScoreMcq,
    ExtractWriting,
    EvaluateWriting,
    AnalyseMcq,
    Recommend,
    Summarise,
}

/// Receives issues and stage completions for one scoring run.
pub trait ScoringObserver: Send + Sync {
    fn on_issue(&self, issue: &ScoringIssue);
    fn on_stage_complete(&self, stage: Stage, elapsed: Duration);
}

/// Discards everything.
pub struct NoopObserver;

impl ScoringObserver for NoopObserver {
    fn on_issue(&self, _: &ScoringIssue) {}
    fn on_stage_complete(&self, _: Stage, _: Duration) {}
}

/// Forwards issues and timings to `tracing`.
pub struct TracingObserver {
    submission_id: String,
}

impl TracingObserver {
    pub fn new(submission_id: impl Into<String>) -> Self {
        Self {
            submission_id: submission_id.into(),
        }
    }
}

impl ScoringObserver for TracingObserver {
    fn on_issue(&self, issue: &ScoringIssue) {
        if issue.needs_manual_review() {
            tracing::warn!(submission_id = %self.submission_id, "{issue}");
        } else {
            tracing::info!(submission_id = %self.submission_id, "{issue}");
        }
    }

    fn on_stage_complete(&self, stage: Stage, elapsed: Duration) {
        tracing::debug!(
            submission_id = %self.submission_id,
            ?stage,
            elapsed_ms = elapsed.as_millis() as u64,
            "stage complete"
        );
    }
}

/// Keeps every event in memory. Used by tests and by the pipeline to attach
/// issues to the persisted result.
#[derive(Default)]
pub struct RecordingObserver {
    issues: Mutex<Vec<ScoringIssue>>,
    stages: Mutex<Vec<Stage>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issues(&self) -> Vec<ScoringIssue> {
        self.issues.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.stages.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl ScoringObserver for RecordingObserver {
    fn on_issue(&self, issue: &ScoringIssue) {
        if let Ok(mut issues) = self.issues.lock() {
            issues.push(issue.clone());
        }
    }

    fn on_stage_complete(&self, stage: Stage, _: Duration) {
        if let Ok(mut stages) = self.stages.lock() {
            stages.push(stage);
        }
    }
}

/// Records events and forwards them to another observer.
pub(crate) struct Tee<'a> {
    pub(crate) record: RecordingObserver,
    pub(crate) inner: &'a dyn ScoringObserver,
}

impl<'a> Tee<'a> {
    pub(crate) fn new(inner: &'a dyn ScoringObserver) -> Self {
        Self {
            record: RecordingObserver::new(),
            inner,
        }
    }
}

impl ScoringObserver for Tee<'_> {
    fn on_issue(&self, issue: &ScoringIssue) {
        self.record.on_issue(issue);
        self.inner.on_issue(issue);
    }

    fn on_stage_complete(&self, stage: Stage, elapsed: Duration) {
        self.record.on_stage_complete(stage, elapsed);
        self.inner.on_stage_complete(stage, elapsed);
    }
}
