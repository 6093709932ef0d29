//! Error types for the scoring pipeline.
//!
//! `ProviderError` represents failures talking to the generative-text service.
//! It lives in `admitscore-core` so the retry loop can downcast and classify
//! errors without string matching.
//!
//! `ScoringIssue` is the non-fatal issue taxonomy. Issues are collected on the
//! scoring result and forwarded to the observer; none of them aborts a run.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Domain;

/// Errors that can occur when interacting with a generative-text provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// The service reported it is overloaded (HTTP 529 or an overload body).
    #[error("service overloaded: {0}")]
    Overloaded(String),

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        match self {
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_) => true,
            ProviderError::ApiError { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            _ => false,
        }
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// A non-fatal problem encountered while scoring one submission.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScoringIssue {
    /// A raw field matched more than one canonical label and was skipped.
    #[error("field '{key}' is ambiguous between {candidates:?}; skipped")]
    ResolutionAmbiguity { key: String, candidates: Vec<String> },

    /// A raw field matched no canonical label and was skipped.
    #[error("field '{key}' matched no configured question; skipped")]
    UnmatchedField { key: String },

    /// A student answer could not be mapped to an option letter.
    #[error("answer to '{label}' matched no option; scored incorrect")]
    NoAnswerMatch { label: String, answer: String },

    /// The generative service was unavailable; a fallback value was used.
    #[error("AI service unavailable for {task}: {reason}")]
    AiServiceUnavailable { task: String, reason: String },

    /// The generative service replied with an unusable payload.
    #[error("malformed AI response for {task}: {reason}")]
    MalformedAiResponse { task: String, reason: String },

    /// Configuration required to score a domain is missing.
    #[error("missing configuration for {domain}: {detail}")]
    MissingConfiguration { domain: Domain, detail: String },
}

impl ScoringIssue {
    /// Whether this issue should put the submission in front of a human reviewer.
    pub fn needs_manual_review(&self) -> bool {
        matches!(
            self,
            ScoringIssue::AiServiceUnavailable { .. }
                | ScoringIssue::MalformedAiResponse { .. }
                | ScoringIssue::MissingConfiguration { .. }
        )
    }
}
