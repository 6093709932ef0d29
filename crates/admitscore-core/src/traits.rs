//! Core trait definitions for generative-text providers.
//!
//! The trait is implemented by the `admitscore-providers` crate; the pipeline
//! only ever talks to `dyn LlmProvider`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// LLM Provider trait
// ---------------------------------------------------------------------------

/// Trait for generative-text backends used for qualitative evaluation.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "anthropic").
    fn name(&self) -> &str;

    /// Send one system + user instruction pair and return the reply text.
    ///
    /// Failures should be returned as [`crate::error::ProviderError`] wrapped
    /// in `anyhow::Error` so callers can classify them for retries.
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse>;

    /// List available models for this provider.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// Request to the generative-text service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier (e.g. "claude-sonnet-4-20250514").
    pub model: String,
    /// System instructions.
    pub system_prompt: String,
    /// User instructions.
    pub prompt: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Ask the provider for a JSON object reply where supported.
    #[serde(default)]
    pub json_response: bool,
}

/// Response from the generative-text service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The raw response content.
    pub content: String,
    /// Model that actually generated the response.
    pub model: String,
    /// Token usage.
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Token accounting for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub estimated_cost_usd: f64,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
    /// Cost per 1K input tokens in USD.
    pub cost_per_1k_input: f64,
    /// Cost per 1K output tokens in USD.
    pub cost_per_1k_output: f64,
}

// ---------------------------------------------------------------------------
// JSON extraction
// ---------------------------------------------------------------------------

/// Extract a JSON object from a model reply.
///
/// Handles:
/// - ```json``` fenced blocks (preferred)
/// - Generic ``` blocks whose content looks like an object
/// - Bare replies, using the span from the first `{` to the last `}`
///
/// Returns `None` when no candidate object is present.
pub fn extract_json_block(response: &str) -> Option<String> {
    let mut json_blocks = Vec::new();
    let mut generic_blocks = Vec::new();
    let mut in_block = false;
    let mut is_json_block = false;
    let mut current_block = String::new();

    for line in response.lines() {
        let trimmed = line.trim();

        if !in_block && trimmed.starts_with("```") {
            in_block = true;
            let lang = trimmed.trim_start_matches('`').trim().to_lowercase();
            is_json_block = lang == "json";
            current_block.clear();
            continue;
        }

        if in_block && trimmed == "```" {
            in_block = false;
            if is_json_block {
                json_blocks.push(current_block.clone());
            } else {
                generic_blocks.push(current_block.clone());
            }
            current_block.clear();
            continue;
        }

        if in_block {
            if !current_block.is_empty() {
                current_block.push('\n');
            }
            current_block.push_str(line);
        }
    }

    // Truncated (unclosed) block: keep what was accumulated
    if in_block && !current_block.is_empty() {
        if is_json_block {
            json_blocks.push(current_block);
        } else {
            generic_blocks.push(current_block);
        }
    }

    if let Some(block) = json_blocks.into_iter().next() {
        return Some(block.trim().to_string());
    }
    if let Some(block) = generic_blocks
        .into_iter()
        .find(|b| b.trim_start().starts_with('{'))
    {
        return Some(block.trim().to_string());
    }

    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| response[start..=end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_fenced_json_block() {
        let input = "Here you go:\n\n```json\n{\"band\": \"Good\", \"score\": 3}\n```\n\nThanks!";
        assert_eq!(
            extract_json_block(input).as_deref(),
            Some("{\"band\": \"Good\", \"score\": 3}")
        );
    }

    #[test]
    fn extract_prefers_json_over_generic() {
        let input = "```\n{\"a\": 1}\n```\n\n```json\n{\"b\": 2}\n```";
        assert_eq!(extract_json_block(input).as_deref(), Some("{\"b\": 2}"));
    }

    #[test]
    fn extract_generic_block_with_object() {
        let input = "```\n{\"score\": 2.5}\n```";
        assert_eq!(extract_json_block(input).as_deref(), Some("{\"score\": 2.5}"));
    }

    #[test]
    fn extract_bare_object_with_chatter() {
        let input = "Sure! {\"band\": \"Emerging\"} Hope that helps.";
        assert_eq!(
            extract_json_block(input).as_deref(),
            Some("{\"band\": \"Emerging\"}")
        );
    }

    #[test]
    fn extract_none_without_object() {
        assert_eq!(extract_json_block("I cannot evaluate this response."), None);
        assert_eq!(extract_json_block("} backwards {"), None);
    }

    #[test]
    fn extract_truncated_unclosed_block() {
        let input = "```json\n{\"band\": \"Good\"";
        assert_eq!(extract_json_block(input).as_deref(), Some("{\"band\": \"Good\""));
    }
}
