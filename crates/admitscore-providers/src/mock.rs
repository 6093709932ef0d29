//! Mock provider for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use admitscore_core::traits::{GenerateRequest, GenerateResponse, LlmProvider, ModelInfo, TokenUsage};

use crate::error::ProviderError;

/// A mock provider for exercising the scoring pipeline without real API calls.
///
/// Replies are chosen by the first rule whose needle appears in the prompt,
/// then from a queue of scripted replies, then the default reply.
pub struct MockProvider {
    /// Prompt substring → reply, checked in insertion order.
    rules: Vec<(String, Result<String, ProviderError>)>,
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    default_response: Result<String, ProviderError>,
    call_count: AtomicU32,
    last_request: Mutex<Option<GenerateRequest>>,
}

impl MockProvider {
    /// Create a mock with prompt → reply rules and an empty default reply.
    pub fn new(rules: Vec<(String, String)>) -> Self {
        Self {
            rules: rules.into_iter().map(|(k, v)| (k, Ok(v))).collect(),
            script: Mutex::new(VecDeque::new()),
            default_response: Ok(String::new()),
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same reply.
    pub fn with_fixed_response(response: &str) -> Self {
        let mut mock = Self::new(Vec::new());
        mock.default_response = Ok(response.to_string());
        mock
    }

    /// Create a mock that always fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        let mut mock = Self::new(Vec::new());
        mock.default_response = Err(error);
        mock
    }

    /// Add a rule: prompts containing `needle` get `reply`.
    pub fn on(mut self, needle: &str, reply: Result<String, ProviderError>) -> Self {
        self.rules.push((needle.to_string(), reply));
        self
    }

    /// Queue replies consumed in order for prompts no rule matches.
    pub fn with_script(self, replies: Vec<Result<String, ProviderError>>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.extend(replies);
        }
        self
    }

    /// Get the number of calls made to this provider.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this provider.
    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }

    fn reply_for(&self, prompt: &str) -> Result<String, ProviderError> {
        if let Some((_, reply)) = self.rules.iter().find(|(needle, _)| prompt.contains(needle)) {
            return reply.clone();
        }
        if let Some(reply) = self.script.lock().ok().and_then(|mut s| s.pop_front()) {
            return reply;
        }
        self.default_response.clone()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        let content = self.reply_for(&request.prompt)?;
        let prompt_tokens = (request.prompt.len() / 4) as u32; // Rough estimate
        let completion_tokens = (content.len() / 4) as u32;

        Ok(GenerateResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
                estimated_cost_usd: 0.0,
            },
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
            cost_per_1k_input: 0.0,
            cost_per_1k_output: 0.0,
        }]
    }
}
