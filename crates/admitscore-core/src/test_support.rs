//! Shared fixtures and fakes for unit tests.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::ProviderError;
use crate::model::{AnswerKeySet, Submission, ThresholdTable};
use crate::parser::{parse_answer_key_str, parse_thresholds_str};
use crate::traits::{GenerateRequest, GenerateResponse, LlmProvider, ModelInfo, TokenUsage};

pub(crate) fn fixture_answer_key() -> AnswerKeySet {
    parse_answer_key_str(
        include_str!("../../../fixtures/answer-keys/grade7.toml"),
        Path::new("grade7.toml"),
    )
    .unwrap()
}

pub(crate) fn fixture_thresholds() -> ThresholdTable {
    parse_thresholds_str(
        include_str!("../../../fixtures/thresholds/northfield.toml"),
        Path::new("northfield.toml"),
    )
    .unwrap()
}

pub(crate) fn fixture_submission(name: &str) -> Submission {
    let raw = match name {
        "v1_labels.json" => include_str!("../../../fixtures/payloads/v1_labels.json"),
        "v2_domain_numbered.json" => {
            include_str!("../../../fixtures/payloads/v2_domain_numbered.json")
        }
        "v3_question_text.json" => include_str!("../../../fixtures/payloads/v3_question_text.json"),
        other => panic!("unknown fixture: {other}"),
    };
    serde_json::from_str(raw).unwrap()
}

/// Replays queued replies in order; errors once the queue is empty.
pub(crate) struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub(crate) fn new(replies: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    pub(crate) fn replying(reply: &str) -> Self {
        Self::new(vec![Ok(reply.to_string())])
    }

    pub(crate) fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::NetworkError("script exhausted".into())));
        let content = next?;
        Ok(GenerateResponse {
            content,
            model: request.model.clone(),
            token_usage: TokenUsage::default(),
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        Vec::new()
    }
}
