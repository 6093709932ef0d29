//! Configuration loading and provider factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use admitscore_core::engine::PipelineConfig;
use admitscore_core::evaluator::DEFAULT_MIN_RESPONSE_CHARS;
use admitscore_core::recommendation::RecommendationConfig;
use admitscore_core::retry::{AiSettings, RetryPolicy};
use admitscore_core::traits::LlmProvider;

use crate::anthropic::AnthropicProvider;
use crate::openai::OpenAiProvider;

/// Configuration for a single provider.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
        }
    }
}

impl ProviderConfig {
    fn api_key(&self) -> &str {
        match self {
            ProviderConfig::OpenAI { api_key, .. } | ProviderConfig::Anthropic { api_key, .. } => {
                api_key
            }
        }
    }
}

/// The `[scoring]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    /// Writing responses shorter than this are scored zero without a call.
    pub min_response_chars: usize,
    pub writing_weight: f64,
    pub support_margin: f64,
    pub mindset_floor: f64,
    pub lens_floor: f64,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        let rec = RecommendationConfig::default();
        Self {
            min_response_chars: DEFAULT_MIN_RESPONSE_CHARS,
            writing_weight: rec.writing_weight,
            support_margin: rec.support_margin,
            mindset_floor: rec.mindset_floor,
            lens_floor: rec.lens_floor,
        }
    }
}

impl ScoringSettings {
    pub fn recommendation(&self) -> RecommendationConfig {
        RecommendationConfig {
            writing_weight: self.writing_weight,
            support_margin: self.support_margin,
            mindset_floor: self.mindset_floor,
            lens_floor: self.lens_floor,
        }
    }
}

/// Top-level admitscore configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmitscoreConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Default provider to use.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Default model to use.
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_temperature")]
    pub default_temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Retries after the first attempt of each generative call.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay")]
    pub retry_initial_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub retry_max_delay_ms: u64,
    /// Total wall-clock cap for one call including retries.
    #[serde(default = "default_budget")]
    pub retry_budget_ms: u64,
    /// Max concurrent generative calls.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Output directory for results.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub scoring: ScoringSettings,
}

fn default_provider() -> String {
    "anthropic".to_string()
}
fn default_model() -> String {
    AiSettings::default().model
}
fn default_temperature() -> f64 {
    AiSettings::default().temperature
}
fn default_max_tokens() -> u32 {
    AiSettings::default().max_tokens
}
fn default_retries() -> u32 {
    RetryPolicy::default().max_retries
}
fn default_initial_delay() -> u64 {
    RetryPolicy::default().initial_delay.as_millis() as u64
}
fn default_max_delay() -> u64 {
    RetryPolicy::default().max_delay.as_millis() as u64
}
fn default_budget() -> u64 {
    RetryPolicy::default().budget.as_millis() as u64
}
fn default_parallelism() -> usize {
    4
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./admitscore-results")
}

impl Default for AdmitscoreConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_retries(),
            retry_initial_delay_ms: default_initial_delay(),
            retry_max_delay_ms: default_max_delay(),
            retry_budget_ms: default_budget(),
            parallelism: default_parallelism(),
            output_dir: default_output_dir(),
            scoring: ScoringSettings::default(),
        }
    }
}

impl AdmitscoreConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            budget: Duration::from_millis(self.retry_budget_ms),
        }
    }

    /// Pipeline settings for `model`, or the default model when `None`.
    pub fn pipeline_config(&self, model: Option<&str>) -> PipelineConfig {
        PipelineConfig {
            ai: AiSettings {
                model: model.unwrap_or(&self.default_model).to_string(),
                temperature: self.default_temperature,
                max_tokens: self.max_tokens,
                retry: self.retry_policy(),
            },
            parallelism: self.parallelism.max(1),
            min_response_chars: self.scoring.min_response_chars,
            recommendation: self.scoring.recommendation(),
            force_rescore: false,
        }
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
            org_id: org_id.as_ref().map(|o| resolve_env_vars(o)),
        },
        ProviderConfig::Anthropic { api_key, base_url } => ProviderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `admitscore.toml` in the current directory
/// 2. `~/.config/admitscore/config.toml`
///
/// Environment variable overrides: `ADMITSCORE_OPENAI_KEY`, `ADMITSCORE_ANTHROPIC_KEY`.
pub fn load_config() -> Result<AdmitscoreConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<AdmitscoreConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("admitscore.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config");
            parse_config_str(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => AdmitscoreConfig::default(),
    };

    Ok(apply_env_overrides(config))
}

/// Parse a configuration document without env overrides.
pub fn parse_config_str(content: &str) -> Result<AdmitscoreConfig> {
    Ok(toml::from_str::<AdmitscoreConfig>(content)?)
}

fn apply_env_overrides(mut config: AdmitscoreConfig) -> AdmitscoreConfig {
    if let Ok(key) = std::env::var("ADMITSCORE_ANTHROPIC_KEY") {
        let entry = config
            .providers
            .entry("anthropic".into())
            .or_insert(ProviderConfig::Anthropic {
                api_key: String::new(),
                base_url: None,
            });
        if let ProviderConfig::Anthropic { api_key, .. } = entry {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("ADMITSCORE_OPENAI_KEY") {
        let entry = config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            });
        if let ProviderConfig::OpenAI { api_key, .. } = entry {
            *api_key = key;
        }
    }

    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();
    config
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("admitscore"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(name: &str, config: &ProviderConfig) -> Result<Arc<dyn LlmProvider>> {
    if config.api_key().trim().is_empty() {
        anyhow::bail!("provider '{name}' has no API key configured");
    }
    let provider: Arc<dyn LlmProvider> = match config {
        ProviderConfig::Anthropic { api_key, base_url } => {
            Arc::new(AnthropicProvider::new(api_key, base_url.clone())?)
        }
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Arc::new(OpenAiProvider::new(api_key, base_url.clone(), org_id.clone())?),
    };
    Ok(provider)
}
