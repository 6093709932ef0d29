//! admitscore-providers: Generative-text service integrations.
//!
//! Implements the `LlmProvider` trait for Anthropic and OpenAI-compatible
//! APIs, plus a scriptable mock, and loads the `admitscore.toml`
//! configuration that selects between them.

pub mod anthropic;
pub mod config;
pub mod error;
pub mod mock;
pub mod openai;

pub use config::{
    create_provider, load_config, load_config_from, AdmitscoreConfig, ProviderConfig,
    ScoringSettings,
};
pub use error::ProviderError;
