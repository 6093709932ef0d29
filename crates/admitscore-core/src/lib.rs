//! admitscore-core: Scoring pipeline, data model, and recommendation engine.
//!
//! This crate turns one raw form submission into a scored, explained
//! admissions recommendation. The stages live in their own modules and are
//! wired together by [`engine::ScoringPipeline`]; generative steps go through
//! the [`traits::LlmProvider`] seam so that providers live in a separate crate.

pub mod analyser;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod extractor;
pub mod model;
pub mod observer;
pub mod parser;
pub mod recommendation;
pub mod report;
pub mod resolver;
pub mod retry;
pub mod scorer;
pub mod summary;
pub mod text;
pub mod traits;

#[cfg(test)]
mod test_support;
