//! The `admitscore score` command.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use admitscore_core::engine::ScoringPipeline;
use admitscore_core::observer::TracingObserver;
use admitscore_core::parser;
use admitscore_core::report::{output_paths, result_file_name, ScoringResult};
use admitscore_core::traits::LlmProvider;
use admitscore_providers::config::{load_config_from, AdmitscoreConfig};
use admitscore_providers::create_provider;

pub struct ScoreArgs {
    pub payload: PathBuf,
    pub answer_key: PathBuf,
    pub thresholds: PathBuf,
    pub output: Option<PathBuf>,
    pub model: Option<String>,
    pub no_ai: bool,
    pub previous: Option<PathBuf>,
    pub rescore_writing: bool,
    pub config: Option<PathBuf>,
}

pub async fn execute(args: ScoreArgs) -> Result<()> {
    let config = load_config_from(args.config.as_deref())?;

    let submission = parser::parse_submission(&args.payload)?;
    let keys = parser::load_answer_keys(&args.answer_key)?;
    let answer_key = parser::select_answer_key(&keys, &submission.grade).with_context(|| {
        format!(
            "no answer key for grade '{}' in {}",
            submission.grade,
            args.answer_key.display()
        )
    })?;
    let thresholds = parser::parse_thresholds(&args.thresholds)?;
    let output = args.output.unwrap_or_else(|| config.output_dir.clone());

    let (provider_name, model) = split_model(args.model.as_deref(), &config);
    let provider = if args.no_ai {
        None
    } else {
        Some(provider_for(&provider_name, &config)?)
    };

    let previous = match &args.previous {
        Some(path) => Some(ScoringResult::load_json(path)?),
        None => {
            let path = output.join(result_file_name(&submission.submission_id));
            if path.exists() {
                match ScoringResult::load_json(&path) {
                    Ok(result) => Some(result),
                    Err(e) => {
                        tracing::warn!("ignoring previous result {}: {e:#}", path.display());
                        None
                    }
                }
            } else {
                None
            }
        }
    };

    let mut pipeline_config = config.pipeline_config(Some(&model));
    pipeline_config.force_rescore = args.rescore_writing;
    let pipeline = ScoringPipeline::new(provider, pipeline_config);

    eprintln!(
        "admitscore v{} — Scoring {} ({}, form {}) with {}",
        env!("CARGO_PKG_VERSION"),
        submission.submission_id,
        answer_key.grade,
        answer_key.form_version,
        if args.no_ai {
            "no generative service".to_string()
        } else {
            format!("{provider_name}/{model}")
        }
    );

    let observer = TracingObserver::new(&submission.submission_id);
    let result = pipeline
        .score(
            &submission,
            answer_key,
            &thresholds,
            previous.as_ref(),
            &observer,
        )
        .await;

    print_summary(&result);

    let (result_path, report_path) = output_paths(&output, &result);
    result.save_json(&result_path)?;
    result.to_report_input().save_json(&report_path)?;
    eprintln!("Result saved to: {}", result_path.display());
    eprintln!("Report input saved to: {}", report_path.display());

    Ok(())
}

/// Split "provider/model" into its parts, defaulting either from the config.
fn split_model(spec: Option<&str>, config: &AdmitscoreConfig) -> (String, String) {
    match spec.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => match s.split_once('/') {
            Some((provider, model)) => (provider.to_string(), model.to_string()),
            None => (config.default_provider.clone(), s.to_string()),
        },
        None => (config.default_provider.clone(), config.default_model.clone()),
    }
}

fn provider_for(name: &str, config: &AdmitscoreConfig) -> Result<Arc<dyn LlmProvider>> {
    let Some(pconfig) = config.providers.get(name) else {
        anyhow::bail!(
            "provider '{}' not found in config. Available: {:?}. Use --no-ai to score without one.",
            name,
            config.providers.keys().collect::<Vec<_>>()
        );
    };
    create_provider(name, pconfig)
}

pub(crate) fn print_summary(result: &ScoringResult) {
    let rec = &result.recommendation;

    let mut table = Table::new();
    table.set_header(vec![
        "Domain",
        "MCQ %",
        "Writing %",
        "Combined %",
        "Threshold",
        "Delta",
        "Status",
    ]);

    let pct = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"));
    for outcome in &rec.domains {
        let status = if !outcome.assessed {
            "not assessed"
        } else if outcome.meets_threshold {
            "meets"
        } else {
            "below"
        };
        table.add_row(vec![
            Cell::new(outcome.domain.display_name()),
            Cell::new(pct(outcome.mcq_pct)),
            Cell::new(pct(outcome.writing_pct)),
            Cell::new(pct(outcome.combined_pct)),
            Cell::new(pct(outcome.threshold)),
            Cell::new(
                outcome
                    .delta
                    .map_or_else(|| "-".to_string(), |d| format!("{d:+.1}")),
            ),
            Cell::new(status),
        ]);
    }
    if let Some(mindset) = rec.mindset_score {
        table.add_row(vec![
            Cell::new("Mindset"),
            Cell::new(format!("{mindset:.1} / 4")),
            Cell::new("-"),
            Cell::new("-"),
            Cell::new("-"),
            Cell::new("-"),
            Cell::new(""),
        ]);
    }

    eprintln!("\n{table}");
    eprintln!(
        "\nRecommendation: {} (overall academic {:.1}%)",
        rec.band, rec.overall_academic_pct
    );
    eprintln!("{}", result.executive_summary.text);

    let reasons = result.manual_review_reasons();
    if !reasons.is_empty() {
        eprintln!("\nManual review required:");
        for reason in &reasons {
            eprintln!("  - {reason}");
        }
    }
}
