//! The `admitscore recommend` command.

use std::path::{Path, PathBuf};

use anyhow::Result;

use admitscore_core::observer::TracingObserver;
use admitscore_core::parser;
use admitscore_core::report::{output_paths, ScoringResult};
use admitscore_providers::config::load_config_from;

use super::score::print_summary;

pub fn execute(
    result_path: PathBuf,
    thresholds_path: PathBuf,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let mut result = ScoringResult::load_json(&result_path)?;
    let thresholds = parser::parse_thresholds(&thresholds_path)?;

    let observer = TracingObserver::new(&result.submission_id);
    let change = result.recompute_recommendation(
        &thresholds,
        &config.scoring.recommendation(),
        &observer,
    );

    print_summary(&result);
    if change.band_changed() {
        eprintln!(
            "\nBand changed: {} -> {}",
            change.previous_band, change.band
        );
    } else {
        eprintln!("\nBand unchanged: {}", change.band);
    }

    let dir = output.unwrap_or_else(|| {
        result_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    });
    let (result_out, report_out) = output_paths(&dir, &result);
    result.save_json(&result_out)?;
    result.to_report_input().save_json(&report_out)?;
    eprintln!("Result saved to: {}", result_out.display());
    eprintln!("Report input saved to: {}", report_out.display());

    Ok(())
}
