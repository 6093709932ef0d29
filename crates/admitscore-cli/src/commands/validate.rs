//! The `admitscore validate` command.

use std::path::PathBuf;

use anyhow::Result;

use admitscore_core::model::Domain;
use admitscore_core::parser;

pub fn execute(answer_key_path: PathBuf, thresholds_path: Option<PathBuf>) -> Result<()> {
    let keys = parser::load_answer_keys(&answer_key_path)?;
    anyhow::ensure!(
        !keys.is_empty(),
        "no answer keys found in {}",
        answer_key_path.display()
    );
    let thresholds = thresholds_path
        .as_deref()
        .map(parser::parse_thresholds)
        .transpose()?;

    let mut total_warnings = 0;

    for key in &keys {
        println!(
            "Answer key: grade {}, form {} ({} questions: {} mcq, {} writing)",
            key.grade,
            key.form_version,
            key.questions.len(),
            key.mcq().count(),
            key.writing().count()
        );

        let mut warnings: Vec<String> = parser::validate_answer_key(key)
            .into_iter()
            .map(|w| match w.label {
                Some(label) => format!("  [{label}] WARNING: {}", w.message),
                None => format!("  WARNING: {}", w.message),
            })
            .collect();

        if let Some(table) = &thresholds {
            for domain in Domain::ACADEMIC {
                if table.threshold(&key.grade, domain).is_none() {
                    warnings.push(format!(
                        "  WARNING: no threshold for {domain} at grade '{}' in {}",
                        key.grade, table.school
                    ));
                }
            }
        }

        for w in &warnings {
            println!("{w}");
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All answer keys valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
