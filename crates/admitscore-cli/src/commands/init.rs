//! The `admitscore init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    write_if_missing(Path::new("admitscore.toml"), SAMPLE_CONFIG)?;

    std::fs::create_dir_all("answer-keys")?;
    write_if_missing(Path::new("answer-keys/example.toml"), EXAMPLE_ANSWER_KEY)?;

    std::fs::create_dir_all("thresholds")?;
    write_if_missing(Path::new("thresholds/example.toml"), EXAMPLE_THRESHOLDS)?;

    println!("\nNext steps:");
    println!("  1. Edit admitscore.toml with your API keys");
    println!("  2. Run: admitscore validate --answer-key answer-keys --thresholds thresholds/example.toml");
    println!(
        "  3. Run: admitscore score --payload <submission.json> --answer-key answer-keys \
         --thresholds thresholds/example.toml"
    );

    Ok(())
}

fn write_if_missing(path: &Path, content: &str) -> Result<()> {
    if path.exists() {
        println!("{} already exists, skipping.", path.display());
    } else {
        std::fs::write(path, content)?;
        println!("Created {}", path.display());
    }
    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# admitscore configuration

default_provider = "anthropic"
default_model = "claude-sonnet-4-20250514"
default_temperature = 0.2
max_retries = 3
retry_initial_delay_ms = 1000
retry_max_delay_ms = 8000
retry_budget_ms = 30000
parallelism = 4
output_dir = "./admitscore-results"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[scoring]
min_response_chars = 20
writing_weight = 0.3
support_margin = 10.0
mindset_floor = 2.0
lens_floor = 1.0
"#;

const EXAMPLE_ANSWER_KEY: &str = r#"[answer_key]
grade = "7"
form_version = "example-v1"

[[questions]]
label = "eng_q1"
domain = "english"
construct = "vocabulary"
question_type = "mcq"
question_number = 1
question_text = "Which word is closest in meaning to 'rapid'?"
correct_answer = "B"
option_a = "Slow"
option_b = "Quick"
option_c = "Heavy"
option_d = "Quiet"

[[questions]]
label = "eng_w1"
domain = "english"
construct = "extended writing"
question_type = "writing"
question_number = 2
question_text = "Describe a place that is important to you and explain why."

[[questions]]
label = "math_q1"
domain = "mathematics"
construct = "number operations"
question_type = "mcq"
question_number = 1
question_text = "What is 3/4 of 12?"
correct_answer = "C"
option_a = "6"
option_b = "8"
option_c = "9"
option_d = "12"

[[questions]]
label = "reas_q1"
domain = "reasoning"
construct = "sequences"
question_type = "mcq"
question_number = 1
question_text = "What comes next: 2, 4, 8, 16, ...?"
correct_answer = "C"
option_a = "18"
option_b = "24"
option_c = "32"
option_d = "64"
"#;

const EXAMPLE_THRESHOLDS: &str = r#"[thresholds]
school = "Example School"

[thresholds.grades."7"]
english = 55.0
mathematics = 60.0
reasoning = 50.0
"#;
