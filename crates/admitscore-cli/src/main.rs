//! admitscore CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "admitscore",
    version,
    about = "Admissions-test scoring and recommendation pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one submission payload
    Score {
        /// Submission payload JSON
        #[arg(long)]
        payload: PathBuf,

        /// Answer key .toml file or directory of keys
        #[arg(long)]
        answer_key: PathBuf,

        /// School threshold table .toml
        #[arg(long)]
        thresholds: PathBuf,

        /// Output directory (defaults to the configured output_dir)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Model as "provider/model" or "model" (defaults to the config)
        #[arg(long)]
        model: Option<String>,

        /// Skip all generative calls and use deterministic fallbacks
        #[arg(long)]
        no_ai: bool,

        /// Previous result to reuse writing evaluations from
        /// (defaults to the existing result in the output directory)
        #[arg(long)]
        previous: Option<PathBuf>,

        /// Re-evaluate writing even when the response is unchanged
        #[arg(long)]
        rescore_writing: bool,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Recompute the recommendation of a saved result with new thresholds
    Recommend {
        /// Saved result JSON
        #[arg(long)]
        result: PathBuf,

        /// School threshold table .toml
        #[arg(long)]
        thresholds: PathBuf,

        /// Output directory (defaults to the result's directory)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate answer key TOML files
    Validate {
        /// Path to answer key file or directory
        #[arg(long)]
        answer_key: PathBuf,

        /// Threshold table to check the keys' grades against
        #[arg(long)]
        thresholds: Option<PathBuf>,
    },

    /// List available models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config, answer key, and threshold table
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("admitscore=info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Score {
            payload,
            answer_key,
            thresholds,
            output,
            model,
            no_ai,
            previous,
            rescore_writing,
            config,
        } => {
            commands::score::execute(commands::score::ScoreArgs {
                payload,
                answer_key,
                thresholds,
                output,
                model,
                no_ai,
                previous,
                rescore_writing,
                config,
            })
            .await
        }
        Commands::Recommend {
            result,
            thresholds,
            output,
            config,
        } => commands::recommend::execute(result, thresholds, output, config),
        Commands::Validate {
            answer_key,
            thresholds,
        } => commands::validate::execute(answer_key, thresholds),
        Commands::ListModels { provider, config } => {
            commands::list_models::execute(provider, config)
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
