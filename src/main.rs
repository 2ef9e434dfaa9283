use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use char_lstm::persistence::Checkpoint;
use char_lstm::text::Corpus;
use char_lstm::training::{create_trainer, TrainingConfig};

/// Environment variable naming an optional JSON file of training settings
const CONFIG_ENV: &str = "CHAR_LSTM_CONFIG";

#[derive(Parser)]
#[command(version, about = "Train a character-level LSTM on a text file")]
struct Cli {
    /// Text file to train on
    corpus: PathBuf,

    /// Name of the checkpoint directory to write
    checkpoint: String,

    /// Checkpoint directory to load initial parameters from
    resume_from: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config() -> char_lstm::Result<TrainingConfig> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) if !path.is_empty() => {
            info!(path = ?path, "loading training configuration");
            TrainingConfig::from_json_file(path)
        }
        _ => Ok(TrainingConfig::default()),
    }
}

fn run(cli: Cli) -> char_lstm::Result<()> {
    let config = load_config()?;
    let corpus = Corpus::from_file(&cli.corpus)?;
    info!(
        corpus = %cli.corpus.display(),
        symbols = corpus.len(),
        vocab = corpus.vocab.size(),
        "loaded corpus"
    );

    let checkpoint = Checkpoint::new(&cli.checkpoint);
    let mut trainer = create_trainer(&corpus, config)?.with_checkpoint(&cli.checkpoint, checkpoint)?;

    if let Some(resume) = &cli.resume_from {
        trainer.resume_from(&Checkpoint::new(resume))?;
    }

    trainer.train()
}

fn main() -> ExitCode {
    // clap prints usage and exits non-zero on missing arguments
    let cli = Cli::parse();
    init_tracing();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
