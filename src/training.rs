use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{LstmError, Result};
use crate::layers::lstm_cell::{LSTMCell, LSTMCellCache, LSTMState, ParameterSet, StateGradients};
use crate::loss::cross_entropy;
use crate::optimizers::{AnyOptimizer, Optimizer, OptimizerKind};
use crate::persistence::{Checkpoint, CheckpointMetadata};
use crate::sampling;
use crate::text::{Corpus, Minibatch, TextVocabulary};

/// File inside the checkpoint directory that receives `iteration,loss` lines
pub const PROGRESS_FILE: &str = "progress.csv";

/// How the monitored loss is derived from per-minibatch mean losses
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum LossSmoothing {
    /// `smoothed = factor * smoothed + (1 - factor) * mean`, seeded with the first mean
    Exponential { factor: f64 },
    /// The mean loss of the latest minibatch, unsmoothed
    PerMinibatch,
}

/// Configuration for training hyperparameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub hidden_size: usize,
    /// Number of time steps per minibatch (the BPTT truncation length)
    pub seq_len: usize,
    pub iterations: usize,
    pub learning_rate: f64,
    pub optimizer: OptimizerKind,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub clip_gradient: Option<f64>,
    pub loss_smoothing: LossSmoothing,
    pub print_every: usize,
    pub sample_every: usize,
    pub sample_length: usize,
    pub temperature: f64,
    pub progress_every: usize,
    pub store_every: usize,
    pub seed: u64,
    /// Step `n` (0-based) uses `learning_rate / (1 + n / decay)`; `None` keeps the rate fixed
    pub learning_rate_decay: Option<f64>,
    /// Stop after this many passes over the corpus, even if `iterations` remain
    pub epochs: Option<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            hidden_size: 64,
            seq_len: 10,
            iterations: 10_000_000,
            learning_rate: 1e-3,
            optimizer: OptimizerKind::Adam,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            clip_gradient: Some(5.0),
            loss_smoothing: LossSmoothing::Exponential { factor: 0.99 },
            print_every: 200,
            sample_every: 200,
            sample_length: 200,
            temperature: 1.0,
            progress_every: 1000,
            store_every: 8000,
            seed: 42,
            learning_rate_decay: None,
            epochs: None,
        }
    }
}

impl TrainingConfig {
    /// Read a JSON file; absent fields keep their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: TrainingConfig = serde_json::from_str(&contents)
            .map_err(|err| LstmError::InvalidConfig(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(LstmError::InvalidConfig(msg.to_string()));

        if self.hidden_size == 0 {
            return invalid("hidden_size must be positive");
        }
        if self.seq_len == 0 {
            return invalid("seq_len must be positive");
        }
        if !(self.learning_rate > 0.0) {
            return invalid("learning_rate must be positive");
        }
        if !(self.temperature > 0.0) {
            return invalid("temperature must be positive");
        }
        if matches!(self.clip_gradient, Some(bound) if !(bound >= 0.0)) {
            return invalid("clip_gradient must be non-negative");
        }
        if matches!(self.learning_rate_decay, Some(decay) if !(decay > 0.0)) {
            return invalid("learning_rate_decay must be positive");
        }
        if let LossSmoothing::Exponential { factor } = self.loss_smoothing {
            if !(0.0..1.0).contains(&factor) {
                return invalid("loss smoothing factor must be in [0, 1)");
            }
        }
        Ok(())
    }
}

/// Training metrics tracked during training
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingMetrics {
    pub iteration: usize,
    /// Mean cross-entropy over the minibatch just processed
    pub minibatch_loss: f64,
    pub smoothed_loss: f64,
    pub best_loss: f64,
    pub time_elapsed: f64,
}

/// Result of one forward/backward sweep over a minibatch
#[derive(Debug, Clone)]
pub struct BpttOutcome {
    /// Sum of per-step cross-entropy losses
    pub loss: f64,
    /// Sum of per-step gradients, unclipped
    pub gradients: ParameterSet,
    pub final_state: LSTMState,
}

/// Truncated backpropagation through time over one minibatch.
///
/// The forward phase runs in time order from `state`; the backward phase runs
/// in reverse, seeded with zero gradients, so nothing flows past the start of
/// the minibatch. Per-step gradients are summed, not averaged.
pub fn bptt(cell: &LSTMCell, batch: &Minibatch, state: &LSTMState) -> Result<BpttOutcome> {
    let mut loss = 0.0;
    let mut steps: Vec<(ndarray::Array2<f64>, LSTMState, LSTMCellCache)> = Vec::with_capacity(batch.len());
    let mut current = state.clone();

    for (input, target) in batch.pairs() {
        let (probs, next, cache) = cell.forward(input, &current)?;
        loss += cross_entropy(&probs, target)?;
        current = next.clone();
        steps.push((probs, next, cache));
    }

    let mut gradients = cell.zero_gradients();
    let mut d_next = StateGradients::zeros(cell.hidden_size);

    for ((probs, step_state, cache), (_, target)) in steps.iter().zip(batch.pairs()).rev() {
        let (step_gradients, d_prev) = cell.backward(probs, target, step_state, &d_next, cache)?;
        gradients.accumulate(&step_gradients);
        d_next = d_prev;
    }

    Ok(BpttOutcome {
        loss,
        gradients,
        final_state: current,
    })
}

/// Clamp every gradient element into `[-bound, bound]`
pub fn clip_gradients(gradients: &mut ParameterSet, bound: f64) {
    gradients.clip(bound);
}

/// Append-only `iteration,loss` record for external plotting
pub struct ProgressLog {
    writer: BufWriter<File>,
}

impl ProgressLog {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(ProgressLog {
            writer: BufWriter::new(file),
        })
    }

    pub fn record(&mut self, iteration: usize, loss: f64) -> Result<()> {
        writeln!(self.writer, "{},{}", iteration, loss)?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Main trainer: cycles through the corpus minibatches, carrying recurrent
/// state from one minibatch to the next.
pub struct LSTMTrainer<O: Optimizer> {
    pub cell: LSTMCell,
    pub optimizer: O,
    pub config: TrainingConfig,
    vocab: TextVocabulary,
    minibatches: Vec<Minibatch>,
    state: LSTMState,
    next_batch: usize,
    iteration: usize,
    smoothed_loss: Option<f64>,
    best_loss: f64,
    sample_rng: StdRng,
    run_name: String,
    checkpoint: Option<Checkpoint>,
    progress: Option<ProgressLog>,
    metrics_history: Vec<TrainingMetrics>,
}

impl<O: Optimizer> LSTMTrainer<O> {
    pub fn new(cell: LSTMCell, optimizer: O, corpus: &Corpus, config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        if corpus.is_empty() {
            return Err(LstmError::EmptyCorpus);
        }
        if cell.vocab_size != corpus.vocab.size() {
            return Err(LstmError::VocabularyMismatch(format!(
                "cell expects {} symbols, corpus has {}",
                cell.vocab_size,
                corpus.vocab.size()
            )));
        }

        let minibatches = corpus.minibatches(config.seq_len)?;
        let state = cell.initial_state();
        let sample_rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));

        Ok(LSTMTrainer {
            cell,
            optimizer,
            vocab: corpus.vocab.clone(),
            minibatches,
            state,
            next_batch: 0,
            iteration: 0,
            smoothed_loss: None,
            best_loss: f64::INFINITY,
            sample_rng,
            run_name: String::new(),
            checkpoint: None,
            progress: None,
            metrics_history: Vec::new(),
            config,
        })
    }

    /// Store checkpoints and the progress log under `checkpoint`'s directory
    pub fn with_checkpoint(mut self, run_name: &str, checkpoint: Checkpoint) -> Result<Self> {
        std::fs::create_dir_all(checkpoint.dir())?;
        self.progress = Some(ProgressLog::open(checkpoint.dir().join(PROGRESS_FILE))?);
        self.run_name = run_name.to_string();
        self.checkpoint = Some(checkpoint);
        Ok(self)
    }

    /// Replace the cell parameters with those stored in `checkpoint`.
    ///
    /// Shapes must match the current hidden width and vocabulary, and a stored
    /// vocabulary must equal the corpus one.
    pub fn resume_from(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let params = checkpoint.load_parameters()?;
        params.validate_shapes(self.cell.hidden_size, self.cell.vocab_size)?;

        if let Some(metadata) = checkpoint.load_metadata()? {
            if metadata.vocabulary != self.vocab.chars() {
                return Err(LstmError::VocabularyMismatch(format!(
                    "checkpoint {} was trained on a different character set",
                    checkpoint.dir().display()
                )));
            }
            self.iteration = metadata.iteration;
        }

        self.cell.params = params;
        self.optimizer.reset();
        info!(dir = %checkpoint.dir().display(), iteration = self.iteration, "resumed from checkpoint");
        Ok(())
    }

    pub fn minibatch_count(&self) -> usize {
        self.minibatches.len()
    }

    /// Minibatch `index`, wrapping around past the end of the corpus
    pub fn minibatch(&self, index: usize) -> &Minibatch {
        &self.minibatches[index % self.minibatches.len()]
    }

    /// State that the next minibatch will start from
    pub fn state(&self) -> &LSTMState {
        &self.state
    }

    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Completed passes over the corpus
    pub fn epoch(&self) -> usize {
        self.iteration / self.minibatches.len()
    }

    /// Learning rate for the step after `completed` steps
    fn scheduled_learning_rate(&self, completed: usize) -> Option<f64> {
        self.config
            .learning_rate_decay
            .map(|decay| self.config.learning_rate / (1.0 + completed as f64 / decay))
    }

    pub fn smoothed_loss(&self) -> Option<f64> {
        self.smoothed_loss
    }

    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    pub fn vocabulary(&self) -> &TextVocabulary {
        &self.vocab
    }

    /// Train on the next minibatch and apply one optimizer update.
    ///
    /// On error nothing is updated: the step counter, minibatch cursor,
    /// carried state and parameters stay as they were.
    pub fn train_step(&mut self) -> Result<TrainingMetrics> {
        let start_time = Instant::now();
        let batch_index = self.next_batch;

        let batch = &self.minibatches[batch_index];
        let outcome = bptt(&self.cell, batch, &self.state)?;
        let first_symbol = batch.inputs[0];
        let mean_loss = outcome.loss / batch.len() as f64;

        if !mean_loss.is_finite() {
            return Err(LstmError::NonFiniteLoss {
                iteration: self.iteration + 1,
                loss: mean_loss,
            });
        }

        if let Some(learning_rate) = self.scheduled_learning_rate(self.iteration) {
            self.optimizer.set_learning_rate(learning_rate);
        }
        self.next_batch = (batch_index + 1) % self.minibatches.len();
        self.iteration += 1;

        let smoothed = match (self.config.loss_smoothing, self.smoothed_loss) {
            (LossSmoothing::Exponential { factor }, Some(previous)) => factor * previous + (1.0 - factor) * mean_loss,
            _ => mean_loss,
        };
        self.smoothed_loss = Some(smoothed);
        self.best_loss = self.best_loss.min(smoothed);

        let mut gradients = outcome.gradients;
        if let Some(bound) = self.config.clip_gradient {
            clip_gradients(&mut gradients, bound);
        }
        self.cell.update_parameters(&gradients, &mut self.optimizer);
        self.state = outcome.final_state;

        let metrics = TrainingMetrics {
            iteration: self.iteration,
            minibatch_loss: mean_loss,
            smoothed_loss: smoothed,
            best_loss: self.best_loss,
            time_elapsed: start_time.elapsed().as_secs_f64(),
        };
        debug!(iteration = self.iteration, batch = batch_index, loss = mean_loss, "trained minibatch");

        self.after_step(&metrics, first_symbol)?;
        Ok(metrics)
    }

    fn after_step(&mut self, metrics: &TrainingMetrics, first_symbol: usize) -> Result<()> {
        let due = |every: usize| every > 0 && metrics.iteration % every == 0;

        if due(self.config.print_every) {
            info!(
                "Iteration: {} (epoch: {}). Loss: {:.6}, best loss: {:.6}, LR: {:.6}, step time: {:.3}ms",
                metrics.iteration,
                self.epoch(),
                metrics.smoothed_loss,
                metrics.best_loss,
                self.optimizer.learning_rate(),
                metrics.time_elapsed * 1e3
            );
        }

        if due(self.config.sample_every) {
            let text = self.sample(first_symbol)?;
            info!("sample at iteration {}:\n{}", metrics.iteration, text);
        }

        if due(self.config.progress_every) {
            self.metrics_history.push(metrics.clone());
            if let Some(progress) = self.progress.as_mut() {
                progress.record(metrics.iteration, metrics.smoothed_loss)?;
            }
        }

        if due(self.config.store_every) {
            self.save_checkpoint()?;
        }

        Ok(())
    }

    /// Run `config.iterations` training steps, then store a final checkpoint.
    ///
    /// With `config.epochs` set, stops early once that many passes over the
    /// corpus are complete.
    pub fn train(&mut self) -> Result<()> {
        info!(
            iterations = self.config.iterations,
            minibatches = self.minibatches.len(),
            hidden = self.cell.hidden_size,
            vocab = self.cell.vocab_size,
            parameters = self.cell.params.num_parameters(),
            "starting training"
        );

        for _ in 0..self.config.iterations {
            if let Some(limit) = self.config.epochs {
                if self.epoch() >= limit {
                    info!(epochs = limit, iteration = self.iteration, "epoch limit reached");
                    break;
                }
            }
            self.train_step()?;
        }

        self.save_checkpoint()?;
        if let Some(latest) = self.get_latest_metrics() {
            debug!(iteration = latest.iteration, loss = latest.smoothed_loss, "last recorded progress");
        }
        info!(best_loss = self.best_loss, "training completed");
        Ok(())
    }

    /// Generate `sample_length` characters from a fresh state starting at `start`
    pub fn sample(&mut self, start: usize) -> Result<String> {
        let symbols = sampling::generate(
            &self.cell,
            start,
            self.config.sample_length,
            self.config.temperature,
            &mut self.sample_rng,
        )?;
        self.vocab.decode(&symbols)
    }

    /// Write the current parameters; a no-op without a configured checkpoint
    pub fn save_checkpoint(&self) -> Result<()> {
        if let Some(checkpoint) = &self.checkpoint {
            let metadata = CheckpointMetadata::new(
                &self.run_name,
                self.cell.hidden_size,
                self.vocab.chars(),
                self.iteration,
                self.smoothed_loss,
            );
            checkpoint.save(&self.cell.params, &metadata)?;
            info!(dir = %checkpoint.dir().display(), iteration = self.iteration, "stored checkpoint");
        }
        Ok(())
    }

    pub fn get_latest_metrics(&self) -> Option<&TrainingMetrics> {
        self.metrics_history.last()
    }

    pub fn get_metrics_history(&self) -> &[TrainingMetrics] {
        &self.metrics_history
    }
}

/// Create a trainer with a seeded cell and the optimizer named in `config`
pub fn create_trainer(corpus: &Corpus, config: TrainingConfig) -> Result<LSTMTrainer<AnyOptimizer>> {
    config.validate()?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let cell = LSTMCell::new(corpus.vocab.size(), config.hidden_size, &mut rng);
    let optimizer = AnyOptimizer::new(
        config.optimizer,
        config.learning_rate,
        config.beta1,
        config.beta2,
        config.epsilon,
    );
    LSTMTrainer::new(cell, optimizer, corpus, config)
}
