//! # Character-level LSTM
//!
//! Trains a single-layer LSTM cell with a softmax output head on raw text,
//! one character at a time, using truncated backpropagation through time.
//! Forward and backward passes are written out by hand for this exact cell.
//!
//! ## Core Components
//!
//! - **LSTM Cell**: parameter set, one-step forward and backward propagation
//! - **Optimizers**: SGD and Adam over the named parameters
//! - **Training**: minibatch sequencing, gradient accumulation and clipping,
//!   state carried across minibatches, loss smoothing
//! - **Sampling**: multinomial text generation for monitoring
//! - **Persistence**: checkpoint directories with one file per parameter
//!
//! ## Quick Start
//!
//! ```rust
//! use char_lstm::text::Corpus;
//! use char_lstm::training::{create_trainer, TrainingConfig};
//!
//! let corpus = Corpus::from_text("hello world").unwrap();
//! let config = TrainingConfig {
//!     hidden_size: 16,
//!     iterations: 5,
//!     print_every: 0,
//!     sample_every: 0,
//!     ..TrainingConfig::default()
//! };
//! let mut trainer = create_trainer(&corpus, config).unwrap();
//! let metrics = trainer.train_step().unwrap();
//! assert!(metrics.minibatch_loss > 0.0);
//! ```

pub mod error;
pub mod utils;
pub mod layers;
pub mod loss;
pub mod optimizers;
pub mod text;
pub mod sampling;
pub mod training;
pub mod persistence;

// Re-export commonly used items
pub use error::{LstmError, Result};
pub use layers::lstm_cell::{LSTMCell, LSTMState, ParameterSet, StateGradients};
pub use training::{bptt, create_trainer, LSTMTrainer, LossSmoothing, TrainingConfig, TrainingMetrics};
pub use optimizers::{Adam, AnyOptimizer, Optimizer, OptimizerKind, SGD};
pub use text::{Corpus, Minibatch, TextVocabulary};
pub use persistence::{Checkpoint, CheckpointMetadata, PersistenceError};
