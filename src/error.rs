use thiserror::Error;

use crate::persistence::PersistenceError;

pub type Result<T> = std::result::Result<T, LstmError>;

/// Errors raised while building a corpus, running the cell or training.
#[derive(Debug, Error)]
pub enum LstmError {
    #[error("symbol index {index} out of range for vocabulary of size {vocab_size}")]
    SymbolOutOfRange { index: usize, vocab_size: usize },

    #[error("character {0:?} is not in the vocabulary")]
    UnknownSymbol(char),

    #[error("corpus is empty")]
    EmptyCorpus,

    #[error("target symbol {target} has zero probability")]
    ZeroProbability { target: usize },

    #[error("non-finite loss {loss} at iteration {iteration}")]
    NonFiniteLoss { iteration: usize, loss: f64 },

    #[error("parameter {name} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        name: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("vocabulary mismatch: {0}")]
    VocabularyMismatch(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
