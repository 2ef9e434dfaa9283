use ndarray::Array2;

use crate::error::{LstmError, Result};

/// Cross-entropy of a softmax distribution against a target symbol: `-ln p[target]`
///
/// `probs` is a `(1, F)` probability row. A zero probability would make the
/// loss infinite and is reported as an error instead.
pub fn cross_entropy(probs: &Array2<f64>, target: usize) -> Result<f64> {
    let vocab_size = probs.ncols();
    if target >= vocab_size {
        return Err(LstmError::SymbolOutOfRange { index: target, vocab_size });
    }

    let p = probs[[0, target]];
    if p <= 0.0 {
        return Err(LstmError::ZeroProbability { target });
    }
    Ok(-p.ln())
}

/// Gradient of cross-entropy w.r.t. the pre-softmax logits: `p - one_hot(target)`
pub fn cross_entropy_gradient(probs: &Array2<f64>, target: usize) -> Result<Array2<f64>> {
    let vocab_size = probs.ncols();
    if target >= vocab_size {
        return Err(LstmError::SymbolOutOfRange { index: target, vocab_size });
    }

    let mut grad = probs.clone();
    grad[[0, target]] -= 1.0;
    Ok(grad)
}
