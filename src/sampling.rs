//! Free-running text generation from the current parameters.

use ndarray::Array2;
use rand::Rng;

use crate::error::Result;
use crate::layers::lstm_cell::LSTMCell;
use crate::utils::softmax_with_temperature;

/// Draw an index from a `(1, F)` probability row by cumulative subtraction.
pub fn sample_index<R: Rng>(probs: &Array2<f64>, rng: &mut R) -> usize {
    let mut rng_val = rng.gen::<f64>();
    for (i, &prob) in probs.iter().enumerate() {
        rng_val -= prob;
        if rng_val <= 0.0 {
            return i;
        }
    }

    // Rounding can leave a sliver of mass unaccounted for
    probs.len() - 1
}

/// Generate `length` symbols starting from `start`.
///
/// Runs from a fresh zero state, so it never touches the training state. Each
/// step feeds back the symbol it just drew. With `temperature` 1.0 the cell's
/// distribution is sampled as is.
pub fn generate<R: Rng>(
    cell: &LSTMCell,
    start: usize,
    length: usize,
    temperature: f64,
    rng: &mut R,
) -> Result<Vec<usize>> {
    let mut state = cell.initial_state();
    let mut symbol = start;
    let mut output = Vec::with_capacity(length);

    for _ in 0..length {
        let (probs, next_state, _) = cell.forward(symbol, &state)?;
        let probs = if temperature == 1.0 {
            probs
        } else {
            softmax_with_temperature(&probs.mapv(f64::ln), temperature)
        };

        symbol = sample_index(&probs, rng);
        output.push(symbol);
        state = next_state;
    }

    Ok(output)
}
