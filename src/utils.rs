//! Activation functions and their derivatives.
//!
//! Derivatives take the activation's *output* rather than its input, so the
//! backward pass can reuse the values cached during the forward pass.

use ndarray::Array2;

/// Sigmoid activation function: σ(x) = 1 / (1 + e^(-x))
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Hyperbolic tangent activation: tanh(x) = (e^x - e^(-x)) / (e^x + e^(-x))
pub fn tanh(x: f64) -> f64 {
    x.tanh()
}

/// σ'(x) expressed through y = σ(x): y(1 - y)
pub fn dsigmoid(y: f64) -> f64 {
    y * (1.0 - y)
}

/// tanh'(x) expressed through y = tanh(x): 1 - y²
pub fn dtanh(y: f64) -> f64 {
    1.0 - y * y
}

/// Row-wise softmax, stabilized by subtracting each row's maximum.
pub fn softmax(logits: &Array2<f64>) -> Array2<f64> {
    softmax_with_temperature(logits, 1.0)
}

/// Row-wise softmax over `logits / temperature`.
pub fn softmax_with_temperature(logits: &Array2<f64>, temperature: f64) -> Array2<f64> {
    let mut result = logits.mapv(|x| x / temperature);

    for mut row in result.rows_mut() {
        let max_val = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|x| (x - max_val).exp());
        let sum = row.sum();
        row.mapv_inplace(|x| x / sum);
    }

    result
}
