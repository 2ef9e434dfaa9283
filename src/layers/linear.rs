use ndarray::{s, Array2, Axis};

use crate::error::{LstmError, Result};

/// Holds gradients for one fully connected transform during backpropagation
#[derive(Clone, Debug)]
pub struct LinearGradients {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
}

/// Encode `index` as a `1 x size` row with a single 1.0
pub fn one_hot(index: usize, size: usize) -> Result<Array2<f64>> {
    if index >= size {
        return Err(LstmError::SymbolOutOfRange { index, vocab_size: size });
    }
    let mut row = Array2::zeros((1, size));
    row[[0, index]] = 1.0;
    Ok(row)
}

/// Join two matrices with the same row count side by side: `[left ; right]`
pub fn concat_columns(left: &Array2<f64>, right: &Array2<f64>) -> Array2<f64> {
    let split = left.ncols();
    let mut joined = Array2::zeros((left.nrows(), split + right.ncols()));
    joined.slice_mut(s![.., ..split]).assign(left);
    joined.slice_mut(s![.., split..]).assign(right);
    joined
}

/// Fully connected forward pass on row vectors.
///
/// Computes `input · weight + bias` where `input` is `(batch, in)`,
/// `weight` is `(in, out)` and `bias` is a `(1, out)` row broadcast over the batch.
pub fn forward(input: &Array2<f64>, weight: &Array2<f64>, bias: &Array2<f64>) -> Array2<f64> {
    input.dot(weight) + bias
}

/// Fully connected backward pass.
///
/// # Arguments
/// * `grad_output` - Gradient w.r.t. the output, shape `(batch, out)`
/// * `weight` - The weight matrix used in the forward pass, shape `(in, out)`
/// * `input` - The input fed to the forward pass, shape `(batch, in)`
///
/// # Returns
/// * Tuple of (gradients, input_gradient)
///   - gradients: `input^T · grad_output` for the weight, column sums for the bias
///   - input_gradient: `grad_output · weight^T`, shape `(batch, in)`
pub fn backward(
    grad_output: &Array2<f64>,
    weight: &Array2<f64>,
    input: &Array2<f64>,
) -> (LinearGradients, Array2<f64>) {
    let weight_grad = input.t().dot(grad_output);
    let bias_grad = grad_output.sum_axis(Axis(0)).insert_axis(Axis(0));
    let input_grad = grad_output.dot(&weight.t());

    let gradients = LinearGradients {
        weight: weight_grad,
        bias: bias_grad,
    };

    (gradients, input_grad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_one_hot() {
        let row = one_hot(2, 4).unwrap();
        assert_eq!(row, arr2(&[[0.0, 0.0, 1.0, 0.0]]));
    }

    #[test]
    fn test_one_hot_rejects_out_of_range() {
        match one_hot(4, 4) {
            Err(LstmError::SymbolOutOfRange { index, vocab_size }) => {
                assert_eq!(index, 4);
                assert_eq!(vocab_size, 4);
            }
            other => panic!("expected out-of-range error, got {:?}", other),
        }
    }

    #[test]
    fn test_concat_columns() {
        let h = arr2(&[[0.1, 0.2]]);
        let x = arr2(&[[0.0, 1.0, 0.0]]);
        let joined = concat_columns(&h, &x);
        assert_eq!(joined, arr2(&[[0.1, 0.2, 0.0, 1.0, 0.0]]));
    }

    #[test]
    fn test_forward_broadcasts_bias() {
        let input = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let weight = arr2(&[[1.0, 0.0, 1.0], [0.0, 1.0, 1.0]]);
        let bias = arr2(&[[0.5, -0.5, 0.0]]);

        let output = forward(&input, &weight, &bias);
        assert_eq!(output, arr2(&[[1.5, 1.5, 3.0], [3.5, 3.5, 7.0]]));
    }

    #[test]
    fn test_backward_shapes_and_values() {
        let input = arr2(&[[1.0, 2.0]]);
        let weight = arr2(&[[1.0, 0.0, 1.0], [0.0, 1.0, 1.0]]);
        let grad_output = arr2(&[[1.0, -1.0, 2.0]]);

        let (gradients, input_grad) = backward(&grad_output, &weight, &input);

        assert_eq!(gradients.weight, arr2(&[[1.0, -1.0, 2.0], [2.0, -2.0, 4.0]]));
        assert_eq!(gradients.bias, arr2(&[[1.0, -1.0, 2.0]]));
        assert_eq!(input_grad, arr2(&[[3.0, 1.0]]));
    }
}
