use ndarray::{s, Array2};
use ndarray_rand::RandomExt;
use rand_distr::StandardNormal;
use rand::Rng;

use crate::error::{LstmError, Result};
use crate::layers::linear;
use crate::loss::cross_entropy_gradient;
use crate::optimizers::Optimizer;
use crate::utils::{dsigmoid, dtanh, sigmoid, tanh};

/// Parameter keys in checkpoint and optimizer order.
pub const PARAMETER_NAMES: [&str; 10] = ["Wf", "Wi", "Wc", "Wo", "Wy", "bf", "bi", "bc", "bo", "by"];

/// The ten trainable arrays of the cell and its output head.
///
/// Also used as the gradient container: gradients carry exactly the same
/// keys and shapes as the parameters they belong to.
///
/// Shapes, with `N` the hidden width and `F` the vocabulary size:
/// - `wf`, `wi`, `wc`, `wo`: `(N + F, N)`
/// - `wy`: `(N, F)`
/// - `bf`, `bi`, `bc`, `bo`: `(1, N)`
/// - `by`: `(1, F)`
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterSet {
    pub wf: Array2<f64>,
    pub wi: Array2<f64>,
    pub wc: Array2<f64>,
    pub wo: Array2<f64>,
    pub wy: Array2<f64>,
    pub bf: Array2<f64>,
    pub bi: Array2<f64>,
    pub bc: Array2<f64>,
    pub bo: Array2<f64>,
    pub by: Array2<f64>,
}

impl ParameterSet {
    /// All-zero parameters, the starting point for gradient accumulation
    pub fn zeros(hidden_size: usize, vocab_size: usize) -> Self {
        Self::from_fn(hidden_size, vocab_size, |_, shape| Array2::zeros(shape))
    }

    /// Gaussian weights scaled by `1/sqrt(fan_in/2)`, zero biases
    pub fn random<R: Rng>(hidden_size: usize, vocab_size: usize, rng: &mut R) -> Self {
        let concat = hidden_size + vocab_size;
        Self::from_fn(hidden_size, vocab_size, |name, shape| {
            if name.starts_with('b') {
                return Array2::zeros(shape);
            }
            let fan_in = if name == "Wy" { hidden_size } else { concat };
            let scale = (fan_in as f64 / 2.0).sqrt();
            Array2::random_using(shape, StandardNormal, &mut *rng) / scale
        })
    }

    fn from_fn<F>(hidden_size: usize, vocab_size: usize, mut init: F) -> Self
    where
        F: FnMut(&'static str, (usize, usize)) -> Array2<f64>,
    {
        let mut make = |name: &'static str| init(name, Self::expected_shape(name, hidden_size, vocab_size));
        ParameterSet {
            wf: make("Wf"),
            wi: make("Wi"),
            wc: make("Wc"),
            wo: make("Wo"),
            wy: make("Wy"),
            bf: make("bf"),
            bi: make("bi"),
            bc: make("bc"),
            bo: make("bo"),
            by: make("by"),
        }
    }

    /// Build a set by fetching every key; fails on the first missing one
    pub fn try_from_fn<F, E>(mut fetch: F) -> std::result::Result<Self, E>
    where
        F: FnMut(&'static str) -> std::result::Result<Array2<f64>, E>,
    {
        Ok(ParameterSet {
            wf: fetch("Wf")?,
            wi: fetch("Wi")?,
            wc: fetch("Wc")?,
            wo: fetch("Wo")?,
            wy: fetch("Wy")?,
            bf: fetch("bf")?,
            bi: fetch("bi")?,
            bc: fetch("bc")?,
            bo: fetch("bo")?,
            by: fetch("by")?,
        })
    }

    /// Shape a parameter named `name` must have for the given dimensions
    pub fn expected_shape(name: &str, hidden_size: usize, vocab_size: usize) -> (usize, usize) {
        match name {
            "Wy" => (hidden_size, vocab_size),
            "by" => (1, vocab_size),
            n if n.starts_with('W') => (hidden_size + vocab_size, hidden_size),
            _ => (1, hidden_size),
        }
    }

    pub fn hidden_size(&self) -> usize {
        self.wy.nrows()
    }

    pub fn vocab_size(&self) -> usize {
        self.wy.ncols()
    }

    /// Check every array against the shapes implied by `hidden_size` and `vocab_size`
    pub fn validate_shapes(&self, hidden_size: usize, vocab_size: usize) -> Result<()> {
        for (name, array) in self.iter() {
            let expected = Self::expected_shape(name, hidden_size, vocab_size);
            if array.dim() != expected {
                return Err(LstmError::ShapeMismatch {
                    name,
                    expected,
                    found: array.dim(),
                });
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Array2<f64>)> {
        [
            ("Wf", &self.wf),
            ("Wi", &self.wi),
            ("Wc", &self.wc),
            ("Wo", &self.wo),
            ("Wy", &self.wy),
            ("bf", &self.bf),
            ("bi", &self.bi),
            ("bc", &self.bc),
            ("bo", &self.bo),
            ("by", &self.by),
        ]
        .into_iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&'static str, &mut Array2<f64>)> {
        let ParameterSet { wf, wi, wc, wo, wy, bf, bi, bc, bo, by } = self;
        [
            ("Wf", wf),
            ("Wi", wi),
            ("Wc", wc),
            ("Wo", wo),
            ("Wy", wy),
            ("bf", bf),
            ("bi", bi),
            ("bc", bc),
            ("bo", bo),
            ("by", by),
        ]
        .into_iter()
    }

    /// Elementwise `self += other`, key by key
    pub fn accumulate(&mut self, other: &ParameterSet) {
        for ((_, total), (_, step)) in self.iter_mut().zip(other.iter()) {
            *total += step;
        }
    }

    /// Clamp every element into `[-bound, bound]`
    pub fn clip(&mut self, bound: f64) {
        for (_, array) in self.iter_mut() {
            array.mapv_inplace(|x| x.clamp(-bound, bound));
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.iter().map(|(_, array)| array.len()).sum()
    }
}

/// Recurrent state carried between time steps: hidden `h` and cell `c`, each `(1, N)`
#[derive(Clone, Debug, PartialEq)]
pub struct LSTMState {
    pub h: Array2<f64>,
    pub c: Array2<f64>,
}

impl LSTMState {
    pub fn zeros(hidden_size: usize) -> Self {
        LSTMState {
            h: Array2::zeros((1, hidden_size)),
            c: Array2::zeros((1, hidden_size)),
        }
    }
}

/// Gradient flowing into a time step from the step after it
#[derive(Clone, Debug, PartialEq)]
pub struct StateGradients {
    pub dh: Array2<f64>,
    pub dc: Array2<f64>,
}

impl StateGradients {
    pub fn zeros(hidden_size: usize) -> Self {
        StateGradients {
            dh: Array2::zeros((1, hidden_size)),
            dc: Array2::zeros((1, hidden_size)),
        }
    }
}

/// Caches intermediate values during forward pass for efficient backward computation
#[derive(Clone, Debug)]
pub struct LSTMCellCache {
    /// `[h_prev ; one_hot(x)]`, shape `(1, N + F)`
    pub input: Array2<f64>,
    pub hx: Array2<f64>,
    pub cx: Array2<f64>,
    pub forget_gate: Array2<f64>,
    pub input_gate: Array2<f64>,
    pub output_gate: Array2<f64>,
    pub cell_gate: Array2<f64>,
    pub tanh_cy: Array2<f64>,
}

/// Single-layer LSTM cell with a linear softmax head over the vocabulary
///
/// Implements, on row vectors with `X = [h_{t-1} ; x_t]`:
/// - f_t = σ(X·Wf + bf)
/// - i_t = σ(X·Wi + bi)
/// - g_t = tanh(X·Wc + bc)
/// - o_t = σ(X·Wo + bo)
/// - c_t = f_t ⊙ c_{t-1} + i_t ⊙ g_t
/// - h_t = o_t ⊙ tanh(c_t)
/// - p_t = softmax(h_t·Wy + by)
#[derive(Clone, Debug)]
pub struct LSTMCell {
    pub params: ParameterSet,
    pub hidden_size: usize,
    pub vocab_size: usize,
}

impl LSTMCell {
    /// Creates a cell with randomly initialized weights drawn from `rng`
    pub fn new<R: Rng>(vocab_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        Self::from_parameters(ParameterSet::random(hidden_size, vocab_size, rng))
    }

    pub fn from_parameters(params: ParameterSet) -> Self {
        let hidden_size = params.hidden_size();
        let vocab_size = params.vocab_size();
        LSTMCell {
            params,
            hidden_size,
            vocab_size,
        }
    }

    pub fn initial_state(&self) -> LSTMState {
        LSTMState::zeros(self.hidden_size)
    }

    pub fn zero_gradients(&self) -> ParameterSet {
        ParameterSet::zeros(self.hidden_size, self.vocab_size)
    }

    /// One time step forward.
    ///
    /// Returns the `(1, F)` probability row, the new state and the cache the
    /// matching backward step needs. Does not mutate the cell.
    pub fn forward(&self, symbol: usize, state: &LSTMState) -> Result<(Array2<f64>, LSTMState, LSTMCellCache)> {
        let p = &self.params;
        let x_one_hot = linear::one_hot(symbol, self.vocab_size)?;
        let input = linear::concat_columns(&state.h, &x_one_hot);

        let forget_gate = linear::forward(&input, &p.wf, &p.bf).mapv(sigmoid);
        let input_gate = linear::forward(&input, &p.wi, &p.bi).mapv(sigmoid);
        let output_gate = linear::forward(&input, &p.wo, &p.bo).mapv(sigmoid);
        let cell_gate = linear::forward(&input, &p.wc, &p.bc).mapv(tanh);

        let cy = &forget_gate * &state.c + &input_gate * &cell_gate;
        let tanh_cy = cy.mapv(tanh);
        let hy = &output_gate * &tanh_cy;

        let logits = linear::forward(&hy, &p.wy, &p.by);
        let probs = crate::utils::softmax(&logits);

        let cache = LSTMCellCache {
            input,
            hx: state.h.clone(),
            cx: state.c.clone(),
            forget_gate,
            input_gate,
            output_gate,
            cell_gate,
            tanh_cy,
        };

        Ok((probs, LSTMState { h: hy, c: cy }, cache))
    }

    /// One time step backward, fused with the softmax cross-entropy loss.
    ///
    /// `probs`, `state` and `cache` come from the forward step being reversed;
    /// `next` is the gradient returned by the backward call of the following
    /// time step (zeros for the last step of a minibatch).
    ///
    /// Returns (parameter_gradients, gradients for the previous time step)
    pub fn backward(
        &self,
        probs: &Array2<f64>,
        target: usize,
        state: &LSTMState,
        next: &StateGradients,
        cache: &LSTMCellCache,
    ) -> Result<(ParameterSet, StateGradients)> {
        let p = &self.params;

        let dy = cross_entropy_gradient(probs, target)?;

        let (head, mut dh) = linear::backward(&dy, &p.wy, &state.h);
        dh += &next.dh;

        let d_output = &dh * &cache.tanh_cy * cache.output_gate.mapv(dsigmoid);

        let dc = &dh * &cache.output_gate * cache.tanh_cy.mapv(dtanh) + &next.dc;

        let d_forget = &dc * &cache.cx * cache.forget_gate.mapv(dsigmoid);
        let d_input = &dc * &cache.cell_gate * cache.input_gate.mapv(dsigmoid);
        let d_cell = &dc * &cache.input_gate * cache.cell_gate.mapv(dtanh);

        let (forget, dx_forget) = linear::backward(&d_forget, &p.wf, &cache.input);
        let (input, dx_input) = linear::backward(&d_input, &p.wi, &cache.input);
        let (cell, dx_cell) = linear::backward(&d_cell, &p.wc, &cache.input);
        let (output, dx_output) = linear::backward(&d_output, &p.wo, &cache.input);

        // All four gates read the same X, so their input gradients add up
        let dx = dx_forget + dx_input + dx_cell + dx_output;

        let gradients = ParameterSet {
            wf: forget.weight,
            wi: input.weight,
            wc: cell.weight,
            wo: output.weight,
            wy: head.weight,
            bf: forget.bias,
            bi: input.bias,
            bc: cell.bias,
            bo: output.bias,
            by: head.bias,
        };

        let previous = StateGradients {
            dh: dx.slice(s![.., ..self.hidden_size]).to_owned(),
            dc: &cache.forget_gate * &dc,
        };

        Ok((gradients, previous))
    }

    /// Apply gradients using the provided optimizer
    pub fn update_parameters<O: Optimizer>(&mut self, gradients: &ParameterSet, optimizer: &mut O) {
        optimizer.begin_step();
        for ((name, param), (_, gradient)) in self.params.iter_mut().zip(gradients.iter()) {
            optimizer.update(name, param, gradient);
        }
    }
}
