use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Optimizer trait for parameter updates during training
///
/// A training step calls `begin_step` once, then `update` once per named
/// parameter.
pub trait Optimizer {
    fn begin_step(&mut self) {}
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>);
    fn learning_rate(&self) -> f64;
    fn set_learning_rate(&mut self, learning_rate: f64);
    fn reset(&mut self);
}

/// Stochastic Gradient Descent: θ = θ - η∇θ
pub struct SGD {
    learning_rate: f64,
}

impl SGD {
    pub fn new(learning_rate: f64) -> Self {
        SGD { learning_rate }
    }
}

impl Optimizer for SGD {
    fn update(&mut self, _param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        param.scaled_add(-self.learning_rate, gradient);
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    fn reset(&mut self) {
        // SGD has no state to reset
    }
}

/// Adam optimizer with adaptive learning rates
///
/// Implements: m_t = β₁m_{t-1} + (1-β₁)g_t
///             v_t = β₂v_{t-1} + (1-β₂)g_t²
///             θ_t = θ_{t-1} - η * m̂_t / (√v̂_t + ε)
/// where m̂_t and v̂_t are bias-corrected with the 1-based step counter `t`,
/// which advances once per training step, not once per parameter.
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    t: i32,
    m: HashMap<String, Array2<f64>>, // first moment estimates
    v: HashMap<String, Array2<f64>>, // second moment estimates
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Adam::with_params(learning_rate, 0.9, 0.999, 1e-7)
    }

    pub fn with_params(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: HashMap::new(),
            v: HashMap::new(),
        }
    }

    pub fn step_count(&self) -> i32 {
        self.t
    }

    pub fn first_moment(&self, param_id: &str) -> Option<&Array2<f64>> {
        self.m.get(param_id)
    }

    pub fn second_moment(&self, param_id: &str) -> Option<&Array2<f64>> {
        self.v.get(param_id)
    }
}

impl Optimizer for Adam {
    fn begin_step(&mut self) {
        self.t += 1;
    }

    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        // A caller that skipped begin_step still gets a valid bias correction
        let t = self.t.max(1);

        let m_t = self
            .m
            .entry(param_id.to_string())
            .or_insert_with(|| Array2::zeros(param.raw_dim()));
        *m_t = self.beta1 * &*m_t + (1.0 - self.beta1) * gradient;
        let m_hat = &*m_t / (1.0 - self.beta1.powi(t));

        let v_t = self
            .v
            .entry(param_id.to_string())
            .or_insert_with(|| Array2::zeros(param.raw_dim()));
        *v_t = self.beta2 * &*v_t + (1.0 - self.beta2) * gradient * gradient;
        let v_hat = &*v_t / (1.0 - self.beta2.powi(t));

        let update = self.learning_rate * m_hat / (v_hat.mapv(f64::sqrt) + self.epsilon);
        *param -= &update;
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    fn reset(&mut self) {
        self.t = 0;
        self.m.clear();
        self.v.clear();
    }
}

/// Which update rule a training run uses
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

/// Either optimizer behind one concrete type, chosen at runtime from configuration
pub enum AnyOptimizer {
    Adam(Adam),
    Sgd(SGD),
}

impl AnyOptimizer {
    pub fn new(kind: OptimizerKind, learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        match kind {
            OptimizerKind::Adam => AnyOptimizer::Adam(Adam::with_params(learning_rate, beta1, beta2, epsilon)),
            OptimizerKind::Sgd => AnyOptimizer::Sgd(SGD::new(learning_rate)),
        }
    }
}

impl Optimizer for AnyOptimizer {
    fn begin_step(&mut self) {
        match self {
            AnyOptimizer::Adam(adam) => adam.begin_step(),
            AnyOptimizer::Sgd(sgd) => sgd.begin_step(),
        }
    }

    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        match self {
            AnyOptimizer::Adam(adam) => adam.update(param_id, param, gradient),
            AnyOptimizer::Sgd(sgd) => sgd.update(param_id, param, gradient),
        }
    }

    fn learning_rate(&self) -> f64 {
        match self {
            AnyOptimizer::Adam(adam) => adam.learning_rate(),
            AnyOptimizer::Sgd(sgd) => sgd.learning_rate(),
        }
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        match self {
            AnyOptimizer::Adam(adam) => adam.set_learning_rate(learning_rate),
            AnyOptimizer::Sgd(sgd) => sgd.set_learning_rate(learning_rate),
        }
    }

    fn reset(&mut self) {
        match self {
            AnyOptimizer::Adam(adam) => adam.reset(),
            AnyOptimizer::Sgd(sgd) => sgd.reset(),
        }
    }
}
