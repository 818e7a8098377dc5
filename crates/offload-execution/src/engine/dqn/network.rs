use std::cmp::Ordering;

use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{ExecutionError, ExecutionResult};

const WEIGHT_STDDEV: f64 = 0.3;
const BIAS_INIT: f64 = 0.1;

/// The regression target of one sample in a training batch.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    pub state: &'a [f64],
    pub action: usize,
    pub value: f64,
}

/// A fully connected network with one ReLU hidden layer
/// that estimates the value of each action in a state.
#[derive(Debug, Clone, PartialEq)]
pub struct QNetwork {
    n_features: usize,
    n_hidden: usize,
    n_actions: usize,
    /// `n_hidden` rows of `n_features` weights
    hidden_weights: Vec<f64>,
    hidden_bias: Vec<f64>,
    /// `n_actions` rows of `n_hidden` weights
    output_weights: Vec<f64>,
    output_bias: Vec<f64>,
}

impl QNetwork {
    pub fn new(
        n_features: usize,
        n_hidden: usize,
        n_actions: usize,
        rng: &mut impl Rng,
    ) -> ExecutionResult<Self> {
        if n_features == 0 || n_hidden == 0 || n_actions == 0 {
            return Err(ExecutionError::invalid(format!(
                "invalid network shape: {n_features} features, {n_hidden} hidden units, {n_actions} actions"
            )));
        }
        let normal = Normal::new(0.0, WEIGHT_STDDEV)
            .map_err(|e| ExecutionError::internal(format!("invalid weight distribution: {e}")))?;
        let hidden_weights = (0..n_hidden * n_features)
            .map(|_| normal.sample(rng))
            .collect();
        let output_weights = (0..n_actions * n_hidden)
            .map(|_| normal.sample(rng))
            .collect();
        Ok(Self {
            n_features,
            n_hidden,
            n_actions,
            hidden_weights,
            hidden_bias: vec![BIAS_INIT; n_hidden],
            output_weights,
            output_bias: vec![BIAS_INIT; n_actions],
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_actions(&self) -> usize {
        self.n_actions
    }

    pub fn forward(&self, state: &[f64]) -> ExecutionResult<Vec<f64>> {
        self.check_state(state)?;
        let (_, output) = self.activations(state);
        Ok(output)
    }

    /// Runs one gradient descent step on the squared error of the batch
    /// and returns the mean squared error before the update.
    /// The error of each sample is clipped to `[-1, 1]` when computing gradients.
    pub fn fit(&mut self, targets: &[Target<'_>], learning_rate: f64) -> ExecutionResult<f64> {
        if targets.is_empty() {
            return Ok(0.0);
        }
        let mut hidden_weights_grad = vec![0.0; self.hidden_weights.len()];
        let mut hidden_bias_grad = vec![0.0; self.hidden_bias.len()];
        let mut output_weights_grad = vec![0.0; self.output_weights.len()];
        let mut output_bias_grad = vec![0.0; self.output_bias.len()];
        let mut loss_sum = 0.0;

        for target in targets {
            self.check_state(target.state)?;
            if target.action >= self.n_actions {
                return Err(ExecutionError::invalid(format!(
                    "action {} is out of range for {} actions",
                    target.action, self.n_actions
                )));
            }
            let (hidden, output) = self.activations(target.state);
            let error = output[target.action] - target.value;
            loss_sum += error * error;
            let error = error.clamp(-1.0, 1.0);

            let row = target.action * self.n_hidden;
            output_bias_grad[target.action] += error;
            for (j, h) in hidden.iter().enumerate() {
                output_weights_grad[row + j] += error * h;
                if *h > 0.0 {
                    let delta = error * self.output_weights[row + j];
                    hidden_bias_grad[j] += delta;
                    for (i, x) in target.state.iter().enumerate() {
                        hidden_weights_grad[j * self.n_features + i] += delta * x;
                    }
                }
            }
        }

        let n = targets.len() as f64;
        let scale = learning_rate * 2.0 / n;
        apply(&mut self.hidden_weights, &hidden_weights_grad, scale);
        apply(&mut self.hidden_bias, &hidden_bias_grad, scale);
        apply(&mut self.output_weights, &output_weights_grad, scale);
        apply(&mut self.output_bias, &output_bias_grad, scale);
        Ok(loss_sum / n)
    }

    fn check_state(&self, state: &[f64]) -> ExecutionResult<()> {
        if state.len() != self.n_features {
            return Err(ExecutionError::invalid(format!(
                "expected {} features, got {}",
                self.n_features,
                state.len()
            )));
        }
        Ok(())
    }

    fn activations(&self, state: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let hidden = self
            .hidden_weights
            .chunks(self.n_features)
            .zip(self.hidden_bias.iter())
            .map(|(row, b)| (dot(row, state) + b).max(0.0))
            .collect::<Vec<_>>();
        let output = self
            .output_weights
            .chunks(self.n_hidden)
            .zip(self.output_bias.iter())
            .map(|(row, b)| dot(row, &hidden) + b)
            .collect();
        (hidden, output)
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn apply(params: &mut [f64], grad: &[f64], scale: f64) {
    for (p, g) in params.iter_mut().zip(grad.iter()) {
        *p -= scale * g;
    }
}

/// The index of the largest value, preferring the first on ties.
/// NaN values are never selected.
pub fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, v)| match best {
            Some((_, b)) if b.partial_cmp(v) != Some(Ordering::Less) => best,
            _ => Some((i, *v)),
        })
        .map(|(i, _)| i)
}
