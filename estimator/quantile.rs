//! # Quantile Loss Kernel
//!
//! The pinball loss shared by the multiplicative and additive quantile modes,
//! and the continuous approximation of an empirical quantile used to seed the
//! global scale.
//!
//! A prediction exactly equal to its target is routed to the `q` branch, so it
//! contributes zero regardless of the quantile. Per-sample contributions that
//! are not finite are dropped from both the weighted error and the weight
//! normalization; they behave like zero-weight samples.

use ndarray::ArrayView1;
use thiserror::Error;

/// Errors raised while evaluating a loss over a batch of observations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LossError {
    #[error("Loss cannot be computed on empty data.")]
    EmptyInput,

    #[error(
        "Loss inputs have inconsistent lengths: {predictions} predictions, {targets} targets, {weights} weights."
    )]
    LengthMismatch {
        predictions: usize,
        targets: usize,
        weights: usize,
    },

    #[error(
        "None of the {observations} observations produced a finite weighted loss contribution."
    )]
    NoFiniteContributions { observations: usize },

    #[error("Quantile must lie in [0, 1], but was {0}.")]
    InvalidQuantile(f64),
}

/// Weighted pinball loss of `prediction` against `y` for quantile `quantile`.
///
/// ```text
/// Σ w·[(y < p)·(1 − q)·(p − y) + (y ≥ p)·q·(y − p)] / Σ w
/// ```
pub fn quantile_costs(
    prediction: ArrayView1<f64>,
    y: ArrayView1<f64>,
    weights: ArrayView1<f64>,
    quantile: f64,
) -> Result<f64, LossError> {
    if y.is_empty() {
        return Err(LossError::EmptyInput);
    }
    if prediction.len() != y.len() || weights.len() != y.len() {
        return Err(LossError::LengthMismatch {
            predictions: prediction.len(),
            targets: y.len(),
            weights: weights.len(),
        });
    }

    let mut sum_weighted_error = 0.0;
    let mut sum_weights = 0.0;
    for ((&p, &target), &w) in prediction.iter().zip(y.iter()).zip(weights.iter()) {
        let error = if target < p {
            (1.0 - quantile) * (p - target)
        } else {
            quantile * (target - p)
        };
        let contribution = error * w;
        if contribution.is_finite() && w.is_finite() {
            sum_weighted_error += contribution;
            sum_weights += w;
        }
    }

    if sum_weights <= 0.0 {
        return Err(LossError::NoFiniteContributions {
            observations: y.len(),
        });
    }
    Ok(sum_weighted_error / sum_weights)
}

/// Continuous approximation of the `quantile` of potentially discrete values.
///
/// Each support point `v` is treated as spreading its mass uniformly over
/// `[v − ½, v + ½]`. With `y_q` the inverted-CDF order statistic at `quantile`
/// (the smallest value whose empirical CDF reaches it), the result is
///
/// `y_q + (quantile · n − n_below) / n_tied − ½`
///
/// where `n_below` counts values strictly below `y_q` and `n_tied` those equal
/// to it. The position inside a tie therefore moves with the quantile rather
/// than snapping to the support point.
pub fn continuous_quantile_from_discrete(
    y: ArrayView1<f64>,
    quantile: f64,
) -> Result<f64, LossError> {
    if !(0.0..=1.0).contains(&quantile) {
        return Err(LossError::InvalidQuantile(quantile));
    }
    if y.is_empty() {
        return Err(LossError::EmptyInput);
    }

    let mut sorted: Vec<f64> = y.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len();
    let position = quantile * n as f64;
    let rank = (position.ceil() as usize).saturating_sub(1).min(n - 1);
    let y_q = sorted[rank];
    let n_below = sorted.partition_point(|&v| v < y_q);
    let n_tied = sorted.partition_point(|&v| v <= y_q) - n_below;

    Ok(y_q + (position - n_below as f64) / n_tied as f64 - 0.5)
}
