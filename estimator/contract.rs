use crate::link::LinkFunction;
use crate::quantile::LossError;
use ndarray::{Array1, ArrayView1, Zip};
use thiserror::Error;

/// Errors raised when a regression mode is configured or when the training
/// targets fall outside the mode's domain.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContractError {
    #[error(
        "The target y must be positive semi-definite and not NAN. y[~(y>=0)] = {values:?}"
    )]
    NegativeTargets { values: Vec<f64> },

    #[error("The target y must be real valued and not NAN. Offending values: {values:?}")]
    NonFiniteTargets { values: Vec<f64> },

    #[error("Quantile must lie in [0, 1], but was {0}.")]
    InvalidQuantile(f64),

    #[error("The neutral factor in link space must be finite, but was {0}.")]
    InvalidNeutralFactorLink(f64),
}

/// One regression mode of the generic-loss estimator.
///
/// A contract is an immutable value: the estimator borrows it for the whole
/// call and evaluates `model` once per sample, `costs` once per objective
/// evaluation, and `uncertainty` once per bin.
pub trait LossContract: Send + Sync {
    /// Combines a natural-scale bin parameter with the prediction of all other
    /// features for one sample.
    fn model(&self, param: f64, others_prediction: f64) -> f64;

    /// Aggregate cost of `prediction` against the observed targets.
    fn costs(
        &self,
        prediction: ArrayView1<f64>,
        y: ArrayView1<f64>,
        weights: ArrayView1<f64>,
    ) -> Result<f64, LossError>;

    /// Closed-form uncertainty of a bin parameter fitted on targets `y`.
    fn uncertainty(&self, y: ArrayView1<f64>) -> f64;

    fn link(&self) -> LinkFunction;

    /// The framework's "no effect" parameter in link space.
    fn neutral_factor_link(&self) -> f64;

    /// The natural-scale value used as the minimizer's starting point and for
    /// unobserved bins. Implementations compute it once at construction with
    /// [`neutral_factor_from_link`].
    fn neutral_factor(&self) -> f64;

    /// Validates the target domain before any optimization work is done.
    fn check_targets(&self, y: ArrayView1<f64>) -> Result<(), ContractError>;

    /// Cost of a single bin as a function of its parameter.
    fn objective(
        &self,
        param: f64,
        y: ArrayView1<f64>,
        others_prediction: ArrayView1<f64>,
        weights: ArrayView1<f64>,
    ) -> Result<f64, LossError> {
        let prediction: Array1<f64> =
            Zip::from(&others_prediction).map_collect(|&others| self.model(param, others));
        self.costs(prediction.view(), y, weights)
    }

    /// In-sample loss after a full feature cycle, used by the framework as a
    /// stopping criterion.
    fn loss(
        &self,
        prediction: ArrayView1<f64>,
        y: ArrayView1<f64>,
        weights: ArrayView1<f64>,
    ) -> Result<f64, LossError> {
        self.costs(prediction, y, weights)
    }
}

/// `0` when the neutral factor is exactly zero in link space, otherwise the
/// natural-scale value of `neutral_factor_link`.
pub fn neutral_factor_from_link(link: LinkFunction, neutral_factor_link: f64) -> f64 {
    if neutral_factor_link == 0.0 {
        0.0
    } else {
        link.unlink(neutral_factor_link)
    }
}
