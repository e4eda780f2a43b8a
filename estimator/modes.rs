//! # Quantile Regression Modes
//!
//! The two shipped loss contracts. Both minimize the pinball loss of the
//! requested quantile in each bin; they differ in how a bin parameter combines
//! with the prediction of the other features and in the link used to store it.
//!
//! - Multiplicative: `param · others`, log link. Targets must be non-negative.
//!   The bin uncertainty moment-matches a Gamma posterior with a log-normal.
//! - Additive: `param + others`, identity link. Targets must be finite. The bin
//!   uncertainty is a fixed small constant.

use crate::contract::{ContractError, LossContract, neutral_factor_from_link};
use crate::diagnostics::DiagnosticsSink;
use crate::global_scale::{GlobalScale, GlobalScaleError, compute_global_scale};
use crate::link::LinkFunction;
use crate::quantile::{LossError, quantile_costs};
use ndarray::ArrayView1;

const ADDITIVE_UNCERTAINTY: f64 = 0.001;

fn validate_settings(quantile: f64, neutral_factor_link: f64) -> Result<(), ContractError> {
    if !(0.0..=1.0).contains(&quantile) {
        return Err(ContractError::InvalidQuantile(quantile));
    }
    if !neutral_factor_link.is_finite() {
        return Err(ContractError::InvalidNeutralFactorLink(neutral_factor_link));
    }
    Ok(())
}

/// Multiplicative quantile regression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MultiplicativeQuantile {
    quantile: f64,
    neutral_factor_link: f64,
    neutral_factor: f64,
}

impl MultiplicativeQuantile {
    pub fn new(quantile: f64) -> Result<Self, ContractError> {
        Self::with_neutral_factor_link(quantile, 0.0)
    }

    pub fn with_neutral_factor_link(
        quantile: f64,
        neutral_factor_link: f64,
    ) -> Result<Self, ContractError> {
        validate_settings(quantile, neutral_factor_link)?;
        Ok(Self {
            quantile,
            neutral_factor_link,
            neutral_factor: neutral_factor_from_link(LinkFunction::Log, neutral_factor_link),
        })
    }

    pub fn quantile(&self) -> f64 {
        self.quantile
    }

    /// Global scale at this mode's quantile, in log space.
    pub fn global_scale(
        &self,
        y: ArrayView1<f64>,
        weights: ArrayView1<f64>,
        prior_prediction: Option<ArrayView1<f64>>,
        sink: &dyn DiagnosticsSink,
    ) -> Result<GlobalScale, GlobalScaleError> {
        compute_global_scale(LinkFunction::Log, self.quantile, y, weights, prior_prediction, sink)
    }
}

impl LossContract for MultiplicativeQuantile {
    fn model(&self, param: f64, others_prediction: f64) -> f64 {
        param * others_prediction
    }

    fn costs(
        &self,
        prediction: ArrayView1<f64>,
        y: ArrayView1<f64>,
        weights: ArrayView1<f64>,
    ) -> Result<f64, LossError> {
        quantile_costs(prediction, y, weights, self.quantile)
    }

    fn uncertainty(&self, y: ArrayView1<f64>) -> f64 {
        let total = y.sum();
        ((1.0 + 2.0 + total).ln() - (2.0 + total).ln()).sqrt()
    }

    fn link(&self) -> LinkFunction {
        LinkFunction::Log
    }

    fn neutral_factor_link(&self) -> f64 {
        self.neutral_factor_link
    }

    fn neutral_factor(&self) -> f64 {
        self.neutral_factor
    }

    fn check_targets(&self, y: ArrayView1<f64>) -> Result<(), ContractError> {
        // `!(v >= 0.0)` also catches NaN.
        let offending: Vec<f64> = y.iter().copied().filter(|v| !(*v >= 0.0)).collect();
        if offending.is_empty() {
            Ok(())
        } else {
            Err(ContractError::NegativeTargets { values: offending })
        }
    }
}

/// Additive quantile regression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdditiveQuantile {
    quantile: f64,
    neutral_factor_link: f64,
    neutral_factor: f64,
}

impl AdditiveQuantile {
    pub fn new(quantile: f64) -> Result<Self, ContractError> {
        Self::with_neutral_factor_link(quantile, 0.0)
    }

    pub fn with_neutral_factor_link(
        quantile: f64,
        neutral_factor_link: f64,
    ) -> Result<Self, ContractError> {
        validate_settings(quantile, neutral_factor_link)?;
        Ok(Self {
            quantile,
            neutral_factor_link,
            neutral_factor: neutral_factor_from_link(LinkFunction::Identity, neutral_factor_link),
        })
    }

    pub fn quantile(&self) -> f64 {
        self.quantile
    }

    pub fn global_scale(
        &self,
        y: ArrayView1<f64>,
        weights: ArrayView1<f64>,
        prior_prediction: Option<ArrayView1<f64>>,
        sink: &dyn DiagnosticsSink,
    ) -> Result<GlobalScale, GlobalScaleError> {
        compute_global_scale(
            LinkFunction::Identity,
            self.quantile,
            y,
            weights,
            prior_prediction,
            sink,
        )
    }
}

impl LossContract for AdditiveQuantile {
    fn model(&self, param: f64, others_prediction: f64) -> f64 {
        param + others_prediction
    }

    fn costs(
        &self,
        prediction: ArrayView1<f64>,
        y: ArrayView1<f64>,
        weights: ArrayView1<f64>,
    ) -> Result<f64, LossError> {
        quantile_costs(prediction, y, weights, self.quantile)
    }

    fn uncertainty(&self, _: ArrayView1<f64>) -> f64 {
        ADDITIVE_UNCERTAINTY
    }

    fn link(&self) -> LinkFunction {
        LinkFunction::Identity
    }

    fn neutral_factor_link(&self) -> f64 {
        self.neutral_factor_link
    }

    fn neutral_factor(&self) -> f64 {
        self.neutral_factor
    }

    fn check_targets(&self, y: ArrayView1<f64>) -> Result<(), ContractError> {
        let offending: Vec<f64> = y.iter().copied().filter(|v| !v.is_finite()).collect();
        if offending.is_empty() {
            Ok(())
        } else {
            Err(ContractError::NonFiniteTargets { values: offending })
        }
    }
}

/// A regression mode chosen at runtime, e.g. from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuantileMode {
    Multiplicative(MultiplicativeQuantile),
    Additive(AdditiveQuantile),
}

impl QuantileMode {
    pub fn quantile(&self) -> f64 {
        match self {
            QuantileMode::Multiplicative(m) => m.quantile(),
            QuantileMode::Additive(m) => m.quantile(),
        }
    }

    pub fn global_scale(
        &self,
        y: ArrayView1<f64>,
        weights: ArrayView1<f64>,
        prior_prediction: Option<ArrayView1<f64>>,
        sink: &dyn DiagnosticsSink,
    ) -> Result<GlobalScale, GlobalScaleError> {
        match self {
            QuantileMode::Multiplicative(m) => m.global_scale(y, weights, prior_prediction, sink),
            QuantileMode::Additive(m) => m.global_scale(y, weights, prior_prediction, sink),
        }
    }

    fn contract(&self) -> &dyn LossContract {
        match self {
            QuantileMode::Multiplicative(m) => m,
            QuantileMode::Additive(m) => m,
        }
    }
}

impl LossContract for QuantileMode {
    fn model(&self, param: f64, others_prediction: f64) -> f64 {
        match self {
            QuantileMode::Multiplicative(m) => m.model(param, others_prediction),
            QuantileMode::Additive(m) => m.model(param, others_prediction),
        }
    }

    fn costs(
        &self,
        prediction: ArrayView1<f64>,
        y: ArrayView1<f64>,
        weights: ArrayView1<f64>,
    ) -> Result<f64, LossError> {
        self.contract().costs(prediction, y, weights)
    }

    fn uncertainty(&self, y: ArrayView1<f64>) -> f64 {
        self.contract().uncertainty(y)
    }

    fn link(&self) -> LinkFunction {
        self.contract().link()
    }

    fn neutral_factor_link(&self) -> f64 {
        self.contract().neutral_factor_link()
    }

    fn neutral_factor(&self) -> f64 {
        self.contract().neutral_factor()
    }

    fn check_targets(&self, y: ArrayView1<f64>) -> Result<(), ContractError> {
        self.contract().check_targets(y)
    }
}
