//! # Global Scale Initialization
//!
//! The global scale is the link-space baseline before any per-feature factor
//! is applied: the link of a continuous approximation of the requested target
//! quantile. Its exact value is not critical for accuracy, since the bin
//! parameters compensate, but a baseline far from the typical target pushes
//! every feature's factors away from neutral and makes them harder to read.
//!
//! When the framework supplies a prior prediction column, the offset between
//! the global scale and the link of the weighted prior mean is stored so the
//! framework can individualize predictions around the prior.

use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::link::LinkFunction;
use crate::quantile::{LossError, continuous_quantile_from_discrete};
use ndarray::ArrayView1;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GlobalScaleError {
    #[error("Failed to compute the target quantile: {0}")]
    Quantile(#[from] LossError),

    #[error("The weights have to be initialized: {found} weights for {expected} targets.")]
    WeightsLengthMismatch { found: usize, expected: usize },

    #[error("The prior prediction column has {found} entries, but there are {expected} targets.")]
    PriorLengthMismatch { found: usize, expected: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlobalScale {
    pub global_scale_link: f64,
    /// `global_scale_link − link(weighted prior mean)` when a prior column was
    /// supplied. Falls back to `global_scale_link` itself when that mean is not
    /// finite in link space.
    pub prior_offset_link: Option<f64>,
}

pub fn compute_global_scale(
    link: LinkFunction,
    quantile: f64,
    y: ArrayView1<f64>,
    weights: ArrayView1<f64>,
    prior_prediction: Option<ArrayView1<f64>>,
    sink: &dyn DiagnosticsSink,
) -> Result<GlobalScale, GlobalScaleError> {
    if weights.len() != y.len() {
        return Err(GlobalScaleError::WeightsLengthMismatch {
            found: weights.len(),
            expected: y.len(),
        });
    }

    let global_scale_link = link.link(continuous_quantile_from_discrete(y, quantile)?);
    log::info!(
        "Global scale at quantile {quantile}: {global_scale_link:.6} in link space ({} targets)",
        y.len()
    );

    let prior = match prior_prediction {
        Some(prior) => prior,
        None => {
            return Ok(GlobalScale {
                global_scale_link,
                prior_offset_link: None,
            });
        }
    };
    if prior.len() != y.len() {
        return Err(GlobalScaleError::PriorLengthMismatch {
            found: prior.len(),
            expected: y.len(),
        });
    }

    let mut non_finite = 0usize;
    let mut weighted_sum = 0.0;
    let mut weight_sum = 0.0;
    for (&p, &w) in prior.iter().zip(weights.iter()) {
        if p.is_finite() {
            weighted_sum += p * w;
            weight_sum += w;
        } else {
            non_finite += 1;
        }
    }
    if non_finite > 0 {
        sink.report(Diagnostic::NonFinitePriorPredictions { count: non_finite });
    }

    let prior_mean = weighted_sum / weight_sum;
    let prior_mean_link = link.link(prior_mean);

    let prior_offset_link = if prior_mean_link.is_finite() {
        global_scale_link - prior_mean_link
    } else {
        sink.report(Diagnostic::NonFinitePriorMeanLink { mean: prior_mean });
        global_scale_link
    };

    Ok(GlobalScale {
        global_scale_link,
        prior_offset_link: Some(prior_offset_link),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingSink;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, array};

    #[test]
    fn global_scale_is_the_linked_quantile() {
        let y = array![1.0, 2.0, 3.0, 4.0];
        let w = Array1::ones(4);
        let sink = RecordingSink::new();

        let log_scale =
            compute_global_scale(LinkFunction::Log, 0.5, y.view(), w.view(), None, &sink).unwrap();
        assert_abs_diff_eq!(log_scale.global_scale_link, 2.5_f64.ln(), epsilon = 1e-12);
        assert_eq!(log_scale.prior_offset_link, None);

        let identity =
            compute_global_scale(LinkFunction::Identity, 0.5, y.view(), w.view(), None, &sink)
                .unwrap();
        assert_abs_diff_eq!(identity.global_scale_link, 2.5, epsilon = 1e-12);
        assert!(sink.records().is_empty());
    }

    #[test]
    fn prior_offset_uses_the_weighted_finite_mean() {
        let y = array![2.0, 2.0, 2.0, 2.0];
        let w = array![1.0, 3.0, 1.0, 5.0];
        let prior = array![1.0, 2.0, f64::NAN, 4.0];
        let sink = RecordingSink::new();

        let scale = compute_global_scale(
            LinkFunction::Identity,
            0.5,
            y.view(),
            w.view(),
            Some(prior.view()),
            &sink,
        )
        .unwrap();

        let mean = (1.0 + 6.0 + 20.0) / 9.0;
        assert_abs_diff_eq!(scale.prior_offset_link.unwrap(), 2.0 - mean, epsilon = 1e-12);
        assert_eq!(
            sink.records(),
            vec![Diagnostic::NonFinitePriorPredictions { count: 1 }]
        );
    }

    #[test]
    fn all_non_finite_prior_disables_individualization() {
        let y = array![1.0, 3.0, 5.0];
        let w = Array1::ones(3);
        let prior = array![f64::NAN, f64::INFINITY, f64::NEG_INFINITY];
        let sink = RecordingSink::new();

        let scale = compute_global_scale(
            LinkFunction::Log,
            0.5,
            y.view(),
            w.view(),
            Some(prior.view()),
            &sink,
        )
        .unwrap();

        assert_eq!(scale.prior_offset_link, Some(scale.global_scale_link));
        assert_eq!(
            sink.count_where(|d| matches!(d, Diagnostic::NonFinitePriorPredictions { count: 3 })),
            1
        );
        assert_eq!(
            sink.count_where(|d| matches!(d, Diagnostic::NonFinitePriorMeanLink { .. })),
            1
        );
    }

    #[test]
    fn non_positive_prior_mean_under_log_link_falls_back() {
        let y = array![1.0, 2.0];
        let w = Array1::ones(2);
        let prior = array![-1.0, -3.0];
        let sink = RecordingSink::new();

        let scale = compute_global_scale(
            LinkFunction::Log,
            0.5,
            y.view(),
            w.view(),
            Some(prior.view()),
            &sink,
        )
        .unwrap();
        assert_eq!(scale.prior_offset_link, Some(scale.global_scale_link));
        assert_eq!(sink.warnings().len(), 1);
    }

    #[test]
    fn mismatched_columns_are_rejected() {
        let y = array![1.0, 2.0];
        let sink = RecordingSink::new();
        assert!(matches!(
            compute_global_scale(LinkFunction::Log, 0.5, y.view(), array![1.0].view(), None, &sink),
            Err(GlobalScaleError::WeightsLengthMismatch { found: 1, expected: 2 })
        ));
        assert!(matches!(
            compute_global_scale(
                LinkFunction::Log,
                0.5,
                y.view(),
                array![1.0, 1.0].view(),
                Some(array![1.0].view()),
                &sink
            ),
            Err(GlobalScaleError::PriorLengthMismatch { .. })
        ));
        assert!(matches!(
            compute_global_scale(
                LinkFunction::Log,
                0.5,
                Array1::<f64>::zeros(0).view(),
                Array1::<f64>::zeros(0).view(),
                None,
                &sink
            ),
            Err(GlobalScaleError::Quantile(LossError::EmptyInput))
        ));
    }
}
