//! # Per-Bin Parameter Estimation
//!
//! Fits one parameter per bin of a feature by minimizing the contract's
//! objective over the samples of that bin, then reconciles the fitted bins
//! with the number of bins the framework declared for the feature:
//!
//! 1.  **Domain check:** the contract validates all targets before any work.
//! 2.  **Grouping:** samples are split into contiguous bin groups.
//! 3.  **Minimization:** every group is minimized independently, starting at
//!     the contract's neutral factor. Groups may be processed in parallel; the
//!     result does not depend on it.
//! 4.  **Unseen bin:** if exactly one declared bin has no samples, it receives
//!     the neutral factor with zero uncertainty. Any larger gap is an error.
//! 5.  **Link space:** parameters are kept away from zero and linked. A
//!     parameter the link cannot represent is reported with its bin.

use crate::contract::{ContractError, LossContract};
use crate::diagnostics::{Diagnostic, DiagnosticsSink};
use crate::grouping::{BinGroup, FeatureBins, GroupingError, SampleBatch, group_by_bin};
use crate::link::{LinkFunction, PARAMETER_EPSILON};
use crate::minimize::{MinimizerConfig, MinimizerError, minimize_scalar};
use ndarray::Array1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EstimationError {
    #[error("Target validation failed: {0}")]
    Contract(#[from] ContractError),

    #[error("Bin grouping failed: {0}")]
    Grouping(#[from] GroupingError),

    #[error("Optimization of bin {bin} failed: {source}")]
    BinOptimization {
        bin: usize,
        #[source]
        source: MinimizerError,
    },

    #[error(
        "Observed {observed} distinct bins, but the feature declares {declared}. At most one declared bin may be unobserved."
    )]
    BinCountMismatch { observed: usize, declared: usize },

    #[error("Bin {bin} has parameter {param}, which has no finite link-space value.")]
    InvalidParameter { bin: usize, param: f64 },
}

/// Knobs of one estimator call that are not part of the loss contract.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimationOptions {
    pub minimizer: MinimizerConfig,
    /// Minimize bins on the rayon thread pool.
    pub parallel: bool,
}

/// Parameters and uncertainties of every declared bin, indexed by bin code.
#[derive(Debug, Clone, PartialEq)]
pub struct BinEstimates {
    pub parameters_link: Array1<f64>,
    pub uncertainties: Array1<f64>,
}

impl BinEstimates {
    pub fn len(&self) -> usize {
        self.parameters_link.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters_link.is_empty()
    }

    pub fn natural_parameters(&self, link: LinkFunction) -> Array1<f64> {
        link.unlink_array(self.parameters_link.view())
    }
}

/// Minimizes the objective of a single bin and returns its natural-scale
/// parameter (before clamping) and its uncertainty.
pub fn optimize_bin<C: LossContract + ?Sized>(
    contract: &C,
    group: &BinGroup,
    minimizer: &MinimizerConfig,
) -> Result<(f64, f64), MinimizerError> {
    let objective = |param: f64| {
        contract.objective(
            param,
            group.target.view(),
            group.others_prediction.view(),
            group.weights.view(),
        )
    };
    let minimum = minimize_scalar(objective, contract.neutral_factor(), minimizer)?;
    log::debug!(
        "Bin {}: {} samples, parameter {:.6} (cost {:.6e}, {} iterations)",
        group.bin,
        group.len(),
        minimum.param,
        minimum.cost,
        minimum.iterations
    );
    Ok((minimum.param, contract.uncertainty(group.target.view())))
}

/// Estimates link-space parameters and uncertainties for every bin of
/// `feature`.
pub fn estimate_bin_parameters<C: LossContract + ?Sized>(
    contract: &C,
    feature: &FeatureBins<'_>,
    batch: &SampleBatch<'_>,
    options: &EstimationOptions,
    sink: &dyn DiagnosticsSink,
) -> Result<BinEstimates, EstimationError> {
    contract.check_targets(batch.target)?;

    let groups = group_by_bin(feature, batch, sink)?;
    log::info!(
        "Estimating {} bins ({} observed) from {} samples",
        feature.n_bins,
        groups.len(),
        batch.len()
    );

    let fit_group = |group: &BinGroup| {
        optimize_bin(contract, group, &options.minimizer).map_err(|source| {
            EstimationError::BinOptimization {
                bin: group.bin,
                source,
            }
        })
    };
    let fitted: Vec<(f64, f64)> = if options.parallel {
        groups.par_iter().map(fit_group).collect::<Result<_, _>>()?
    } else {
        groups.iter().map(fit_group).collect::<Result<_, _>>()?
    };

    let observed = groups.len();
    let declared = feature.n_bins;
    let mut parameters: Vec<f64> = fitted.iter().map(|&(p, _)| p).collect();
    let mut uncertainties: Vec<f64> = fitted.iter().map(|&(_, u)| u).collect();

    if observed + 1 == declared {
        // Codes are distinct and in range, so the first gap is the only one.
        let missing = groups
            .iter()
            .enumerate()
            .find(|(position, group)| group.bin != *position)
            .map_or(observed, |(position, _)| position);
        parameters.insert(missing, contract.neutral_factor());
        uncertainties.insert(missing, 0.0);
        sink.report(Diagnostic::FallbackBinInserted { bin: missing });
    } else if observed != declared {
        return Err(EstimationError::BinCountMismatch { observed, declared });
    }

    let link = contract.link();
    let parameters_link = parameters
        .into_iter()
        .enumerate()
        .map(|(bin, param)| {
            let linked = link.link(link.clamp_natural(param, PARAMETER_EPSILON));
            if linked.is_finite() {
                Ok(linked)
            } else {
                Err(EstimationError::InvalidParameter { bin, param })
            }
        })
        .collect::<Result<Array1<f64>, _>>()?;

    Ok(BinEstimates {
        parameters_link,
        uncertainties: Array1::from_vec(uncertainties),
    })
}
