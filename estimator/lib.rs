#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

//! Generic-loss bin parameter estimation for cyclic boosting.
//!
//! Given the bin assignment of one feature, the training targets, and the
//! combined prediction of every other feature, this crate fits one
//! correction parameter per bin by numerically minimizing a pluggable loss,
//! and attaches a closed-form uncertainty to each parameter. The cyclic fit
//! loop, binning, and smoothing live in the enclosing framework.

pub mod config;
pub mod contract;
pub mod diagnostics;
pub mod estimate;
pub mod global_scale;
pub mod grouping;
pub mod link;
pub mod minimize;
pub mod modes;
pub mod quantile;

#[cfg(test)]
mod test_fixtures;

pub use config::{ConfigError, EstimatorConfig, ModeKind};
pub use contract::{ContractError, LossContract};
pub use diagnostics::{Diagnostic, DiagnosticsSink, LogSink, RecordingSink, Severity};
pub use estimate::{
    BinEstimates, EstimationError, EstimationOptions, estimate_bin_parameters, optimize_bin,
};
pub use global_scale::{GlobalScale, GlobalScaleError, compute_global_scale};
pub use grouping::{BinGroup, FeatureBins, GroupingError, SampleBatch, group_by_bin};
pub use link::{LinkFunction, PARAMETER_EPSILON};
pub use minimize::{MinimizerConfig, MinimizerError, MinimizerMethod, Minimum, minimize_scalar};
pub use modes::{AdditiveQuantile, MultiplicativeQuantile, QuantileMode};
pub use quantile::{LossError, continuous_quantile_from_discrete, quantile_costs};
