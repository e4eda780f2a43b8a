use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Smallest magnitude a natural-scale bin parameter may take before it is
/// transformed to link space.
pub const PARAMETER_EPSILON: f64 = 1e-5;

/// Defines the link function, connecting a natural-scale bin parameter to the
/// unconstrained space in which the framework smooths and aggregates factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkFunction {
    /// The log link, for strictly positive multiplicative factors.
    /// Maps (0, +inf) to the real line (-inf, +inf).
    Log,
    /// The identity link, for additive corrections on the real line.
    Identity,
}

impl LinkFunction {
    /// Natural scale to link space.
    pub fn link(self, value: f64) -> f64 {
        match self {
            LinkFunction::Log => value.ln(),
            LinkFunction::Identity => value,
        }
    }

    /// Link space back to natural scale.
    pub fn unlink(self, value: f64) -> f64 {
        match self {
            LinkFunction::Log => value.exp(),
            LinkFunction::Identity => value,
        }
    }

    pub fn link_array(self, values: ArrayView1<f64>) -> Array1<f64> {
        values.mapv(|v| self.link(v))
    }

    pub fn unlink_array(self, values: ArrayView1<f64>) -> Array1<f64> {
        values.mapv(|v| self.unlink(v))
    }

    /// Keeps a natural-scale parameter at least `epsilon` away from zero.
    ///
    /// The identity link keeps the sign of the parameter. The log link is only
    /// defined for positive values: magnitudes below `epsilon` (including
    /// negative round-off from the minimizer) land on `+epsilon`, while a
    /// larger negative value is left as is and links to NaN.
    pub fn clamp_natural(self, param: f64, epsilon: f64) -> f64 {
        match self {
            LinkFunction::Log => {
                if param.abs() < epsilon {
                    epsilon
                } else {
                    param
                }
            }
            LinkFunction::Identity => clamp_away_from_zero(param, epsilon),
        }
    }
}

/// Sign-preserving clamp: values with `|param| < epsilon` become `±epsilon`.
/// Both signed zeros map to `+epsilon`. NaN passes through unchanged.
pub fn clamp_away_from_zero(param: f64, epsilon: f64) -> f64 {
    if param.abs() >= epsilon || param.is_nan() {
        param
    } else if param == 0.0 {
        epsilon
    } else {
        epsilon.copysign(param)
    }
}
