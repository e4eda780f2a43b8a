//! # Scalar Minimization
//!
//! One-dimensional unconstrained minimization of a bin objective. The default
//! method is Nelder-Mead (via `argmin`), which needs no derivatives and copes
//! with the kinks of the pinball loss. The BFGS path uses the `wolfe_bfgs`
//! line-search implementation with a central finite-difference gradient.
//!
//! A single simplex run can stop at a point that is not a minimum: two vertices
//! on either side of a kink may have equal cost, and argmin then reports
//! convergence. The search is therefore restarted from the best point found so
//! far, with a shorter initial edge whenever a restart brings no improvement.
//! It ends once a restart with an edge no longer than the parameter tolerance
//! leaves the cost unchanged. Both tolerances are relative:
//!
//! - cost: `tolerance · (1 + |f|)`, but never finer than the cost change caused
//!   by a move of one parameter tolerance, so large-magnitude parameters do not
//!   chase rounding noise;
//! - parameter: `param_tolerance · (1 + |x|)`.
//!
//! Every call builds its own solver and simplex, so concurrent calls never
//! share state. A search that exhausts its iteration budget is reported as an
//! error together with the best point it reached; the starting value is never
//! returned silently.

use crate::quantile::LossError;
use argmin::core::{
    CostFunction, Error as ArgminError, Executor, State, TerminationReason, TerminationStatus,
};
use argmin::solver::neldermead::NelderMead;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use thiserror::Error;
use wolfe_bfgs::{Bfgs, BfgsSolution};

/// Iteration cap of one simplex run between restarts.
const RESTART_ITERATIONS: u64 = 200;

/// Factor applied to the initial edge after a restart without improvement.
const STEP_SHRINK: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MinimizerMethod {
    NelderMead,
    Bfgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimizerConfig {
    pub method: MinimizerMethod,
    /// Total iteration budget, shared by all restarts.
    pub max_iterations: u64,
    /// Nelder-Mead: relative cost tolerance. BFGS: gradient-norm tolerance.
    pub tolerance: f64,
    /// Nelder-Mead: relative parameter tolerance.
    pub param_tolerance: f64,
}

impl Default for MinimizerConfig {
    fn default() -> Self {
        Self {
            method: MinimizerMethod::NelderMead,
            max_iterations: 1000,
            tolerance: 1e-10,
            param_tolerance: 1e-10,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MinimizerError {
    #[error(
        "The minimizer did not converge within {iterations} iterations (best parameter {best_param}, cost {best_cost:.6e})."
    )]
    NotConverged {
        iterations: u64,
        best_param: f64,
        best_cost: f64,
    },

    #[error("The objective could not be evaluated: {0}")]
    Objective(#[from] LossError),

    #[error("The minimizer backend failed: {0}")]
    Backend(String),
}

/// Result of a converged minimization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Minimum {
    pub param: f64,
    pub cost: f64,
    pub iterations: u64,
}

/// Minimizes `objective` starting from `x0`.
pub fn minimize_scalar<F>(
    objective: F,
    x0: f64,
    config: &MinimizerConfig,
) -> Result<Minimum, MinimizerError>
where
    F: Fn(f64) -> Result<f64, LossError>,
{
    match config.method {
        MinimizerMethod::NelderMead => nelder_mead(objective, x0, config),
        MinimizerMethod::Bfgs => bfgs(objective, x0, config),
    }
}

/// Initial simplex edge, following the usual 5% rule with a fixed step at zero.
fn initial_step(x0: f64) -> f64 {
    if x0 != 0.0 { 0.05 * x0 } else { 0.00025 }
}

/// Adapts a scalar objective to argmin's vector-valued `CostFunction`.
struct ScalarProblem<F> {
    objective: F,
}

impl<F> CostFunction for ScalarProblem<F>
where
    F: Fn(f64) -> Result<f64, LossError>,
{
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, ArgminError> {
        Ok((self.objective)(param[0])?)
    }
}

/// Outcome of one simplex run.
struct SimplexRun {
    param: f64,
    cost: f64,
    iterations: u64,
}

fn simplex_run<F>(
    objective: &F,
    x0: f64,
    step: f64,
    cost_tolerance: f64,
    max_iterations: u64,
) -> Result<SimplexRun, MinimizerError>
where
    F: Fn(f64) -> Result<f64, LossError>,
{
    let simplex = vec![vec![x0], vec![x0 + step]];
    let solver = NelderMead::new(simplex)
        .with_sd_tolerance(cost_tolerance)
        .map_err(|e| MinimizerError::Backend(e.to_string()))?;

    let result = Executor::new(ScalarProblem { objective }, solver)
        .configure(|state| state.max_iters(max_iterations))
        .run()
        .map_err(|e| match e.downcast_ref::<LossError>() {
            Some(loss) => MinimizerError::Objective(loss.clone()),
            None => MinimizerError::Backend(e.to_string()),
        })?;

    let state = result.state();
    let param = match state.get_best_param() {
        Some(p) => p[0],
        None => {
            return Err(MinimizerError::Backend(
                "Nelder-Mead finished without a best parameter".to_string(),
            ));
        }
    };

    match state.get_termination_status() {
        TerminationStatus::Terminated(
            TerminationReason::SolverConverged | TerminationReason::MaxItersReached,
        ) => Ok(SimplexRun {
            param,
            cost: state.get_best_cost(),
            iterations: state.get_iter(),
        }),
        other => Err(MinimizerError::Backend(format!(
            "Nelder-Mead stopped unexpectedly: {other:?}"
        ))),
    }
}

/// Cost tolerance around `param`: relative to the cost, and at least the cost
/// change of a move by `param_tolerance`.
fn cost_tolerance<F>(
    objective: &F,
    param: f64,
    cost: f64,
    param_tolerance: f64,
    relative: f64,
) -> Result<f64, LossError>
where
    F: Fn(f64) -> Result<f64, LossError>,
{
    let resolution = (objective(param + param_tolerance)? - cost).abs();
    Ok((relative * (1.0 + cost.abs())).max(resolution))
}

fn nelder_mead<F>(
    objective: F,
    x0: f64,
    config: &MinimizerConfig,
) -> Result<Minimum, MinimizerError>
where
    F: Fn(f64) -> Result<f64, LossError>,
{
    let mut best_param = x0;
    let mut best_cost = objective(x0)?;
    let mut step = initial_step(x0);
    let mut iterations = 0u64;

    loop {
        if iterations >= config.max_iterations {
            return Err(MinimizerError::NotConverged {
                iterations,
                best_param,
                best_cost,
            });
        }
        let param_tolerance = config.param_tolerance * (1.0 + best_param.abs());
        let cost_tolerance = cost_tolerance(
            &objective,
            best_param,
            best_cost,
            param_tolerance,
            config.tolerance,
        )?;
        let budget = (config.max_iterations - iterations).min(RESTART_ITERATIONS);

        let run = simplex_run(&objective, best_param, step, cost_tolerance, budget)?;
        // A run that stops on its initial simplex still counts, so the budget
        // bounds the number of restarts.
        iterations += run.iterations.max(1);

        let improvement = best_cost - run.cost;
        let moved = (run.param - best_param).abs();
        if run.cost < best_cost {
            best_param = run.param;
            best_cost = run.cost;
        }

        if improvement > cost_tolerance {
            step = step.min(moved).max(param_tolerance);
        } else if step <= param_tolerance {
            return Ok(Minimum {
                param: best_param,
                cost: best_cost,
                iterations,
            });
        } else {
            step = (step * STEP_SHRINK).max(param_tolerance);
        }
    }
}

fn bfgs<F>(objective: F, x0: f64, config: &MinimizerConfig) -> Result<Minimum, MinimizerError>
where
    F: Fn(f64) -> Result<f64, LossError>,
{
    objective(x0)?;

    // The solver's callback cannot fail, so the first evaluation error is kept
    // here and reported after the run.
    let failure: RefCell<Option<LossError>> = RefCell::new(None);
    let evaluate = |x: f64| -> f64 {
        match objective(x) {
            Ok(cost) if cost.is_finite() => cost,
            Ok(cost) => {
                log::warn!("Non-finite cost {cost} at parameter {x}, returning large finite value");
                1e10
            }
            Err(e) => {
                let mut slot = failure.borrow_mut();
                if slot.is_none() {
                    *slot = Some(e);
                }
                1e10
            }
        }
    };

    let cost_and_grad = |point: &Array1<f64>| -> (f64, Array1<f64>) {
        let x = point[0];
        let h = 1e-7 * x.abs().max(1.0);
        let cost = evaluate(x);
        let grad = (evaluate(x + h) - evaluate(x - h)) / (2.0 * h);
        (cost, Array1::from_elem(1, grad))
    };

    let outcome = Bfgs::new(Array1::from_elem(1, x0), cost_and_grad)
        .with_tolerance(config.tolerance)
        .with_max_iterations(config.max_iterations as usize)
        .run();

    if let Some(e) = failure.borrow_mut().take() {
        return Err(MinimizerError::Objective(e));
    }

    let BfgsSolution {
        final_point,
        final_value,
        iterations,
        ..
    } = outcome.map_err(|e| MinimizerError::Backend(format!("BFGS failed: {e:?}")))?;

    let param = final_point[0];
    let iterations = iterations as u64;
    if iterations >= config.max_iterations {
        return Err(MinimizerError::NotConverged {
            iterations,
            best_param: param,
            best_cost: final_value,
        });
    }
    Ok(Minimum {
        param,
        cost: final_value,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantile::quantile_costs;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn nelder_mead_finds_a_smooth_minimum() {
        let objective = |x: f64| Ok((x - 3.0).powi(2) + 1.0);
        let min = minimize_scalar(objective, 0.0, &MinimizerConfig::default()).unwrap();
        assert_abs_diff_eq!(min.param, 3.0, epsilon = 1e-4);
        assert_abs_diff_eq!(min.cost, 1.0, epsilon = 1e-8);
    }

    #[test]
    fn nelder_mead_finds_a_kinked_minimum() {
        let objective = |x: f64| Ok(0.5 * (x - 5.0).abs());
        let min = minimize_scalar(objective, 1.0, &MinimizerConfig::default()).unwrap();
        assert_abs_diff_eq!(min.param, 5.0, epsilon = 1e-6);
    }

    #[test]
    fn nelder_mead_keeps_an_optimal_start() {
        // The start is the only point with zero cost; the simplex collapses onto it.
        let objective = |x: f64| Ok(x.abs());
        let min = minimize_scalar(objective, 0.0, &MinimizerConfig::default()).unwrap();
        assert_eq!(min.param, 0.0);
    }

    #[test]
    fn exhausted_budget_is_an_error() {
        let config = MinimizerConfig {
            max_iterations: 2,
            ..MinimizerConfig::default()
        };
        let objective = |x: f64| Ok((x - 100.0).powi(2));
        let err = minimize_scalar(objective, 0.0, &config).unwrap_err();
        assert!(matches!(err, MinimizerError::NotConverged { .. }));
    }

    #[test]
    fn objective_errors_are_propagated() {
        let objective = |_: f64| -> Result<f64, LossError> { Err(LossError::EmptyInput) };
        let err = minimize_scalar(objective, 1.0, &MinimizerConfig::default()).unwrap_err();
        assert_eq!(err, MinimizerError::Objective(LossError::EmptyInput));

        let config = MinimizerConfig {
            method: MinimizerMethod::Bfgs,
            ..MinimizerConfig::default()
        };
        let err = minimize_scalar(objective, 1.0, &config).unwrap_err();
        assert_eq!(err, MinimizerError::Objective(LossError::EmptyInput));
    }

    #[test]
    fn bfgs_finds_a_smooth_minimum() {
        let config = MinimizerConfig {
            method: MinimizerMethod::Bfgs,
            tolerance: 1e-6,
            max_iterations: 200,
            ..MinimizerConfig::default()
        };
        let objective = |x: f64| Ok((x + 2.0).powi(2));
        let min = minimize_scalar(objective, 1.0, &config).unwrap();
        assert_abs_diff_eq!(min.param, -2.0, epsilon = 1e-3);
    }

    fn pinball(y: f64, others: f64, quantile: f64) -> impl Fn(f64) -> Result<f64, LossError> {
        move |param: f64| {
            quantile_costs(
                array![param * others].view(),
                array![y].view(),
                array![1.0].view(),
                quantile,
            )
        }
    }

    #[test]
    fn large_magnitude_optimum_converges() {
        let config = MinimizerConfig::default();
        for y in [2e7, 4.5e7, 1.23e8, 7.7e9] {
            let min = minimize_scalar(pinball(y, 0.9, 0.3), 0.0, &config).unwrap();
            let exact = y / 0.9;
            assert!(
                (min.param - exact).abs() <= 1e-9 * exact,
                "y = {y}: found {} instead of {exact}",
                min.param
            );
        }
    }

    #[test]
    fn kink_between_the_initial_vertices_is_not_mistaken_for_a_minimum() {
        // 0 and the first edge 0.00025 have equal cost around the kink at 0.000125
        let config = MinimizerConfig::default();
        let min = minimize_scalar(pinball(0.000125, 1.0, 0.5), 0.0, &config).unwrap();
        assert_abs_diff_eq!(min.param, 0.000125, epsilon = 1e-9);

        let min = minimize_scalar(pinball(0.01, 1.0, 0.5), 0.0, &config).unwrap();
        assert_abs_diff_eq!(min.param, 0.01, epsilon = 1e-9);

        let min = minimize_scalar(pinball(5.0, 1.0, 0.5), 0.0, &config).unwrap();
        assert_abs_diff_eq!(min.param, 5.0, epsilon = 1e-8);
    }

    #[test]
    fn restarts_share_the_iteration_budget() {
        let config = MinimizerConfig::default();
        let min = minimize_scalar(pinball(3.0e6, 2.0, 0.8), 1.0, &config).unwrap();
        assert!(min.iterations <= config.max_iterations);
        assert_abs_diff_eq!(min.param, 1.5e6, epsilon = 1.5e6 * 1e-9);
    }

    #[test]
    fn initial_step_follows_the_five_percent_rule() {
        assert_eq!(initial_step(0.0), 0.00025);
        assert_abs_diff_eq!(initial_step(2.0), 0.1, epsilon = 1e-15);
    }
}
