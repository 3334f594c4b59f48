//! # ALM/PANOC solver
//!
//! Solves an `NlpProblem` with the augmented Lagrangian method of
//! `optimization_engine`. The problem is mapped onto the engine's form
//!
//! ```text
//! minimise    f(u)
//! subject to  u    in U = [lb, ub]
//!             F1(u) in C = [gl, gu]
//! ```
//!
//! so the constraint function is used as the mapping `F1` with its Jacobian
//! transpose product built from `constraint_jacobian`. Problems without
//! constraints skip the outer loop and are handed straight to PANOC.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace};
use nalgebra::DVector;
use optimization_engine::{
    alm::{AlmCache, AlmFactory, AlmOptimizer, AlmProblem, NO_JACOBIAN_MAPPING, NO_MAPPING},
    constraints::{BallInf, Rectangle},
    core::ExitStatus,
    panoc::{PANOCCache, PANOCOptimizer},
    Optimizer, Problem, SolverError,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

// Internal
use super::{constraint_violation, NlpError, NlpProblem, NlpSolution, NlpSolver};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Radius of the box the multiplier estimates are kept in.
const MULTIPLIER_BOUND: f64 = 1e12;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters of the ALM/PANOC solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlmParams {
    /// Maximum number of multiplier updates.
    pub max_outer_iters: usize,

    /// Maximum number of PANOC iterations per inner problem.
    pub max_inner_iters: usize,

    /// Largest accepted norm of the constraint residual.
    pub constraint_tol: f64,

    /// Fixed point residual tolerance of the final inner problem.
    pub optimality_tol: f64,

    /// Tolerance of the first inner problem, tightened towards
    /// `optimality_tol` on each outer iteration.
    pub initial_inner_tol: f64,

    pub inner_tol_update_factor: f64,

    pub initial_penalty: f64,

    /// Factor the penalty is multiplied by when the residual does not fall
    /// by `sufficient_decrease`.
    pub penalty_update_factor: f64,

    pub sufficient_decrease: f64,

    /// Number of past steps kept by the L-BFGS directions.
    pub lbfgs_memory: usize,

    /// Wall clock limit on a single solve.
    pub max_solve_time_ms: Option<u64>,
}

/// NLP solver backed by the `optimization_engine` ALM and PANOC methods.
#[derive(Debug, Clone, Default)]
pub struct AlmSolver {
    params: AlmParams,
}

/// Adapts an `NlpProblem` to the slice based callbacks of the engine.
#[derive(Clone, Copy)]
struct Callbacks<'a> {
    problem: &'a dyn NlpProblem,
}

/// What the engine reported about a solve.
struct EngineStatus {
    exit: ExitStatus,
    iterations: usize,
    iter_limit: usize,
    multipliers: Option<DVector<f64>>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for AlmParams {
    fn default() -> Self {
        Self {
            max_outer_iters: 50,
            max_inner_iters: 2000,
            constraint_tol: 1e-5,
            optimality_tol: 1e-5,
            initial_inner_tol: 1e-2,
            inner_tol_update_factor: 0.1,
            initial_penalty: 100.0,
            penalty_update_factor: 5.0,
            sufficient_decrease: 0.1,
            lbfgs_memory: 10,
            max_solve_time_ms: None,
        }
    }
}

impl AlmSolver {
    pub fn new(params: AlmParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &AlmParams {
        &self.params
    }

    /// Run PANOC on a problem with only variable bounds.
    fn solve_bounded(
        &self,
        cb: Callbacks,
        lb: &DVector<f64>,
        ub: &DVector<f64>,
        u: &mut [f64]
    ) -> Result<EngineStatus, SolverError> {
        let bounds = Rectangle::new(Some(lb.as_slice()), Some(ub.as_slice()));

        let cost = |u: &[f64], c: &mut f64| -> Result<(), SolverError> { cb.cost(u, c) };
        let grad = |u: &[f64], g: &mut [f64]| -> Result<(), SolverError> { cb.gradient(u, g) };
        let problem = Problem::new(&bounds, grad, cost);

        let mut cache =
            PANOCCache::new(u.len(), self.params.optimality_tol, self.params.lbfgs_memory);
        let mut panoc =
            PANOCOptimizer::new(problem, &mut cache).with_max_iter(self.params.max_inner_iters);
        if let Some(ms) = self.params.max_solve_time_ms {
            panoc = panoc.with_max_duration(Duration::from_millis(ms));
        }

        let status = panoc.solve(u)?;
        trace!("PANOC status: {:?}", status);

        Ok(EngineStatus {
            exit: status.exit_status(),
            iterations: status.iterations(),
            iter_limit: self.params.max_inner_iters,
            multipliers: None,
        })
    }

    /// Run the augmented Lagrangian method with the constraints as `F1`.
    fn solve_constrained(
        &self,
        cb: Callbacks,
        (lb, ub): (&DVector<f64>, &DVector<f64>),
        (gl, gu): (&DVector<f64>, &DVector<f64>),
        u: &mut [f64]
    ) -> Result<EngineStatus, SolverError> {
        let p = &self.params;
        let n1 = gl.len();

        let bounds = Rectangle::new(Some(lb.as_slice()), Some(ub.as_slice()));
        let set_c = Rectangle::new(Some(gl.as_slice()), Some(gu.as_slice()));
        let set_y = BallInf::new(None, MULTIPLIER_BOUND);

        let cost = |u: &[f64], c: &mut f64| -> Result<(), SolverError> { cb.cost(u, c) };
        let grad = |u: &[f64], g: &mut [f64]| -> Result<(), SolverError> { cb.gradient(u, g) };
        let f1 = |u: &[f64], g: &mut [f64]| -> Result<(), SolverError> { cb.constraints(u, g) };
        let jf1_trans = |u: &[f64], d: &[f64], r: &mut [f64]| -> Result<(), SolverError> {
            cb.jacobian_trans_product(u, d, r)
        };

        let factory = AlmFactory::new(
            cost,
            grad,
            Some(f1),
            Some(jf1_trans),
            NO_MAPPING,
            NO_JACOBIAN_MAPPING,
            Some(set_c),
            0,
        );

        let problem = AlmProblem::new(
            bounds,
            Some(Rectangle::new(Some(gl.as_slice()), Some(gu.as_slice()))),
            Some(set_y),
            |u: &[f64], xi: &[f64], c: &mut f64| -> Result<(), SolverError> {
                factory.psi(u, xi, c)
            },
            |u: &[f64], xi: &[f64], g: &mut [f64]| -> Result<(), SolverError> {
                factory.d_psi(u, xi, g)
            },
            Some(f1),
            NO_MAPPING,
            n1,
            0,
        );

        let panoc_cache = PANOCCache::new(u.len(), p.optimality_tol, p.lbfgs_memory);
        let mut alm_cache = AlmCache::new(panoc_cache, n1, 0);

        let mut alm = AlmOptimizer::new(&mut alm_cache, problem)
            .with_delta_tolerance(p.constraint_tol)
            .with_epsilon_tolerance(p.optimality_tol)
            .with_initial_inner_tolerance(p.initial_inner_tol)
            .with_inner_tolerance_update_factor(p.inner_tol_update_factor)
            .with_max_outer_iterations(p.max_outer_iters)
            .with_max_inner_iterations(p.max_inner_iters)
            .with_initial_penalty(p.initial_penalty)
            .with_penalty_update_factor(p.penalty_update_factor)
            .with_sufficient_decrease_coefficient(p.sufficient_decrease);
        if let Some(ms) = p.max_solve_time_ms {
            alm = alm.with_max_duration(Duration::from_millis(ms));
        }

        let status = alm.solve(u)?;
        trace!(
            "ALM status: {:?}, {} outer and {} inner iterations",
            status.exit_status(),
            status.num_outer_iterations(),
            status.num_inner_iterations()
        );

        Ok(EngineStatus {
            exit: status.exit_status(),
            iterations: status.num_outer_iterations(),
            iter_limit: p.max_outer_iters,
            multipliers: status
                .lagrange_multipliers()
                .as_ref()
                .map(|y| DVector::from_column_slice(y)),
        })
    }
}

impl NlpSolver for AlmSolver {
    fn solve(&mut self, problem: &dyn NlpProblem) -> Result<NlpSolution, NlpError> {
        let n = problem.num_vars();
        let m = problem.num_constraints();

        // ---- CHECK PROBLEM ----

        let (lb, ub) = problem.var_bounds();
        let (gl, gu) = problem.constraint_bounds();

        check_dim("variable lower bounds", n, lb.len())?;
        check_dim("variable upper bounds", n, ub.len())?;
        check_dim("constraint lower bounds", m, gl.len())?;
        check_dim("constraint upper bounds", m, gu.len())?;
        check_bounds("variable", &lb, &ub)?;
        check_bounds("constraint", &gl, &gu)?;

        let x0 = problem.initial_guess();
        check_dim("initial guess", n, x0.len())?;
        check_finite("initial guess", x0.iter())?;
        check_dim("cost gradient", n, problem.cost_gradient(&x0).len())?;
        check_dim("constraint values", m, problem.constraints(&x0).len())?;

        let mut u: Vec<f64> = x0
            .iter()
            .zip(lb.iter().zip(ub.iter()))
            .map(|(x, (l, h))| x.max(*l).min(*h))
            .collect();

        // ---- SOLVE ----

        let cb = Callbacks { problem };
        let engine = if m == 0 {
            self.solve_bounded(cb, &lb, &ub, &mut u)
        }
        else {
            self.solve_constrained(cb, (&lb, &ub), (&gl, &gu), &mut u)
        }
        .map_err(|e| NlpError::NumericalError(format!("Engine failed: {:?}", e)))?;

        // ---- CHECK RESULT ----

        let vars = DVector::from_vec(u);
        let g = problem.constraints(&vars);
        check_finite("constraint values", g.iter())?;
        let violation = constraint_violation(&g, &gl, &gu);

        match engine.exit {
            ExitStatus::Converged => (),
            ExitStatus::NotConvergedIterations if violation > self.params.constraint_tol => {
                return Err(NlpError::Infeasible(violation))
            }
            ExitStatus::NotConvergedIterations => {
                return Err(NlpError::MaxIterations(engine.iter_limit))
            }
            ExitStatus::NotConvergedOutOfTime => {
                return Err(NlpError::Timeout(self.params.max_solve_time_ms.unwrap_or_default()))
            }
        }

        let cost = problem.cost(&vars);
        if !cost.is_finite() {
            return Err(NlpError::NumericalError(String::from(
                "Cost is not finite at the solution",
            )));
        }

        debug!(
            "ALM converged in {} iterations, cost {:.6e}, violation {:.3e}",
            engine.iterations, cost, violation
        );

        Ok(NlpSolution {
            vars,
            cost,
            iterations: engine.iterations,
            max_violation: violation,
            multipliers: engine.multipliers.unwrap_or_else(|| DVector::zeros(m)),
        })
    }
}

impl<'a> Callbacks<'a> {
    fn cost(&self, u: &[f64], c: &mut f64) -> Result<(), SolverError> {
        *c = self.problem.cost(&DVector::from_column_slice(u));
        finite(c.is_finite())
    }

    fn gradient(&self, u: &[f64], grad: &mut [f64]) -> Result<(), SolverError> {
        let g = self.problem.cost_gradient(&DVector::from_column_slice(u));
        copy_finite(g.as_slice(), grad)
    }

    fn constraints(&self, u: &[f64], out: &mut [f64]) -> Result<(), SolverError> {
        let g = self.problem.constraints(&DVector::from_column_slice(u));
        copy_finite(g.as_slice(), out)
    }

    /// `J(u)^T d`
    fn jacobian_trans_product(
        &self,
        u: &[f64],
        d: &[f64],
        out: &mut [f64]
    ) -> Result<(), SolverError> {
        let jac = self.problem.constraint_jacobian(&DVector::from_column_slice(u));
        if jac.nrows() != d.len() || jac.ncols() != out.len() {
            return Err(SolverError::Cost);
        }

        let r = jac.tr_mul(&DVector::from_column_slice(d));
        copy_finite(r.as_slice(), out)
    }
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

fn finite(is_finite: bool) -> Result<(), SolverError> {
    if is_finite {
        Ok(())
    }
    else {
        Err(SolverError::NotFiniteComputation)
    }
}

fn copy_finite(src: &[f64], dst: &mut [f64]) -> Result<(), SolverError> {
    if src.len() != dst.len() {
        return Err(SolverError::Cost);
    }
    dst.copy_from_slice(src);
    finite(src.iter().all(|v| v.is_finite()))
}

fn check_dim(what: &'static str, expected: usize, got: usize) -> Result<(), NlpError> {
    if expected != got {
        return Err(NlpError::DimensionMismatch { what, expected, got });
    }
    Ok(())
}

fn check_bounds(
    what: &'static str,
    lower: &DVector<f64>,
    upper: &DVector<f64>
) -> Result<(), NlpError> {
    // Written so that NaN bounds also fail
    if lower.iter().zip(upper.iter()).all(|(l, u)| l <= u) {
        Ok(())
    }
    else {
        Err(NlpError::InconsistentBounds(what))
    }
}

fn check_finite<'b, I>(what: &str, mut values: I) -> Result<(), NlpError>
where
    I: Iterator<Item = &'b f64>
{
    if values.all(|v| v.is_finite()) {
        Ok(())
    }
    else {
        Err(NlpError::NumericalError(format!("The {} contains non-finite values", what)))
    }
}
