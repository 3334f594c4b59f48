//! # Nonlinear program module
//!
//! Defines the interface between a nonlinear program (NLP) and the engine
//! solving it. A problem has the form
//!
//! ```text
//! minimise    f(x)
//! subject to  lb  <= x    <= ub
//!             gl  <= g(x) <= gu
//! ```
//!
//! where `x` has `num_vars` elements and `g` has `num_constraints` elements.
//! Equality constraints are expressed as `gl == gu`, fixed variables as
//! `lb == ub`. Infinite bounds are allowed.
//!
//! Problems provide first derivatives of the constraints and first and second
//! derivatives of the cost, solvers only ever see a problem through the
//! `NlpProblem` trait.

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

mod alm;

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

// Internal
pub use alm::*;

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A nonlinear program with bounds and two-sided constraints.
pub trait NlpProblem {
    /// Number of optimisation variables.
    fn num_vars(&self) -> usize;

    /// Number of constraints.
    fn num_constraints(&self) -> usize;

    /// Lower and upper bounds on the variables.
    fn var_bounds(&self) -> (DVector<f64>, DVector<f64>);

    /// Lower and upper bounds on the constraint values.
    fn constraint_bounds(&self) -> (DVector<f64>, DVector<f64>);

    /// Starting point for the solver.
    fn initial_guess(&self) -> DVector<f64>;

    fn cost(&self, vars: &DVector<f64>) -> f64;

    fn cost_gradient(&self, vars: &DVector<f64>) -> DVector<f64>;

    /// Hessian of the cost, a `num_vars x num_vars` symmetric matrix.
    fn cost_hessian(&self, vars: &DVector<f64>) -> DMatrix<f64>;

    fn constraints(&self, vars: &DVector<f64>) -> DVector<f64>;

    /// Jacobian of the constraints, a `num_constraints x num_vars` matrix
    /// where element `(j, i)` is `dg_j/dx_i`.
    fn constraint_jacobian(&self, vars: &DVector<f64>) -> DMatrix<f64>;
}

/// An engine able to solve an `NlpProblem`.
///
/// Solvers must be deterministic, the same problem and solver configuration
/// always produce the same result.
pub trait NlpSolver {
    fn solve(&mut self, problem: &dyn NlpProblem) -> Result<NlpSolution, NlpError>;
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A locally optimal solution to a problem.
#[derive(Debug, Clone, Serialize)]
pub struct NlpSolution {
    /// Value of all variables at the solution
    pub vars: DVector<f64>,

    /// Cost at the solution
    pub cost: f64,

    /// Number of iterations used, outer ones when there are constraints
    pub iterations: usize,

    /// Largest constraint violation at the solution
    pub max_violation: f64,

    /// Lagrange multiplier estimates for the constraints
    pub multipliers: DVector<f64>,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Possible failures of a solve.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NlpError {
    #[error("Dimension mismatch in {what}: expected {expected}, got {got}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize
    },

    #[error("Inconsistent {0} bounds, a lower bound is above its upper bound or is NaN")]
    InconsistentBounds(&'static str),

    #[error("Maximum number of iterations ({0}) reached without converging")]
    MaxIterations(usize),

    #[error("Problem appears infeasible, violation is {0:.3e} at the iteration limit")]
    Infeasible(f64),

    #[error("Solve did not finish within {0} ms")]
    Timeout(u64),

    #[error("Numerical error: {0}")]
    NumericalError(String),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Largest distance of any constraint value outside of its bounds.
pub fn constraint_violation(
    values: &DVector<f64>,
    lower: &DVector<f64>,
    upper: &DVector<f64>
) -> f64 {
    values
        .iter()
        .zip(lower.iter().zip(upper.iter()))
        .map(|(v, (l, u))| (l - v).max(v - u).max(0.0))
        .fold(0.0, f64::max)
}
