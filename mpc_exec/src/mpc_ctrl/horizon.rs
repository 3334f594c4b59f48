//! # Horizon problem
//!
//! Builds the nonlinear program solved each cycle: find the states and
//! actuations over the horizon which minimise the weighted tracking and
//! effort cost while obeying the vehicle model between every pair of
//! consecutive states.
//!
//! The cost is quadratic in the variables so its Hessian is constant.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{DMatrix, DVector};

// Internal
use super::{
    layout::{ActuatorComponent, HorizonLayout, StateComponent},
    Params,
};
use crate::nlp::NlpProblem;
use crate::vehicle_model::{Actuation, KinematicBicycle, VehicleState};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// The optimisation problem for one control cycle.
pub struct HorizonProblem<'a> {
    params: &'a Params,
    layout: HorizonLayout,
    model: KinematicBicycle,

    /// State the first step of the horizon is pinned to
    init_state: VehicleState,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<'a> HorizonProblem<'a> {
    /// Build the problem starting from the (delay compensated) state.
    pub fn new(params: &'a Params, init_state: VehicleState) -> Self {
        Self {
            params,
            layout: HorizonLayout::new(params.horizon_len),
            model: KinematicBicycle::new(params.lf_m),
            init_state,
        }
    }

    pub fn layout(&self) -> &HorizonLayout {
        &self.layout
    }

    pub fn init_state(&self) -> &VehicleState {
        &self.init_state
    }

    /// Apply `f(index_a, index_b, weight)` to every pair of consecutive
    /// actuations in the horizon, for both actuators.
    fn for_each_rate_pair<F: FnMut(usize, usize, f64)>(&self, mut f: F) {
        let l = &self.layout;
        let w = &self.params.weights;

        for i in 0..l.num_actuations().saturating_sub(1) {
            f(
                l.actuator(ActuatorComponent::Steer, i),
                l.actuator(ActuatorComponent::Steer, i + 1),
                w.steer_rate,
            );
            f(
                l.actuator(ActuatorComponent::Throttle, i),
                l.actuator(ActuatorComponent::Throttle, i + 1),
                w.throttle_rate,
            );
        }
    }

    /// The indices and weights of every squared tracking or effort term, in
    /// the form `weight * (vars[index] - target)^2`.
    fn for_each_square_term<F: FnMut(usize, f64, f64)>(&self, mut f: F) {
        let l = &self.layout;
        let w = &self.params.weights;

        for i in 0..l.horizon_len() {
            f(l.state(StateComponent::Cte, i), w.cte, 0.0);
            f(l.state(StateComponent::Epsi, i), w.epsi, 0.0);
            f(l.state(StateComponent::V, i), w.speed, self.params.ref_v_ms);
        }

        for i in 0..l.num_actuations() {
            f(l.actuator(ActuatorComponent::Steer, i), w.steer, 0.0);
            f(l.actuator(ActuatorComponent::Throttle, i), w.throttle, 0.0);
        }
    }

    fn state_at(&self, vars: &DVector<f64>, step: usize) -> VehicleState {
        VehicleState::from_array(
            StateComponent::ALL.map(|c| vars[self.layout.state(c, step)])
        )
    }

    fn actuation_at(&self, vars: &DVector<f64>, step: usize) -> Actuation {
        Actuation::from_array(
            ActuatorComponent::ALL.map(|c| vars[self.layout.actuator(c, step)])
        )
    }
}

impl<'a> NlpProblem for HorizonProblem<'a> {
    fn num_vars(&self) -> usize {
        self.layout.num_vars()
    }

    fn num_constraints(&self) -> usize {
        self.layout.num_constraints()
    }

    fn var_bounds(&self) -> (DVector<f64>, DVector<f64>) {
        let l = &self.layout;
        let mut lower = DVector::from_element(l.num_vars(), f64::NEG_INFINITY);
        let mut upper = DVector::from_element(l.num_vars(), f64::INFINITY);

        // Pin the first state
        let init = self.init_state.to_array();
        for comp in StateComponent::ALL.iter() {
            let idx = l.state(*comp, 0);
            lower[idx] = init[comp.index()];
            upper[idx] = init[comp.index()];
        }

        for i in 0..l.num_actuations() {
            let steer = l.actuator(ActuatorComponent::Steer, i);
            lower[steer] = -self.params.max_steer_rad;
            upper[steer] = self.params.max_steer_rad;

            let throttle = l.actuator(ActuatorComponent::Throttle, i);
            lower[throttle] = -self.params.max_throttle;
            upper[throttle] = self.params.max_throttle;
        }

        (lower, upper)
    }

    fn constraint_bounds(&self) -> (DVector<f64>, DVector<f64>) {
        let m = self.layout.num_constraints();
        (DVector::zeros(m), DVector::zeros(m))
    }

    /// Zero actuation over the whole horizon, with the states found by
    /// running the model forwards so that the guess is dynamically feasible.
    fn initial_guess(&self) -> DVector<f64> {
        let l = &self.layout;
        let mut vars = DVector::zeros(l.num_vars());

        let mut state = self.init_state;
        l.set_state(vars.as_mut_slice(), 0, &state);

        for i in 1..l.horizon_len() {
            state = self.model.step(&state, &Actuation::default(), self.params.timestep_s);
            l.set_state(vars.as_mut_slice(), i, &state);
        }

        vars
    }

    fn cost(&self, vars: &DVector<f64>) -> f64 {
        let mut cost = 0.0;

        self.for_each_square_term(|i, w, target| {
            cost += w * (vars[i] - target).powi(2);
        });
        self.for_each_rate_pair(|a, b, w| {
            cost += w * (vars[b] - vars[a]).powi(2);
        });

        cost
    }

    fn cost_gradient(&self, vars: &DVector<f64>) -> DVector<f64> {
        let mut grad = DVector::zeros(vars.len());

        self.for_each_square_term(|i, w, target| {
            grad[i] += 2.0 * w * (vars[i] - target);
        });
        self.for_each_rate_pair(|a, b, w| {
            let d = 2.0 * w * (vars[b] - vars[a]);
            grad[a] -= d;
            grad[b] += d;
        });

        grad
    }

    fn cost_hessian(&self, vars: &DVector<f64>) -> DMatrix<f64> {
        let n = vars.len();
        let mut hess = DMatrix::zeros(n, n);

        self.for_each_square_term(|i, w, _| {
            hess[(i, i)] += 2.0 * w;
        });
        self.for_each_rate_pair(|a, b, w| {
            hess[(a, a)] += 2.0 * w;
            hess[(b, b)] += 2.0 * w;
            hess[(a, b)] -= 2.0 * w;
            hess[(b, a)] -= 2.0 * w;
        });

        hess
    }

    /// `state[i + 1] - model(state[i], act[i])` for every step and component.
    fn constraints(&self, vars: &DVector<f64>) -> DVector<f64> {
        let l = &self.layout;
        let mut g = DVector::zeros(l.num_constraints());

        for i in 0..l.num_actuations() {
            let predicted = self
                .model
                .step(&self.state_at(vars, i), &self.actuation_at(vars, i), self.params.timestep_s)
                .to_array();
            let next = self.state_at(vars, i + 1).to_array();

            for comp in StateComponent::ALL.iter() {
                let k = comp.index();
                g[l.constraint(*comp, i)] = next[k] - predicted[k];
            }
        }

        g
    }

    fn constraint_jacobian(&self, vars: &DVector<f64>) -> DMatrix<f64> {
        let l = &self.layout;
        let mut jac = DMatrix::zeros(l.num_constraints(), l.num_vars());

        for i in 0..l.num_actuations() {
            let (a, b) = self.model.jacobian(
                &self.state_at(vars, i),
                &self.actuation_at(vars, i),
                self.params.timestep_s,
            );

            for row_comp in StateComponent::ALL.iter() {
                let row = l.constraint(*row_comp, i);
                let k = row_comp.index();

                jac[(row, l.state(*row_comp, i + 1))] = 1.0;

                for col_comp in StateComponent::ALL.iter() {
                    jac[(row, l.state(*col_comp, i))] = -a[(k, col_comp.index())];
                }
                for col_comp in ActuatorComponent::ALL.iter() {
                    jac[(row, l.actuator(*col_comp, i))] = -b[(k, col_comp.index())];
                }
            }
        }

        jac
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::nlp::{AlmSolver, NlpSolver};
    use approx::assert_relative_eq;

    fn test_params() -> Params {
        Params::default()
    }

    /// A point in the variable space which is not feasible, to exercise the
    /// derivatives away from the initial guess.
    fn test_point(problem: &HorizonProblem) -> DVector<f64> {
        DVector::from_fn(problem.num_vars(), |i, _| {
            0.3 * ((i as f64) * 0.7).sin() + 0.05 * i as f64
        })
    }

    #[test]
    fn test_bounds() {
        let params = test_params();
        let init = VehicleState::at_origin(20.0, 1.0, 0.05);
        let problem = HorizonProblem::new(&params, init);
        let l = *problem.layout();

        let (lower, upper) = problem.var_bounds();
        assert_eq!(lower.len(), 8 * params.horizon_len - 2);

        assert_eq!(lower[l.state(StateComponent::V, 0)], 20.0);
        assert_eq!(upper[l.state(StateComponent::V, 0)], 20.0);
        assert_eq!(lower[l.state(StateComponent::Cte, 0)], 1.0);
        assert_eq!(upper[l.state(StateComponent::Epsi, 0)], 0.05);
        assert_eq!(lower[l.state(StateComponent::X, 1)], f64::NEG_INFINITY);
        assert_eq!(upper[l.state(StateComponent::Cte, 9)], f64::INFINITY);
        assert_eq!(lower[l.actuator(ActuatorComponent::Steer, 3)], -params.max_steer_rad);
        assert_eq!(upper[l.actuator(ActuatorComponent::Throttle, 8)], params.max_throttle);

        let (gl, gu) = problem.constraint_bounds();
        assert_eq!(gl.len(), 6 * (params.horizon_len - 1));
        assert!(gl.iter().chain(gu.iter()).all(|b| *b == 0.0));
    }

    #[test]
    fn test_initial_guess_feasible() {
        let params = test_params();
        let problem = HorizonProblem::new(&params, VehicleState::at_origin(15.0, -0.4, 0.1));

        let guess = problem.initial_guess();
        let g = problem.constraints(&guess);

        assert!(g.iter().all(|v| v.abs() < 1e-12));

        let view = problem.layout().view(guess.as_slice()).unwrap();
        assert_eq!(view.state(0), *problem.init_state());
        assert!(view.actuations().iter().all(|a| *a == Actuation::default()));
    }

    #[test]
    fn test_cost_derivatives() {
        let params = test_params();
        let problem = HorizonProblem::new(&params, VehicleState::at_origin(10.0, 0.5, 0.0));
        let x = test_point(&problem);
        let h = 1e-5;

        let grad = problem.cost_gradient(&x);
        let hess = problem.cost_hessian(&x);

        for i in 0..x.len() {
            let mut plus = x.clone();
            let mut minus = x.clone();
            plus[i] += h;
            minus[i] -= h;

            let fd = (problem.cost(&plus) - problem.cost(&minus)) / (2.0 * h);
            assert_relative_eq!(grad[i], fd, epsilon = 1e-4, max_relative = 1e-6);

            // Quadratic cost so the gradient is exactly linear
            let fd_col = (problem.cost_gradient(&plus) - problem.cost_gradient(&minus)) / (2.0 * h);
            for j in 0..x.len() {
                assert_relative_eq!(hess[(j, i)], fd_col[j], epsilon = 1e-4, max_relative = 1e-6);
            }
        }
    }

    #[test]
    fn test_constraint_jacobian() {
        let params = test_params();
        let problem = HorizonProblem::new(&params, VehicleState::at_origin(10.0, 0.5, 0.0));
        let x = test_point(&problem);
        let h = 1e-6;

        let jac = problem.constraint_jacobian(&x);
        assert_eq!(jac.nrows(), problem.num_constraints());
        assert_eq!(jac.ncols(), problem.num_vars());

        for i in 0..x.len() {
            let mut plus = x.clone();
            let mut minus = x.clone();
            plus[i] += h;
            minus[i] -= h;

            let fd = (problem.constraints(&plus) - problem.constraints(&minus)) / (2.0 * h);
            for j in 0..problem.num_constraints() {
                assert_relative_eq!(jac[(j, i)], fd[j], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_solution_feasible_and_bounded() {
        let params = test_params();
        let problem = HorizonProblem::new(&params, VehicleState::at_origin(20.0, 1.0, 0.05));

        let sol = AlmSolver::new(params.solver.clone()).solve(&problem).unwrap();

        // Dynamics hold at the optimum
        let g = problem.constraints(&sol.vars);
        assert!(g.iter().all(|v| v.abs() <= params.solver.constraint_tol));

        // Actuations are within their limits
        let view = problem.layout().view(sol.vars.as_slice()).unwrap();
        for act in view.actuations() {
            assert!(act.steer_rad.abs() <= params.max_steer_rad);
            assert!(act.throttle.abs() <= params.max_throttle);
        }

        // The initial state is untouched
        assert_eq!(view.state(0), *problem.init_state());
    }
}
