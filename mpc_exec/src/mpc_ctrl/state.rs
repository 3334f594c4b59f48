//! MPC control module state

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::{debug, trace, warn};
use serde::Serialize;
use std::time::Instant;

// Internal
use super::{delay, HorizonProblem, Params};
use crate::nlp::{AlmSolver, NlpError, NlpSolver};
use crate::reference::{to_vehicle_frame, Pose2, RefCurve, RefCurveError};
use crate::vehicle_model::{Actuation, KinematicBicycle, VehicleState};
use util::{maths::clamp, module::State, params};

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Model predictive controller.
///
/// Each call to `proc` is one control cycle: the measured state is projected
/// over the actuation latency, the horizon problem is built and solved, and
/// the first actuation of the solution is returned. The only data kept
/// between cycles is the last actuation issued.
pub struct MpcCtrl<S: NlpSolver = AlmSolver> {
    params: Params,

    model: KinematicBicycle,

    solver: S,

    /// Executing mode
    mode: MpcCtrlMode,

    /// Last actuation issued, in the model's steering convention
    last_act: Actuation,
}

/// Input data to MPC control.
#[derive(Debug, Clone, PartialEq)]
pub struct InputData {
    /// Measured state in the vehicle frame. Position and heading are
    /// ignored, the vehicle is at the origin of its own frame.
    pub state: VehicleState,

    /// Reference curve in the vehicle frame
    pub ref_curve: RefCurve,

    /// Actuation currently being executed by the vehicle, in the external
    /// steering convention. If `None` the last actuation issued by the
    /// controller is used.
    pub prev_act: Option<Actuation>,
}

/// Output of MPC control.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OutputData {
    /// Actuation to apply now, in the external steering convention
    pub act: Actuation,

    /// Predicted positions over the horizon, in the vehicle frame
    pub predicted_x_m: Vec<f64>,
    pub predicted_y_m: Vec<f64>,

    /// Points along the reference curve for display, in the vehicle frame
    pub reference_x_m: Vec<f64>,
    pub reference_y_m: Vec<f64>,
}

/// Status report for MPC control processing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusReport {
    /// Wall clock time spent in the solver
    pub solve_time_s: f64,

    /// Solver iterations
    pub iterations: usize,

    /// Cost of the solution
    pub cost: f64,

    /// Largest dynamics constraint violation of the solution
    pub max_violation: f64,

    /// State the horizon started from, after delay compensation
    pub comp_state: VehicleState,

    /// All predicted states over the horizon
    pub predicted_states: Vec<VehicleState>,
}

/// Flat summary of one cycle for CSV archives.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleRecord {
    pub time_s: f64,
    pub speed_ms: f64,
    pub cte_m: f64,
    pub epsi_rad: f64,

    /// True if the solve succeeded and the demands below are valid
    pub solved: bool,
    pub steer_rad: f64,
    pub throttle: f64,

    pub solve_time_s: f64,
    pub iterations: usize,
    pub cost: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Potential errors that can occur during processing of the module.
#[derive(Debug, thiserror::Error)]
pub enum MpcCtrlError {
    #[error("Could not load parameters: {0}")]
    ParamLoadError(params::LoadError),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// The input cannot be used to build a horizon. Raised before the solver
    /// is invoked.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// The solver did not find a solution. No actuation is substituted, the
    /// caller must decide on a fallback.
    #[error("Failed to solve the horizon problem: {0}")]
    SolveFailed(NlpError),
}

/// The possible modes of execution of MpcCtrl.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MpcCtrlMode {
    /// No problem being solved
    Idle,

    /// A horizon problem is being solved
    Solving,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl From<RefCurveError> for MpcCtrlError {
    fn from(e: RefCurveError) -> Self {
        MpcCtrlError::MalformedInput(e.to_string())
    }
}

impl InputData {
    /// Build the input from the world frame pose of the vehicle and world
    /// frame reference waypoints.
    pub fn from_world(
        pose: &Pose2,
        speed_ms: f64,
        world_x: &[f64],
        world_y: &[f64],
        prev_act: Option<Actuation>
    ) -> Result<Self, MpcCtrlError> {
        let (xs, ys) = to_vehicle_frame(pose, world_x, world_y)?;
        let ref_curve = RefCurve::fit(&xs, &ys)?;

        Ok(Self {
            state: VehicleState::at_origin(
                speed_ms,
                ref_curve.cross_track_error(),
                ref_curve.heading_error()
            ),
            ref_curve,
            prev_act,
        })
    }
}

impl CycleRecord {
    /// Summarise a cycle's input and result.
    pub fn new(
        time_s: f64,
        input: &InputData,
        result: &Result<(OutputData, StatusReport), MpcCtrlError>
    ) -> Self {
        let mut rec = Self {
            time_s,
            speed_ms: input.state.v_ms,
            cte_m: input.state.cte_m,
            epsi_rad: input.state.epsi_rad,
            ..Default::default()
        };

        if let Ok((out, report)) = result {
            rec.solved = true;
            rec.steer_rad = out.act.steer_rad;
            rec.throttle = out.act.throttle;
            rec.solve_time_s = report.solve_time_s;
            rec.iterations = report.iterations;
            rec.cost = report.cost;
        }

        rec
    }
}

impl State for MpcCtrl<AlmSolver> {
    type InitData = Params;
    type InitError = MpcCtrlError;

    type InputData = InputData;
    type OutputData = OutputData;
    type StatusReport = StatusReport;
    type ProcError = MpcCtrlError;

    /// Initialise the MpcCtrl module with the `optimization_engine` ALM solver.
    fn init(params: Self::InitData) -> Result<Self, Self::InitError> {
        let solver = AlmSolver::new(params.solver.clone());
        Self::with_solver(params, solver)
    }

    fn proc(&mut self, input_data: &Self::InputData)
        -> Result<(Self::OutputData, Self::StatusReport), Self::ProcError>
    {
        self.cycle(input_data)
    }
}

impl MpcCtrl<AlmSolver> {
    /// Load the parameters from the given file in the params directory and
    /// initialise the module.
    pub fn from_params_file(params_file: &str) -> Result<Self, MpcCtrlError> {
        let params: Params = params::load(params_file)
            .map_err(MpcCtrlError::ParamLoadError)?;

        Self::init(params)
    }
}

impl<S: NlpSolver> MpcCtrl<S> {
    /// Initialise the module with a specific solver.
    pub fn with_solver(params: Params, solver: S) -> Result<Self, MpcCtrlError> {
        params.validate().map_err(MpcCtrlError::InvalidParams)?;

        Ok(Self {
            model: KinematicBicycle::new(params.lf_m),
            params,
            solver,
            mode: MpcCtrlMode::Idle,
            last_act: Actuation::default(),
        })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn mode(&self) -> MpcCtrlMode {
        self.mode
    }

    /// The last actuation issued, in the external steering convention.
    pub fn last_act(&self) -> Actuation {
        self.convert_steer(self.last_act)
    }

    /// Execute one control cycle.
    pub fn cycle(&mut self, input: &InputData) -> Result<(OutputData, StatusReport), MpcCtrlError> {
        // ---- VALIDATE INPUT ----

        if !input.state.is_finite() {
            return Err(MpcCtrlError::MalformedInput(format!(
                "State contains non-finite values: {:?}",
                input.state
            )));
        }
        if !input.ref_curve.is_finite() {
            return Err(MpcCtrlError::MalformedInput(String::from(
                "Reference curve contains non-finite coefficients",
            )));
        }

        let prev_act = match input.prev_act {
            Some(a) if !a.is_finite() => {
                return Err(MpcCtrlError::MalformedInput(format!(
                    "Previous actuation contains non-finite values: {:?}",
                    a
                )))
            }
            Some(a) => self.convert_steer(a),
            None => self.last_act,
        };

        // ---- SOLVE ----

        let comp_state = delay::compensate(
            &self.model,
            &input.state,
            &prev_act,
            self.params.latency_s
        );
        trace!("Compensated state: {:?}", comp_state);

        let problem = HorizonProblem::new(&self.params, comp_state);

        self.mode = MpcCtrlMode::Solving;
        let start = Instant::now();
        let result = self.solver.solve(&problem);
        let solve_time_s = start.elapsed().as_secs_f64();
        self.mode = MpcCtrlMode::Idle;

        let solution = result.map_err(|e| {
            warn!("MPC solve failed after {:.3} s: {}", solve_time_s, e);
            MpcCtrlError::SolveFailed(e)
        })?;

        let view = problem
            .layout()
            .view(solution.vars.as_slice())
            .ok_or_else(|| MpcCtrlError::SolveFailed(NlpError::DimensionMismatch {
                what: "solution",
                expected: problem.layout().num_vars(),
                got: solution.vars.len(),
            }))?;

        // ---- EXTRACT OUTPUTS ----

        let first = view.actuation(0);
        let act_model = Actuation {
            steer_rad: clamp(
                &first.steer_rad,
                &-self.params.max_steer_rad,
                &self.params.max_steer_rad
            ),
            throttle: clamp(
                &first.throttle,
                &-self.params.max_throttle,
                &self.params.max_throttle
            ),
        };
        self.last_act = act_model;

        let (predicted_x_m, predicted_y_m) = view.positions();
        let (reference_x_m, reference_y_m) = input.ref_curve.display_points(
            self.params.ref_display_num_points,
            self.params.ref_display_spacing_m,
        );

        let output = OutputData {
            act: self.convert_steer(act_model),
            predicted_x_m,
            predicted_y_m,
            reference_x_m,
            reference_y_m,
        };

        debug!(
            "MPC demands: steer {:+.4} rad, throttle {:+.4} ({} iters, {:.1} ms, cost {:.3e})",
            output.act.steer_rad,
            output.act.throttle,
            solution.iterations,
            solve_time_s * 1000.0,
            solution.cost
        );

        let report = StatusReport {
            solve_time_s,
            iterations: solution.iterations,
            cost: solution.cost,
            max_violation: solution.max_violation,
            comp_state,
            predicted_states: view.states(),
        };

        Ok((output, report))
    }

    /// Convert between the model's and the external steering conventions.
    /// The conversion is its own inverse.
    fn convert_steer(&self, act: Actuation) -> Actuation {
        if self.params.invert_steer_output {
            Actuation {
                steer_rad: -act.steer_rad,
                throttle: act.throttle,
            }
        }
        else {
            act
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mpc_ctrl::Weights;
    use crate::nlp::{NlpProblem, NlpSolution};
    use approx::assert_abs_diff_eq;

    /// Counts calls and passes them on to the ALM solver.
    #[derive(Default)]
    struct CountingSolver {
        calls: usize,
        inner: AlmSolver,
    }

    impl NlpSolver for CountingSolver {
        fn solve(&mut self, problem: &dyn NlpProblem) -> Result<NlpSolution, NlpError> {
            self.calls += 1;
            self.inner.solve(problem)
        }
    }

    /// Always fails.
    struct FailingSolver;

    impl NlpSolver for FailingSolver {
        fn solve(&mut self, _: &dyn NlpProblem) -> Result<NlpSolution, NlpError> {
            Err(NlpError::MaxIterations(0))
        }
    }

    fn zero_curve_input(v_ms: f64, cte_m: f64, epsi_rad: f64) -> InputData {
        InputData {
            state: VehicleState::at_origin(v_ms, cte_m, epsi_rad),
            ref_curve: RefCurve::default(),
            prev_act: Some(Actuation::default()),
        }
    }

    #[test]
    fn test_zero_error_fixed_point() {
        let params = Params::default();
        let mut ctrl: MpcCtrl = MpcCtrl::init(params.clone()).unwrap();

        let (out, report) = ctrl.proc(&zero_curve_input(params.ref_v_ms, 0.0, 0.0)).unwrap();

        assert_abs_diff_eq!(out.act.steer_rad, 0.0, epsilon = 1e-3);
        assert_abs_diff_eq!(out.act.throttle, 0.0, epsilon = 1e-3);
        assert_eq!(out.predicted_x_m.len(), params.horizon_len);
        assert_eq!(out.reference_x_m.len(), params.ref_display_num_points);
        assert_eq!(report.predicted_states.len(), params.horizon_len);
        assert_eq!(ctrl.mode(), MpcCtrlMode::Idle);
    }

    #[test]
    fn test_corrects_cross_track_error() {
        // Heading error weighted well above cross track error so the approach
        // to the path is damped and the steering stays off the stops
        let params = Params {
            ref_v_ms: 20.0,
            weights: Weights {
                cte: 50.0,
                epsi: 500.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut ctrl: MpcCtrl = MpcCtrl::init(params.clone()).unwrap();

        let (out, report) = ctrl.proc(&zero_curve_input(20.0, 1.0, 0.05)).unwrap();

        // Vehicle is left of the path so must steer right, which is negative
        // in the external convention, without saturating
        assert!(out.act.steer_rad < 0.0, "steer was {}", out.act.steer_rad);
        assert!(
            out.act.steer_rad.abs() < params.max_steer_rad,
            "steer saturated at {}",
            out.act.steer_rad
        );

        // Step 1 is fixed by the heading at step 0, from there the error must
        // not grow anywhere along the horizon
        const CTE_TOL_M: f64 = 1e-3;
        let cte: Vec<f64> = report.predicted_states.iter().map(|s| s.cte_m).collect();
        for i in 1..cte.len() - 1 {
            assert!(
                cte[i + 1] <= cte[i] + CTE_TOL_M,
                "cte grows between steps {} and {}: {:?}",
                i,
                i + 1,
                cte
            );
        }
        assert!(cte[cte.len() - 1] < 0.1 * cte[1], "cte not reduced: {:?}", cte);

        // Dynamics hold along the prediction
        assert!(report.max_violation <= params.solver.constraint_tol);
    }

    #[test]
    fn test_default_weights_reach_path() {
        // The aggressive default weights reach the path within the horizon
        let params = Params {
            ref_v_ms: 20.0,
            ..Default::default()
        };
        let mut ctrl: MpcCtrl = MpcCtrl::init(params.clone()).unwrap();

        let (out, report) = ctrl.proc(&zero_curve_input(20.0, 1.0, 0.05)).unwrap();

        assert!(out.act.steer_rad < 0.0);
        assert!(out.act.steer_rad >= -params.max_steer_rad - 1e-9);

        let cte: Vec<f64> = report.predicted_states.iter().map(|s| s.cte_m).collect();
        assert!(cte[4..].iter().all(|c| c.abs() < 0.05), "path not reached: {:?}", cte);
    }

    #[test]
    fn test_insufficient_points_rejected() {
        let mut ctrl = MpcCtrl::with_solver(Params::default(), CountingSolver::default()).unwrap();

        let pose = Pose2::default();
        let result = InputData::from_world(&pose, 10.0, &[1.0, 2.0, 3.0], &[0.0, 0.0, 0.0], None)
            .and_then(|input| ctrl.cycle(&input));

        assert!(matches!(result, Err(MpcCtrlError::MalformedInput(_))));
        assert_eq!(ctrl.solver().calls, 0);

        // And succeeds with enough points
        let input = InputData::from_world(
            &pose,
            10.0,
            &[1.0, 2.0, 3.0, 4.0],
            &[0.0, 0.0, 0.0, 0.0],
            None
        )
        .unwrap();
        assert!(ctrl.cycle(&input).is_ok());
        assert_eq!(ctrl.solver().calls, 1);
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let mut ctrl = MpcCtrl::with_solver(Params::default(), CountingSolver::default()).unwrap();

        let input = zero_curve_input(f64::NAN, 0.0, 0.0);
        assert!(matches!(ctrl.cycle(&input), Err(MpcCtrlError::MalformedInput(_))));

        let mut input = zero_curve_input(10.0, 0.0, 0.0);
        input.ref_curve = RefCurve::new([0.0, f64::INFINITY, 0.0, 0.0]);
        assert!(matches!(ctrl.cycle(&input), Err(MpcCtrlError::MalformedInput(_))));

        let mut input = zero_curve_input(10.0, 0.0, 0.0);
        input.prev_act = Some(Actuation { steer_rad: f64::NAN, throttle: 0.0 });
        assert!(matches!(ctrl.cycle(&input), Err(MpcCtrlError::MalformedInput(_))));

        assert_eq!(ctrl.solver().calls, 0);
    }

    #[test]
    fn test_solve_failure() {
        let mut ctrl = MpcCtrl::with_solver(Params::default(), FailingSolver).unwrap();

        let result = ctrl.cycle(&zero_curve_input(10.0, 0.5, 0.0));

        assert!(matches!(
            result,
            Err(MpcCtrlError::SolveFailed(NlpError::MaxIterations(0)))
        ));
        assert_eq!(ctrl.mode(), MpcCtrlMode::Idle);
        assert_eq!(ctrl.last_act(), Actuation::default());
    }

    #[test]
    fn test_last_act_used_for_compensation() {
        let params = Params::default();
        let mut ctrl: MpcCtrl = MpcCtrl::init(params.clone()).unwrap();

        let mut input = zero_curve_input(20.0, 0.5, 0.0);
        let (out, _) = ctrl.proc(&input).unwrap();
        assert_eq!(ctrl.last_act(), out.act);

        // Without a previous actuation the one just issued is assumed
        input.prev_act = None;
        let (_, report) = ctrl.proc(&input).unwrap();

        assert_abs_diff_eq!(
            report.comp_state.v_ms,
            20.0 + out.act.throttle * params.latency_s,
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            report.comp_state.psi_rad,
            // External steering is inverted by default
            (20.0 / params.lf_m) * out.act.steer_rad * params.latency_s,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_invalid_params() {
        let params = Params {
            timestep_s: 0.0,
            ..Default::default()
        };

        assert!(matches!(
            MpcCtrl::<AlmSolver>::init(params),
            Err(MpcCtrlError::InvalidParams(_))
        ));
    }
}
