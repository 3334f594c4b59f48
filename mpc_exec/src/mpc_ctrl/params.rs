//! MPC control parameters

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};

// Internal
use crate::nlp::AlmParams;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Parameters for MPC control
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Params {
    /// Number of states in the horizon, including the pinned initial state
    pub horizon_len: usize,

    /// Time between states in the horizon
    ///
    /// Units: seconds
    pub timestep_s: f64,

    /// Distance between the vehicle's centre of gravity and its front axle
    ///
    /// Units: meters
    pub lf_m: f64,

    /// Time between a demand being computed and it taking effect
    ///
    /// Units: seconds
    pub latency_s: f64,

    /// Steering demand limit, demands are bounded to `[-max, max]`
    ///
    /// Units: radians
    pub max_steer_rad: f64,

    /// Throttle demand limit, demands are bounded to `[-max, max]`. Must not
    /// be greater than 1.
    pub max_throttle: f64,

    /// Target cruise speed
    ///
    /// Units: the same as the measured speed
    pub ref_v_ms: f64,

    /// If true the reported steering is negated, giving demands which are
    /// positive counter-clockwise
    pub invert_steer_output: bool,

    /// Number of points in the reference display line
    pub ref_display_num_points: usize,

    /// Separation in x of the points in the reference display line
    ///
    /// Units: meters
    pub ref_display_spacing_m: f64,

    /// Cost function weights
    pub weights: Weights,

    /// Settings of the NLP solver
    #[serde(default)]
    pub solver: AlmParams,
}

/// Weights of each term of the horizon cost function.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Weights {
    /// Cross track error, per state
    pub cte: f64,

    /// Heading error, per state
    pub epsi: f64,

    /// Deviation from the reference speed, per state
    pub speed: f64,

    /// Steering demand, per actuation
    pub steer: f64,

    /// Throttle demand, per actuation
    pub throttle: f64,

    /// Change in steering demand between consecutive actuations
    pub steer_rate: f64,

    /// Change in throttle demand between consecutive actuations
    pub throttle_rate: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            horizon_len: 10,
            timestep_s: 0.1,
            lf_m: 2.67,
            latency_s: 0.1,
            max_steer_rad: 25f64.to_radians(),
            max_throttle: 1.0,
            ref_v_ms: 40.0,
            invert_steer_output: true,
            ref_display_num_points: 25,
            ref_display_spacing_m: 2.5,
            weights: Weights::default(),
            solver: AlmParams::default(),
        }
    }
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            cte: 2000.0,
            epsi: 2000.0,
            speed: 1.0,
            steer: 5.0,
            throttle: 5.0,
            steer_rate: 200.0,
            throttle_rate: 10.0,
        }
    }
}

impl Params {
    /// Check the parameters describe a solvable problem.
    ///
    /// Returns a description of the first invalid parameter found.
    pub fn validate(&self) -> Result<(), String> {
        if self.horizon_len < 2 {
            return Err(format!(
                "horizon_len must be at least 2, got {}",
                self.horizon_len
            ));
        }

        let positive = [
            ("timestep_s", self.timestep_s),
            ("lf_m", self.lf_m),
            ("max_steer_rad", self.max_steer_rad),
            ("max_throttle", self.max_throttle),
        ];
        for (name, val) in positive.iter() {
            if !(val.is_finite() && *val > 0.0) {
                return Err(format!("{} must be positive and finite, got {}", name, val));
            }
        }

        if self.max_throttle > 1.0 {
            return Err(format!(
                "max_throttle must not be greater than 1, got {}",
                self.max_throttle
            ));
        }

        if !(self.latency_s.is_finite() && self.latency_s >= 0.0) {
            return Err(format!(
                "latency_s must be non-negative and finite, got {}",
                self.latency_s
            ));
        }

        if !self.ref_v_ms.is_finite() {
            return Err(format!("ref_v_ms must be finite, got {}", self.ref_v_ms));
        }

        if !(self.ref_display_spacing_m.is_finite() && self.ref_display_spacing_m >= 0.0) {
            return Err(format!(
                "ref_display_spacing_m must be non-negative and finite, got {}",
                self.ref_display_spacing_m
            ));
        }

        let w = &self.weights;
        let weights = [
            ("cte", w.cte),
            ("epsi", w.epsi),
            ("speed", w.speed),
            ("steer", w.steer),
            ("throttle", w.throttle),
            ("steer_rate", w.steer_rate),
            ("throttle_rate", w.throttle_rate),
        ];
        for (name, val) in weights.iter() {
            if !(val.is_finite() && *val >= 0.0) {
                return Err(format!(
                    "weights.{} must be non-negative and finite, got {}",
                    name, val
                ));
            }
        }

        let s = &self.solver;
        if s.max_outer_iters == 0 || s.max_inner_iters == 0 {
            return Err(String::from("solver iteration limits must be non-zero"));
        }
        if !(s.constraint_tol > 0.0 && s.optimality_tol > 0.0) {
            return Err(String::from("solver tolerances must be positive"));
        }
        if s.initial_inner_tol < s.optimality_tol {
            return Err(String::from(
                "solver.initial_inner_tol must not be below solver.optimality_tol",
            ));
        }
        if !(s.inner_tol_update_factor > 0.0 && s.inner_tol_update_factor < 1.0)
            || !(s.sufficient_decrease > 0.0 && s.sufficient_decrease < 1.0)
        {
            return Err(String::from(
                "solver.inner_tol_update_factor and solver.sufficient_decrease must be in (0, 1)",
            ));
        }
        if !(s.initial_penalty > 0.0 && s.penalty_update_factor > 1.0) {
            return Err(String::from(
                "solver.initial_penalty must be positive and solver.penalty_update_factor above 1",
            ));
        }
        if s.lbfgs_memory == 0 || s.max_solve_time_ms == Some(0) {
            return Err(String::from(
                "solver.lbfgs_memory and solver.max_solve_time_ms must be non-zero",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        assert!(Params::default().validate().is_ok());
    }

    #[test]
    fn test_invalid() {
        let mut p = Params::default();
        p.horizon_len = 1;
        assert!(p.validate().is_err());

        let mut p = Params::default();
        p.timestep_s = 0.0;
        assert!(p.validate().unwrap_err().contains("timestep_s"));

        let mut p = Params::default();
        p.max_throttle = 1.5;
        assert!(p.validate().is_err());

        let mut p = Params::default();
        p.latency_s = -0.1;
        assert!(p.validate().is_err());

        let mut p = Params::default();
        p.weights.cte = f64::NAN;
        assert!(p.validate().unwrap_err().contains("weights.cte"));

        let mut p = Params::default();
        p.solver.penalty_update_factor = 1.0;
        assert!(p.validate().unwrap_err().contains("penalty_update_factor"));

        let mut p = Params::default();
        p.solver.initial_inner_tol = 1e-9;
        assert!(p.validate().unwrap_err().contains("initial_inner_tol"));

        let mut p = Params::default();
        p.solver.max_solve_time_ms = Some(0);
        assert!(p.validate().is_err());
    }

    #[test]
    fn test_from_toml() {
        let p: Params = util::params::from_toml_str(
            r#"
            horizon_len = 12
            timestep_s = 0.05
            lf_m = 2.67
            latency_s = 0.0
            max_steer_rad = 0.4
            max_throttle = 1.0
            ref_v_ms = 30.0
            invert_steer_output = false
            ref_display_num_points = 10
            ref_display_spacing_m = 2.0

            [weights]
            cte = 1.0
            epsi = 2.0
            speed = 3.0
            steer = 4.0
            throttle = 5.0
            steer_rate = 6.0
            throttle_rate = 7.0

            [solver]
            max_outer_iters = 20
            max_solve_time_ms = 50
            "#,
        )
        .unwrap();

        assert_eq!(p.horizon_len, 12);
        assert_eq!(p.weights.throttle_rate, 7.0);
        assert_eq!(p.solver.max_outer_iters, 20);
        assert_eq!(p.solver.max_inner_iters, AlmParams::default().max_inner_iters);
        assert_eq!(p.solver.max_solve_time_ms, Some(50));
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_shipped_params() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../params/mpc_ctrl.toml");
        let p: Params = util::params::load_from_path(path).unwrap();

        assert!(p.validate().is_ok());
        assert_eq!(p.horizon_len, Params::default().horizon_len);
        assert_eq!(p.weights, Weights::default());
        assert_eq!(p.solver, AlmParams::default());
    }
}
