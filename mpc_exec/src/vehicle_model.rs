//! # Vehicle model
//!
//! Discrete time kinematic bicycle model of the vehicle. The model is used
//! both to project the measured state over the actuation latency and as the
//! dynamics constraints of the horizon optimisation.
//!
//! All quantities are in the vehicle frame at the time the optimisation is
//! formulated: `x` forwards, `y` to the left. Positive steering turns the
//! vehicle clockwise, i.e. reduces the heading.
//!
//! The model is generic over `num_dual::DualNum` so that evaluating it with
//! dual numbers gives exact first derivatives.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::SMatrix;
use num_dual::{Dual64, DualNum};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Number of elements in the vehicle state.
pub const NUM_STATES: usize = 6;

/// Number of actuators.
pub const NUM_ACTUATORS: usize = 2;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// State of the vehicle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleState<T = f64> {
    /// Longitudinal position
    ///
    /// Units: meters
    pub x_m: T,

    /// Lateral position
    ///
    /// Units: meters
    pub y_m: T,

    /// Heading
    ///
    /// Units: radians
    pub psi_rad: T,

    /// Speed
    ///
    /// Units: meters/second
    pub v_ms: T,

    /// Cross track error, the lateral offset of the vehicle from the
    /// reference curve
    ///
    /// Units: meters
    pub cte_m: T,

    /// Heading error, vehicle heading minus the heading of the reference
    /// curve
    ///
    /// Units: radians
    pub epsi_rad: T,
}

/// A pair of actuator demands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Actuation<T = f64> {
    /// Steering angle, positive clockwise
    ///
    /// Units: radians
    pub steer_rad: T,

    /// Throttle, negative values brake
    ///
    /// Units: meters/second^2 at full scale
    pub throttle: T,
}

/// The kinematic bicycle model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KinematicBicycle {
    /// Distance from the centre of gravity to the front axle
    pub lf_m: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl<T: Clone> VehicleState<T> {
    /// The state as an array in `[x, y, psi, v, cte, epsi]` order.
    pub fn to_array(&self) -> [T; NUM_STATES] {
        [
            self.x_m.clone(),
            self.y_m.clone(),
            self.psi_rad.clone(),
            self.v_ms.clone(),
            self.cte_m.clone(),
            self.epsi_rad.clone(),
        ]
    }

    pub fn from_array(a: [T; NUM_STATES]) -> Self {
        let [x_m, y_m, psi_rad, v_ms, cte_m, epsi_rad] = a;
        Self { x_m, y_m, psi_rad, v_ms, cte_m, epsi_rad }
    }
}

impl VehicleState<f64> {
    /// A state at the vehicle frame origin with the given speed and errors.
    pub fn at_origin(v_ms: f64, cte_m: f64, epsi_rad: f64) -> Self {
        Self {
            v_ms,
            cte_m,
            epsi_rad,
            ..Default::default()
        }
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

impl<T: Clone> Actuation<T> {
    /// The actuation as an array in `[steer, throttle]` order.
    pub fn to_array(&self) -> [T; NUM_ACTUATORS] {
        [self.steer_rad.clone(), self.throttle.clone()]
    }

    pub fn from_array(a: [T; NUM_ACTUATORS]) -> Self {
        let [steer_rad, throttle] = a;
        Self { steer_rad, throttle }
    }
}

impl Actuation<f64> {
    pub fn is_finite(&self) -> bool {
        self.steer_rad.is_finite() && self.throttle.is_finite()
    }
}

impl KinematicBicycle {
    pub fn new(lf_m: f64) -> Self {
        Self { lf_m }
    }

    /// Advance the state by `dt_s` seconds with the actuation held constant.
    pub fn step<T: DualNum<f64>>(
        &self,
        state: &VehicleState<T>,
        act: &Actuation<T>,
        dt_s: f64
    ) -> VehicleState<T> {
        let yaw_change = state.v_ms.clone() * act.steer_rad.clone() / self.lf_m * dt_s;

        VehicleState {
            x_m: state.x_m.clone() + state.v_ms.clone() * state.psi_rad.cos() * dt_s,
            y_m: state.y_m.clone() + state.v_ms.clone() * state.psi_rad.sin() * dt_s,
            psi_rad: state.psi_rad.clone() - yaw_change.clone(),
            v_ms: state.v_ms.clone() + act.throttle.clone() * dt_s,
            cte_m: state.cte_m.clone() + state.v_ms.clone() * state.epsi_rad.sin() * dt_s,
            epsi_rad: state.epsi_rad.clone() - yaw_change,
        }
    }

    /// Jacobians of `step` with respect to the state and the actuation,
    /// evaluated at the given point.
    ///
    /// Element `(j, i)` of the first matrix is `d next_j / d state_i`.
    pub fn jacobian(
        &self,
        state: &VehicleState<f64>,
        act: &Actuation<f64>,
        dt_s: f64
    ) -> (
        SMatrix<f64, NUM_STATES, NUM_STATES>,
        SMatrix<f64, NUM_STATES, NUM_ACTUATORS>,
    ) {
        let mut a = SMatrix::zeros();
        let mut b = SMatrix::zeros();

        let state_arr = state.to_array().map(Dual64::from);
        let act_arr = act.to_array().map(Dual64::from);

        let state_dual = VehicleState::from_array(state_arr);
        let act_dual = Actuation::from_array(act_arr);

        for i in 0..NUM_STATES {
            let mut perturbed = state_arr;
            perturbed[i].eps = 1.0;

            let next = self
                .step(&VehicleState::from_array(perturbed), &act_dual, dt_s)
                .to_array();
            for j in 0..NUM_STATES {
                a[(j, i)] = next[j].eps;
            }
        }

        for i in 0..NUM_ACTUATORS {
            let mut perturbed = act_arr;
            perturbed[i].eps = 1.0;

            let next = self
                .step(&state_dual, &Actuation::from_array(perturbed), dt_s)
                .to_array();
            for j in 0..NUM_STATES {
                b[(j, i)] = next[j].eps;
            }
        }

        (a, b)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    const LF_M: f64 = 2.67;

    fn test_state() -> VehicleState {
        VehicleState {
            x_m: 1.2,
            y_m: -0.4,
            psi_rad: 0.3,
            v_ms: 12.0,
            cte_m: 0.8,
            epsi_rad: -0.15,
        }
    }

    #[test]
    fn test_step_inverts() {
        let model = KinematicBicycle::new(LF_M);
        let s = test_state();
        let act = Actuation { steer_rad: 0.2, throttle: -0.6 };
        let dt = 0.1;

        let next = model.step(&s, &act, dt);

        // Undo the speed and heading updates
        let v = next.v_ms - act.throttle * dt;
        let yaw_change = v * act.steer_rad / LF_M * dt;
        let psi = next.psi_rad + yaw_change;
        let epsi = next.epsi_rad + yaw_change;

        assert_relative_eq!(v, s.v_ms, epsilon = 1e-12);
        assert_relative_eq!(psi, s.psi_rad, epsilon = 1e-12);
        assert_relative_eq!(epsi, s.epsi_rad, epsilon = 1e-12);
        assert_relative_eq!(next.x_m - v * psi.cos() * dt, s.x_m, epsilon = 1e-12);
        assert_relative_eq!(next.y_m - v * psi.sin() * dt, s.y_m, epsilon = 1e-12);
        assert_relative_eq!(next.cte_m - v * epsi.sin() * dt, s.cte_m, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_speed() {
        let model = KinematicBicycle::new(LF_M);
        let s = VehicleState::at_origin(0.0, 0.5, 0.1);
        let act = Actuation { steer_rad: 0.4, throttle: 0.0 };

        let next = model.step(&s, &act, 0.1);

        assert!(next.is_finite());
        assert_eq!(next, s);
    }

    #[test]
    fn test_jacobian() {
        let model = KinematicBicycle::new(LF_M);
        let s = test_state();
        let act = Actuation { steer_rad: -0.1, throttle: 0.4 };
        let dt = 0.1;
        let h = 1e-6;

        let (a, b) = model.jacobian(&s, &act, dt);

        // Central differences
        for i in 0..NUM_STATES {
            let mut plus = s.to_array();
            let mut minus = s.to_array();
            plus[i] += h;
            minus[i] -= h;

            let fp = model.step(&VehicleState::from_array(plus), &act, dt).to_array();
            let fm = model.step(&VehicleState::from_array(minus), &act, dt).to_array();

            for j in 0..NUM_STATES {
                assert_relative_eq!(a[(j, i)], (fp[j] - fm[j]) / (2.0 * h), epsilon = 1e-6);
            }
        }

        for i in 0..NUM_ACTUATORS {
            let mut plus = act.to_array();
            let mut minus = act.to_array();
            plus[i] += h;
            minus[i] -= h;

            let fp = model.step(&s, &Actuation::from_array(plus), dt).to_array();
            let fm = model.step(&s, &Actuation::from_array(minus), dt).to_array();

            for j in 0..NUM_STATES {
                assert_relative_eq!(b[(j, i)], (fp[j] - fm[j]) / (2.0 * h), epsilon = 1e-6);
            }
        }

        // Spot check a few analytical entries
        assert_relative_eq!(a[(0, 2)], -s.v_ms * s.psi_rad.sin() * dt, epsilon = 1e-12);
        assert_relative_eq!(b[(2, 0)], -s.v_ms / LF_M * dt, epsilon = 1e-12);
        assert_relative_eq!(b[(3, 1)], dt, epsilon = 1e-12);
    }
}
