//! # Delay compensation
//!
//! A demand takes effect one latency period after it is computed. Until then
//! the vehicle keeps executing the previous demand, so the horizon must
//! start from where the vehicle will be once the latency has elapsed.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// Internal
use crate::vehicle_model::{Actuation, KinematicBicycle, VehicleState};

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Project the measured state forward by `latency_s` under the previously
/// issued actuation.
///
/// Position and heading of the measured state are reset to the vehicle frame
/// origin since the reference curve is relative to the current pose. Both
/// `measured` and `prev_act` use the model's steering convention.
pub fn compensate(
    model: &KinematicBicycle,
    measured: &VehicleState,
    prev_act: &Actuation,
    latency_s: f64
) -> VehicleState {
    let origin = VehicleState::at_origin(measured.v_ms, measured.cte_m, measured.epsi_rad);

    if latency_s == 0.0 {
        return origin;
    }

    model.step(&origin, prev_act, latency_s)
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    const LF_M: f64 = 2.67;

    #[test]
    fn test_compensate() {
        let model = KinematicBicycle::new(LF_M);
        let measured = VehicleState {
            x_m: 3.0,
            y_m: -1.0,
            psi_rad: 0.7,
            v_ms: 10.0,
            cte_m: 0.0,
            epsi_rad: 0.0,
        };
        let prev = Actuation { steer_rad: 0.1, throttle: 0.5 };

        let s = compensate(&model, &measured, &prev, 0.1);

        assert_relative_eq!(s.v_ms, 10.05, epsilon = 1e-12);
        assert_relative_eq!(s.psi_rad, -(10.0 / LF_M) * 0.1 * 0.1, epsilon = 1e-12);
        assert_relative_eq!(s.x_m, 1.0, epsilon = 1e-12);
        assert_relative_eq!(s.y_m, 0.0, epsilon = 1e-12);
        assert_relative_eq!(s.epsi_rad, s.psi_rad, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_latency() {
        let model = KinematicBicycle::new(LF_M);
        let measured = VehicleState {
            x_m: 3.0,
            y_m: -1.0,
            psi_rad: 0.7,
            v_ms: 10.0,
            cte_m: 0.3,
            epsi_rad: -0.2,
        };
        let prev = Actuation { steer_rad: 0.1, throttle: 0.5 };

        assert_eq!(
            compensate(&model, &measured, &prev, 0.0),
            VehicleState::at_origin(10.0, 0.3, -0.2)
        );
    }
}
