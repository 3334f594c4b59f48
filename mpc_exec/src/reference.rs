//! # Reference curve
//!
//! The reference path is given as world frame waypoints. Each cycle these are
//! moved into the vehicle frame and fitted with a cubic `y = f(x)`, from
//! which the cross track and heading errors of the vehicle are found.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

// Internal
use util::maths::{poly_deriv_val, poly_val};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Polynomial order of the reference curve.
pub const REF_CURVE_ORDER: usize = 3;

/// Number of coefficients in the reference curve.
pub const NUM_REF_COEFFS: usize = REF_CURVE_ORDER + 1;

/// Smallest ratio between diagonal elements of the fit's R factor before the
/// fit is considered rank deficient.
const RANK_TOL: f64 = 1e-10;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// A 2D pose in the world frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pose2 {
    pub x_m: f64,
    pub y_m: f64,

    /// Heading, counter-clockwise from the world x axis
    pub psi_rad: f64,
}

/// A cubic reference curve `y = c0 + c1 x + c2 x^2 + c3 x^3` in the vehicle
/// frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RefCurve {
    coeffs: [f64; NUM_REF_COEFFS],
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while building a reference curve.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RefCurveError {
    #[error("At least {needed} points are needed to fit the reference curve, got {got}")]
    InsufficientPoints { needed: usize, got: usize },

    #[error("Got {0} x values but {1} y values")]
    LengthMismatch(usize, usize),

    #[error("Reference points contain non-finite values")]
    NonFinite,

    #[error("Reference points do not have enough distinct x values to fit a curve")]
    Degenerate,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl RefCurve {
    /// Create a curve from coefficients in ascending power order.
    pub fn new(coeffs: [f64; NUM_REF_COEFFS]) -> Self {
        Self { coeffs }
    }

    pub fn coeffs(&self) -> &[f64; NUM_REF_COEFFS] {
        &self.coeffs
    }

    /// Least squares fit of the curve to vehicle frame points.
    pub fn fit(xs: &[f64], ys: &[f64]) -> Result<Self, RefCurveError> {
        if xs.len() != ys.len() {
            return Err(RefCurveError::LengthMismatch(xs.len(), ys.len()));
        }
        if xs.len() < NUM_REF_COEFFS {
            return Err(RefCurveError::InsufficientPoints {
                needed: NUM_REF_COEFFS,
                got: xs.len(),
            });
        }
        if xs.iter().chain(ys.iter()).any(|v| !v.is_finite()) {
            return Err(RefCurveError::NonFinite);
        }

        // Scale x into [-1, 1] to keep the Vandermonde matrix well conditioned
        let scale = xs.iter().fold(0.0, |m: f64, x| x.abs().max(m));
        if scale == 0.0 {
            return Err(RefCurveError::Degenerate);
        }

        let a = DMatrix::from_fn(xs.len(), NUM_REF_COEFFS, |r, c| (xs[r] / scale).powi(c as i32));
        let b = DVector::from_column_slice(ys);

        let (q, r) = a.qr().unpack();

        let max_diag = r.diagonal().iter().fold(0.0, |m: f64, d| d.abs().max(m));
        if r.diagonal().iter().any(|d| d.abs() <= RANK_TOL * max_diag) {
            return Err(RefCurveError::Degenerate);
        }

        let scaled = r
            .solve_upper_triangular(&q.tr_mul(&b))
            .ok_or(RefCurveError::Degenerate)?;

        let mut coeffs = [0.0; NUM_REF_COEFFS];
        for (k, c) in coeffs.iter_mut().enumerate() {
            *c = scaled[k] / scale.powi(k as i32);
        }

        Ok(Self { coeffs })
    }

    /// Value of the curve at `x`.
    pub fn eval(&self, x: f64) -> f64 {
        poly_val(x, &self.coeffs)
    }

    /// Gradient `dy/dx` of the curve at `x`.
    pub fn slope(&self, x: f64) -> f64 {
        poly_deriv_val(x, &self.coeffs)
    }

    /// Lateral offset of the vehicle (at the origin) from the curve, positive
    /// when the vehicle is to the left of the curve.
    pub fn cross_track_error(&self) -> f64 {
        -self.eval(0.0)
    }

    /// Vehicle heading (zero in its own frame) minus the curve's heading at
    /// the origin.
    pub fn heading_error(&self) -> f64 {
        -self.slope(0.0).atan()
    }

    /// Points along the curve for display, starting at the vehicle and
    /// spaced `spacing_m` apart in x.
    pub fn display_points(&self, num_points: usize, spacing_m: f64) -> (Vec<f64>, Vec<f64>) {
        (0..num_points)
            .map(|i| {
                let x = spacing_m * i as f64;
                (x, self.eval(x))
            })
            .unzip()
    }

    pub fn is_finite(&self) -> bool {
        self.coeffs.iter().all(|c| c.is_finite())
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Transform world frame points into the frame of a vehicle at `pose`.
pub fn to_vehicle_frame(
    pose: &Pose2,
    world_x: &[f64],
    world_y: &[f64]
) -> Result<(Vec<f64>, Vec<f64>), RefCurveError> {
    if world_x.len() != world_y.len() {
        return Err(RefCurveError::LengthMismatch(world_x.len(), world_y.len()));
    }

    let (sin_psi, cos_psi) = pose.psi_rad.sin_cos();

    Ok(world_x
        .iter()
        .zip(world_y.iter())
        .map(|(x, y)| {
            let dx = x - pose.x_m;
            let dy = y - pose.y_m;

            (dx * cos_psi + dy * sin_psi, dy * cos_psi - dx * sin_psi)
        })
        .unzip())
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fit_exact_cubic() {
        let truth = RefCurve::new([1.5, -0.3, 0.02, -0.001]);

        let xs: Vec<f64> = (0..8).map(|i| -5.0 + 12.0 * i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|&x| truth.eval(x)).collect();

        let fit = RefCurve::fit(&xs, &ys).unwrap();

        for (x, y) in xs.iter().zip(ys.iter()) {
            assert_relative_eq!(fit.eval(*x), *y, epsilon = 1e-8);
        }
        for (c, t) in fit.coeffs().iter().zip(truth.coeffs().iter()) {
            assert_relative_eq!(c, t, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_fit_errors() {
        assert!(matches!(
            RefCurve::fit(&[0.0, 1.0, 2.0], &[0.0, 1.0, 2.0]),
            Err(RefCurveError::InsufficientPoints { needed: 4, got: 3 })
        ));
        assert!(matches!(
            RefCurve::fit(&[0.0, 1.0, 2.0, 3.0], &[0.0, 1.0, 2.0]),
            Err(RefCurveError::LengthMismatch(4, 3))
        ));
        assert!(matches!(
            RefCurve::fit(&[0.0, 1.0, f64::NAN, 3.0], &[0.0; 4]),
            Err(RefCurveError::NonFinite)
        ));
        assert!(matches!(
            RefCurve::fit(&[2.0, 2.0, 2.0, 2.0, 2.0], &[0.0, 1.0, 2.0, 3.0, 4.0]),
            Err(RefCurveError::Degenerate)
        ));
    }

    #[test]
    fn test_errors_from_curve() {
        // Curve 0.5 m to the right of the vehicle, heading 45 deg to the left
        let curve = RefCurve::new([-0.5, 1.0, 0.0, 0.0]);

        assert_relative_eq!(curve.cross_track_error(), 0.5);
        assert_relative_eq!(curve.heading_error(), -std::f64::consts::FRAC_PI_4);
        assert_relative_eq!(curve.slope(3.0), 1.0);
    }

    #[test]
    fn test_display_points() {
        let curve = RefCurve::new([1.0, 0.0, 0.1, 0.0]);
        let (xs, ys) = curve.display_points(25, 2.5);

        assert_eq!(xs.len(), 25);
        assert_eq!(ys.len(), 25);
        assert_eq!(xs[0], 0.0);
        assert_relative_eq!(xs[24], 60.0);
        assert_relative_eq!(ys[2], 1.0 + 0.1 * 25.0);
    }

    #[test]
    fn test_to_vehicle_frame() {
        let pose = Pose2 {
            x_m: 10.0,
            y_m: 5.0,
            psi_rad: std::f64::consts::FRAC_PI_2,
        };

        // A point 2 m ahead and 1 m to the left of a vehicle facing world +y
        let (xs, ys) = to_vehicle_frame(&pose, &[9.0], &[7.0]).unwrap();

        assert_relative_eq!(xs[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(ys[0], 1.0, epsilon = 1e-12);

        assert!(matches!(
            to_vehicle_frame(&pose, &[1.0, 2.0], &[1.0]),
            Err(RefCurveError::LengthMismatch(2, 1))
        ));
    }
}
