//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float
{
    target_range.0
        + ((value - source_range.0)
        * (target_range.1 - target_range.0)
        / (source_range.1 - source_range.0))
}

/// Apply polynomial coefficients to a value.
///
/// Coefficients are in ascending power order, i.e. if there are 3
/// coefficients the result is `c[0] + c[1]*x + c[2]*x^2`.
pub fn poly_val<T>(value: T, coeffs: &[T]) -> T
where
    T: Float
{
    // Horner's scheme from the highest power down
    coeffs
        .iter()
        .rev()
        .fold(T::zero(), |acc, &c| acc * value + c)
}

/// Evaluate the first derivative of a polynomial at a value.
///
/// Coefficients are in ascending power order, as for `poly_val`.
pub fn poly_deriv_val<T>(value: T, coeffs: &[T]) -> T
where
    T: Float
{
    let mut res = T::zero();
    let mut power = T::one();
    let mut value_pow = T::one();

    for &c in coeffs.iter().skip(1) {
        res = res + power * c * value_pow;
        power = power + T::one();
        value_pow = value_pow * value;
    }

    res
}

/// Clamp a value into the range `[min, max]`.
///
/// Unlike `f64::clamp` this does not panic if `min > max` or either bound is
/// NaN, the upper bound is applied first.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}
