//! Float helpers missing from `core`.
//!
//! `f64::abs` and `f64::round` live in `std`; these replacements keep the
//! crate `no_std` without pulling in a libm.

/// Absolute value.
#[inline]
pub(crate) fn abs(x: f64) -> f64 {
    if x < 0.0 {
        -x
    } else {
        x
    }
}

/// Round a non-negative value to the nearest integer, halves away from zero.
///
/// Negative and non-finite inputs map to 0. Inputs are expected to be at most
/// a quantization resolution; the cast saturates above `u32::MAX`.
#[inline]
pub(crate) fn round_non_negative(x: f64) -> u32 {
    if !(x > 0.0) || !x.is_finite() {
        return 0;
    }
    (x + 0.5) as u32
}
