//! Float trait abstraction for f32/f64 support.
//!
//! The kernel and the colour transforms are written once against this trait
//! so callers can pick single or double precision.

use num_traits::{Float, FromPrimitive, NumAssign, ToPrimitive};
use rustfft::FftNum;
use std::fmt::Debug;
use std::iter::Sum;

/// Trait alias for floating point types supported by BM3D.
///
/// Combines the bounds needed by the pipeline:
/// - Basic float operations (Float, NumAssign)
/// - FFT compatibility (FftNum from rustfft)
/// - Conversion to and from primitive types
/// - Iteration support (Sum)
pub trait Bm3dFloat:
    Float + FftNum + FromPrimitive + ToPrimitive + NumAssign + Sum + Debug + Send + Sync + 'static
{
    /// The constant PI for this float type.
    const PI: Self;

    /// Largest 8-bit sample value (255).
    const SAMPLE_MAX: Self;

    /// Create a value from an f64 constant.
    fn from_f64_c(val: f64) -> Self;

    /// Create a value from a usize constant.
    fn usize_as(val: usize) -> Self;

    /// Create a value from an 8-bit sample.
    fn from_sample(val: u8) -> Self;

    /// Widen to f64 for statistics and logging.
    fn to_f64_c(self) -> f64;
}

impl Bm3dFloat for f32 {
    const PI: Self = std::f32::consts::PI;
    const SAMPLE_MAX: Self = 255.0;

    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val as f32
    }

    #[inline]
    fn usize_as(val: usize) -> Self {
        val as f32
    }

    #[inline]
    fn from_sample(val: u8) -> Self {
        f32::from(val)
    }

    #[inline]
    fn to_f64_c(self) -> f64 {
        f64::from(self)
    }
}

impl Bm3dFloat for f64 {
    const PI: Self = std::f64::consts::PI;
    const SAMPLE_MAX: Self = 255.0;

    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val
    }

    #[inline]
    fn usize_as(val: usize) -> Self {
        val as f64
    }

    #[inline]
    fn from_sample(val: u8) -> Self {
        f64::from(val)
    }

    #[inline]
    fn to_f64_c(self) -> f64 {
        self
    }
}

/// Round and clip a float sample back to the 8-bit range.
#[inline]
pub fn to_u8_sample<F: Bm3dFloat>(val: F) -> u8 {
    if !val.is_finite() {
        return 0;
    }
    let clipped = val.round().max(F::zero()).min(F::SAMPLE_MAX);
    clipped.to_u8().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_f32_trait_impl() {
        let val: f32 = Bm3dFloat::from_f64_c(std::f64::consts::PI);
        assert!((val - std::f32::consts::PI).abs() < 1e-5);

        let usize_val: f32 = Bm3dFloat::usize_as(42);
        assert_eq!(usize_val, 42.0f32);

        let sample: f32 = Bm3dFloat::from_sample(200);
        assert_eq!(sample, 200.0f32);
    }

    #[test]
    fn test_f64_trait_impl() {
        let val: f64 = Bm3dFloat::from_f64_c(std::f64::consts::PI);
        assert!((val - std::f64::consts::PI).abs() < 1e-14);

        let usize_val: f64 = Bm3dFloat::usize_as(42);
        assert_eq!(usize_val, 42.0f64);

        assert_eq!(1.5f64.to_f64_c(), 1.5);
    }

    #[test]
    fn test_sample_max() {
        assert_eq!(f32::SAMPLE_MAX, 255.0f32);
        assert_eq!(f64::SAMPLE_MAX, 255.0f64);
    }

    #[test]
    fn test_to_u8_sample_rounds_and_clips() {
        assert_eq!(to_u8_sample(-3.0f32), 0);
        assert_eq!(to_u8_sample(0.4f32), 0);
        assert_eq!(to_u8_sample(0.6f32), 1);
        assert_eq!(to_u8_sample(254.6f64), 255);
        assert_eq!(to_u8_sample(1000.0f64), 255);
        assert_eq!(to_u8_sample(f32::NAN), 0);
    }
}
