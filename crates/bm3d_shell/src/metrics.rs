//! Reference-based quality metrics for 8-bit images.

use crate::error::{Result, ShellError};
use crate::image::Image;

/// Peak value of an 8-bit sample.
pub const DATA_RANGE: f64 = 255.0;

/// Mean squared error between two images of the same shape.
pub fn mse(reference: &Image, test: &Image) -> Result<f64> {
    if reference.shape() != test.shape() {
        return Err(ShellError::ShapeMismatch {
            reference: reference.shape(),
            test: test.shape(),
        });
    }
    let sum: f64 = reference
        .view()
        .iter()
        .zip(test.view().iter())
        .map(|(&a, &b)| {
            let d = f64::from(a) - f64::from(b);
            d * d
        })
        .sum();
    Ok(sum / reference.view().len() as f64)
}

/// Peak signal-to-noise ratio in dB, `10 * log10(255^2 / MSE)`.
///
/// Identical images give `f64::INFINITY`.
pub fn psnr(reference: &Image, test: &Image) -> Result<f64> {
    let err = mse(reference, test)?;
    if err == 0.0 {
        return Ok(f64::INFINITY);
    }
    Ok(10.0 * (DATA_RANGE * DATA_RANGE / err).log10())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array3;

    fn flat(value: u8) -> Image {
        Image::new(Array3::from_elem((4, 4, 3), value)).unwrap()
    }

    #[test]
    fn test_identical_is_infinite() {
        assert_eq!(psnr(&flat(9), &flat(9)).unwrap(), f64::INFINITY);
        assert_eq!(mse(&flat(9), &flat(9)).unwrap(), 0.0);
    }

    #[test]
    fn test_constant_offset() {
        // MSE = 100 -> PSNR = 10 * log10(65025 / 100)
        let p = psnr(&flat(100), &flat(110)).unwrap();
        assert_relative_eq!(p, 28.130_803_608_679_1, epsilon = 1e-9);
        assert_relative_eq!(mse(&flat(110), &flat(100)).unwrap(), 100.0);
    }

    #[test]
    fn test_full_range_error_is_zero_db() {
        assert_relative_eq!(psnr(&flat(0), &flat(255)).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_shape_mismatch() {
        let grey = Image::zeros(4, 4, 1).unwrap();
        assert!(matches!(
            psnr(&flat(0), &grey),
            Err(ShellError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_more_error_lower_psnr() {
        let a = psnr(&flat(100), &flat(105)).unwrap();
        let b = psnr(&flat(100), &flat(120)).unwrap();
        assert!(a > b);
    }
}
