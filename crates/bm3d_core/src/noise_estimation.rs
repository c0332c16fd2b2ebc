use crate::float_trait::Bm3dFloat;
use ndarray::{Array2, ArrayView2, ArrayView3, Axis};

/// Daubechies-3 wavelet high-pass decomposition filter coefficients.
/// These coefficients correspond to the decomposition high-pass filter (dec_hi).
/// L2 norm is 1.0.
const DB3_DEC_HI: [f64; 6] = [
    -0.33267055,
    0.80689151,
    -0.45987750,
    -0.13501102,
    0.08544127,
    0.03522629,
];

/// Gaussian MAD consistency constant (1 / 0.6745).
const MAD_TO_SIGMA: f64 = 1.4826;

/// Estimate the standard deviation of additive white Gaussian noise.
///
/// The image is filtered with the db3 high-pass along rows and then along
/// columns (the diagonal detail band). Smooth content is suppressed there while
/// white noise passes with unit gain, so `1.4826 * MAD` of the response is a
/// robust estimate of sigma in the units of the input.
pub fn estimate_noise_sigma<F: Bm3dFloat>(image: ArrayView2<F>) -> F {
    let (rows, cols) = image.dim();
    if rows == 0 || cols == 0 {
        return F::zero();
    }

    let db3_kernel: Vec<F> = DB3_DEC_HI.iter().map(|&x| F::from_f64_c(x)).collect();
    let horizontal = convolve_1d_horizontal(image, &db3_kernel);
    let diagonal = convolve_1d_vertical(horizontal.view(), &db3_kernel);

    compute_mad(diagonal.view()) * F::from_f64_c(MAD_TO_SIGMA)
}

/// Mean of the per-channel estimates of a `(channels, rows, cols)` image.
pub fn estimate_noise_sigma_channels<F: Bm3dFloat>(image: ArrayView3<F>) -> F {
    let channels = image.len_of(Axis(0));
    if channels == 0 {
        return F::zero();
    }
    let total: F = image
        .axis_iter(Axis(0))
        .map(|plane| estimate_noise_sigma(plane))
        .sum();
    total / F::usize_as(channels)
}

fn convolve_1d_vertical<F: Bm3dFloat>(data: ArrayView2<F>, kernel: &[F]) -> Array2<F> {
    let (rows, cols) = data.dim();
    let radius = kernel.len() / 2;
    let mut output = Array2::zeros((rows, cols));

    for c in 0..cols {
        for r in 0..rows {
            let mut sum = F::zero();
            for (k, &k_val) in kernel.iter().enumerate() {
                let k_idx = k as isize - radius as isize;
                let src_r = (r as isize + k_idx).clamp(0, (rows - 1) as isize);
                sum += data[[src_r as usize, c]] * k_val;
            }
            output[[r, c]] = sum;
        }
    }
    output
}

fn convolve_1d_horizontal<F: Bm3dFloat>(data: ArrayView2<F>, kernel: &[F]) -> Array2<F> {
    let (rows, cols) = data.dim();
    let radius = kernel.len() / 2;
    let mut output = Array2::zeros((rows, cols));

    for r in 0..rows {
        for c in 0..cols {
            let mut sum = F::zero();
            for (k, &k_val) in kernel.iter().enumerate() {
                let k_idx = k as isize - radius as isize;
                let src_c = (c as isize + k_idx).clamp(0, (cols - 1) as isize);
                sum += data[[r, src_c as usize]] * k_val;
            }
            output[[r, c]] = sum;
        }
    }
    output
}

fn median_of_slice<F: Bm3dFloat>(data: &mut [F]) -> F {
    let len = data.len();
    if len == 0 {
        return F::zero();
    }
    let mid = len / 2;

    // select_nth_unstable finds the median in O(n)
    let (left_part, &mut median, _) = data.select_nth_unstable_by(mid, |a, b| {
        a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
    });

    if len % 2 == 1 {
        median
    } else {
        // Everything left of mid is <= median; the other middle value is its max.
        let prev_median = left_part
            .iter()
            .fold(F::neg_infinity(), |a, &b| if b > a { b } else { a });
        (prev_median + median) / F::from_f64_c(2.0)
    }
}

fn compute_mad<F: Bm3dFloat>(data: ArrayView2<F>) -> F {
    let mut flat_data: Vec<F> = data.iter().cloned().collect();
    let median = median_of_slice(&mut flat_data);

    let mut deviations: Vec<F> = flat_data.iter().map(|&x| (x - median).abs()).collect();

    median_of_slice(&mut deviations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};
    use rand::prelude::*;
    use rand_distr::{Distribution, Normal};

    fn generate_white_noise(height: usize, width: usize, sigma: f32, seed: u64) -> Array2<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, sigma).unwrap();
        Array2::from_shape_fn((height, width), |_| normal.sample(&mut rng))
    }

    #[test]
    fn test_median_even_and_odd() {
        let mut odd = vec![3.0f32, 1.0, 2.0];
        assert_eq!(median_of_slice(&mut odd), 2.0);
        let mut even = vec![4.0f32, 1.0, 3.0, 2.0];
        assert_eq!(median_of_slice(&mut even), 2.5);
        let mut empty: Vec<f32> = Vec::new();
        assert_eq!(median_of_slice(&mut empty), 0.0);
    }

    #[test]
    fn test_estimate_known_sigma_white_noise() {
        let sigma_true = 10.0;
        let noise_img = generate_white_noise(256, 256, sigma_true, 42);

        let sigma_est = estimate_noise_sigma(noise_img.view());
        let error = (sigma_est - sigma_true).abs() / sigma_true;

        assert!(
            error < 0.10,
            "Error {:.2}% exceeds 10% tolerance",
            error * 100.0
        );
    }

    #[test]
    fn test_relative_noise_levels() {
        let img_low = generate_white_noise(128, 128, 2.0, 42);
        let img_high = generate_white_noise(128, 128, 20.0, 42);

        let est_low = estimate_noise_sigma(img_low.view());
        let est_high = estimate_noise_sigma(img_high.view());

        assert!(est_high > est_low);
        let ratio = est_high / est_low;
        assert!(
            ratio > 8.0 && ratio < 12.0,
            "Expected ratio ~10, got {}",
            ratio
        );
    }

    #[test]
    fn test_smooth_structure_insensitivity() {
        let (height, width) = (256, 256);
        let ramp = Array2::<f32>::from_shape_fn((height, width), |(r, c)| {
            100.0 + 50.0 * (r as f32 / 40.0).sin() + 0.3 * c as f32
        });
        let combined = &ramp + &generate_white_noise(height, width, 5.0, 7);

        let sigma_est = estimate_noise_sigma(combined.view());
        assert!(
            (sigma_est - 5.0).abs() < 1.0,
            "Estimator affected by smooth structure. Got {}",
            sigma_est
        );
    }

    #[test]
    fn test_constant_image_has_zero_sigma() {
        let img = Array2::<f64>::from_elem((32, 32), 128.0);
        assert!(estimate_noise_sigma(img.view()).abs() < 1e-9);
    }

    #[test]
    fn test_channels_average() {
        let mut img = Array3::<f32>::zeros((3, 128, 128));
        for (i, sigma) in [4.0f32, 8.0, 12.0].iter().enumerate() {
            img.index_axis_mut(Axis(0), i)
                .assign(&generate_white_noise(128, 128, *sigma, 100 + i as u64));
        }
        let est = estimate_noise_sigma_channels(img.view());
        assert!((est - 8.0).abs() < 1.0, "got {}", est);
    }

    #[test]
    fn test_f64_support() {
        let sigma_true = 0.05f64;
        let mut rng = StdRng::seed_from_u64(999);
        let normal = Normal::new(0.0, sigma_true).unwrap();
        let img = Array2::<f64>::from_shape_fn((256, 256), |_| normal.sample(&mut rng));

        let sigma_est = estimate_noise_sigma(img.view());
        let error = (sigma_est - sigma_true).abs() / sigma_true;
        assert!(error < 0.10, "f64 estimation failed with error {:.2}%", error * 100.0);
    }
}
