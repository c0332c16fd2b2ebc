use ndarray::{Array2, ArrayView2, ArrayViewMut2};
use rustfft::{num_complex::Complex, Fft};
use std::sync::Arc;

use crate::float_trait::Bm3dFloat;

/// Compute the unnormalized 2D FFT of `input` into `out`.
///
/// `line` must hold at least `max(rows, cols)` elements; it is used as the
/// per-row / per-column work buffer.
pub fn fft2d_into<F: Bm3dFloat>(
    input: ArrayView2<F>,
    fft_row_plan: &Arc<dyn Fft<F>>,
    fft_col_plan: &Arc<dyn Fft<F>>,
    out: &mut ArrayViewMut2<Complex<F>>,
    line: &mut [Complex<F>],
) {
    let (rows, cols) = input.dim();

    for r in 0..rows {
        let row_buf = &mut line[..cols];
        for (slot, &v) in row_buf.iter_mut().zip(input.row(r).iter()) {
            *slot = Complex::new(v, F::zero());
        }
        fft_row_plan.process(row_buf);
        for (c, v) in row_buf.iter().enumerate() {
            out[[r, c]] = *v;
        }
    }

    for c in 0..cols {
        let col_buf = &mut line[..rows];
        for (r, slot) in col_buf.iter_mut().enumerate() {
            *slot = out[[r, c]];
        }
        fft_col_plan.process(col_buf);
        for (r, v) in col_buf.iter().enumerate() {
            out[[r, c]] = *v;
        }
    }
}

/// Compute the 2D inverse FFT of `input` into `out`, normalized by 1/(rows*cols).
///
/// `input` is consumed as scratch and left in an unspecified state.
pub fn ifft2d_into<F: Bm3dFloat>(
    input: &mut ArrayViewMut2<Complex<F>>,
    ifft_row_plan: &Arc<dyn Fft<F>>,
    ifft_col_plan: &Arc<dyn Fft<F>>,
    out: &mut Array2<F>,
    line: &mut [Complex<F>],
) {
    let (rows, cols) = input.dim();

    for c in 0..cols {
        let col_buf = &mut line[..rows];
        for (r, slot) in col_buf.iter_mut().enumerate() {
            *slot = input[[r, c]];
        }
        ifft_col_plan.process(col_buf);
        for (r, v) in col_buf.iter().enumerate() {
            input[[r, c]] = *v;
        }
    }

    let norm_factor = F::one() / F::usize_as(rows * cols);
    for r in 0..rows {
        let row_buf = &mut line[..cols];
        for (c, slot) in row_buf.iter_mut().enumerate() {
            *slot = input[[r, c]];
        }
        ifft_row_plan.process(row_buf);
        for (c, v) in row_buf.iter().enumerate() {
            out[[r, c]] = v.re * norm_factor;
        }
    }
}

/// Compute the unnormalized 2D FFT of a patch using pre-computed plans.
pub fn fft2d<F: Bm3dFloat>(
    input: ArrayView2<F>,
    fft_row_plan: &Arc<dyn Fft<F>>,
    fft_col_plan: &Arc<dyn Fft<F>>,
) -> Array2<Complex<F>> {
    let (rows, cols) = input.dim();
    let mut output = Array2::<Complex<F>>::zeros((rows, cols));
    let mut line = vec![Complex::new(F::zero(), F::zero()); rows.max(cols)];
    fft2d_into(
        input,
        fft_row_plan,
        fft_col_plan,
        &mut output.view_mut(),
        &mut line,
    );
    output
}

/// Compute the normalized 2D inverse FFT of a patch using pre-computed plans.
pub fn ifft2d<F: Bm3dFloat>(
    input: &Array2<Complex<F>>,
    ifft_row_plan: &Arc<dyn Fft<F>>,
    ifft_col_plan: &Arc<dyn Fft<F>>,
) -> Array2<F> {
    let (rows, cols) = input.dim();
    let mut work = input.clone();
    let mut output = Array2::<F>::zeros((rows, cols));
    let mut line = vec![Complex::new(F::zero(), F::zero()); rows.max(cols)];
    ifft2d_into(
        &mut work.view_mut(),
        ifft_row_plan,
        ifft_col_plan,
        &mut output,
        &mut line,
    );
    output
}

/// In-place Fast Walsh-Hadamard Transform (natural order) for 8 elements.
///
/// Butterfly network of additions and subtractions only: 8 log2(8) = 24 ops.
#[inline(always)]
fn fwht8<F: Bm3dFloat>(buf: &mut [F; 8]) {
    let mut stride = 1;
    while stride < 8 {
        let mut base = 0;
        while base < 8 {
            for i in base..base + stride {
                let a = buf[i];
                let b = buf[i + stride];
                buf[i] = a + b;
                buf[i + stride] = a - b;
            }
            base += stride * 2;
        }
        stride *= 2;
    }
}

/// Separable 8x8 WHT over a row-major buffer.
#[inline(always)]
fn wht2d_8x8_in_place<F: Bm3dFloat>(data: &mut [F; 64]) {
    for r in 0..8 {
        let mut row_buf = [F::zero(); 8];
        row_buf.copy_from_slice(&data[r * 8..r * 8 + 8]);
        fwht8(&mut row_buf);
        data[r * 8..r * 8 + 8].copy_from_slice(&row_buf);
    }
    for c in 0..8 {
        let mut col_buf = [F::zero(); 8];
        for r in 0..8 {
            col_buf[r] = data[r * 8 + c];
        }
        fwht8(&mut col_buf);
        for r in 0..8 {
            data[r * 8 + c] = col_buf[r];
        }
    }
}

/// 2D WHT of an 8x8 patch into `out` (imaginary parts zero).
pub fn wht2d_8x8_forward_into<F: Bm3dFloat>(
    input: ArrayView2<F>,
    out: &mut ArrayViewMut2<Complex<F>>,
) {
    let mut data = [F::zero(); 64];
    for ((r, c), &v) in input.indexed_iter() {
        data[r * 8 + c] = v;
    }
    wht2d_8x8_in_place(&mut data);
    for r in 0..8 {
        for c in 0..8 {
            out[[r, c]] = Complex::new(data[r * 8 + c], F::zero());
        }
    }
}

/// Inverse 2D WHT of an 8x8 patch into `out`. Imaginary parts are ignored.
pub fn wht2d_8x8_inverse_into<F: Bm3dFloat>(
    input: ArrayView2<Complex<F>>,
    out: &mut Array2<F>,
) {
    let mut data = [F::zero(); 64];
    for ((r, c), v) in input.indexed_iter() {
        data[r * 8 + c] = v.re;
    }
    wht2d_8x8_in_place(&mut data);
    let norm_scale = F::one() / F::usize_as(64);
    for r in 0..8 {
        for c in 0..8 {
            out[[r, c]] = data[r * 8 + c] * norm_scale;
        }
    }
}

/// 2D WHT for an 8x8 patch. Returns Complex (im=0) for compatibility with the FFT path.
pub fn wht2d_8x8_forward<F: Bm3dFloat>(input: ArrayView2<F>) -> Array2<Complex<F>> {
    let mut output = Array2::<Complex<F>>::zeros((8, 8));
    wht2d_8x8_forward_into(input, &mut output.view_mut());
    output
}

/// 2D inverse WHT for an 8x8 patch.
pub fn wht2d_8x8_inverse<F: Bm3dFloat>(input: &Array2<Complex<F>>) -> Array2<F> {
    let mut output = Array2::<F>::zeros((8, 8));
    wht2d_8x8_inverse_into(input.view(), &mut output);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustfft::FftPlanner;

    struct SimpleLcg {
        state: u64,
    }

    impl SimpleLcg {
        fn new(seed: u64) -> Self {
            Self { state: seed }
        }

        fn next_f64(&mut self) -> f64 {
            // [-1.0, 1.0)
            self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((self.state >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
        }
    }

    fn random_matrix_f32(rows: usize, cols: usize, seed: u64) -> Array2<f32> {
        let mut rng = SimpleLcg::new(seed);
        Array2::from_shape_fn((rows, cols), |_| rng.next_f64() as f32)
    }

    fn random_matrix_f64(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
        let mut rng = SimpleLcg::new(seed);
        Array2::from_shape_fn((rows, cols), |_| rng.next_f64())
    }

    #[allow(clippy::type_complexity)]
    fn plans<F: Bm3dFloat>(
        rows: usize,
        cols: usize,
    ) -> (Arc<dyn Fft<F>>, Arc<dyn Fft<F>>, Arc<dyn Fft<F>>, Arc<dyn Fft<F>>) {
        let mut planner = FftPlanner::<F>::new();
        (
            planner.plan_fft_forward(cols),
            planner.plan_fft_forward(rows),
            planner.plan_fft_inverse(cols),
            planner.plan_fft_inverse(rows),
        )
    }

    fn max_abs_diff_f32(a: &Array2<f32>, b: &Array2<f32>) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).abs())
            .fold(0.0f32, f32::max)
    }

    #[test]
    fn test_fft2d_roundtrip_various_sizes() {
        for (rows, cols) in [(4, 4), (8, 8), (16, 16), (4, 8), (8, 16)] {
            let input = random_matrix_f32(rows, cols, (rows * 1000 + cols) as u64);
            let (fft_row, fft_col, ifft_row, ifft_col) = plans::<f32>(rows, cols);

            let freq = fft2d(input.view(), &fft_row, &fft_col);
            let output = ifft2d(&freq, &ifft_row, &ifft_col);

            let diff = max_abs_diff_f32(&input, &output);
            assert!(diff < 1e-5, "FFT roundtrip failed for {}x{}: {}", rows, cols, diff);
        }
    }

    #[test]
    fn test_fft2d_roundtrip_f64() {
        let input = random_matrix_f64(8, 8, 12345);
        let (fft_row, fft_col, ifft_row, ifft_col) = plans::<f64>(8, 8);

        let freq = fft2d(input.view(), &fft_row, &fft_col);
        let output = ifft2d(&freq, &ifft_row, &ifft_col);

        for (a, b) in input.iter().zip(output.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_fft2d_constant_has_only_dc() {
        let input = Array2::<f32>::from_elem((8, 8), 2.0);
        let (fft_row, fft_col, _, _) = plans::<f32>(8, 8);
        let freq = fft2d(input.view(), &fft_row, &fft_col);

        assert!((freq[[0, 0]].re - 128.0).abs() < 1e-4);
        for ((r, c), v) in freq.indexed_iter() {
            if (r, c) != (0, 0) {
                assert!(v.norm() < 1e-4, "non-DC energy at ({}, {})", r, c);
            }
        }
    }

    #[test]
    fn test_fft2d_parseval() {
        // sum |x|^2 = (1/N) sum |X|^2 for the unnormalized transform
        let input = random_matrix_f64(8, 8, 999);
        let (fft_row, fft_col, _, _) = plans::<f64>(8, 8);
        let freq = fft2d(input.view(), &fft_row, &fft_col);

        let spatial: f64 = input.iter().map(|v| v * v).sum();
        let spectral: f64 = freq.iter().map(|v| v.norm_sqr()).sum::<f64>() / 64.0;
        assert!((spatial - spectral).abs() < 1e-9);
    }

    #[test]
    fn test_wht_8x8_roundtrip() {
        for seed in 0..5u64 {
            let input = random_matrix_f32(8, 8, seed * 7919);
            let freq = wht2d_8x8_forward(input.view());
            let output = wht2d_8x8_inverse(&freq);
            assert!(max_abs_diff_f32(&input, &output) < 1e-5);
        }
    }

    #[test]
    fn test_wht_constant() {
        let input = Array2::<f64>::from_elem((8, 8), 1.0);
        let output = wht2d_8x8_forward(input.view());
        assert_eq!(output[[0, 0]].re, 64.0);
        for ((r, c), v) in output.indexed_iter() {
            if (r, c) != (0, 0) {
                assert_eq!(v.re, 0.0);
            }
            assert_eq!(v.im, 0.0);
        }
    }

    #[test]
    fn test_wht_impulse_is_flat() {
        let mut input = Array2::<f32>::zeros((8, 8));
        input[[0, 0]] = 1.0;
        let output = wht2d_8x8_forward(input.view());
        for v in output.iter() {
            assert_eq!(v.re, 1.0);
        }
    }
}
