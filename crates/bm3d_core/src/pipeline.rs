//! BM3D Pipeline - Core denoising kernel and multi-channel processing.

use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3, ArrayViewMut2, Axis, Zip};
use rayon::prelude::*;
use rustfft::num_complex::Complex;
use rustfft::Fft;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::block_matching::{self, IntegralImages, MatchQuery, PatchMatch};
use crate::error::{Bm3dError, Result};
use crate::float_trait::Bm3dFloat;
use crate::transforms;

// =============================================================================
// Constants for BM3D Pipeline
// =============================================================================

/// Small epsilon for numerical stability in Wiener filter division.
const WIENER_EPSILON: f64 = 1e-8;

/// Maximum allowed group weight in Wiener filtering.
const MAX_WIENER_WEIGHT: f64 = 1e6;

/// If the accumulated weight of a pixel is below this, the noisy input is kept.
const AGGREGATION_EPSILON: f64 = 1e-6;

/// Minimum chunk length for Rayon parallel iteration.
const RAYON_MIN_CHUNK_LEN: usize = 64;

const PROFILE_TIMING_ENV: &str = "BM3D_PROFILE_TIMING";
const USE_HADAMARD_ENV: &str = "BM3D_USE_HADAMARD";
static USE_HADAMARD_FAST_PATH: AtomicBool = AtomicBool::new(false);

/// Walsh-Hadamard Transform is only implemented for 8x8 patches.
const HADAMARD_PATCH_SIZE: usize = 8;

/// BM3D filtering mode.
///
/// Determines whether to use hard thresholding (first pass) or Wiener filtering (second pass).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bm3dMode {
    /// Hard thresholding: zeroes coefficients below threshold.
    /// Used as the first pass to get an initial estimate.
    HardThreshold,
    /// Wiener filtering: applies the empirical Wiener filter using the pilot estimate.
    /// Used as the second pass for refinement.
    Wiener,
}

/// Kernel parameters shared by single-channel, multi-channel and stack processing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm3dKernelConfig<F: Bm3dFloat> {
    /// Hard thresholding coefficient (ignored by the Wiener pass).
    pub threshold: F,
    pub patch_size: usize,
    pub step_size: usize,
    pub search_window: usize,
    pub max_matches: usize,
}

impl<F: Bm3dFloat> Bm3dKernelConfig<F> {
    pub fn validate(&self) -> Result<()> {
        if self.patch_size == 0 {
            return Err(Bm3dError::invalid("patch_size", "must be > 0"));
        }
        if self.step_size == 0 {
            return Err(Bm3dError::invalid("step_size", "must be > 0"));
        }
        if self.search_window == 0 {
            return Err(Bm3dError::invalid("search_window", "must be > 0"));
        }
        if self.max_matches == 0 {
            return Err(Bm3dError::invalid("max_matches", "must be > 0"));
        }
        if !self.threshold.is_finite() || self.threshold < F::zero() {
            return Err(Bm3dError::invalid("threshold", "must be finite and >= 0"));
        }
        Ok(())
    }
}

/// Pre-computed FFT plans.
///
/// Reusing plans avoids re-initialization for every group:
/// - 2D plans for patches (row/col)
/// - 1D plans for the group dimension, indexed by group size `k`
pub struct Bm3dPlans<F: Bm3dFloat> {
    patch_size: usize,
    max_matches: usize,
    fft_2d_row: Arc<dyn Fft<F>>,
    fft_2d_col: Arc<dyn Fft<F>>,
    ifft_2d_row: Arc<dyn Fft<F>>,
    ifft_2d_col: Arc<dyn Fft<F>>,
    fft_1d_plans: Vec<Arc<dyn Fft<F>>>,
    ifft_1d_plans: Vec<Arc<dyn Fft<F>>>,
}

impl<F: Bm3dFloat> Bm3dPlans<F> {
    /// Create new BM3D plans for the given patch size and maximum matches.
    pub fn new(patch_size: usize, max_matches: usize) -> Self {
        let mut planner = rustfft::FftPlanner::new();
        let fft_2d_row = planner.plan_fft_forward(patch_size);
        let fft_2d_col = planner.plan_fft_forward(patch_size);
        let ifft_2d_row = planner.plan_fft_inverse(patch_size);
        let ifft_2d_col = planner.plan_fft_inverse(patch_size);

        let mut fft_1d_plans = Vec::with_capacity(max_matches + 1);
        let mut ifft_1d_plans = Vec::with_capacity(max_matches + 1);

        // Index 0 is never used; keeps plans[k] addressable by group size.
        fft_1d_plans.push(planner.plan_fft_forward(1));
        ifft_1d_plans.push(planner.plan_fft_inverse(1));

        for k in 1..=max_matches {
            fft_1d_plans.push(planner.plan_fft_forward(k));
            ifft_1d_plans.push(planner.plan_fft_inverse(k));
        }

        Self {
            patch_size,
            max_matches,
            fft_2d_row,
            fft_2d_col,
            ifft_2d_row,
            ifft_2d_col,
            fft_1d_plans,
            ifft_1d_plans,
        }
    }

    pub fn for_config(config: &Bm3dKernelConfig<F>) -> Self {
        Self::new(config.patch_size, config.max_matches)
    }

    fn check_compatible(&self, config: &Bm3dKernelConfig<F>) -> Result<()> {
        if self.patch_size != config.patch_size || self.max_matches < config.max_matches {
            return Err(Bm3dError::DimensionMismatch {
                expected: format!(
                    "plans for patch_size {} and max_matches >= {}",
                    config.patch_size, config.max_matches
                ),
                actual: format!(
                    "plans for patch_size {} and max_matches {}",
                    self.patch_size, self.max_matches
                ),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Helper Functions for BM3D Kernel Decomposition
// =============================================================================

struct WorkerBuffers<F: Bm3dFloat> {
    matches: Vec<PatchMatch<F>>,
    g_noisy_c: Array3<Complex<F>>,
    g_pilot_c: Array3<Complex<F>>,
    spatial_patch: Array2<F>,
    line: Vec<Complex<F>>,
}

impl<F: Bm3dFloat> WorkerBuffers<F> {
    fn new(max_matches: usize, patch_size: usize) -> Self {
        let zero = Complex::new(F::zero(), F::zero());
        Self {
            matches: Vec::with_capacity(max_matches.max(1)),
            g_noisy_c: Array3::from_elem((max_matches, patch_size, patch_size), zero),
            g_pilot_c: Array3::from_elem((max_matches, patch_size, patch_size), zero),
            spatial_patch: Array2::zeros((patch_size, patch_size)),
            line: vec![zero; max_matches.max(patch_size).max(1)],
        }
    }
}

/// Per-worker numerator/denominator buffers for overlap-add aggregation.
///
/// Only the horizontal band `row_offset..row_offset + band_rows` that the
/// worker's groups can touch is allocated.
struct Accumulator<F: Bm3dFloat> {
    row_offset: usize,
    numerator: Array3<F>,
    denominator: Array3<F>,
}

impl<F: Bm3dFloat> Accumulator<F> {
    fn new(channels: usize, band: Range<usize>, cols: usize) -> Self {
        let band_rows = band.end - band.start;
        Self {
            row_offset: band.start,
            numerator: Array3::zeros((channels, band_rows, cols)),
            denominator: Array3::zeros((channels, band_rows, cols)),
        }
    }

    fn add_patch(
        &mut self,
        channel: usize,
        m: &PatchMatch<F>,
        spatial: &Array2<F>,
        weight: F,
        blend: &Array2<F>,
    ) {
        let (ph, pw) = spatial.dim();
        let row = m.row - self.row_offset;
        let window = s![channel, row..row + ph, m.col..m.col + pw];
        Zip::from(self.numerator.slice_mut(window))
            .and(self.denominator.slice_mut(window))
            .and(spatial)
            .and(blend)
            .for_each(|num, den, &val, &b| {
                let w = weight * b;
                *num += val * w;
                *den += w;
            });
    }

    /// Add this band into full-size buffers.
    fn add_into(&self, numerator: &mut Array3<F>, denominator: &mut Array3<F>) {
        let band = s![.., self.row_offset..self.row_offset + self.numerator.dim().1, ..];
        let mut num = numerator.slice_mut(band);
        num += &self.numerator;
        let mut den = denominator.slice_mut(band);
        den += &self.denominator;
    }
}

/// Image rows that groups of reference rows `first_ref..=last_ref` can write.
///
/// Matches stay within `search_window / 2` rows of their reference and never
/// start past `rows - patch_size`.
fn aggregation_band(
    first_ref: usize,
    last_ref: usize,
    rows: usize,
    patch_size: usize,
    search_window: usize,
) -> Range<usize> {
    let half = search_window / 2;
    let start = first_ref.saturating_sub(half);
    let end = (last_ref + half).min(rows - patch_size) + patch_size;
    start..end
}

#[derive(Default, Clone, Copy)]
struct KernelStageStats {
    groups: u64,
    matched_patches: u64,
    block_matching_ns: u128,
    forward_ns: u128,
    filtering_ns: u128,
    inverse_ns: u128,
    aggregation_ns: u128,
}

impl KernelStageStats {
    fn merge(self, other: Self) -> Self {
        Self {
            groups: self.groups + other.groups,
            matched_patches: self.matched_patches + other.matched_patches,
            block_matching_ns: self.block_matching_ns + other.block_matching_ns,
            forward_ns: self.forward_ns + other.forward_ns,
            filtering_ns: self.filtering_ns + other.filtering_ns,
            inverse_ns: self.inverse_ns + other.inverse_ns,
            aggregation_ns: self.aggregation_ns + other.aggregation_ns,
        }
    }
}

/// Enable or disable the 8x8 Hadamard fast path globally.
///
/// Default is `false` (quality-first FFT path).
pub fn set_use_hadamard_fast_path(enabled: bool) {
    USE_HADAMARD_FAST_PATH.store(enabled, Ordering::Relaxed);
}

/// Get current 8x8 Hadamard fast-path setting.
pub fn use_hadamard_fast_path() -> bool {
    USE_HADAMARD_FAST_PATH.load(Ordering::Relaxed)
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .ok()
        .map(|value| {
            let v = value.trim();
            v == "1"
                || v.eq_ignore_ascii_case("true")
                || v.eq_ignore_ascii_case("yes")
                || v.eq_ignore_ascii_case("on")
        })
        .unwrap_or(false)
}

/// Resolve whether the 8x8 Hadamard fast path should be used.
///
/// Set `BM3D_USE_HADAMARD=1` (or call [`set_use_hadamard_fast_path`]) to
/// trade some quality near strong edges for speed on 8x8 patches.
fn resolve_use_hadamard(patch_size: usize) -> bool {
    patch_size == HADAMARD_PATCH_SIZE && (use_hadamard_fast_path() || env_flag(USE_HADAMARD_ENV))
}

/// Reference patch positions along one axis.
///
/// Positions step by `step` from 0 and always include the last valid offset
/// `len - patch`, so every pixel is covered by at least one reference patch.
pub fn reference_positions(len: usize, patch: usize, step: usize) -> Vec<usize> {
    if patch == 0 || patch > len {
        return Vec::new();
    }
    let last = len - patch;
    let mut positions: Vec<usize> = (0..=last).step_by(step.max(1)).collect();
    if positions.last() != Some(&last) {
        positions.push(last);
    }
    positions
}

/// Build separable patch-blend weights for overlap-add aggregation.
///
/// Uses a sine window with positive edges (no hard zeros), normalized to a
/// mean weight of 1.0.
fn compute_patch_blend_weights<F: Bm3dFloat>(patch_size: usize) -> Array2<F> {
    if patch_size <= 1 {
        return Array2::ones((patch_size.max(1), patch_size.max(1)));
    }

    let n = F::usize_as(patch_size);
    let half = F::from_f64_c(0.5);
    let one_d: Vec<F> = (0..patch_size)
        .map(|i| (F::PI * (F::usize_as(i) + half) / n).sin())
        .collect();

    let mut weights = Array2::from_shape_fn((patch_size, patch_size), |(r, c)| one_d[r] * one_d[c]);
    let mean = weights.sum() / F::usize_as(patch_size * patch_size);
    if mean > F::zero() {
        weights.mapv_inplace(|v| v / mean);
    }
    weights
}

/// Forward 2D transform of every matched patch of `image` into `group[..k]`.
fn load_transformed_group<F: Bm3dFloat>(
    image: ArrayView2<F>,
    matches: &[PatchMatch<F>],
    patch_size: usize,
    use_hadamard: bool,
    plans: &Bm3dPlans<F>,
    group: &mut Array3<Complex<F>>,
    line: &mut [Complex<F>],
) {
    for (i, m) in matches.iter().enumerate() {
        let patch = image.slice(s![m.row..m.row + patch_size, m.col..m.col + patch_size]);
        let mut out = group.index_axis_mut(Axis(0), i);
        if use_hadamard {
            transforms::wht2d_8x8_forward_into(patch, &mut out);
        } else {
            transforms::fft2d_into(patch, &plans.fft_2d_row, &plans.fft_2d_col, &mut out, line);
        }
    }
}

/// Apply a 1D transform along the group dimension at each (r, c) position.
fn transform_group_dim<F: Bm3dFloat>(
    group: &mut Array3<Complex<F>>,
    k: usize,
    plan: &Arc<dyn Fft<F>>,
    line: &mut [Complex<F>],
    scale: F,
) {
    let buf = &mut line[..k];
    for mut lane in group.slice_mut(s![..k, .., ..]).lanes_mut(Axis(0)) {
        for (slot, v) in buf.iter_mut().zip(lane.iter()) {
            *slot = *v;
        }
        plan.process(buf);
        for (v, slot) in lane.iter_mut().zip(buf.iter()) {
            *v = *slot * scale;
        }
    }
}

/// Hard-threshold the first `k` transformed patches. Returns the group weight.
fn hard_threshold_group<F: Bm3dFloat>(group: &mut Array3<Complex<F>>, k: usize, cutoff: F) -> F {
    let zero = Complex::new(F::zero(), F::zero());
    let mut nz_count = 0usize;
    for coeff in group.slice_mut(s![..k, .., ..]).iter_mut() {
        if coeff.norm() < cutoff {
            *coeff = zero;
        } else {
            nz_count += 1;
        }
    }
    if nz_count > 0 {
        F::one() / (F::usize_as(nz_count) + F::one())
    } else {
        F::one()
    }
}

/// Empirical Wiener shrinkage of the noisy group using the pilot group.
/// Returns the group weight.
fn wiener_group<F: Bm3dFloat>(
    noisy: &mut Array3<Complex<F>>,
    pilot: &Array3<Complex<F>>,
    k: usize,
    noise_var: F,
    sigma_sq: F,
) -> F {
    let wiener_eps = F::from_f64_c(WIENER_EPSILON);
    let mut wiener_sum = F::zero();
    Zip::from(noisy.slice_mut(s![..k, .., ..]))
        .and(pilot.slice(s![..k, .., ..]))
        .for_each(|n, p| {
            let p_pow = p.norm_sqr();
            let w = p_pow / (p_pow + noise_var + wiener_eps);
            *n = *n * w;
            wiener_sum += w * w;
        });
    let weight = F::one() / (wiener_sum * sigma_sq + wiener_eps);
    weight.min(F::from_f64_c(MAX_WIENER_WEIGHT))
}

macro_rules! timed {
    ($enabled:expr, $acc:expr, $body:block) => {{
        if $enabled {
            let _t = Instant::now();
            let _ret = { $body };
            $acc += _t.elapsed().as_nanos();
            _ret
        } else {
            $body
        }
    }};
}

/// Core BM3D kernel over a `(channels, rows, cols)` image.
///
/// Groups are formed once per reference patch by matching on channel 0 of
/// `input_pilot` and are reused for every channel, each filtered with its own
/// noise level from `channel_sigmas`. Inputs are assumed validated.
pub fn run_bm3d_kernel<F: Bm3dFloat>(
    input_noisy: ArrayView3<F>,
    input_pilot: ArrayView3<F>,
    mode: Bm3dMode,
    channel_sigmas: &[F],
    config: &Bm3dKernelConfig<F>,
    plans: &Bm3dPlans<F>,
) -> Array3<F> {
    let use_hadamard = resolve_use_hadamard(config.patch_size);
    filter_and_aggregate(
        input_noisy,
        input_pilot,
        mode,
        channel_sigmas,
        config,
        plans,
        use_hadamard,
    )
}

/// [`run_bm3d_kernel`] with the patch transform chosen by the caller.
fn filter_and_aggregate<F: Bm3dFloat>(
    input_noisy: ArrayView3<F>,
    input_pilot: ArrayView3<F>,
    mode: Bm3dMode,
    channel_sigmas: &[F],
    config: &Bm3dKernelConfig<F>,
    plans: &Bm3dPlans<F>,
    use_hadamard: bool,
) -> Array3<F> {
    let (channels, rows, cols) = input_noisy.dim();
    let _span = tracing::debug_span!("bm3d_kernel", ?mode, channels, rows, cols).entered();

    let patch_size = config.patch_size;
    let guide = input_pilot.index_axis(Axis(0), 0);
    let integral = IntegralImages::new(guide);

    let ref_rows = reference_positions(rows, patch_size, config.step_size);
    let ref_cols = reference_positions(cols, patch_size, config.step_size);
    let total_refs = ref_rows.len() * ref_cols.len();

    let blend = compute_patch_blend_weights::<F>(patch_size);
    let spatial_scale = F::usize_as(patch_size);
    let agg_eps = F::from_f64_c(AGGREGATION_EPSILON);
    let profile_timing = env_flag(PROFILE_TIMING_ENV);
    let kernel_started = Instant::now();

    let partial = if total_refs == 0 {
        None
    } else {
        // One coordinate chunk per Rayon worker.
        let partial_count = total_refs.min(rayon::current_num_threads().max(1));
        let chunk_len = total_refs.div_ceil(partial_count).max(RAYON_MIN_CHUNK_LEN);
        let chunk_count = total_refs.div_ceil(chunk_len);

        let partials = (0..chunk_count)
            .into_par_iter()
            .map(|chunk_idx| {
                let chunk_start = chunk_idx * chunk_len;
                let chunk_end = (chunk_start + chunk_len).min(total_refs);
                let band = aggregation_band(
                    ref_rows[chunk_start / ref_cols.len()],
                    ref_rows[(chunk_end - 1) / ref_cols.len()],
                    rows,
                    patch_size,
                    config.search_window,
                );
                let mut acc = Accumulator::new(channels, band, cols);
                let mut worker = WorkerBuffers::<F>::new(config.max_matches, patch_size);
                let mut stats = KernelStageStats::default();

                for ref_index in chunk_start..chunk_end {
                    let query = MatchQuery {
                        ref_pos: (
                            ref_rows[ref_index / ref_cols.len()],
                            ref_cols[ref_index % ref_cols.len()],
                        ),
                        patch_size: (patch_size, patch_size),
                        search_window: (config.search_window, config.search_window),
                        max_matches: config.max_matches,
                        step: config.step_size,
                    };

                    // 1. Block matching on the guide channel
                    timed!(profile_timing, stats.block_matching_ns, {
                        block_matching::find_similar_patches_into(
                            guide,
                            &integral,
                            &query,
                            &mut worker.matches,
                        );
                    });
                    let k = worker.matches.len();
                    if k == 0 {
                        continue;
                    }
                    stats.groups += 1;
                    stats.matched_patches += k as u64;
                    let k_f = F::usize_as(k);

                    for (ch, &sigma) in channel_sigmas.iter().enumerate().take(channels) {
                        // 2. Forward 2D + 1D transforms
                        timed!(profile_timing, stats.forward_ns, {
                            load_transformed_group(
                                input_noisy.index_axis(Axis(0), ch),
                                &worker.matches,
                                patch_size,
                                use_hadamard,
                                plans,
                                &mut worker.g_noisy_c,
                                &mut worker.line,
                            );
                            transform_group_dim(
                                &mut worker.g_noisy_c,
                                k,
                                &plans.fft_1d_plans[k],
                                &mut worker.line,
                                F::one(),
                            );
                            if mode == Bm3dMode::Wiener {
                                load_transformed_group(
                                    input_pilot.index_axis(Axis(0), ch),
                                    &worker.matches,
                                    patch_size,
                                    use_hadamard,
                                    plans,
                                    &mut worker.g_pilot_c,
                                    &mut worker.line,
                                );
                                transform_group_dim(
                                    &mut worker.g_pilot_c,
                                    k,
                                    &plans.fft_1d_plans[k],
                                    &mut worker.line,
                                    F::one(),
                                );
                            }
                        });

                        // 3. Collaborative filtering
                        // Unnormalized transforms scale the noise std by sqrt(k) * patch_size.
                        let weight = timed!(profile_timing, stats.filtering_ns, {
                            match mode {
                                Bm3dMode::HardThreshold => {
                                    let cutoff = config.threshold * sigma * k_f.sqrt() * spatial_scale;
                                    hard_threshold_group(&mut worker.g_noisy_c, k, cutoff)
                                }
                                Bm3dMode::Wiener => {
                                    let sigma_sq = sigma * sigma;
                                    let noise_var = k_f * sigma_sq * spatial_scale * spatial_scale;
                                    wiener_group(
                                        &mut worker.g_noisy_c,
                                        &worker.g_pilot_c,
                                        k,
                                        noise_var,
                                        sigma_sq,
                                    )
                                }
                            }
                        });

                        // 4. Inverse transforms and aggregation
                        timed!(profile_timing, stats.inverse_ns, {
                            transform_group_dim(
                                &mut worker.g_noisy_c,
                                k,
                                &plans.ifft_1d_plans[k],
                                &mut worker.line,
                                F::one() / k_f,
                            );
                        });
                        for (i, matched) in worker.matches.iter().enumerate() {
                            let mut coeffs: ArrayViewMut2<Complex<F>> =
                                worker.g_noisy_c.index_axis_mut(Axis(0), i);
                            timed!(profile_timing, stats.inverse_ns, {
                                if use_hadamard {
                                    transforms::wht2d_8x8_inverse_into(
                                        coeffs.view(),
                                        &mut worker.spatial_patch,
                                    );
                                } else {
                                    transforms::ifft2d_into(
                                        &mut coeffs,
                                        &plans.ifft_2d_row,
                                        &plans.ifft_2d_col,
                                        &mut worker.spatial_patch,
                                        &mut worker.line,
                                    );
                                }
                            });
                            timed!(profile_timing, stats.aggregation_ns, {
                                acc.add_patch(ch, matched, &worker.spatial_patch, weight, &blend);
                            });
                        }
                    }
                }

                (acc, stats)
            })
            .collect::<Vec<_>>();
        Some(partials)
    };

    let mut output = input_noisy.to_owned();
    let mut stage_stats = KernelStageStats::default();
    if let Some(partials) = partial {
        let mut numerator = Array3::<F>::zeros((channels, rows, cols));
        let mut denominator = Array3::<F>::zeros((channels, rows, cols));
        for (acc, stats) in &partials {
            acc.add_into(&mut numerator, &mut denominator);
            stage_stats = stage_stats.merge(*stats);
        }
        drop(partials);
        Zip::from(&mut output)
            .and(&numerator)
            .and(&denominator)
            .for_each(|out, &num, &den| {
                if den > agg_eps {
                    *out = num / den;
                }
            });
    }

    if profile_timing {
        tracing::debug!(
            refs = total_refs,
            groups = stage_stats.groups,
            matched_patches = stage_stats.matched_patches,
            hadamard = use_hadamard,
            wall_ms = kernel_started.elapsed().as_secs_f64() * 1e3,
            block_thread_ms = stage_stats.block_matching_ns as f64 / 1e6,
            forward_thread_ms = stage_stats.forward_ns as f64 / 1e6,
            filter_thread_ms = stage_stats.filtering_ns as f64 / 1e6,
            inverse_thread_ms = stage_stats.inverse_ns as f64 / 1e6,
            agg_thread_ms = stage_stats.aggregation_ns as f64 / 1e6,
            "bm3d kernel profile"
        );
    }

    output
}

fn validate_inputs<F: Bm3dFloat>(
    noisy_dim: (usize, usize, usize),
    pilot_dim: (usize, usize, usize),
    sigmas: &[F],
    config: &Bm3dKernelConfig<F>,
    plans: &Bm3dPlans<F>,
) -> Result<()> {
    config.validate()?;
    plans.check_compatible(config)?;

    if pilot_dim != noisy_dim {
        return Err(Bm3dError::DimensionMismatch {
            expected: format!("pilot of shape {:?}", noisy_dim),
            actual: format!("{:?}", pilot_dim),
        });
    }
    let (channels, rows, cols) = noisy_dim;
    if sigmas.len() != channels {
        return Err(Bm3dError::DimensionMismatch {
            expected: format!("{} noise levels", channels),
            actual: format!("{}", sigmas.len()),
        });
    }
    if sigmas.iter().any(|s| !s.is_finite() || *s < F::zero()) {
        return Err(Bm3dError::invalid("sigma", "must be finite and >= 0"));
    }
    if rows < config.patch_size || cols < config.patch_size {
        return Err(Bm3dError::ImageTooSmall {
            rows,
            cols,
            patch_size: config.patch_size,
        });
    }
    Ok(())
}

/// Run one BM3D pass on a single 2D image.
pub fn run_bm3d_step<F: Bm3dFloat>(
    input_noisy: ArrayView2<F>,
    input_pilot: ArrayView2<F>,
    mode: Bm3dMode,
    sigma: F,
    config: &Bm3dKernelConfig<F>,
    plans: &Bm3dPlans<F>,
) -> Result<Array2<F>> {
    let noisy = input_noisy.insert_axis(Axis(0));
    let pilot = input_pilot.insert_axis(Axis(0));
    validate_inputs(noisy.dim(), pilot.dim(), &[sigma], config, plans)?;

    let output = run_bm3d_kernel(noisy, pilot, mode, &[sigma], config, plans);
    Ok(output.index_axis_move(Axis(0), 0))
}

/// Run one BM3D pass on a `(channels, rows, cols)` image with shared grouping.
///
/// Block matching uses channel 0 of the pilot (the luminance channel of a
/// decorrelated colour image); `channel_sigmas` holds one noise level per
/// channel.
pub fn run_bm3d_step_channels<F: Bm3dFloat>(
    input_noisy: ArrayView3<F>,
    input_pilot: ArrayView3<F>,
    mode: Bm3dMode,
    channel_sigmas: &[F],
    config: &Bm3dKernelConfig<F>,
    plans: &Bm3dPlans<F>,
) -> Result<Array3<F>> {
    validate_inputs(
        input_noisy.dim(),
        input_pilot.dim(),
        channel_sigmas,
        config,
        plans,
    )?;
    Ok(run_bm3d_kernel(
        input_noisy,
        input_pilot,
        mode,
        channel_sigmas,
        config,
        plans,
    ))
}

/// Run one BM3D pass on every slice of a `(n, rows, cols)` stack independently.
///
/// Each slice does its own block matching; `slice_sigmas` holds one noise
/// level per slice.
pub fn run_bm3d_step_stack<F: Bm3dFloat>(
    input_noisy: ArrayView3<F>,
    input_pilot: ArrayView3<F>,
    mode: Bm3dMode,
    slice_sigmas: &[F],
    config: &Bm3dKernelConfig<F>,
    plans: &Bm3dPlans<F>,
) -> Result<Array3<F>> {
    validate_inputs(
        input_noisy.dim(),
        input_pilot.dim(),
        slice_sigmas,
        config,
        plans,
    )?;
    let (n, rows, cols) = input_noisy.dim();

    let results: Vec<Array3<F>> = (0..n)
        .into_par_iter()
        .map(|i| {
            run_bm3d_kernel(
                input_noisy.slice(s![i..i + 1, .., ..]),
                input_pilot.slice(s![i..i + 1, .., ..]),
                mode,
                &slice_sigmas[i..i + 1],
                config,
                plans,
            )
        })
        .collect();

    let mut output = Array3::<F>::zeros((n, rows, cols));
    for (i, res) in results.into_iter().enumerate() {
        output.slice_mut(s![i..i + 1, .., ..]).assign(&res);
    }
    Ok(output)
}
