//! Two-pass BM3D for 8-bit grey and colour images.
//!
//! Images are `(rows, cols, channels)` arrays on the `[0, 255]` scale with one
//! or three channels. Internally the samples are normalised to `[0, 1]`, moved
//! to a planar layout, optionally decorrelated with a [`ColorSpace`], and run
//! through a hard-threshold pass followed by a Wiener pass that uses the first
//! estimate as its pilot.

use ndarray::{Array3, ArrayView3, Axis};
use std::time::Instant;

use crate::color::ColorSpace;
use crate::error::{Bm3dError, Result};
use crate::float_trait::{to_u8_sample, Bm3dFloat};
use crate::noise_estimation::estimate_noise_sigma_channels;
use crate::pipeline::{
    run_bm3d_step_channels, run_bm3d_step_stack, Bm3dKernelConfig, Bm3dMode, Bm3dPlans,
};

// =============================================================================
// Constants
// =============================================================================

/// Default patch size for block matching
const DEFAULT_PATCH_SIZE: usize = 8;

/// Default step size (stride) between reference patches
const DEFAULT_STEP_SIZE: usize = 3;

/// Default search window size for block matching
const DEFAULT_SEARCH_WINDOW: usize = 39;

/// Default maximum group size for the hard-threshold pass
const DEFAULT_HARD_MAX_MATCHES: usize = 16;

/// Default maximum group size for the Wiener pass
const DEFAULT_WIENER_MAX_MATCHES: usize = 32;

/// Default hard thresholding coefficient
const DEFAULT_THRESHOLD: f64 = 2.7;

// =============================================================================
// Types
// =============================================================================

/// Block-matching and filtering parameters of one pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageParams {
    /// Square patch side. Default: 8
    pub patch_size: usize,
    /// Stride between reference patches. Default: 3
    pub step_size: usize,
    /// Side of the search area around each reference patch. Default: 39
    pub search_window: usize,
    /// Maximum number of patches per group.
    pub max_matches: usize,
    /// Hard thresholding coefficient. Only read by the first pass. Default: 2.7
    pub threshold: f64,
}

impl StageParams {
    pub fn validate(&self) -> Result<()> {
        self.kernel_config::<f64>().validate()
    }

    fn kernel_config<F: Bm3dFloat>(&self) -> Bm3dKernelConfig<F> {
        Bm3dKernelConfig {
            threshold: F::from_f64_c(self.threshold),
            patch_size: self.patch_size,
            step_size: self.step_size,
            search_window: self.search_window,
            max_matches: self.max_matches,
        }
    }
}

/// Full denoiser configuration.
///
/// `Bm3dParams::default()` is the reference profile used by every entry point
/// that does not take explicit parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm3dParams {
    /// First pass (hard thresholding).
    pub hard: StageParams,
    /// Second pass (Wiener filtering).
    pub wiener: StageParams,
    /// Colour space for three-channel images. Ignored for grey images.
    pub color_space: ColorSpace,
    /// Log pipeline milestones at `info` instead of `debug`.
    pub verbose: bool,
}

impl Default for Bm3dParams {
    fn default() -> Self {
        Self {
            hard: StageParams {
                patch_size: DEFAULT_PATCH_SIZE,
                step_size: DEFAULT_STEP_SIZE,
                search_window: DEFAULT_SEARCH_WINDOW,
                max_matches: DEFAULT_HARD_MAX_MATCHES,
                threshold: DEFAULT_THRESHOLD,
            },
            wiener: StageParams {
                patch_size: DEFAULT_PATCH_SIZE,
                step_size: DEFAULT_STEP_SIZE,
                search_window: DEFAULT_SEARCH_WINDOW,
                max_matches: DEFAULT_WIENER_MAX_MATCHES,
                threshold: DEFAULT_THRESHOLD,
            },
            color_space: ColorSpace::default(),
            verbose: false,
        }
    }
}

impl Bm3dParams {
    /// The reference parameter profile.
    pub fn reference() -> Self {
        Self::default()
    }

    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Validate both passes.
    pub fn validate(&self) -> Result<()> {
        self.hard.validate()?;
        self.wiener.validate()
    }

    fn min_image_side(&self) -> usize {
        self.hard.patch_size.max(self.wiener.patch_size)
    }
}

macro_rules! milestone {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+);
        } else {
            tracing::debug!($($arg)+);
        }
    };
}

// =============================================================================
// Helper Functions
// =============================================================================

fn check_sigma(sigma: f64) -> Result<()> {
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(Bm3dError::invalid(
            "sigma",
            format!("must be finite and >= 0, got {}", sigma),
        ));
    }
    Ok(())
}

fn check_image_shape(dim: (usize, usize, usize), params: &Bm3dParams) -> Result<()> {
    let (rows, cols, channels) = dim;
    if channels != 1 && channels != 3 {
        return Err(Bm3dError::UnsupportedChannels(channels));
    }
    let min_side = params.min_image_side();
    if rows < min_side || cols < min_side {
        return Err(Bm3dError::ImageTooSmall {
            rows,
            cols,
            patch_size: min_side,
        });
    }
    Ok(())
}

/// Run both passes over a planar `(channels, rows, cols)` image in `[0, 1]`.
///
/// With `shared_grouping` the channels are matched together on channel 0;
/// otherwise every channel is an independent slice.
fn two_pass<F: Bm3dFloat>(
    planar: ArrayView3<F>,
    sigmas: &[F],
    params: &Bm3dParams,
    shared_grouping: bool,
) -> Result<Array3<F>> {
    let hard_config = params.hard.kernel_config::<F>();
    let wiener_config = params.wiener.kernel_config::<F>();
    let hard_plans = Bm3dPlans::for_config(&hard_config);
    let wiener_plans = if params.wiener.patch_size == params.hard.patch_size
        && params.wiener.max_matches <= params.hard.max_matches
    {
        None
    } else {
        Some(Bm3dPlans::for_config(&wiener_config))
    };
    let wiener_plans = wiener_plans.as_ref().unwrap_or(&hard_plans);

    type StepFn<F> = fn(
        ArrayView3<F>,
        ArrayView3<F>,
        Bm3dMode,
        &[F],
        &Bm3dKernelConfig<F>,
        &Bm3dPlans<F>,
    ) -> Result<Array3<F>>;
    let step: StepFn<F> = if shared_grouping {
        run_bm3d_step_channels::<F>
    } else {
        run_bm3d_step_stack::<F>
    };

    let started = Instant::now();
    // Pass 1: pilot = noisy
    let pilot = step(
        planar,
        planar,
        Bm3dMode::HardThreshold,
        sigmas,
        &hard_config,
        &hard_plans,
    )?;
    milestone!(
        params.verbose,
        elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
        "hard-threshold pass done"
    );

    // Pass 2: pilot = hard-threshold estimate
    let started = Instant::now();
    let output = step(
        planar,
        pilot.view(),
        Bm3dMode::Wiener,
        sigmas,
        &wiener_config,
        wiener_plans,
    )?;
    milestone!(
        params.verbose,
        elapsed_ms = started.elapsed().as_secs_f64() * 1e3,
        "wiener pass done"
    );
    Ok(output)
}

// =============================================================================
// Entry points
// =============================================================================

/// BM3D on a float image on the `[0, 255]` scale.
///
/// `image` is `(rows, cols, channels)` with one or three channels and `sigma`
/// is the standard deviation of the additive noise on the same scale. The
/// output has the input's shape and is neither rounded nor clipped.
/// `sigma == 0` returns a copy of the input.
pub fn bm3d_raw<F: Bm3dFloat>(
    image: ArrayView3<F>,
    sigma: F,
    params: &Bm3dParams,
) -> Result<Array3<F>> {
    params.validate()?;
    check_sigma(sigma.to_f64_c())?;
    check_image_shape(image.dim(), params)?;

    if sigma == F::zero() {
        return Ok(image.to_owned());
    }

    let (rows, cols, channels) = image.dim();
    let shared_grouping = channels == 3 && params.color_space.shares_grouping();
    milestone!(
        params.verbose,
        rows,
        cols,
        channels,
        sigma = sigma.to_f64_c(),
        color_space = %params.color_space,
        "running BM3D"
    );

    let scale = F::SAMPLE_MAX;
    let sigma_n = sigma / scale;
    let planar = image
        .permuted_axes([2, 0, 1])
        .mapv(|v| v / scale);

    let denoised = if shared_grouping {
        let decorrelated = params.color_space.forward(planar.view())?;
        let sigmas = params.color_space.channel_sigmas(sigma_n);
        let filtered = two_pass(decorrelated.view(), &sigmas, params, true)?;
        params.color_space.inverse(filtered.view())?
    } else {
        let sigmas = vec![sigma_n; channels];
        two_pass(planar.view(), &sigmas, params, false)?
    };

    let mut output = Array3::<F>::zeros((rows, cols, channels));
    for (ch, plane) in denoised.axis_iter(Axis(0)).enumerate() {
        output
            .index_axis_mut(Axis(2), ch)
            .assign(&plane.mapv(|v| v * scale));
    }
    Ok(output)
}

/// BM3D on an 8-bit image.
///
/// The result is rounded and clipped back to `[0, 255]`. `sigma == 0`
/// returns the input unchanged.
pub fn bm3d(image: ArrayView3<u8>, sigma: f64, params: &Bm3dParams) -> Result<Array3<u8>> {
    check_sigma(sigma)?;
    if sigma == 0.0 {
        params.validate()?;
        check_image_shape(image.dim(), params)?;
        return Ok(image.to_owned());
    }
    let float_image = image.mapv(f32::from_sample);
    let denoised = bm3d_raw(float_image.view(), sigma as f32, params)?;
    Ok(denoised.mapv(to_u8_sample))
}

/// Estimate the noise level of an 8-bit image on the `[0, 255]` scale.
pub fn estimate_sigma(image: ArrayView3<u8>) -> f64 {
    let planar = image.permuted_axes([2, 0, 1]).mapv(f64::from_sample);
    estimate_noise_sigma_channels(planar.view())
}

/// BM3D with the reference parameters and a noise level estimated from the
/// image itself.
pub fn simple_bm3d(image: ArrayView3<u8>) -> Result<Array3<u8>> {
    let params = Bm3dParams::default();
    check_image_shape(image.dim(), &params)?;
    let sigma = estimate_sigma(image);
    tracing::info!(sigma, "estimated noise level");
    bm3d(image, sigma, &params)
}
