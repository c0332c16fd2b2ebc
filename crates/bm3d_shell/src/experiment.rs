//! Denoising an [`Image`] and the add-noise / denoise / PSNR harness.

use std::fmt;
use std::time::{Duration, Instant};

use bm3d_core::Bm3dParams;
use rand::Rng;

use crate::degrade::add_gaussian_noise;
use crate::error::Result;
use crate::image::Image;
use crate::metrics::psnr;

/// Denoise with a known noise level on the `[0, 255]` scale.
pub fn denoise(image: &Image, sigma: f64, params: &Bm3dParams) -> Result<Image> {
    let out = bm3d_core::bm3d(image.view(), sigma, params)?;
    Image::new(out)
}

/// Denoise with a noise level estimated from the image itself.
///
/// Returns the estimate along with the image.
pub fn denoise_auto(image: &Image, params: &Bm3dParams) -> Result<(Image, f64)> {
    let sigma = bm3d_core::estimate_sigma(image.view());
    tracing::info!(sigma, "estimated noise level");
    Ok((denoise(image, sigma, params)?, sigma))
}

/// Outcome of one [`run_experiment`].
#[derive(Debug, Clone)]
pub struct ExperimentReport {
    pub sigma: f64,
    pub noisy: Image,
    pub denoised: Image,
    pub noisy_psnr: f64,
    pub denoised_psnr: f64,
    /// Wall time of the denoiser alone.
    pub elapsed: Duration,
}

impl ExperimentReport {
    /// PSNR gained by denoising, in dB.
    pub fn improvement_db(&self) -> f64 {
        self.denoised_psnr - self.noisy_psnr
    }
}

impl fmt::Display for ExperimentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "PSNR of noisy image: {:.4}", self.noisy_psnr)?;
        writeln!(f, "PSNR of reconstructed image: {:.4}", self.denoised_psnr)?;
        write!(
            f,
            "improvement: {:+.4} dB in {:.2?}",
            self.improvement_db(),
            self.elapsed
        )
    }
}

/// Add `N(0, sigma)` noise to `reference`, denoise it with the same `sigma`
/// and score both images against the reference.
pub fn run_experiment<R: Rng + ?Sized>(
    reference: &Image,
    sigma: f64,
    params: &Bm3dParams,
    rng: &mut R,
) -> Result<ExperimentReport> {
    tracing::info!(sigma, shape = ?reference.shape(), "adding noise");
    let noisy = add_gaussian_noise(reference, sigma, rng)?;

    tracing::info!(color_space = %params.color_space, "denoising with BM3D");
    let started = Instant::now();
    let denoised = denoise(&noisy, sigma, params)?;
    let elapsed = started.elapsed();

    let noisy_psnr = psnr(reference, &noisy)?;
    let denoised_psnr = psnr(reference, &denoised)?;
    tracing::info!(
        noisy_psnr,
        denoised_psnr,
        elapsed_ms = elapsed.as_secs_f64() * 1e3,
        "experiment finished"
    );

    Ok(ExperimentReport {
        sigma,
        noisy,
        denoised,
        noisy_psnr,
        denoised_psnr,
        elapsed,
    })
}
