//! Synthetic degradations: additive Gaussian noise and channel clearing.

use std::fmt;

use ndarray::{Array3, Zip};
use rand::prelude::*;
use rand_distr::Normal;

use crate::error::{Result, ShellError};
use crate::image::{Image, RGB_CHANNELS};

/// Add `N(0, sigma)` noise to every sample independently.
///
/// Each noisy value is clipped to `[0, 255]` and truncated to `u8`.
/// `sigma == 0` returns an identical image.
pub fn add_gaussian_noise<R: Rng + ?Sized>(image: &Image, sigma: f64, rng: &mut R) -> Result<Image> {
    if sigma == 0.0 {
        return Ok(image.clone());
    }
    let noise = sample_noise(image.shape(), sigma, rng)?;
    apply_noise(image, &noise)
}

/// Draw an `N(0, sigma)` noise field of the given `(height, width, channels)`.
pub fn sample_noise<R: Rng + ?Sized>(
    shape: (usize, usize, usize),
    sigma: f64,
    rng: &mut R,
) -> Result<Array3<f64>> {
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(ShellError::InvalidParameter {
            name: "sigma",
            reason: format!("must be finite and >= 0, got {}", sigma),
        });
    }
    let normal = Normal::new(0.0, sigma).map_err(|e| ShellError::InvalidParameter {
        name: "sigma",
        reason: e.to_string(),
    })?;
    Ok(Array3::from_shape_simple_fn(shape, || normal.sample(rng)))
}

/// Add a noise field, clip to `[0, 255]` and truncate to `u8`.
pub fn apply_noise(image: &Image, noise: &Array3<f64>) -> Result<Image> {
    if noise.dim() != image.shape() {
        return Err(ShellError::ShapeMismatch {
            reference: image.shape(),
            test: noise.dim(),
        });
    }
    let mut noisy = Array3::<u8>::zeros(image.shape());
    Zip::from(&mut noisy)
        .and(image.view())
        .and(noise)
        .for_each(|out, &v, &n| *out = (f64::from(v) + n).clamp(0.0, 255.0) as u8);
    Image::new(noisy)
}

/// [`add_gaussian_noise`] with a `StdRng` seeded from `seed`.
pub fn add_gaussian_noise_seeded(image: &Image, sigma: f64, seed: u64) -> Result<Image> {
    let mut rng = StdRng::seed_from_u64(seed);
    add_gaussian_noise(image, sigma, &mut rng)
}

/// Which colour channels of an RGB image are kept.
///
/// Bit 2 is red, bit 1 green, bit 0 blue. A cleared bit zeroes that channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelMask(u8);

impl ChannelMask {
    /// Every channel kept.
    pub const ALL: ChannelMask = ChannelMask(0b111);

    pub fn new(bits: u8) -> Result<Self> {
        if bits > Self::ALL.0 {
            return Err(ShellError::InvalidParameter {
                name: "mask",
                reason: format!("must be in 0..=7, got {}", bits),
            });
        }
        Ok(Self(bits))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// The seven masks that clear at least one channel, in increasing order.
    pub fn degraded_variants() -> impl Iterator<Item = ChannelMask> {
        (0..Self::ALL.0).map(ChannelMask)
    }

    pub fn keeps(self, channel: usize) -> bool {
        channel < RGB_CHANNELS && self.0 & (1 << (RGB_CHANNELS - 1 - channel)) != 0
    }

    /// Indices (0 = red) of the channels this mask zeroes.
    pub fn cleared_channels(self) -> Vec<usize> {
        (0..RGB_CHANNELS).filter(|&ch| !self.keeps(ch)).collect()
    }

    /// Three-digit binary form, e.g. `"101"`.
    pub fn file_suffix(self) -> String {
        format!("{:03b}", self.0)
    }
}

impl fmt::Display for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03b}", self.0)
    }
}

/// Zero the channels cleared by `mask`. The image must be RGB.
pub fn apply_channel_mask(image: &Image, mask: ChannelMask) -> Result<Image> {
    if image.channels() != RGB_CHANNELS {
        return Err(ShellError::InvalidShape {
            shape: image.shape(),
            reason: "channel masks need an RGB image".to_string(),
        });
    }
    let mut out = image.clone();
    for ch in mask.cleared_channels() {
        out.view_mut()
            .index_axis_mut(ndarray::Axis(2), ch)
            .fill(0);
    }
    Ok(out)
}

/// Every degraded variant of `image`, one per [`ChannelMask::degraded_variants`].
pub fn generate_channel_variants(image: &Image) -> Result<Vec<(ChannelMask, Image)>> {
    ChannelMask::degraded_variants()
        .map(|mask| apply_channel_mask(image, mask).map(|img| (mask, img)))
        .collect()
}
