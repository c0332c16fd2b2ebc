//! The 8-bit image entity shared by every operation in this crate.

use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::{Array3, ArrayView3, ArrayViewMut3, Axis};

use crate::error::{Result, ShellError};

/// Channel count of a grey image.
pub const GREY_CHANNELS: usize = 1;

/// Channel count of a colour image.
pub const RGB_CHANNELS: usize = 3;

/// An owned `(height, width, channels)` array of 8-bit samples with one or
/// three channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image(Array3<u8>);

impl Image {
    /// Wrap an array, checking the channel count and that it is not empty.
    pub fn new(array: Array3<u8>) -> Result<Self> {
        let shape = array.dim();
        let (height, width, channels) = shape;
        if channels != GREY_CHANNELS && channels != RGB_CHANNELS {
            return Err(ShellError::InvalidShape {
                shape,
                reason: format!("expected 1 or 3 channels, got {}", channels),
            });
        }
        if height == 0 || width == 0 {
            return Err(ShellError::InvalidShape {
                shape,
                reason: "height and width must be non-zero".to_string(),
            });
        }
        Ok(Self(array))
    }

    pub fn zeros(height: usize, width: usize, channels: usize) -> Result<Self> {
        Self::new(Array3::zeros((height, width, channels)))
    }

    pub fn height(&self) -> usize {
        self.0.len_of(Axis(0))
    }

    pub fn width(&self) -> usize {
        self.0.len_of(Axis(1))
    }

    pub fn channels(&self) -> usize {
        self.0.len_of(Axis(2))
    }

    /// `(height, width, channels)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        self.0.dim()
    }

    pub fn view(&self) -> ArrayView3<'_, u8> {
        self.0.view()
    }

    pub fn view_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        self.0.view_mut()
    }

    pub fn into_array(self) -> Array3<u8> {
        self.0
    }

    /// Convert a decoded image. 8-bit grey stays single-channel, everything
    /// else is converted to 8-bit RGB.
    pub fn from_dynamic(img: &DynamicImage) -> Result<Self> {
        match img {
            DynamicImage::ImageLuma8(grey) => {
                let (w, h) = grey.dimensions();
                let array =
                    Array3::from_shape_vec((h as usize, w as usize, 1), grey.as_raw().clone())
                        .map_err(|e| ShellError::InvalidShape {
                            shape: (h as usize, w as usize, 1),
                            reason: e.to_string(),
                        })?;
                Self::new(array)
            }
            other => {
                let rgb = other.to_rgb8();
                let (w, h) = rgb.dimensions();
                let array = Array3::from_shape_vec((h as usize, w as usize, 3), rgb.into_raw())
                    .map_err(|e| ShellError::InvalidShape {
                        shape: (h as usize, w as usize, 3),
                        reason: e.to_string(),
                    })?;
                Self::new(array)
            }
        }
    }

    /// Convert back to an `image` buffer (`Luma8` or `Rgb8`).
    pub fn to_dynamic(&self) -> Result<DynamicImage> {
        let (height, width, channels) = self.shape();
        let raw: Vec<u8> = self.0.iter().copied().collect();
        let too_large = || ShellError::InvalidShape {
            shape: (height, width, channels),
            reason: "dimensions do not fit the image buffer".to_string(),
        };
        let (w, h) = (
            u32::try_from(width).map_err(|_| too_large())?,
            u32::try_from(height).map_err(|_| too_large())?,
        );
        if channels == GREY_CHANNELS {
            GrayImage::from_raw(w, h, raw)
                .map(DynamicImage::ImageLuma8)
                .ok_or_else(too_large)
        } else {
            RgbImage::from_raw(w, h, raw)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(too_large)
        }
    }

    /// Channel-major `(channels, height, width)` flatten as `f32`.
    pub fn planar_f32(&self) -> Vec<f32> {
        self.0
            .view()
            .permuted_axes([2, 0, 1])
            .iter()
            .map(|&v| f32::from(v))
            .collect()
    }
}

impl TryFrom<Array3<u8>> for Image {
    type Error = ShellError;

    fn try_from(array: Array3<u8>) -> Result<Self> {
        Self::new(array)
    }
}

impl AsRef<Array3<u8>> for Image {
    fn as_ref(&self) -> &Array3<u8> {
        &self.0
    }
}
