//! Colour decorrelation for three-channel images.
//!
//! `Opp` and `YCbCr` move most of the signal energy into channel 0, which then
//! drives block matching for all three channels. `Rgb` leaves the samples
//! untouched and each channel is denoised on its own.

use ndarray::{Array3, ArrayView3, Axis, Zip};
use std::fmt;
use std::str::FromStr;

use crate::error::{Bm3dError, Result};
use crate::float_trait::Bm3dFloat;

type Matrix3 = [[f64; 3]; 3];

const OPP_FORWARD: Matrix3 = [
    [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0],
    [0.5, 0.0, -0.5],
    [0.25, -0.5, 0.25],
];
const OPP_INVERSE: Matrix3 = [
    [1.0, 1.0, 2.0 / 3.0],
    [1.0, 0.0, -4.0 / 3.0],
    [1.0, -1.0, 2.0 / 3.0],
];

// ITU-R BT.601 luma weights. Cb = (B - Y) / CB_SCALE, Cr = (R - Y) / CR_SCALE.
const KR: f64 = 0.299;
const KG: f64 = 0.587;
const KB: f64 = 0.114;
const CB_SCALE: f64 = 2.0 * (1.0 - KB);
const CR_SCALE: f64 = 2.0 * (1.0 - KR);

const YCBCR_FORWARD: Matrix3 = [
    [KR, KG, KB],
    [-KR / CB_SCALE, -KG / CB_SCALE, 0.5],
    [0.5, -KG / CR_SCALE, -KB / CR_SCALE],
];
const YCBCR_INVERSE: Matrix3 = [
    [1.0, 0.0, CR_SCALE],
    [1.0, -KB * CB_SCALE / KG, -KR * CR_SCALE / KG],
    [1.0, CB_SCALE, 0.0],
];

const IDENTITY: Matrix3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Colour space in which a three-channel image is denoised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    /// Channels are processed independently.
    Rgb,
    /// Opponent colour space (the default).
    #[default]
    Opp,
    YCbCr,
}

impl ColorSpace {
    /// Whether block matching is shared across channels through the luminance.
    pub fn shares_grouping(self) -> bool {
        !matches!(self, ColorSpace::Rgb)
    }

    fn forward_matrix(self) -> &'static Matrix3 {
        match self {
            ColorSpace::Rgb => &IDENTITY,
            ColorSpace::Opp => &OPP_FORWARD,
            ColorSpace::YCbCr => &YCBCR_FORWARD,
        }
    }

    fn inverse_matrix(self) -> &'static Matrix3 {
        match self {
            ColorSpace::Rgb => &IDENTITY,
            ColorSpace::Opp => &OPP_INVERSE,
            ColorSpace::YCbCr => &YCBCR_INVERSE,
        }
    }

    /// Convert a `(3, rows, cols)` RGB image into this colour space.
    pub fn forward<F: Bm3dFloat>(self, image: ArrayView3<F>) -> Result<Array3<F>> {
        apply_matrix(image, self.forward_matrix())
    }

    /// Convert a `(3, rows, cols)` image in this colour space back to RGB.
    pub fn inverse<F: Bm3dFloat>(self, image: ArrayView3<F>) -> Result<Array3<F>> {
        apply_matrix(image, self.inverse_matrix())
    }

    /// Noise level of each transformed channel for RGB noise of level `sigma`.
    ///
    /// Channel `i` is a linear combination of independent noisy samples, so its
    /// noise level is `sigma` times the L2 norm of forward row `i`.
    pub fn channel_sigmas<F: Bm3dFloat>(self, sigma: F) -> [F; 3] {
        let m = self.forward_matrix();
        let mut out = [F::zero(); 3];
        for (slot, row) in out.iter_mut().zip(m.iter()) {
            let norm = row.iter().map(|v| v * v).sum::<f64>().sqrt();
            *slot = sigma * F::from_f64_c(norm);
        }
        out
    }
}

impl FromStr for ColorSpace {
    type Err = Bm3dError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rgb" => Ok(ColorSpace::Rgb),
            "opp" => Ok(ColorSpace::Opp),
            "ycbcr" => Ok(ColorSpace::YCbCr),
            _ => Err(Bm3dError::UnknownColorSpace(s.to_string())),
        }
    }
}

impl fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColorSpace::Rgb => "RGB",
            ColorSpace::Opp => "opp",
            ColorSpace::YCbCr => "YCbCr",
        };
        f.write_str(name)
    }
}

fn apply_matrix<F: Bm3dFloat>(image: ArrayView3<F>, m: &Matrix3) -> Result<Array3<F>> {
    let channels = image.len_of(Axis(0));
    if channels != 3 {
        return Err(Bm3dError::UnsupportedChannels(channels));
    }
    let coeff: Vec<F> = m.iter().flatten().map(|&v| F::from_f64_c(v)).collect();

    let mut output = Array3::<F>::zeros(image.raw_dim());
    let (c0, c1, c2) = (
        image.index_axis(Axis(0), 0),
        image.index_axis(Axis(0), 1),
        image.index_axis(Axis(0), 2),
    );
    for (out_ch, mut plane) in output.axis_iter_mut(Axis(0)).enumerate() {
        let row = &coeff[out_ch * 3..out_ch * 3 + 3];
        Zip::from(&mut plane)
            .and(&c0)
            .and(&c1)
            .and(&c2)
            .for_each(|o, &a, &b, &c| *o = row[0] * a + row[1] * b + row[2] * c);
    }
    Ok(output)
}
