//! Error type for the BM3D kernel and its entry points.

use thiserror::Error;

/// Errors reported by `bm3d_core`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Bm3dError {
    /// A configuration value is out of range.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Two arrays that must agree in shape do not.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    /// The image cannot hold a single patch.
    #[error("image size ({rows}, {cols}) is smaller than patch_size {patch_size}")]
    ImageTooSmall {
        rows: usize,
        cols: usize,
        patch_size: usize,
    },

    /// Only grey (1) and colour (3) images are supported.
    #[error("unsupported channel count {0}, expected 1 or 3")]
    UnsupportedChannels(usize),

    /// A colour space name could not be parsed.
    #[error("unknown color space {0:?}, expected one of RGB, opp, YCbCr")]
    UnknownColorSpace(String),
}

impl Bm3dError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Result alias for `bm3d_core` operations.
pub type Result<T> = std::result::Result<T, Bm3dError>;
