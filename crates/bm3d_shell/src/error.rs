//! Error type for the shell library.

use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by `bm3d_shell`.
#[derive(Error, Debug)]
pub enum ShellError {
    /// The array cannot be an image (wrong channel count or empty).
    #[error("invalid image shape {shape:?}: {reason}")]
    InvalidShape {
        shape: (usize, usize, usize),
        reason: String,
    },

    /// Two images that must agree in shape do not.
    #[error("shape mismatch: reference {reference:?}, test {test:?}")]
    ShapeMismatch {
        reference: (usize, usize, usize),
        test: (usize, usize, usize),
    },

    /// A raw dump does not hold `height * width * channels` bytes.
    #[error("raw data has {actual} bytes, layout {height}x{width}x{channels} needs {expected}")]
    RawSizeMismatch {
        height: usize,
        width: usize,
        channels: usize,
        expected: usize,
        actual: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Failed to load an image file.
    #[error("failed to load image from {path}: {source}")]
    ImageLoad {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Failed to save an image file.
    #[error("failed to save image to {path}: {source}")]
    ImageSave {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Failed to parse a params file.
    #[error("failed to parse params file {path}: {source}")]
    Params {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Filesystem error on a known path.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The denoiser rejected its input.
    #[error(transparent)]
    Denoise(#[from] bm3d_core::Bm3dError),
}

impl ShellError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for shell operations.
pub type Result<T> = std::result::Result<T, ShellError>;
