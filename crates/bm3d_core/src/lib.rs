//! BM3D Core Algorithm Library
//!
//! Pure Rust implementation of BM3D (Block-Matching and 3D filtering) for
//! 8-bit grey and colour images: block matching, 2D+1D collaborative
//! transforms, hard-threshold and Wiener passes, colour decorrelation and
//! noise-level estimation.

pub mod block_matching;
pub mod color;
pub mod denoise;
pub mod error;
pub mod float_trait;
pub mod noise_estimation;
pub mod pipeline;
pub mod transforms;

// Re-export commonly used types at the crate root
pub use block_matching::{IntegralImages, MatchQuery, PatchMatch};
pub use color::ColorSpace;
pub use denoise::{bm3d, bm3d_raw, estimate_sigma, simple_bm3d, Bm3dParams, StageParams};
pub use error::{Bm3dError, Result};
pub use float_trait::Bm3dFloat;
pub use noise_estimation::{estimate_noise_sigma, estimate_noise_sigma_channels};
pub use pipeline::{
    run_bm3d_kernel, run_bm3d_step, run_bm3d_step_channels, run_bm3d_step_stack,
    set_use_hadamard_fast_path, Bm3dKernelConfig, Bm3dMode, Bm3dPlans,
};
pub use transforms::{fft2d, ifft2d, wht2d_8x8_forward, wht2d_8x8_inverse};
