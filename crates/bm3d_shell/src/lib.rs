//! # bm3d_shell
//!
//! Everything around the BM3D denoiser in `bm3d_core`: synthetic noise and
//! channel-cleared test images, headerless raw frame dumps, PSNR scoring and
//! the add-noise / denoise / compare harness used by the `bm3d-shell` binary.
//!
//! ```no_run
//! use bm3d_shell::{codec, experiment, Bm3dParams};
//! use rand::prelude::*;
//!
//! # fn main() -> bm3d_shell::Result<()> {
//! let reference = codec::load_image("astronaut.png")?;
//! let mut rng = StdRng::seed_from_u64(0);
//! let report = experiment::run_experiment(&reference, 10.0, &Bm3dParams::default(), &mut rng)?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod degrade;
pub mod error;
pub mod experiment;
pub mod frames;
pub mod image;
pub mod metrics;
pub mod params;
pub mod raw;

pub use bm3d_core::{Bm3dParams, ColorSpace};
pub use degrade::ChannelMask;
pub use error::{Result, ShellError};
pub use experiment::{run_experiment, ExperimentReport};
pub use crate::image::Image;
pub use raw::RawLayout;
