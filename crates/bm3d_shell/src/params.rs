//! JSON parameter files overlaying the reference [`Bm3dParams`].
//!
//! Every field is optional; missing fields keep their default value.
//!
//! ```json
//! { "color_space": "YCbCr", "hard": { "threshold": 3.0 }, "wiener": { "max_matches": 16 } }
//! ```

use std::fs;
use std::path::Path;

use bm3d_core::{Bm3dParams, ColorSpace, StageParams};
use serde::Deserialize;

use crate::error::{Result, ShellError};

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageOverride {
    pub patch_size: Option<usize>,
    pub step_size: Option<usize>,
    pub search_window: Option<usize>,
    pub max_matches: Option<usize>,
    pub threshold: Option<f64>,
}

impl StageOverride {
    fn apply(&self, mut stage: StageParams) -> StageParams {
        if let Some(v) = self.patch_size {
            stage.patch_size = v;
        }
        if let Some(v) = self.step_size {
            stage.step_size = v;
        }
        if let Some(v) = self.search_window {
            stage.search_window = v;
        }
        if let Some(v) = self.max_matches {
            stage.max_matches = v;
        }
        if let Some(v) = self.threshold {
            stage.threshold = v;
        }
        stage
    }
}

/// Contents of a params file.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParamsFile {
    #[serde(default)]
    pub hard: StageOverride,
    #[serde(default)]
    pub wiener: StageOverride,
    pub color_space: Option<String>,
    pub verbose: Option<bool>,
}

impl ParamsFile {
    /// Overlay onto `base` and validate the result.
    pub fn apply(&self, base: Bm3dParams) -> Result<Bm3dParams> {
        let mut params = base;
        params.hard = self.hard.apply(params.hard);
        params.wiener = self.wiener.apply(params.wiener);
        if let Some(name) = &self.color_space {
            params.color_space = name.parse::<ColorSpace>()?;
        }
        if let Some(verbose) = self.verbose {
            params.verbose = verbose;
        }
        params.validate()?;
        Ok(params)
    }
}

/// Read a params file and overlay it onto the reference parameters.
pub fn load_params<P: AsRef<Path>>(path: P) -> Result<Bm3dParams> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| ShellError::io(path, e))?;
    let file: ParamsFile = serde_json::from_str(&text).map_err(|source| ShellError::Params {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!(path = %path.display(), ?file, "loaded params file");
    file.apply(Bm3dParams::default())
}
