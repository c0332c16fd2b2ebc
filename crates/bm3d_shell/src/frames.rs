//! Listing raw frame dumps and converting one to a viewable PNG.

use std::fs;
use std::path::{Path, PathBuf};

use crate::codec::save_image;
use crate::error::{Result, ShellError};
use crate::image::Image;
use crate::raw::{read_raw, RawLayout};

/// File-name prefix of raw frame dumps.
pub const DEFAULT_FRAME_PREFIX: &str = "frame";

/// Regular files in `dir` whose name starts with `prefix`, sorted by name.
pub fn list_frames<P: AsRef<Path>>(dir: P, prefix: &str) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|e| ShellError::io(dir, e))?;

    let mut frames = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ShellError::io(dir, e))?;
        let path = entry.path();
        let is_file = entry
            .file_type()
            .map(|t| t.is_file())
            .map_err(|e| ShellError::io(&path, e))?;
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(prefix));
        if is_file && matches {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

/// One `"[i] : <path>"` line per frame.
pub fn format_listing(frames: &[PathBuf]) -> String {
    frames
        .iter()
        .enumerate()
        .map(|(i, path)| format!("[{}] : {}\n", i, path.display()))
        .collect()
}

/// Decode the raw frame at `path` with `layout` and write it as an image to
/// `out`.
pub fn show_frame<P: AsRef<Path>, Q: AsRef<Path>>(
    path: P,
    layout: RawLayout,
    out: Q,
) -> Result<Image> {
    let image = read_raw(path.as_ref(), layout)?;
    save_image(out.as_ref(), &image)?;
    tracing::info!(
        frame = %path.as_ref().display(),
        output = %out.as_ref().display(),
        "frame converted"
    );
    Ok(image)
}
