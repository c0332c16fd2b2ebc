//! Encoded image files (PNG, JPEG, TIFF) via the `image` crate.

use std::path::Path;

use crate::error::{Result, ShellError};
use crate::image::Image;

/// Load an image file; the format is detected from its contents.
pub fn load_image<P: AsRef<Path>>(path: P) -> Result<Image> {
    let path = path.as_ref();
    let img = image::open(path).map_err(|source| ShellError::ImageLoad {
        path: path.to_path_buf(),
        source,
    })?;
    let image = Image::from_dynamic(&img)?;
    tracing::debug!(path = %path.display(), shape = ?image.shape(), "loaded image");
    Ok(image)
}

/// Save an image; the format follows the file extension.
pub fn save_image<P: AsRef<Path>>(path: P, image: &Image) -> Result<()> {
    let path = path.as_ref();
    image
        .to_dynamic()?
        .save(path)
        .map_err(|source| ShellError::ImageSave {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::debug!(path = %path.display(), shape = ?image.shape(), "saved image");
    Ok(())
}
