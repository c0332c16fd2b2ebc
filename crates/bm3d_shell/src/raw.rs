//! Headerless raw frame dumps.
//!
//! A raw frame is the row-major `(height, width, channels)` sample bytes and
//! nothing else; the layout has to be supplied out of band when reading.

use std::fs;
use std::path::Path;

use ndarray::Array3;

use crate::degrade::ChannelMask;
use crate::error::{Result, ShellError};
use crate::image::Image;

/// Shape needed to interpret a raw dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLayout {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl RawLayout {
    pub fn new(height: usize, width: usize, channels: usize) -> Self {
        Self {
            height,
            width,
            channels,
        }
    }

    pub fn of(image: &Image) -> Self {
        let (height, width, channels) = image.shape();
        Self::new(height, width, channels)
    }

    /// Number of bytes a dump with this layout holds, `None` on overflow.
    pub fn byte_len(&self) -> Option<usize> {
        self.height
            .checked_mul(self.width)?
            .checked_mul(self.channels)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }
}

pub fn encode_raw(image: &Image) -> Vec<u8> {
    image.view().iter().copied().collect()
}

pub fn decode_raw(bytes: &[u8], layout: RawLayout) -> Result<Image> {
    let expected = layout.byte_len().ok_or_else(|| ShellError::InvalidShape {
        shape: layout.shape(),
        reason: "sample count overflows usize".to_string(),
    })?;
    if bytes.len() != expected {
        return Err(ShellError::RawSizeMismatch {
            height: layout.height,
            width: layout.width,
            channels: layout.channels,
            expected,
            actual: bytes.len(),
        });
    }
    let shape = layout.shape();
    let array = Array3::from_shape_vec(shape, bytes.to_vec()).map_err(|e| {
        ShellError::InvalidShape {
            shape,
            reason: e.to_string(),
        }
    })?;
    Image::new(array)
}

pub fn write_raw<P: AsRef<Path>>(path: P, image: &Image) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, encode_raw(image)).map_err(|e| ShellError::io(path, e))?;
    tracing::debug!(path = %path.display(), shape = ?image.shape(), "wrote raw frame");
    Ok(())
}

pub fn read_raw<P: AsRef<Path>>(path: P, layout: RawLayout) -> Result<Image> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| ShellError::io(path, e))?;
    decode_raw(&bytes, layout)
}

/// `frame_<stem>_base`
pub fn base_frame_name(stem: &str) -> String {
    format!("frame_{}_base", stem)
}

/// `frame_<stem>_<bits>`, e.g. `frame_cat_101`.
pub fn variant_frame_name(stem: &str, mask: ChannelMask) -> String {
    format!("frame_{}_{}", stem, mask.file_suffix())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Image {
        Image::new(Array3::from_shape_fn((3, 4, 3), |(r, c, ch)| {
            (r * 100 + c * 10 + ch) as u8
        }))
        .unwrap()
    }

    #[test]
    fn test_encode_is_row_major_interleaved() {
        let bytes = encode_raw(&sample());
        assert_eq!(bytes.len(), 36);
        assert_eq!(&bytes[..6], &[0, 1, 2, 10, 11, 12]);
        // Second row starts after width * channels bytes.
        assert_eq!(bytes[12], 100);
    }

    #[test]
    fn test_decode_restores_image() {
        let img = sample();
        let decoded = decode_raw(&encode_raw(&img), RawLayout::of(&img)).unwrap();
        assert_eq!(decoded, img);
    }

    #[test]
    fn test_decode_size_mismatch() {
        let bytes = encode_raw(&sample());
        let err = decode_raw(&bytes, RawLayout::new(4, 4, 3)).unwrap_err();
        assert!(matches!(
            err,
            ShellError::RawSizeMismatch {
                expected: 48,
                actual: 36,
                ..
            }
        ));
    }

    #[test]
    fn test_decode_overflowing_layout() {
        let layout = RawLayout::new(usize::MAX / 2, 3, 1);
        assert_eq!(layout.byte_len(), None);
        let err = decode_raw(&[0u8; 12], layout).unwrap_err();
        assert!(matches!(err, ShellError::InvalidShape { .. }), "{err}");
    }

    #[test]
    fn test_decode_same_size_other_layout() {
        // Headerless: a matching byte count decodes even with the wrong shape.
        let bytes = encode_raw(&sample());
        let img = decode_raw(&bytes, RawLayout::new(4, 3, 3)).unwrap();
        assert_eq!(img.shape(), (4, 3, 3));
    }

    #[test]
    fn test_layout_byte_len() {
        assert_eq!(RawLayout::new(300, 451, 3).byte_len(), Some(405_900));
    }

    #[test]
    fn test_frame_names() {
        assert_eq!(base_frame_name("cat"), "frame_cat_base");
        let mask = ChannelMask::new(0b010).unwrap();
        assert_eq!(variant_frame_name("cat", mask), "frame_cat_010");
    }
}
