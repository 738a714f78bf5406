//! Difference hashing for still images.
//!
//! The hash is stable under recompression and resizing: it only records
//! whether each pixel of a tiny grayscale thumbnail is brighter than its
//! right-hand neighbour.

use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::imageops::{self, FilterType};
use image::{AnimationDecoder, DynamicImage, ImageFormat, ImageReader};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

/// Default hash size (an 8x8 comparison grid, 16 hex characters).
pub const DEFAULT_HASH_SIZE: u32 = 8;

/// Errors that can occur during perceptual hashing.
#[derive(Debug, Error)]
pub enum PerceptualError {
    /// Failed to open or decode the image.
    #[error("Failed to load image {0}: {1}")]
    LoadError(String, #[source] image::ImageError),

    /// Content is not a recognised image format.
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// The image has more than one frame.
    #[error("Animated image: {0}")]
    Animated(String),
}

/// Computes difference hashes for still images.
#[derive(Debug, Clone, Copy)]
pub struct PerceptualHasher {
    hash_size: u32,
}

impl PerceptualHasher {
    /// Create a hasher comparing a `hash_size` x `hash_size` grid.
    ///
    /// `hash_size` must be a positive multiple of 4 so the bit count packs
    /// into whole bytes; [`crate::config::Config::validate`] enforces this.
    pub fn new(hash_size: u32) -> Self {
        debug_assert!(hash_size > 0 && hash_size % 4 == 0);
        Self { hash_size }
    }

    /// Compute the difference hash for the still image at `path`.
    ///
    /// Multi-frame images are rejected with [`PerceptualError::Animated`]
    /// before any frame is fully decoded.
    pub fn compute_hash<P: AsRef<Path>>(&self, path: P) -> Result<String, PerceptualError> {
        let path = path.as_ref();
        let display = || path.display().to_string();

        let reader = ImageReader::open(path)
            .and_then(|r| r.with_guessed_format())
            .map_err(|e| PerceptualError::LoadError(display(), image::ImageError::IoError(e)))?;
        let format = reader
            .format()
            .ok_or_else(|| PerceptualError::UnsupportedFormat(display()))?;

        if is_animated(path, format).map_err(|e| PerceptualError::LoadError(display(), e))? {
            return Err(PerceptualError::Animated(display()));
        }

        let img = reader
            .decode()
            .map_err(|e| PerceptualError::LoadError(display(), e))?;

        Ok(self.hash_image(&img))
    }

    /// Compute the difference hash of an already decoded image.
    pub fn hash_image(&self, img: &DynamicImage) -> String {
        let n = self.hash_size;
        let gray = img.to_luma8();
        let thumb = imageops::resize(&gray, n + 1, n, FilterType::Lanczos3);

        let mut bits = Vec::with_capacity((n * n) as usize);
        for y in 0..n {
            for x in 0..n {
                let left = thumb.get_pixel(x, y)[0];
                let right = thumb.get_pixel(x + 1, y)[0];
                bits.push(left > right);
            }
        }

        pack_bits(&bits)
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new(DEFAULT_HASH_SIZE)
    }
}

/// Pack booleans eight at a time, first boolean in the most significant bit,
/// and render each byte as two lowercase hex digits.
pub fn pack_bits(bits: &[bool]) -> String {
    bits.chunks(8)
        .map(|group| {
            group
                .iter()
                .enumerate()
                .fold(0u8, |byte, (i, &bit)| if bit { byte | (0x80 >> i) } else { byte })
        })
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Check whether an image in `format` carries more than one frame.
pub fn is_animated(path: &Path, format: ImageFormat) -> image::ImageResult<bool> {
    let open = || -> image::ImageResult<BufReader<File>> { Ok(BufReader::new(File::open(path)?)) };

    match format {
        ImageFormat::Gif => {
            let decoder = GifDecoder::new(open()?)?;
            Ok(decoder.into_frames().take(2).count() > 1)
        }
        ImageFormat::Png => PngDecoder::new(open()?)?.is_apng(),
        ImageFormat::WebP => Ok(WebPDecoder::new(open()?)?.has_animation()),
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use std::fs;
    use tempfile::tempdir;

    fn horizontal_gradient(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| Luma([(x * 255 / (width - 1)) as u8]))
    }

    #[test]
    fn test_pack_bits_msb_first() {
        let mut bits = vec![false; 16];
        bits[0] = true;
        bits[15] = true;
        assert_eq!(pack_bits(&bits), "8001");
    }

    #[test]
    fn test_pack_bits_all_set() {
        assert_eq!(pack_bits(&[true; 64]), "ffffffffffffffff");
        assert_eq!(pack_bits(&[false; 64]), "0000000000000000");
    }

    #[test]
    fn test_hash_length_follows_hash_size() {
        let img = DynamicImage::ImageLuma8(horizontal_gradient(64, 64));
        assert_eq!(PerceptualHasher::new(8).hash_image(&img).len(), 16);
        assert_eq!(PerceptualHasher::new(4).hash_image(&img).len(), 4);
        assert_eq!(PerceptualHasher::new(16).hash_image(&img).len(), 64);
    }

    #[test]
    fn test_rising_gradient_hashes_to_zero() {
        // Every pixel is darker than its right neighbour.
        let img = DynamicImage::ImageLuma8(horizontal_gradient(90, 80));
        assert_eq!(PerceptualHasher::default().hash_image(&img), "0000000000000000");
    }

    #[test]
    fn test_falling_gradient_hashes_to_ones() {
        let img = GrayImage::from_fn(90, 80, |x, _| Luma([255 - (x * 255 / 89) as u8]));
        let hash = PerceptualHasher::default().hash_image(&DynamicImage::ImageLuma8(img));
        assert_eq!(hash, "ffffffffffffffff");
    }

    #[test]
    fn test_invalid_image() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("invalid.jpg");
        fs::write(&file_path, b"not an image").unwrap();

        let result = PerceptualHasher::default().compute_hash(&file_path);
        assert!(result.is_err());
        assert!(!matches!(result, Err(PerceptualError::Animated(_))));
    }

    #[test]
    fn test_compute_hash_real_image() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("test_image.png");
        horizontal_gradient(32, 32).save(&file_path).unwrap();

        let hash = PerceptualHasher::default().compute_hash(&file_path).unwrap();
        assert_eq!(hash.len(), 16);
    }

    #[test]
    fn test_still_png_is_not_animated() {
        let temp_dir = tempdir().unwrap();
        let file_path = temp_dir.path().join("still.png");
        horizontal_gradient(8, 8).save(&file_path).unwrap();

        assert!(!is_animated(&file_path, ImageFormat::Png).unwrap());
    }
}
