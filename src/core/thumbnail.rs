use crate::core::pixels::{DecodeError, DecodedImage, PixelSource};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage, GenericImageView};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Could not decode source image: {0}")]
    Decode(#[from] DecodeError),

    #[error("Invalid thumbnail size: {max_dim}")]
    InvalidSize { max_dim: u32 },
}

pub const DEFAULT_MAX_DIM: u32 = 300;
pub const DEFAULT_QUALITY: u8 = 80;

/// Produces bounded JPEG previews
pub struct ThumbnailGenerator {
    quality: u8,
    source: PixelSource,
}

impl ThumbnailGenerator {
    pub fn new() -> Self {
        Self::with_quality(DEFAULT_QUALITY)
    }

    pub fn with_quality(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            source: PixelSource::new(),
        }
    }

    /// Encode a preview whose larger side is at most `max_dim`; never upscales
    pub fn generate(&self, image: &DynamicImage, max_dim: u32) -> Result<Vec<u8>, ThumbnailError> {
        if max_dim == 0 {
            return Err(ThumbnailError::InvalidSize { max_dim });
        }

        let (width, height) = image.dimensions();
        let (new_width, new_height) = target_dimensions(width, height, max_dim);

        let rgb = if (new_width, new_height) == (width, height) {
            image.to_rgb8()
        } else {
            image
                .resize_exact(new_width, new_height, FilterType::Lanczos3)
                .to_rgb8()
        };

        let mut output = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut output, self.quality);
        rgb.write_with_encoder(encoder)?;

        Ok(output)
    }

    pub fn generate_decoded(
        &self,
        decoded: &DecodedImage,
        max_dim: u32,
    ) -> Result<Vec<u8>, ThumbnailError> {
        self.generate(&decoded.image, max_dim)
    }

    pub fn generate_from_bytes(
        &self,
        bytes: &[u8],
        filename: Option<&str>,
        max_dim: u32,
    ) -> Result<Vec<u8>, ThumbnailError> {
        let decoded = self.source.decode_image(bytes, filename)?;
        self.generate_decoded(&decoded, max_dim)
    }

    pub fn generate_from_path(&self, path: &Path, max_dim: u32) -> Result<Vec<u8>, ThumbnailError> {
        let decoded = self.source.decode_image_path(path)?;
        self.generate_decoded(&decoded, max_dim)
    }

    /// Write encoded thumbnail bytes, creating the parent directory if needed
    pub fn save(&self, bytes: &[u8], thumbnail_path: &Path) -> Result<(), ThumbnailError> {
        if let Some(parent) = thumbnail_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(thumbnail_path, bytes)?;
        Ok(())
    }

    /// Expected thumbnail location for a stored photo file
    pub fn thumbnail_path(&self, thumbnail_dir: &Path, filename: &str) -> PathBuf {
        let stem = Path::new(filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| filename.to_string());
        thumbnail_dir.join(format!("thumb_{}.jpg", stem))
    }
}

impl Default for ThumbnailGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Fit `width` x `height` inside a `max_dim` square, keeping aspect ratio
pub fn target_dimensions(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    if width <= max_dim && height <= max_dim {
        return (width, height);
    }

    if width >= height {
        let ratio = max_dim as f64 / width as f64;
        (max_dim, ((height as f64 * ratio).round() as u32).max(1))
    } else {
        let ratio = max_dim as f64 / height as f64;
        (((width as f64 * ratio).round() as u32).max(1), max_dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    fn create_test_image(width: u32, height: u32) -> DynamicImage {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let intensity = ((x + y) % 256) as u8;
            Rgb([intensity, intensity, intensity])
        });
        DynamicImage::ImageRgb8(img)
    }

    fn decoded_dimensions(bytes: &[u8]) -> (u32, u32) {
        image::load_from_memory(bytes).unwrap().dimensions()
    }

    #[test]
    fn test_target_dimensions() {
        assert_eq!(target_dimensions(1920, 1080, 512), (512, 288));
        assert_eq!(target_dimensions(1080, 1920, 512), (288, 512));
        assert_eq!(target_dimensions(100, 50, 300), (100, 50));
        assert_eq!(target_dimensions(5000, 1, 300), (300, 1));
    }

    #[test]
    fn test_aspect_ratio_preservation() {
        let generator = ThumbnailGenerator::new();

        let wide = generator.generate(&create_test_image(1920, 1080), 512).unwrap();
        let (w_width, w_height) = decoded_dimensions(&wide);
        assert_eq!(w_width, 512);
        assert!(w_height < 512);

        let tall = generator.generate(&create_test_image(1080, 1920), 512).unwrap();
        let (t_width, t_height) = decoded_dimensions(&tall);
        assert_eq!(t_height, 512);
        assert!(t_width < 512);
    }

    #[test]
    fn test_never_upscales() {
        let generator = ThumbnailGenerator::new();
        let bytes = generator.generate(&create_test_image(120, 80), 300).unwrap();
        assert_eq!(decoded_dimensions(&bytes), (120, 80));
    }

    #[test]
    fn test_zero_size_rejected() {
        let generator = ThumbnailGenerator::new();
        let result = generator.generate(&create_test_image(10, 10), 0);
        assert!(matches!(result, Err(ThumbnailError::InvalidSize { max_dim: 0 })));
    }

    #[test]
    fn test_decode_failure_is_thumbnail_error() {
        let generator = ThumbnailGenerator::new();
        let result = generator.generate_from_bytes(b"not an image", Some("photo.png"), 300);
        assert!(matches!(result, Err(ThumbnailError::Decode(_))));
    }

    #[test]
    fn test_generate_from_path_and_save() {
        let temp_dir = TempDir::new().unwrap();
        let original_path = temp_dir.path().join("original.png");
        create_test_image(800, 600).save(&original_path).unwrap();

        let generator = ThumbnailGenerator::new();
        let bytes = generator.generate_from_path(&original_path, 300).unwrap();

        let thumb_dir = temp_dir.path().join("thumbnails");
        let thumb_path = generator.thumbnail_path(&thumb_dir, "original.png");
        assert_eq!(thumb_path, thumb_dir.join("thumb_original.jpg"));

        generator.save(&bytes, &thumb_path).unwrap();
        assert!(thumb_path.exists());

        let thumb = image::open(&thumb_path).unwrap();
        assert_eq!(thumb.dimensions(), (300, 225));
    }
}
