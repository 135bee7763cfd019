use image::{DynamicImage, GenericImageView, GrayImage, ImageBuffer, ImageReader};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Image decoding failed: {0}")]
    Malformed(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid pixel buffer: {message}")]
    InvalidBuffer { message: String },
}

impl DecodeError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, DecodeError::UnsupportedFormat { .. })
    }
}

/// Image containers accepted at the ingest boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoFormat {
    Jpeg,
    Png,
    Webp,
    Gif,
    Bmp,
    Tiff,
}

impl PhotoFormat {
    pub const ALL: [PhotoFormat; 6] = [
        PhotoFormat::Jpeg,
        PhotoFormat::Png,
        PhotoFormat::Webp,
        PhotoFormat::Gif,
        PhotoFormat::Bmp,
        PhotoFormat::Tiff,
    ];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(PhotoFormat::Jpeg),
            "png" => Some(PhotoFormat::Png),
            "webp" => Some(PhotoFormat::Webp),
            "gif" => Some(PhotoFormat::Gif),
            "bmp" => Some(PhotoFormat::Bmp),
            "tif" | "tiff" => Some(PhotoFormat::Tiff),
            _ => None,
        }
    }

    /// Determine the format from a filename's extension, if it has one we accept
    pub fn from_filename(filename: &str) -> Option<Self> {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(PhotoFormat::Jpeg),
            image::ImageFormat::Png => Some(PhotoFormat::Png),
            image::ImageFormat::WebP => Some(PhotoFormat::Webp),
            image::ImageFormat::Gif => Some(PhotoFormat::Gif),
            image::ImageFormat::Bmp => Some(PhotoFormat::Bmp),
            image::ImageFormat::Tiff => Some(PhotoFormat::Tiff),
            _ => None,
        }
    }

    fn to_image_format(self) -> image::ImageFormat {
        match self {
            PhotoFormat::Jpeg => image::ImageFormat::Jpeg,
            PhotoFormat::Png => image::ImageFormat::Png,
            PhotoFormat::Webp => image::ImageFormat::WebP,
            PhotoFormat::Gif => image::ImageFormat::Gif,
            PhotoFormat::Bmp => image::ImageFormat::Bmp,
            PhotoFormat::Tiff => image::ImageFormat::Tiff,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PhotoFormat::Jpeg => "jpeg",
            PhotoFormat::Png => "png",
            PhotoFormat::Webp => "webp",
            PhotoFormat::Gif => "gif",
            PhotoFormat::Bmp => "bmp",
            PhotoFormat::Tiff => "tiff",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            PhotoFormat::Jpeg => "image/jpeg",
            PhotoFormat::Png => "image/png",
            PhotoFormat::Webp => "image/webp",
            PhotoFormat::Gif => "image/gif",
            PhotoFormat::Bmp => "image/bmp",
            PhotoFormat::Tiff => "image/tiff",
        }
    }
}

/// Whether a filename carries one of the accepted image extensions
pub fn is_supported_filename(filename: &str) -> bool {
    PhotoFormat::from_filename(filename).is_some()
}

/// Single-channel intensity samples in row-major order.
///
/// `samples.len() == width * height` and both dimensions are non-zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    samples: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, samples: Vec<u8>) -> Result<Self, DecodeError> {
        if width == 0 || height == 0 {
            return Err(DecodeError::InvalidBuffer {
                message: format!("dimensions must be non-zero, got {}x{}", width, height),
            });
        }
        let expected = width as usize * height as usize;
        if samples.len() != expected {
            return Err(DecodeError::InvalidBuffer {
                message: format!(
                    "expected {} samples for {}x{}, got {}",
                    expected,
                    width,
                    height,
                    samples.len()
                ),
            });
        }
        Ok(Self {
            width,
            height,
            samples,
        })
    }

    /// Buffer where every sample has the same intensity
    pub fn filled(width: u32, height: u32, value: u8) -> Result<Self, DecodeError> {
        Self::new(width, height, vec![value; width as usize * height as usize])
    }

    pub fn from_luma(gray: GrayImage) -> Result<Self, DecodeError> {
        let (width, height) = gray.dimensions();
        Self::new(width, height, gray.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples(&self) -> &[u8] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.samples[y as usize * self.width as usize + x as usize]
    }

    pub fn to_gray_image(&self) -> GrayImage {
        ImageBuffer::from_fn(self.width, self.height, |x, y| image::Luma([self.get(x, y)]))
    }
}

/// Basic facts about an image, read without running analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub format: PhotoFormat,
    pub width: u32,
    pub height: u32,
    pub has_alpha: bool,
}

/// A decoded image together with the container format it came from
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub format: PhotoFormat,
    pub image: DynamicImage,
}

impl DecodedImage {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn info(&self) -> ImageInfo {
        let (width, height) = self.dimensions();
        ImageInfo {
            format: self.format,
            width,
            height,
            has_alpha: self.image.color().has_alpha(),
        }
    }

    /// Flatten to luminance samples
    pub fn pixels(&self) -> Result<PixelBuffer, DecodeError> {
        PixelBuffer::from_luma(self.image.to_luma8())
    }
}

/// Decodes supported image containers into pixel data
pub struct PixelSource;

impl PixelSource {
    pub fn new() -> Self {
        Self
    }

    /// Identify the container format.
    ///
    /// The byte signature wins; the filename extension is only consulted when
    /// the signature is not recognised at all.
    pub fn sniff(&self, bytes: &[u8], filename: Option<&str>) -> Result<PhotoFormat, DecodeError> {
        match image::guess_format(bytes) {
            Ok(format) => PhotoFormat::from_image_format(format).ok_or_else(|| {
                DecodeError::UnsupportedFormat {
                    format: format!("{:?}", format).to_lowercase(),
                }
            }),
            Err(_) => {
                let ext = filename
                    .and_then(|name| Path::new(name).extension())
                    .and_then(|ext| ext.to_str());
                match ext {
                    Some(ext) => PhotoFormat::from_extension(ext).ok_or_else(|| {
                        DecodeError::UnsupportedFormat {
                            format: ext.to_lowercase(),
                        }
                    }),
                    None => Err(DecodeError::UnsupportedFormat {
                        format: "unknown".to_string(),
                    }),
                }
            }
        }
    }

    pub fn decode_image(
        &self,
        bytes: &[u8],
        filename: Option<&str>,
    ) -> Result<DecodedImage, DecodeError> {
        let format = self.sniff(bytes, filename)?;
        let mut reader = ImageReader::new(Cursor::new(bytes));
        reader.set_format(format.to_image_format());
        let image = reader.decode()?;

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DecodeError::InvalidBuffer {
                message: "decoded image has no pixels".to_string(),
            });
        }

        Ok(DecodedImage { format, image })
    }

    /// Read a file fully and decode it; the handle is closed before decoding
    pub fn decode_image_path(&self, path: &Path) -> Result<DecodedImage, DecodeError> {
        let bytes = std::fs::read(path)?;
        let filename = path.file_name().and_then(|name| name.to_str());
        self.decode_image(&bytes, filename)
    }

    /// Decode straight to a grayscale pixel buffer
    pub fn decode(&self, bytes: &[u8], filename: Option<&str>) -> Result<PixelBuffer, DecodeError> {
        self.decode_image(bytes, filename)?.pixels()
    }

    pub fn decode_path(&self, path: &Path) -> Result<PixelBuffer, DecodeError> {
        self.decode_image_path(path)?.pixels()
    }

    pub fn probe(&self, bytes: &[u8], filename: Option<&str>) -> Result<ImageInfo, DecodeError> {
        Ok(self.decode_image(bytes, filename)?.info())
    }
}

impl Default for PixelSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn encode_png(width: u32, height: u32, f: impl Fn(u32, u32) -> Rgb<u8>) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, f);
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_png_to_grayscale() {
        let bytes = encode_png(4, 3, |_, _| Rgb([255, 255, 255]));
        let source = PixelSource::new();

        let pixels = source.decode(&bytes, Some("white.png")).unwrap();

        assert_eq!(pixels.width(), 4);
        assert_eq!(pixels.height(), 3);
        assert_eq!(pixels.len(), 12);
        assert!(pixels.samples().iter().all(|&p| p == 255));
    }

    #[test]
    fn test_signature_wins_over_extension() {
        let bytes = encode_png(2, 2, |_, _| Rgb([10, 10, 10]));
        let source = PixelSource::new();

        let format = source.sniff(&bytes, Some("mislabelled.jpg")).unwrap();
        assert_eq!(format, PhotoFormat::Png);
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let source = PixelSource::new();
        let err = source.decode(b"plain text", Some("notes.txt")).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_unknown_bytes_without_name_rejected() {
        let source = PixelSource::new();
        let err = source.decode(b"\x00\x01\x02", None).unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_corrupted_jpeg_is_decode_error() {
        let source = PixelSource::new();
        let err = source.decode(b"definitely not a jpeg", Some("broken.jpg")).unwrap_err();
        assert!(!err.is_unsupported());
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_probe_reports_dimensions() {
        let bytes = encode_png(7, 5, |x, y| Rgb([x as u8, y as u8, 0]));
        let info = PixelSource::new().probe(&bytes, None).unwrap();
        assert_eq!(info.format, PhotoFormat::Png);
        assert_eq!((info.width, info.height), (7, 5));
        assert!(!info.has_alpha);
    }

    #[test]
    fn test_pixel_buffer_rejects_wrong_length() {
        assert!(PixelBuffer::new(2, 2, vec![0; 3]).is_err());
        assert!(PixelBuffer::new(0, 2, vec![]).is_err());
    }

    #[test]
    fn test_extension_helpers() {
        assert!(is_supported_filename("IMG_0001.JPG"));
        assert!(is_supported_filename("scan.tif"));
        assert!(!is_supported_filename("movie.mp4"));
        assert_eq!(PhotoFormat::Webp.mime_type(), "image/webp");
    }
}
