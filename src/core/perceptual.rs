use crate::core::pixels::{DecodeError, PixelBuffer};
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const HASH_BITS: u32 = 64;
const GRID: u32 = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PerceptualHashParseError {
    #[error("expected {expected} bits, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("invalid bit character {0:?}")]
    InvalidBit(char),
}

/// 64-bit average hash, first bit = top-left cell of the 8x8 grid.
///
/// Serialises as a string of 64 `'0'`/`'1'` characters in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PerceptualHash(u64);

impl PerceptualHash {
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    /// Hamming distance between two hashes
    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// 1.0 for identical hashes, 0.0 when every bit differs
    pub fn similarity(&self, other: &PerceptualHash) -> f64 {
        1.0 - self.distance(other) as f64 / HASH_BITS as f64
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:064b}", self.0)
    }
}

impl FromStr for PerceptualHash {
    type Err = PerceptualHashParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let count = s.chars().count();
        if count != HASH_BITS as usize {
            return Err(PerceptualHashParseError::Length {
                expected: HASH_BITS as usize,
                actual: count,
            });
        }

        let mut bits = 0u64;
        for c in s.chars() {
            bits <<= 1;
            match c {
                '1' => bits |= 1,
                '0' => {}
                other => return Err(PerceptualHashParseError::InvalidBit(other)),
            }
        }
        Ok(Self(bits))
    }
}

impl TryFrom<String> for PerceptualHash {
    type Error = PerceptualHashParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PerceptualHash> for String {
    fn from(hash: PerceptualHash) -> Self {
        hash.to_string()
    }
}

/// Average-hash fingerprint for catching re-saved copies of the same picture
pub struct PerceptualHasher {
    filter: FilterType,
}

impl PerceptualHasher {
    pub fn new() -> Self {
        Self {
            filter: FilterType::Triangle,
        }
    }

    /// Resize to an 8x8 grid ignoring aspect ratio, then set one bit per cell
    /// that is brighter than the grid mean.
    pub fn hash(&self, pixels: &PixelBuffer) -> PerceptualHash {
        let gray = pixels.to_gray_image();
        let grid = imageops::resize(&gray, GRID, GRID, self.filter);
        let cells = grid.as_raw();

        let sum: u64 = cells.iter().map(|&c| c as u64).sum();
        let count = cells.len() as u64;

        // cell > sum / count, kept in integers
        let bits = cells.iter().fold(0u64, |acc, &cell| {
            let bit = (cell as u64 * count > sum) as u64;
            (acc << 1) | bit
        });

        PerceptualHash(bits)
    }

    /// Hash a decode result; a failed decode yields no hash rather than an error
    pub fn hash_decoded(&self, pixels: Result<&PixelBuffer, &DecodeError>) -> Option<PerceptualHash> {
        match pixels {
            Ok(pixels) => Some(self.hash(pixels)),
            Err(e) => {
                log::warn!("Skipping perceptual hash: {}", e);
                None
            }
        }
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pixels::PixelSource;
    use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn split_image(width: u32, height: u32) -> ImageBuffer<Rgb<u8>, Vec<u8>> {
        ImageBuffer::from_fn(width, height, |x, y| {
            let dark = x < width / 2;
            let band = y < height / 4;
            match (dark, band) {
                (true, _) => Rgb([40, 40, 40]),
                (false, true) => Rgb([120, 200, 220]),
                (false, false) => Rgb([210, 210, 200]),
            }
        })
    }

    fn to_jpeg(img: &ImageBuffer<Rgb<u8>, Vec<u8>>, quality: u8) -> Vec<u8> {
        let mut out = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut out, quality);
        img.write_with_encoder(encoder).unwrap();
        out
    }

    #[test]
    fn test_hash_has_64_bits() {
        let pixels = PixelBuffer::new(16, 16, (0..=255).collect()).unwrap();
        let hash = PerceptualHasher::new().hash(&pixels);
        let text = hash.to_string();
        assert_eq!(text.len(), 64);
        assert!(text.chars().all(|c| c == '0' || c == '1'));
    }

    #[test]
    fn test_flat_image_hashes_to_zero() {
        let pixels = PixelBuffer::filled(32, 20, 128).unwrap();
        let hash = PerceptualHasher::new().hash(&pixels);
        assert_eq!(hash.bits(), 0);
    }

    #[test]
    fn test_left_right_split_bits() {
        // Left half dark, right half bright: every row reads 00001111
        let pixels = PixelBuffer::new(
            16,
            16,
            (0..256).map(|i| if i % 16 < 8 { 0 } else { 255 }).collect(),
        )
        .unwrap();
        let hash = PerceptualHasher::new().hash(&pixels);
        assert_eq!(hash.to_string(), "00001111".repeat(8));
    }

    #[test]
    fn test_hash_is_deterministic() {
        let pixels = PixelBuffer::new(10, 10, (0..100).map(|i| (i * 7 % 256) as u8).collect()).unwrap();
        let hasher = PerceptualHasher::new();
        assert_eq!(hasher.hash(&pixels), hasher.hash(&pixels));
    }

    #[test]
    fn test_stable_across_jpeg_quality() {
        let img = split_image(128, 96);
        let source = PixelSource::new();
        let hasher = PerceptualHasher::new();

        let high = source.decode(&to_jpeg(&img, 95), Some("a.jpg")).unwrap();
        let low = source.decode(&to_jpeg(&img, 60), Some("b.jpg")).unwrap();

        let distance = hasher.hash(&high).distance(&hasher.hash(&low));
        assert!(distance <= 2, "distance was {}", distance);
    }

    #[test]
    fn test_identical_across_lossless_formats() {
        let img = DynamicImage::ImageRgb8(split_image(96, 64));
        let source = PixelSource::new();
        let hasher = PerceptualHasher::new();

        let hashes: Vec<PerceptualHash> = [
            (ImageFormat::Png, "a.png"),
            (ImageFormat::Bmp, "a.bmp"),
            (ImageFormat::Tiff, "a.tiff"),
        ]
        .into_iter()
        .map(|(format, name)| {
            let mut out = Cursor::new(Vec::new());
            img.write_to(&mut out, format).unwrap();
            hasher.hash(&source.decode(&out.into_inner(), Some(name)).unwrap())
        })
        .collect();

        assert_eq!(hashes[0], hashes[1]);
        assert_eq!(hashes[0], hashes[2]);
        assert_ne!(hashes[0].bits(), 0);
    }

    #[test]
    fn test_fill_resize_ignores_aspect_ratio() {
        // Same left/right split, stretched to very different aspect ratios
        let wide = PixelBuffer::new(64, 8, (0..512).map(|i| if i % 64 < 32 { 0 } else { 255 }).collect()).unwrap();
        let tall = PixelBuffer::new(8, 64, (0..512).map(|i| if i % 8 < 4 { 0 } else { 255 }).collect()).unwrap();
        let hasher = PerceptualHasher::new();
        assert_eq!(hasher.hash(&wide), hasher.hash(&tall));
    }

    #[test]
    fn test_decode_failure_yields_none() {
        let source = PixelSource::new();
        let result = source.decode(b"garbage", Some("x.png"));
        assert!(PerceptualHasher::new().hash_decoded(result.as_ref()).is_none());
    }

    #[test]
    fn test_string_round_trip_and_errors() {
        let hash = PerceptualHash::from_bits(0xF0F0_0000_0000_0001);
        let parsed: PerceptualHash = hash.to_string().parse().unwrap();
        assert_eq!(parsed, hash);

        assert_eq!(
            "0101".parse::<PerceptualHash>(),
            Err(PerceptualHashParseError::Length { expected: 64, actual: 4 })
        );
        let bad = format!("{}2", "0".repeat(63));
        assert_eq!(
            bad.parse::<PerceptualHash>(),
            Err(PerceptualHashParseError::InvalidBit('2'))
        );
    }

    #[test]
    fn test_distance_and_similarity() {
        let a = PerceptualHash::from_bits(0);
        let b = PerceptualHash::from_bits(0b1011);
        assert_eq!(a.distance(&b), 3);
        assert_eq!(a.similarity(&a), 1.0);
        assert_eq!(a.similarity(&PerceptualHash::from_bits(u64::MAX)), 0.0);
    }

    #[test]
    fn test_serializes_as_bit_string() {
        let hash = PerceptualHash::from_bits(1);
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}1\"", "0".repeat(63)));
        let back: PerceptualHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }
}
