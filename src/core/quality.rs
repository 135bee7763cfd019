use crate::core::pixels::{DecodeError, PixelBuffer};
use serde::{Deserialize, Serialize};

/// Tunable constants for quality scoring and screenshot detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSettings {
    #[serde(default = "default_brightness_weight")]
    pub brightness_weight: f64,

    #[serde(default = "default_contrast_weight")]
    pub contrast_weight: f64,

    #[serde(default = "default_sharpness_weight")]
    pub sharpness_weight: f64,

    /// Mean brightness below this counts as under-exposed
    #[serde(default = "default_underexposed_below")]
    pub underexposed_below: f64,

    /// Mean brightness above this counts as over-exposed
    #[serde(default = "default_overexposed_above")]
    pub overexposed_above: f64,

    /// Brightness term used in place of 1.0 when exposure is off
    #[serde(default = "default_exposure_penalty_score")]
    pub exposure_penalty_score: f64,

    /// Samples strictly below this intensity count as near-black
    #[serde(default = "default_dark_pixel_cutoff")]
    pub dark_pixel_cutoff: u8,

    /// Near-black fraction above which an image is classed as a screenshot
    #[serde(default = "default_screenshot_dark_ratio")]
    pub screenshot_dark_ratio: f64,
}

fn default_brightness_weight() -> f64 {
    0.2
}

fn default_contrast_weight() -> f64 {
    0.3
}

fn default_sharpness_weight() -> f64 {
    0.5
}

fn default_underexposed_below() -> f64 {
    0.1
}

fn default_overexposed_above() -> f64 {
    0.9
}

fn default_exposure_penalty_score() -> f64 {
    0.3
}

fn default_dark_pixel_cutoff() -> u8 {
    50
}

fn default_screenshot_dark_ratio() -> f64 {
    0.1
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            brightness_weight: default_brightness_weight(),
            contrast_weight: default_contrast_weight(),
            sharpness_weight: default_sharpness_weight(),
            underexposed_below: default_underexposed_below(),
            overexposed_above: default_overexposed_above(),
            exposure_penalty_score: default_exposure_penalty_score(),
            dark_pixel_cutoff: default_dark_pixel_cutoff(),
            screenshot_dark_ratio: default_screenshot_dark_ratio(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub brightness: f64,
    pub contrast: f64,
    pub sharpness: f64,
    pub quality: f64,
    pub is_screenshot: bool,
}

impl QualityReport {
    /// Neutral values used when the image could not be decoded
    pub fn fallback() -> Self {
        Self {
            brightness: 0.5,
            contrast: 0.5,
            sharpness: 0.5,
            quality: 0.5,
            is_screenshot: false,
        }
    }

    pub fn is_blurry(&self, threshold: f64) -> bool {
        self.quality < threshold
    }
}

pub struct QualityAnalyzer {
    settings: AnalysisSettings,
}

impl QualityAnalyzer {
    pub fn new() -> Self {
        Self::with_settings(AnalysisSettings::default())
    }

    pub fn with_settings(settings: AnalysisSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn analyze(&self, pixels: &PixelBuffer) -> QualityReport {
        let brightness = self.calculate_brightness(pixels);
        let contrast = self.calculate_contrast(pixels);
        let sharpness = self.calculate_sharpness(pixels);
        let quality = self.calculate_quality(brightness, contrast, sharpness);
        let is_screenshot = self.detect_screenshot(pixels);

        QualityReport {
            brightness,
            contrast,
            sharpness,
            quality,
            is_screenshot,
        }
    }

    /// Analyse a decode result, falling back to neutral values on failure
    pub fn analyze_decoded(&self, pixels: Result<&PixelBuffer, &DecodeError>) -> QualityReport {
        match pixels {
            Ok(pixels) => self.analyze(pixels),
            Err(e) => {
                log::warn!("Quality analysis fell back to defaults: {}", e);
                QualityReport::fallback()
            }
        }
    }

    fn mean(&self, pixels: &PixelBuffer) -> f64 {
        let sum: u64 = pixels.samples().iter().map(|&p| p as u64).sum();
        sum as f64 / pixels.len() as f64
    }

    fn calculate_brightness(&self, pixels: &PixelBuffer) -> f64 {
        (self.mean(pixels) / 255.0).clamp(0.0, 1.0)
    }

    fn calculate_contrast(&self, pixels: &PixelBuffer) -> f64 {
        let mean = self.mean(pixels);
        let variance = pixels
            .samples()
            .iter()
            .map(|&p| {
                let d = p as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / pixels.len() as f64;

        (variance.sqrt() / 128.0).min(1.0)
    }

    /// Mean absolute 4-neighbour Laplacian over interior pixels, scaled to [0, 1]
    fn calculate_sharpness(&self, pixels: &PixelBuffer) -> f64 {
        let (width, height) = (pixels.width(), pixels.height());
        if width < 3 || height < 3 {
            return 0.0;
        }

        let mut sum = 0u64;
        let mut count = 0u64;

        for y in 1..(height - 1) {
            for x in 1..(width - 1) {
                let laplacian = 4 * pixels.get(x, y) as i32
                    - pixels.get(x - 1, y) as i32
                    - pixels.get(x + 1, y) as i32
                    - pixels.get(x, y - 1) as i32
                    - pixels.get(x, y + 1) as i32;

                sum += laplacian.unsigned_abs() as u64;
                count += 1;
            }
        }

        let average = sum as f64 / count as f64;
        (average / 255.0).min(1.0)
    }

    fn calculate_quality(&self, brightness: f64, contrast: f64, sharpness: f64) -> f64 {
        let s = &self.settings;
        let exposure_off = brightness < s.underexposed_below || brightness > s.overexposed_above;
        let brightness_score = if exposure_off {
            s.exposure_penalty_score
        } else {
            1.0
        };

        let quality = brightness_score * s.brightness_weight
            + contrast * s.contrast_weight
            + sharpness * s.sharpness_weight;

        quality.clamp(0.0, 1.0)
    }

    fn detect_screenshot(&self, pixels: &PixelBuffer) -> bool {
        let dark = pixels
            .samples()
            .iter()
            .filter(|&&p| p < self.settings.dark_pixel_cutoff)
            .count();

        dark as f64 / pixels.len() as f64 > self.settings.screenshot_dark_ratio
    }
}

impl Default for QualityAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
