use crate::core::catalog::{DEFAULT_BLUR_THRESHOLD, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::core::ingest::IngestOptions;
use crate::core::quality::AnalysisSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not serialise config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisSettings,

    #[serde(default)]
    pub ingest: IngestOptions,

    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_blur_threshold")]
    pub blur_threshold: f64,

    #[serde(default = "default_page_size")]
    pub default_page_size: usize,

    /// Holds the record file plus the originals and thumbnails directories
    #[serde(default = "default_library_dir")]
    pub library_dir: PathBuf,
}

fn default_blur_threshold() -> f64 {
    DEFAULT_BLUR_THRESHOLD
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_library_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("photosieve")
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            blur_threshold: default_blur_threshold(),
            default_page_size: default_page_size(),
            library_dir: default_library_dir(),
        }
    }
}

impl Config {
    /// Load the user config, writing the defaults on first run
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("photosieve")
            .join("config.toml")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.analysis;
        let unit_fields = [
            ("analysis.brightness_weight", a.brightness_weight),
            ("analysis.contrast_weight", a.contrast_weight),
            ("analysis.sharpness_weight", a.sharpness_weight),
            ("analysis.underexposed_below", a.underexposed_below),
            ("analysis.overexposed_above", a.overexposed_above),
            ("analysis.exposure_penalty_score", a.exposure_penalty_score),
            ("analysis.screenshot_dark_ratio", a.screenshot_dark_ratio),
            ("catalog.blur_threshold", self.catalog.blur_threshold),
        ];
        for (field, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    field,
                    message: format!("{} is outside 0..=1", value),
                });
            }
        }

        if a.underexposed_below > a.overexposed_above {
            return Err(ConfigError::Invalid {
                field: "analysis.underexposed_below",
                message: "must not exceed overexposed_above".to_string(),
            });
        }

        let i = &self.ingest;
        if i.workers == Some(0) {
            return Err(ConfigError::Invalid {
                field: "ingest.workers",
                message: "must be at least 1".to_string(),
            });
        }
        if i.max_files_per_batch == 0 {
            return Err(ConfigError::Invalid {
                field: "ingest.max_files_per_batch",
                message: "must be at least 1".to_string(),
            });
        }
        if i.thumbnail_max_dim == 0 {
            return Err(ConfigError::Invalid {
                field: "ingest.thumbnail_max_dim",
                message: "must be at least 1".to_string(),
            });
        }
        if !(1..=100).contains(&i.thumbnail_quality) {
            return Err(ConfigError::Invalid {
                field: "ingest.thumbnail_quality",
                message: format!("{} is outside 1..=100", i.thumbnail_quality),
            });
        }

        let page_size = self.catalog.default_page_size;
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid {
                field: "catalog.default_page_size",
                message: format!("{} is outside 1..={}", page_size, MAX_PAGE_SIZE),
            });
        }

        Ok(())
    }

    pub fn records_path(&self) -> PathBuf {
        self.catalog.library_dir.join("photos.json")
    }

    pub fn originals_dir(&self) -> PathBuf {
        self.catalog.library_dir.join("originals")
    }

    pub fn thumbnail_dir(&self) -> PathBuf {
        self.catalog.library_dir.join("thumbnails")
    }
}
