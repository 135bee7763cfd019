use crate::core::perceptual::PerceptualHash;
use crate::core::quality::QualityReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

pub const MAX_TAG_LEN: usize = 20;

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid sort: {0}")]
    InvalidSort(String),

    #[error("Page must be 1 or greater, got {0}")]
    InvalidPage(usize),

    #[error("Limit must be between 1 and 100, got {0}")]
    InvalidLimit(usize),

    #[error("Threshold must be between 0 and 1, got {0}")]
    InvalidThreshold(f64),

    #[error("Tags must be 1-{max} characters: {tag:?}")]
    InvalidTag { tag: String, max: usize },

    #[error("Photo {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: PhotoStatus,
        to: PhotoStatus,
    },

    #[error("Photo not found: {0}")]
    NotFound(String),
}

/// Lifecycle bucket of a stored photo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PhotoStatus {
    #[default]
    Active,
    Trash,
    /// Permanently deleted, waiting for the file to be purged
    Deleted,
}

impl PhotoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoStatus::Active => "active",
            PhotoStatus::Trash => "trash",
            PhotoStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for PhotoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhotoStatus {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(PhotoStatus::Active),
            "trash" => Ok(PhotoStatus::Trash),
            "deleted" => Ok(PhotoStatus::Deleted),
            other => Err(CatalogError::InvalidStatus(other.to_string())),
        }
    }
}

/// Analysis fields attached to a photo at ingest and by the grouping pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PhotoAnalysis {
    pub quality: Option<f64>,
    pub brightness: Option<f64>,
    pub contrast: Option<f64>,
    pub sharpness: Option<f64>,
    pub is_blurry: bool,
    pub is_screenshot: bool,
    pub is_duplicate: bool,
    /// Id of the kept representative; `None` for the representative itself
    pub duplicate_group: Option<String>,
}

impl PhotoAnalysis {
    pub fn from_report(report: &QualityReport, blur_threshold: f64) -> Self {
        Self {
            quality: Some(report.quality),
            brightness: Some(report.brightness),
            contrast: Some(report.contrast),
            sharpness: Some(report.sharpness),
            is_blurry: report.is_blurry(blur_threshold),
            is_screenshot: report.is_screenshot,
            is_duplicate: false,
            duplicate_group: None,
        }
    }

    /// `quality < threshold`; photos never analysed do not match
    pub fn is_below(&self, threshold: f64) -> bool {
        self.quality.is_some_and(|q| q < threshold)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub id: String,
    pub original_name: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub content_hash: String,
    pub perceptual_hash: Option<PerceptualHash>,
    pub thumbnail_path: Option<String>,
    #[serde(default)]
    pub analysis: PhotoAnalysis,
    #[serde(default)]
    pub status: PhotoStatus,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

pub fn new_photo_id() -> String {
    format!("pho_{}", Uuid::new_v4().simple())
}

impl PhotoRecord {
    pub fn new(original_name: impl Into<String>, size: u64, content_hash: impl Into<String>) -> Self {
        let original_name = original_name.into();
        Self {
            id: new_photo_id(),
            filename: original_name.clone(),
            original_name,
            mime_type: None,
            size,
            width: None,
            height: None,
            content_hash: content_hash.into(),
            perceptual_hash: None,
            thumbnail_path: None,
            analysis: PhotoAnalysis::default(),
            status: PhotoStatus::Active,
            favorite: false,
            tags: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == PhotoStatus::Active
    }

    fn transition(&mut self, from: PhotoStatus, to: PhotoStatus) -> Result<(), CatalogError> {
        if self.status != from {
            return Err(CatalogError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn move_to_trash(&mut self) -> Result<(), CatalogError> {
        self.transition(PhotoStatus::Active, PhotoStatus::Trash)
    }

    pub fn restore(&mut self) -> Result<(), CatalogError> {
        self.transition(PhotoStatus::Trash, PhotoStatus::Active)
    }

    /// Only trashed photos can be permanently deleted
    pub fn mark_deleted(&mut self) -> Result<(), CatalogError> {
        self.transition(PhotoStatus::Trash, PhotoStatus::Deleted)
    }

    /// Flip the favorite flag on an active photo and return the new value
    pub fn toggle_favorite(&mut self) -> Result<bool, CatalogError> {
        if !self.is_active() {
            return Err(CatalogError::NotFound(self.id.clone()));
        }
        self.favorite = !self.favorite;
        Ok(self.favorite)
    }

    pub fn set_tags<I, S>(&mut self, tags: I) -> Result<(), CatalogError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if !self.is_active() {
            return Err(CatalogError::NotFound(self.id.clone()));
        }

        let mut cleaned = Vec::new();
        for tag in tags {
            let tag = tag.as_ref().trim();
            let len = tag.chars().count();
            if len == 0 || len > MAX_TAG_LEN {
                return Err(CatalogError::InvalidTag {
                    tag: tag.to_string(),
                    max: MAX_TAG_LEN,
                });
            }
            cleaned.push(tag.to_string());
        }

        self.tags = cleaned;
        Ok(())
    }

    /// "1920 × 1080", or "Unknown" when the image was never decoded
    pub fn resolution(&self) -> String {
        match (self.width, self.height) {
            (Some(w), Some(h)) => format!("{} × {}", w, h),
            _ => "Unknown".to_string(),
        }
    }

    pub fn formatted_size(&self) -> String {
        format_file_size(self.size)
    }
}

/// Human readable size with one decimal, e.g. "1.5 MB"
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
