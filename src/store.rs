use crate::core::ingest::IngestedPhoto;
use crate::core::photo::{CatalogError, PhotoRecord, PhotoStatus};
use crate::core::thumbnail::ThumbnailGenerator;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt record file: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("{filename}: could not copy original: {source}")]
    Import {
        filename: String,
        source: std::io::Error,
    },
}

/// Photo records for one library, kept as a JSON array on disk
pub struct CatalogStore {
    path: PathBuf,
    photos: Vec<PhotoRecord>,
}

impl CatalogStore {
    /// Open the record file, starting empty if it does not exist yet
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let photos = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content)?
            }
        } else {
            Vec::new()
        };

        log::debug!("Loaded {} record(s) from {}", photos.len(), path.display());
        Ok(Self { path, photos })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn photos(&self) -> &[PhotoRecord] {
        &self.photos
    }

    pub fn photos_mut(&mut self) -> &mut [PhotoRecord] {
        &mut self.photos
    }

    pub fn len(&self) -> usize {
        self.photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.photos.is_empty()
    }

    pub fn insert(&mut self, photo: PhotoRecord) {
        self.photos.push(photo);
    }

    pub fn get(&self, id: &str) -> Option<&PhotoRecord> {
        self.photos.iter().find(|p| p.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut PhotoRecord, StoreError> {
        self.photos
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| CatalogError::NotFound(id.to_string()).into())
    }

    /// Drop records marked deleted and hand them back for file cleanup
    pub fn purge_deleted(&mut self) -> Vec<PhotoRecord> {
        let (deleted, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.photos)
            .into_iter()
            .partition(|p| p.status == PhotoStatus::Deleted);
        self.photos = kept;
        deleted
    }

    /// Write all records, replacing the file atomically
    pub fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&self.photos)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path)?;

        log::debug!("Saved {} record(s) to {}", self.photos.len(), self.path.display());
        Ok(())
    }
}

/// Copied originals and thumbnails that back the records of one library
pub struct LibraryFiles {
    originals_dir: PathBuf,
    thumbnail_dir: PathBuf,
    thumbnails: ThumbnailGenerator,
}

impl LibraryFiles {
    pub fn new(originals_dir: impl Into<PathBuf>, thumbnail_dir: impl Into<PathBuf>) -> Self {
        Self {
            originals_dir: originals_dir.into(),
            thumbnail_dir: thumbnail_dir.into(),
            thumbnails: ThumbnailGenerator::new(),
        }
    }

    pub fn originals_dir(&self) -> &Path {
        &self.originals_dir
    }

    pub fn original_path(&self, photo: &PhotoRecord) -> PathBuf {
        self.originals_dir.join(&photo.filename)
    }

    /// Turn an analysed upload into a record backed by library files.
    ///
    /// A failed copy rejects the photo and leaves no partial file. A failed
    /// thumbnail write only drops the preview.
    pub fn import(
        &self,
        mut photo: IngestedPhoto,
        created_at: DateTime<Utc>,
        blur_threshold: f64,
    ) -> Result<PhotoRecord, StoreError> {
        let source = photo.source_path.take();
        let thumbnail = photo.thumbnail.take();
        let format = photo.format;
        let mut record = photo.into_record(created_at, blur_threshold);
        record.filename = format!("{}.{}", record.id, format.name());

        if let Some(source) = source {
            let dest = self.original_path(&record);
            let copied = fs::create_dir_all(&self.originals_dir).and_then(|_| fs::copy(&source, &dest));
            if let Err(e) = copied {
                let _ = remove_if_present(&dest);
                return Err(StoreError::Import {
                    filename: record.original_name,
                    source: e,
                });
            }
        }

        if let Some(bytes) = thumbnail {
            let thumb_path = self.thumbnails.thumbnail_path(&self.thumbnail_dir, &record.filename);
            match self.thumbnails.save(&bytes, &thumb_path) {
                Ok(()) => record.thumbnail_path = Some(thumb_path.to_string_lossy().into_owned()),
                Err(e) => log::warn!("{}: thumbnail not saved: {}", record.original_name, e),
            }
        }

        Ok(record)
    }

    /// Delete the original and thumbnail of a purged record
    pub fn remove(&self, photo: &PhotoRecord) -> Result<(), StoreError> {
        remove_if_present(&self.original_path(photo))?;
        if let Some(thumb) = &photo.thumbnail_path {
            remove_if_present(Path::new(thumb))?;
        }
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> Result<(), StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
