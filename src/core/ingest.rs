use crate::core::hash::{ContentHasher, HashError};
use crate::core::perceptual::{PerceptualHash, PerceptualHasher};
use crate::core::photo::{PhotoAnalysis, PhotoRecord};
use crate::core::pixels::{DecodeError, PhotoFormat, PixelSource};
use crate::core::quality::{AnalysisSettings, QualityAnalyzer, QualityReport};
use crate::core::thumbnail::{ThumbnailError, ThumbnailGenerator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;

const MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{filename}: unsupported format {format}")]
    UnsupportedFormat { filename: String, format: String },

    #[error("{filename}: could not decode image: {source}")]
    Decode { filename: String, source: DecodeError },

    #[error("{filename}: thumbnail failed: {source}")]
    Thumbnail {
        filename: String,
        source: ThumbnailError,
    },

    #[error("{filename}: hashing failed: {source}")]
    Hash { filename: String, source: HashError },

    #[error("{filename}: analysis did not finish within {seconds:.1}s")]
    Timeout { filename: String, seconds: f64 },

    #[error("{filename}: worker failed: {message}")]
    Worker { filename: String, message: String },

    #[error("Batch holds {count} files, the limit is {max}")]
    TooManyFiles { count: usize, max: usize },
}

impl IngestError {
    /// Stable reason string reported per file
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::UnsupportedFormat { .. } => "UnsupportedFormat",
            IngestError::Decode { .. } => "DecodeError",
            IngestError::Thumbnail { .. } => "ThumbnailError",
            IngestError::Hash { .. } => "HashError",
            IngestError::Timeout { .. } => "Timeout",
            IngestError::Worker { .. } => "WorkerError",
            IngestError::TooManyFiles { .. } => "TooManyFiles",
        }
    }

    pub fn filename(&self) -> Option<&str> {
        match self {
            IngestError::UnsupportedFormat { filename, .. }
            | IngestError::Decode { filename, .. }
            | IngestError::Thumbnail { filename, .. }
            | IngestError::Hash { filename, .. }
            | IngestError::Timeout { filename, .. }
            | IngestError::Worker { filename, .. } => Some(filename),
            IngestError::TooManyFiles { .. } => None,
        }
    }
}

/// Per-file failure or notice, as reported back to the uploader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    pub filename: String,
    pub kind: String,
    pub reason: String,
}

impl From<&IngestError> for FileError {
    fn from(error: &IngestError) -> Self {
        Self {
            filename: error.filename().unwrap_or_default().to_string(),
            kind: error.kind().to_string(),
            reason: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestOptions {
    /// Unset means one worker per CPU on the running machine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    #[serde(default = "default_max_files_per_batch")]
    pub max_files_per_batch: usize,

    #[serde(default = "default_thumbnail_max_dim")]
    pub thumbnail_max_dim: u32,

    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,

    #[serde(default = "default_timeout_base_secs")]
    pub timeout_base_secs: u64,

    #[serde(default = "default_timeout_secs_per_mib")]
    pub timeout_secs_per_mib: u64,
}

fn default_max_files_per_batch() -> usize {
    10
}

fn default_thumbnail_max_dim() -> u32 {
    crate::core::thumbnail::DEFAULT_MAX_DIM
}

fn default_thumbnail_quality() -> u8 {
    crate::core::thumbnail::DEFAULT_QUALITY
}

fn default_timeout_base_secs() -> u64 {
    10
}

fn default_timeout_secs_per_mib() -> u64 {
    2
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            workers: None,
            max_files_per_batch: default_max_files_per_batch(),
            thumbnail_max_dim: default_thumbnail_max_dim(),
            thumbnail_quality: default_thumbnail_quality(),
            timeout_base_secs: default_timeout_base_secs(),
            timeout_secs_per_mib: default_timeout_secs_per_mib(),
        }
    }
}

impl IngestOptions {
    /// Time allowed for one file: a fixed base plus a per-MiB allowance
    /// Saturates at `Duration::MAX` for oversized settings.
    pub fn timeout_for(&self, size: u64) -> Duration {
        let per_size = self.timeout_secs_per_mib as f64 * (size as f64 / MIB);
        let per_size = Duration::try_from_secs_f64(per_size).unwrap_or(Duration::MAX);
        Duration::from_secs(self.timeout_base_secs).saturating_add(per_size)
    }

    /// Configured worker count, or one per CPU when left unset
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(num_cpus::get).max(1)
    }
}

#[derive(Debug, Clone)]
pub enum UploadSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
}

/// One file handed to the ingest pipeline
#[derive(Debug, Clone)]
pub struct Upload {
    pub original_name: String,
    pub source: UploadSource,
}

impl Upload {
    pub fn from_bytes(original_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            original_name: original_name.into(),
            source: UploadSource::Bytes(bytes),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let original_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            original_name,
            source: UploadSource::Path(path),
        }
    }

    /// Size used for the timeout budget; unreadable paths count as empty
    pub fn size_hint(&self) -> u64 {
        match &self.source {
            UploadSource::Bytes(bytes) => bytes.len() as u64,
            UploadSource::Path(path) => fs::metadata(path).map(|m| m.len()).unwrap_or(0),
        }
    }
}

/// Everything computed for one accepted file
#[derive(Debug, Clone)]
pub struct IngestedPhoto {
    pub original_name: String,
    /// Set when the upload came from a file on disk
    pub source_path: Option<PathBuf>,
    pub format: PhotoFormat,
    pub size: u64,
    pub content_hash: String,
    pub perceptual_hash: Option<PerceptualHash>,
    pub report: QualityReport,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Encoded JPEG preview, if one could be produced
    pub thumbnail: Option<Vec<u8>>,
    /// Non-fatal problems (decode fallback, missing thumbnail)
    pub notices: Vec<FileError>,
}

impl IngestedPhoto {
    /// False when analysis used the neutral fallback values
    pub fn is_analyzed(&self) -> bool {
        self.perceptual_hash.is_some()
    }

    pub fn into_record(self, created_at: DateTime<Utc>, blur_threshold: f64) -> PhotoRecord {
        let mut record = PhotoRecord::new(self.original_name, self.size, self.content_hash);
        record.mime_type = Some(self.format.mime_type().to_string());
        record.width = self.width;
        record.height = self.height;
        record.perceptual_hash = self.perceptual_hash;
        record.analysis = PhotoAnalysis::from_report(&self.report, blur_threshold);
        record.created_at = created_at;
        record
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// Accepted files, in upload order
    pub photos: Vec<IngestedPhoto>,
    pub errors: Vec<FileError>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

struct Pipeline {
    source: PixelSource,
    hasher: ContentHasher,
    perceptual: PerceptualHasher,
    analyzer: QualityAnalyzer,
    thumbnails: ThumbnailGenerator,
    thumbnail_max_dim: u32,
}

impl Pipeline {
    fn process(&self, upload: Upload) -> Result<IngestedPhoto, IngestError> {
        let started = Instant::now();
        let Upload {
            original_name: name,
            source,
        } = upload;

        let (bytes, source_path) = match source {
            UploadSource::Bytes(bytes) => (bytes, None),
            UploadSource::Path(path) => {
                let bytes = fs::read(&path).map_err(|e| IngestError::Hash {
                    filename: name.clone(),
                    source: HashError::Io(e),
                })?;
                (bytes, Some(path))
            }
        };

        let format = match self.source.sniff(&bytes, Some(&name)) {
            Ok(format) => format,
            Err(DecodeError::UnsupportedFormat { format }) => {
                return Err(IngestError::UnsupportedFormat {
                    filename: name,
                    format,
                })
            }
            Err(source) => {
                return Err(IngestError::Decode {
                    filename: name,
                    source,
                })
            }
        };

        // The same buffer feeds the hash, the decoder and the stored size
        let content_hash = self.hasher.hash_bytes(&bytes);
        let mut notices = Vec::new();

        let decoded = self
            .source
            .decode_image(&bytes, Some(&name))
            .and_then(|image| image.pixels().map(|pixels| (image, pixels)));
        let pixels = decoded.as_ref().map(|(_, pixels)| pixels);
        let perceptual_hash = self.perceptual.hash_decoded(pixels);
        let report = self.analyzer.analyze_decoded(pixels);

        let (dimensions, thumbnail) = match decoded {
            Ok((image, _)) => {
                let thumbnail = match self.thumbnails.generate_decoded(&image, self.thumbnail_max_dim) {
                    Ok(bytes) => Some(bytes),
                    Err(source) => {
                        let error = IngestError::Thumbnail {
                            filename: name.clone(),
                            source,
                        };
                        log::warn!("{}", error);
                        notices.push(FileError::from(&error));
                        None
                    }
                };
                (Some(image.dimensions()), thumbnail)
            }
            Err(source) => {
                let error = IngestError::Decode {
                    filename: name.clone(),
                    source,
                };
                notices.push(FileError::from(&error));
                (None, None)
            }
        };

        log::debug!("Processed {} in {:?}", name, started.elapsed());

        Ok(IngestedPhoto {
            original_name: name,
            source_path,
            format,
            size: bytes.len() as u64,
            content_hash,
            perceptual_hash,
            report,
            width: dimensions.map(|(w, _)| w),
            height: dimensions.map(|(_, h)| h),
            thumbnail,
            notices,
        })
    }
}

/// Runs per-file analysis for upload batches on a bounded worker pool
pub struct IngestService {
    pipeline: Arc<Pipeline>,
    options: IngestOptions,
}

impl IngestService {
    pub fn new() -> Self {
        Self::with_settings(IngestOptions::default(), AnalysisSettings::default())
    }

    pub fn with_settings(options: IngestOptions, analysis: AnalysisSettings) -> Self {
        let pipeline = Pipeline {
            source: PixelSource::new(),
            hasher: ContentHasher::new(),
            perceptual: PerceptualHasher::new(),
            analyzer: QualityAnalyzer::with_settings(analysis),
            thumbnails: ThumbnailGenerator::with_quality(options.thumbnail_quality),
            thumbnail_max_dim: options.thumbnail_max_dim,
        };
        Self {
            pipeline: Arc::new(pipeline),
            options,
        }
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Analyse one file on the calling thread
    pub fn process(&self, upload: Upload) -> Result<IngestedPhoto, IngestError> {
        self.pipeline.process(upload)
    }

    /// Analyse a batch concurrently.
    ///
    /// A bad file never fails the batch: it lands in `BatchReport::errors`
    /// and the remaining files carry on. Only an oversized batch is rejected
    /// as a whole.
    pub async fn ingest_batch(&self, uploads: Vec<Upload>) -> Result<BatchReport, IngestError> {
        if uploads.len() > self.options.max_files_per_batch {
            return Err(IngestError::TooManyFiles {
                count: uploads.len(),
                max: self.options.max_files_per_batch,
            });
        }

        let semaphore = Arc::new(Semaphore::new(self.options.worker_count()));
        let mut tasks = Vec::with_capacity(uploads.len());

        for upload in uploads {
            let filename = upload.original_name.clone();
            let timeout = self.options.timeout_for(upload.size_hint());
            let pipeline = self.pipeline.clone();
            let semaphore = semaphore.clone();

            let task = tokio::spawn(async move {
                let permit = semaphore.acquire_owned().await.map_err(|e| IngestError::Worker {
                    filename: upload.original_name.clone(),
                    message: e.to_string(),
                })?;

                let name = upload.original_name.clone();
                // The permit lives as long as the blocking work, even past a timeout
                let work = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    pipeline.process(upload)
                });

                match tokio::time::timeout(timeout, work).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(e)) => Err(IngestError::Worker {
                        filename: name,
                        message: e.to_string(),
                    }),
                    Err(_) => Err(IngestError::Timeout {
                        filename: name,
                        seconds: timeout.as_secs_f64(),
                    }),
                }
            });
            tasks.push((filename, task));
        }

        let mut report = BatchReport::default();
        for (filename, task) in tasks {
            let result = task.await.unwrap_or_else(|e| {
                Err(IngestError::Worker {
                    filename,
                    message: e.to_string(),
                })
            });

            match result {
                Ok(photo) => report.photos.push(photo),
                Err(e) => {
                    log::warn!("Ingest failed: {}", e);
                    report.errors.push(FileError::from(&e));
                }
            }
        }

        log::info!(
            "Ingested {} file(s), {} failed",
            report.photos.len(),
            report.errors.len()
        );
        Ok(report)
    }
}

impl Default for IngestService {
    fn default() -> Self {
        Self::new()
    }
}
