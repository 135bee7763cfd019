pub mod config;
pub mod core;
pub mod store;

pub use crate::core::catalog::{CatalogPage, CatalogQuery, CatalogStats, Pagination, PhotoCatalogFilter, PhotoFilter, SortOrder};
pub use crate::core::duplicate::{DuplicateGrouper, GroupingLocks, GroupingOutcome};
pub use crate::core::hash::ContentHasher;
pub use crate::core::ingest::{BatchReport, FileError, IngestError, IngestService, IngestedPhoto, Upload};
pub use crate::core::perceptual::{PerceptualHash, PerceptualHasher};
pub use crate::core::photo::{CatalogError, PhotoRecord, PhotoStatus};
pub use crate::core::pixels::{DecodeError, PhotoFormat, PixelBuffer, PixelSource};
pub use crate::core::quality::{AnalysisSettings, QualityAnalyzer, QualityReport};
pub use crate::core::thumbnail::ThumbnailGenerator;
pub use crate::store::{CatalogStore, LibraryFiles};
