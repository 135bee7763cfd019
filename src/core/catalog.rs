use crate::core::photo::{CatalogError, PhotoRecord, PhotoStatus};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const DEFAULT_BLUR_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PhotoFilter {
    #[default]
    All,
    Duplicates,
    Blurry,
    Screenshots,
    Favorites,
}

impl PhotoFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhotoFilter::All => "all",
            PhotoFilter::Duplicates => "duplicates",
            PhotoFilter::Blurry => "blurry",
            PhotoFilter::Screenshots => "screenshots",
            PhotoFilter::Favorites => "favorites",
        }
    }

    fn matches(&self, photo: &PhotoRecord, blur_threshold: f64) -> bool {
        match self {
            PhotoFilter::All => true,
            PhotoFilter::Duplicates => photo.analysis.is_duplicate,
            PhotoFilter::Blurry => photo.analysis.is_below(blur_threshold),
            PhotoFilter::Screenshots => photo.analysis.is_screenshot,
            PhotoFilter::Favorites => photo.favorite,
        }
    }
}

impl FromStr for PhotoFilter {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(PhotoFilter::All),
            "duplicates" => Ok(PhotoFilter::Duplicates),
            "blurry" => Ok(PhotoFilter::Blurry),
            "screenshots" => Ok(PhotoFilter::Screenshots),
            "favorites" => Ok(PhotoFilter::Favorites),
            other => Err(CatalogError::InvalidFilter(other.to_string())),
        }
    }
}

impl fmt::Display for PhotoFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    #[default]
    DateDesc,
    DateAsc,
    SizeDesc,
    SizeAsc,
    NameAsc,
    NameDesc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::DateDesc => "date-desc",
            SortOrder::DateAsc => "date-asc",
            SortOrder::SizeDesc => "size-desc",
            SortOrder::SizeAsc => "size-asc",
            SortOrder::NameAsc => "name-asc",
            SortOrder::NameDesc => "name-desc",
        }
    }

    fn compare(&self, a: &PhotoRecord, b: &PhotoRecord) -> Ordering {
        match self {
            SortOrder::DateDesc => b.created_at.cmp(&a.created_at),
            SortOrder::DateAsc => a.created_at.cmp(&b.created_at),
            SortOrder::SizeDesc => b.size.cmp(&a.size),
            SortOrder::SizeAsc => a.size.cmp(&b.size),
            SortOrder::NameAsc => a.original_name.cmp(&b.original_name),
            SortOrder::NameDesc => b.original_name.cmp(&a.original_name),
        }
    }
}

impl FromStr for SortOrder {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "date-desc" => Ok(SortOrder::DateDesc),
            "date-asc" => Ok(SortOrder::DateAsc),
            "size-desc" => Ok(SortOrder::SizeDesc),
            "size-asc" => Ok(SortOrder::SizeAsc),
            "name-asc" => Ok(SortOrder::NameAsc),
            "name-desc" => Ok(SortOrder::NameDesc),
            other => Err(CatalogError::InvalidSort(other.to_string())),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogQuery {
    pub status: PhotoStatus,
    pub filter: PhotoFilter,
    pub sort: SortOrder,
    /// 1-indexed
    pub page: usize,
    pub limit: usize,
    /// Used by the blurry filter: `quality < blur_threshold`
    pub blur_threshold: f64,
}

impl Default for CatalogQuery {
    fn default() -> Self {
        Self {
            status: PhotoStatus::Active,
            filter: PhotoFilter::All,
            sort: SortOrder::DateDesc,
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            blur_threshold: DEFAULT_BLUR_THRESHOLD,
        }
    }
}

impl CatalogQuery {
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.page == 0 {
            return Err(CatalogError::InvalidPage(self.page));
        }
        if self.limit == 0 || self.limit > MAX_PAGE_SIZE {
            return Err(CatalogError::InvalidLimit(self.limit));
        }
        if !(0.0..=1.0).contains(&self.blur_threshold) {
            return Err(CatalogError::InvalidThreshold(self.blur_threshold));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: usize, limit: usize, total: usize) -> Self {
        let total_pages = total.div_ceil(limit);
        Self {
            page,
            limit,
            total,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }

    fn offset(&self) -> usize {
        (self.page - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogPage<'a> {
    pub photos: Vec<&'a PhotoRecord>,
    pub pagination: Pagination,
}

/// Counts shown on the library dashboard, over active photos only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub total_photos: usize,
    pub duplicate_photos: usize,
    pub blurry_photos: usize,
    pub screenshot_photos: usize,
    pub favorite_photos: usize,
    pub storage_used: u64,
}

impl CatalogStats {
    pub fn summarize(photos: &[PhotoRecord]) -> Self {
        photos
            .iter()
            .filter(|p| p.is_active())
            .fold(CatalogStats::default(), |mut stats, photo| {
                stats.total_photos += 1;
                stats.duplicate_photos += photo.analysis.is_duplicate as usize;
                stats.blurry_photos += photo.analysis.is_blurry as usize;
                stats.screenshot_photos += photo.analysis.is_screenshot as usize;
                stats.favorite_photos += photo.favorite as usize;
                stats.storage_used += photo.size;
                stats
            })
    }
}

/// Answers listing queries over a user's photo collection
pub struct PhotoCatalogFilter;

impl PhotoCatalogFilter {
    pub fn new() -> Self {
        Self
    }

    /// Filter, sort and page `photos`.
    ///
    /// Sorting is stable, so photos that compare equal keep their input
    /// order and repeated calls on unchanged data return the same pages.
    pub fn query<'a>(
        &self,
        photos: &'a [PhotoRecord],
        query: &CatalogQuery,
    ) -> Result<CatalogPage<'a>, CatalogError> {
        query.validate()?;

        let mut matching: Vec<&PhotoRecord> = photos
            .iter()
            .filter(|p| p.status == query.status)
            .filter(|p| query.filter.matches(p, query.blur_threshold))
            .collect();
        matching.sort_by(|a, b| query.sort.compare(a, b));

        let pagination = Pagination::new(query.page, query.limit, matching.len());
        let page = matching
            .into_iter()
            .skip(pagination.offset())
            .take(query.limit)
            .collect();

        Ok(CatalogPage {
            photos: page,
            pagination,
        })
    }

    /// Active photos with `quality < threshold`, newest first
    pub fn find_blurry<'a>(
        &self,
        photos: &'a [PhotoRecord],
        threshold: f64,
    ) -> Result<Vec<&'a PhotoRecord>, CatalogError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(CatalogError::InvalidThreshold(threshold));
        }
        Ok(self.active_newest_first(photos, |p| p.analysis.is_below(threshold)))
    }

    /// Active photos classified as screenshots, newest first
    pub fn find_screenshots<'a>(&self, photos: &'a [PhotoRecord]) -> Vec<&'a PhotoRecord> {
        self.active_newest_first(photos, |p| p.analysis.is_screenshot)
    }

    fn active_newest_first<'a>(
        &self,
        photos: &'a [PhotoRecord],
        predicate: impl Fn(&PhotoRecord) -> bool,
    ) -> Vec<&'a PhotoRecord> {
        let mut found: Vec<&PhotoRecord> = photos
            .iter()
            .filter(|p| p.is_active() && predicate(p))
            .collect();
        found.sort_by(|a, b| SortOrder::DateDesc.compare(a, b));
        found
    }
}

impl Default for PhotoCatalogFilter {
    fn default() -> Self {
        Self::new()
    }
}
