use chrono::{Duration, Utc};
use image::{DynamicImage, ImageBuffer, Rgb};
use photosieve::core::catalog::{CatalogQuery, CatalogStats, PhotoCatalogFilter, PhotoFilter};
use photosieve::core::duplicate::DuplicateGrouper;
use photosieve::core::ingest::{IngestService, Upload};
use photosieve::core::photo::PhotoStatus;
use photosieve::store::CatalogStore;
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

fn write_image(dir: &TempDir, name: &str, f: impl Fn(u32, u32) -> Rgb<u8>) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let img = ImageBuffer::from_fn(128, 96, f);
    DynamicImage::ImageRgb8(img).save(&path).unwrap();
    path
}

fn sharp(x: u32, y: u32) -> Rgb<u8> {
    if (x / 2 + y / 2) % 2 == 0 {
        Rgb([20, 20, 20])
    } else {
        Rgb([235, 235, 235])
    }
}

fn flat(_: u32, _: u32) -> Rgb<u8> {
    Rgb([128, 128, 128])
}

#[tokio::test]
async fn test_ingest_group_and_query() {
    let temp_dir = TempDir::new().unwrap();
    let original = write_image(&temp_dir, "original.png", sharp);
    let copy = temp_dir.path().join("copy.png");
    fs::copy(&original, &copy).unwrap();
    let soft = write_image(&temp_dir, "soft.png", flat);
    let notes = temp_dir.path().join("notes.txt");
    fs::write(&notes, "not a photo").unwrap();

    let service = IngestService::new();
    let report = service
        .ingest_batch(vec![
            Upload::from_path(&original),
            Upload::from_path(&copy),
            Upload::from_path(&soft),
            Upload::from_path(&notes),
        ])
        .await
        .unwrap();

    assert_eq!(report.photos.len(), 3);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].kind, "UnsupportedFormat");

    // Upload order stands in for age: the first file is the oldest
    let now = Utc::now();
    let mut photos: Vec<_> = report
        .photos
        .into_iter()
        .enumerate()
        .map(|(i, photo)| photo.into_record(now - Duration::minutes(10 - i as i64), 0.7))
        .collect();

    let outcome = DuplicateGrouper::new().regroup_active(&mut photos);
    assert_eq!(outcome.groups.len(), 1);
    let copy_record = photos.iter().find(|p| p.original_name == "copy.png").unwrap();
    let original_record = photos.iter().find(|p| p.original_name == "original.png").unwrap();
    // The newer upload is kept, the older one points at it
    assert!(!copy_record.analysis.is_duplicate);
    assert!(original_record.analysis.is_duplicate);
    assert_eq!(original_record.analysis.duplicate_group.as_ref(), Some(&copy_record.id));

    let filter = PhotoCatalogFilter::new();
    let duplicates = filter
        .query(&photos, &CatalogQuery { filter: PhotoFilter::Duplicates, ..CatalogQuery::default() })
        .unwrap();
    assert_eq!(duplicates.pagination.total, 1);
    assert_eq!(duplicates.photos[0].original_name, "original.png");

    let blurry = filter
        .query(&photos, &CatalogQuery { filter: PhotoFilter::Blurry, ..CatalogQuery::default() })
        .unwrap();
    let blurry_names: Vec<&str> = blurry.photos.iter().map(|p| p.original_name.as_str()).collect();
    assert!(blurry_names.contains(&"soft.png"));
    assert!(!blurry_names.contains(&"original.png"));

    let stats = CatalogStats::summarize(&photos);
    assert_eq!(stats.total_photos, 3);
    assert_eq!(stats.duplicate_photos, 1);
}

#[tokio::test]
async fn test_trash_regroup_and_persist() {
    let temp_dir = TempDir::new().unwrap();
    let first = write_image(&temp_dir, "first.png", sharp);
    let second = temp_dir.path().join("second.png");
    fs::copy(&first, &second).unwrap();

    let report = IngestService::new()
        .ingest_batch(vec![Upload::from_path(&first), Upload::from_path(&second)])
        .await
        .unwrap();

    let now = Utc::now();
    let records_path = temp_dir.path().join("library").join("photos.json");
    let mut store = CatalogStore::open(&records_path).unwrap();
    for (i, photo) in report.photos.into_iter().enumerate() {
        store.insert(photo.into_record(now + Duration::seconds(i as i64), 0.7));
    }

    let grouper = DuplicateGrouper::new();
    let outcome = grouper.regroup_active(store.photos_mut());
    let kept = outcome.groups[0].representative.clone();
    let duplicate = outcome.groups[0].duplicates[0].clone();

    // Trashing the kept copy promotes the other one
    store.get_mut(&kept).unwrap().move_to_trash().unwrap();
    grouper.regroup_active(store.photos_mut());
    assert!(!store.get(&duplicate).unwrap().analysis.is_duplicate);
    store.save().unwrap();

    let reopened = CatalogStore::open(&records_path).unwrap();
    assert_eq!(reopened.len(), 2);
    let statuses: Vec<(String, PhotoStatus, bool)> = reopened
        .photos()
        .iter()
        .map(|p| (p.id.clone(), p.status, p.analysis.is_duplicate))
        .collect();
    let expected: Vec<(String, PhotoStatus, bool)> = store
        .photos()
        .iter()
        .map(|p| (p.id.clone(), p.status, p.analysis.is_duplicate))
        .collect();
    assert_eq!(statuses, expected);

    let trash = PhotoCatalogFilter::new()
        .query(reopened.photos(), &CatalogQuery { status: PhotoStatus::Trash, ..CatalogQuery::default() })
        .unwrap();
    assert_eq!(trash.photos.len(), 1);
    assert_eq!(trash.photos[0].id, kept);
}
