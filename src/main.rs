use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use photosieve::config::Config;
use photosieve::core::catalog::{CatalogQuery, CatalogStats, PhotoCatalogFilter, PhotoFilter, SortOrder};
use photosieve::core::duplicate::DuplicateGrouper;
use photosieve::core::ingest::{IngestService, Upload};
use photosieve::core::photo::{format_file_size, PhotoRecord, PhotoStatus};
use photosieve::core::pixels::is_supported_filename;
use photosieve::store::{CatalogStore, LibraryFiles};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "photosieve", version, about = "Analyse, dedupe and browse a photo library")]
struct Cli {
    /// Config file to use instead of the per-user default
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyse image files and add them to the library
    Ingest {
        /// Files or directories to ingest
        #[arg(required = true, value_name = "PATH")]
        paths: Vec<PathBuf>,
    },

    /// Recompute duplicate groups and list them
    Duplicates {
        /// Move every duplicate (not the kept copy) to the trash
        #[arg(long)]
        trash: bool,
    },

    /// List photos with filtering, sorting and paging
    List {
        #[arg(long, default_value = "active")]
        status: PhotoStatus,
        #[arg(long, default_value = "all")]
        filter: PhotoFilter,
        #[arg(long, default_value = "date-desc")]
        sort: SortOrder,
        #[arg(long, default_value_t = 1)]
        page: usize,
        /// Page size (default from config)
        #[arg(long)]
        limit: Option<usize>,
        /// Quality cut-off for the blurry filter (default from config)
        #[arg(long)]
        threshold: Option<f64>,
        /// Print the page as JSON
        #[arg(long)]
        json: bool,
    },

    /// Active photos scoring below the blur threshold
    Blurry {
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Active photos classified as screenshots
    Screenshots,

    /// Move photos to the trash
    Trash {
        #[arg(required = true, value_name = "ID")]
        ids: Vec<String>,
    },

    /// Bring photos back from the trash
    Restore {
        #[arg(required = true, value_name = "ID")]
        ids: Vec<String>,
    },

    /// Permanently delete trashed photos
    Purge {
        /// Only these photos (default: everything in the trash)
        #[arg(value_name = "ID")]
        ids: Vec<String>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Toggle the favorite flag
    Favorite {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Replace a photo's tags
    Tag {
        #[arg(value_name = "ID")]
        id: String,
        #[arg(value_name = "TAG")]
        tags: Vec<String>,
    },

    /// Library summary
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => Config::load().context("Failed to load config")?,
    };
    config.validate()?;

    let records_path = config.records_path();
    let mut store = CatalogStore::open(&records_path)
        .with_context(|| format!("Failed to open record file {:?}", records_path))?;

    match cli.command {
        Commands::Ingest { paths } => {
            ingest(&config, &mut store, &paths).await?;
        }

        Commands::Duplicates { trash } => {
            let outcome = DuplicateGrouper::new().regroup_active(store.photos_mut());
            if outcome.groups.is_empty() {
                println!("No duplicates found.");
            } else {
                println!("Found {} duplicate group(s):", outcome.groups.len());
                for (i, group) in outcome.groups.iter().enumerate() {
                    println!("\n✨ Group {}:", i + 1);
                    println!("   🏆 Keeping → {}", describe(&store, &group.representative));
                    for id in &group.duplicates {
                        if trash {
                            store.get_mut(id)?.move_to_trash()?;
                            println!("   🗑️  Trashed {}", describe(&store, id));
                        } else {
                            println!("   ▶ {}", describe(&store, id));
                        }
                    }
                }
                if trash {
                    // Trashed copies leave the active set, so flags must be recomputed
                    DuplicateGrouper::new().regroup_active(store.photos_mut());
                }
            }
            store.save()?;
        }

        Commands::List {
            status,
            filter,
            sort,
            page,
            limit,
            threshold,
            json,
        } => {
            let query = CatalogQuery {
                status,
                filter,
                sort,
                page,
                limit: limit.unwrap_or(config.catalog.default_page_size),
                blur_threshold: threshold.unwrap_or(config.catalog.blur_threshold),
            };
            let result = PhotoCatalogFilter::new().query(store.photos(), &query)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                for photo in &result.photos {
                    print_photo(photo);
                }
                let p = result.pagination;
                println!(
                    "\nPage {}/{} ({} photo(s)){}{}",
                    p.page,
                    p.total_pages.max(1),
                    p.total,
                    if p.has_prev { ", has previous" } else { "" },
                    if p.has_next { ", has next" } else { "" }
                );
            }
        }

        Commands::Blurry { threshold } => {
            let threshold = threshold.unwrap_or(config.catalog.blur_threshold);
            let photos = PhotoCatalogFilter::new().find_blurry(store.photos(), threshold)?;
            println!("▶ {} photo(s) with quality below {:.2}:", photos.len(), threshold);
            for photo in photos {
                print_photo(photo);
            }
        }

        Commands::Screenshots => {
            let photos = PhotoCatalogFilter::new().find_screenshots(store.photos());
            println!("▶ {} screenshot(s):", photos.len());
            for photo in photos {
                print_photo(photo);
            }
        }

        Commands::Trash { ids } => {
            for id in &ids {
                store.get_mut(id)?.move_to_trash()?;
                println!("🗑️  Trashed {}", describe(&store, id));
            }
            DuplicateGrouper::new().regroup_active(store.photos_mut());
            store.save()?;
        }

        Commands::Restore { ids } => {
            for id in &ids {
                store.get_mut(id)?.restore()?;
                println!("🔄 Restored {}", describe(&store, id));
            }
            DuplicateGrouper::new().regroup_active(store.photos_mut());
            store.save()?;
        }

        Commands::Purge { ids, yes } => {
            purge(&config, &mut store, ids, yes)?;
        }

        Commands::Favorite { id } => {
            let favorite = store.get_mut(&id)?.toggle_favorite()?;
            store.save()?;
            println!("{} {}", if favorite { "⭐ Favorited" } else { "☆ Unfavorited" }, id);
        }

        Commands::Tag { id, tags } => {
            let record = store.get_mut(&id)?;
            record.set_tags(&tags)?;
            let stored = record.tags.join(", ");
            store.save()?;
            println!("🏷️  {} → [{}]", id, stored);
        }

        Commands::Stats => {
            let stats = CatalogStats::summarize(store.photos());
            println!("🗂️  Library: {}", config.catalog.library_dir.display());
            println!("   Photos:      {}", stats.total_photos);
            println!("   Duplicates:  {}", stats.duplicate_photos);
            println!("   Blurry:      {}", stats.blurry_photos);
            println!("   Screenshots: {}", stats.screenshot_photos);
            println!("   Favorites:   {}", stats.favorite_photos);
            println!("   Storage:     {}", format_file_size(stats.storage_used));
        }
    }

    Ok(())
}

async fn ingest(config: &Config, store: &mut CatalogStore, paths: &[PathBuf]) -> Result<()> {
    let files = scan_paths(paths)?;
    if files.is_empty() {
        println!("No image files found.");
        return Ok(());
    }
    println!("▶ Ingesting {} file(s)…", files.len());

    let service = IngestService::with_settings(config.ingest.clone(), config.analysis.clone());
    let library = LibraryFiles::new(config.originals_dir(), config.thumbnail_dir());

    let bar = ProgressBar::new(files.len() as u64);
    bar.set_style(ProgressStyle::with_template("{bar:40.green} {pos}/{len} {msg}")?);

    let mut added = 0;
    let mut failed = 0;
    let start = Instant::now();

    for chunk in files.chunks(config.ingest.max_files_per_batch) {
        let uploads = chunk.iter().map(Upload::from_path).collect();
        let report = service.ingest_batch(uploads).await?;

        for error in &report.errors {
            bar.println(format!("   ⚠️  {} [{}]: {}", error.filename, error.kind, error.reason));
            failed += 1;
        }

        for photo in report.photos {
            for notice in &photo.notices {
                bar.println(format!("   ℹ️  {} [{}]", notice.filename, notice.kind));
            }

            let record = match library.import(photo, Utc::now(), config.catalog.blur_threshold) {
                Ok(record) => record,
                Err(e) => {
                    bar.println(format!("   ⚠️  {}", e));
                    failed += 1;
                    continue;
                }
            };

            bar.set_message(record.original_name.clone());
            store.insert(record);
            added += 1;
        }
        bar.inc(chunk.len() as u64);
    }
    bar.finish_with_message("done");

    let outcome = DuplicateGrouper::new().regroup_active(store.photos_mut());
    store.save()?;

    println!(
        "\n✅ Added {} photo(s), {} failed, {} duplicate(s) in library ({:.2?})",
        added,
        failed,
        outcome.duplicate_count(),
        start.elapsed()
    );
    Ok(())
}

fn purge(config: &Config, store: &mut CatalogStore, ids: Vec<String>, yes: bool) -> Result<()> {
    let targets: Vec<String> = if ids.is_empty() {
        store
            .photos()
            .iter()
            .filter(|p| p.status == PhotoStatus::Trash)
            .map(|p| p.id.clone())
            .collect()
    } else {
        ids
    };

    if targets.is_empty() {
        println!("Trash is empty.");
        return Ok(());
    }

    if !yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Permanently delete {} photo(s)? This cannot be undone.",
                targets.len()
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Purge cancelled.");
            return Ok(());
        }
    }

    for id in &targets {
        store.get_mut(id)?.mark_deleted()?;
    }

    let files = LibraryFiles::new(config.originals_dir(), config.thumbnail_dir());
    for photo in store.purge_deleted() {
        if let Err(e) = files.remove(&photo) {
            log::warn!("{}: files not removed: {}", photo.original_name, e);
        }
        println!("🗑️  Deleted {}", photo.original_name);
    }

    store.save()?;
    Ok(())
}

/// Expand files and directories into the supported image files they contain
fn scan_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Scanning for images…");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut images = Vec::new();
    for root in paths {
        for entry in WalkDir::new(root).into_iter().filter_map(Result::ok) {
            let path = entry.path();
            if path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(is_supported_filename)
            {
                images.push(path.to_path_buf());
            }
            spinner.tick();
        }
    }
    spinner.finish_with_message("Scan complete");
    Ok(images)
}

fn describe(store: &CatalogStore, id: &str) -> String {
    match store.get(id) {
        Some(photo) => format!("{} ({})", photo.original_name, id),
        None => id.to_string(),
    }
}

fn print_photo(photo: &PhotoRecord) {
    let quality = photo
        .analysis
        .quality
        .map(|q| format!("{:.2}", q))
        .unwrap_or_else(|| "-".to_string());
    let mut flags = Vec::new();
    if photo.analysis.is_duplicate {
        flags.push("duplicate");
    }
    if photo.analysis.is_blurry {
        flags.push("blurry");
    }
    if photo.analysis.is_screenshot {
        flags.push("screenshot");
    }
    if photo.favorite {
        flags.push("favorite");
    }

    println!(
        "   ▶ {}  {}  {}  {}  q={}  {}",
        photo.id,
        photo.original_name,
        photo.resolution(),
        photo.formatted_size(),
        quality,
        flags.join(",")
    );
}
