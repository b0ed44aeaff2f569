use std::path::PathBuf;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use photon_core::{CatalogModel, ThumbnailCache, ThumbnailConfig, ThumbnailSize, WorkerPool};
use tracing::warn;

use super::{format_size, scoped_photos};

pub fn run(
    model: &CatalogModel,
    cache_dir: Option<PathBuf>,
    size: u32,
    threads: Option<usize>,
    folder: Option<&str>,
) -> Result<()> {
    let config = match cache_dir {
        Some(dir) => ThumbnailConfig::new(dir),
        None => ThumbnailConfig::in_user_cache()?,
    };
    let pool = match threads {
        Some(n) => WorkerPool::new(n)?,
        None => WorkerPool::with_available_parallelism()?,
    };
    let cache = ThumbnailCache::new(config, pool)?;
    let size = ThumbnailSize::square(size);

    let photos = scoped_photos(model, folder)?;
    if photos.is_empty() {
        println!("No photos to process.");
        return Ok(());
    }

    let pb = ProgressBar::new(photos.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );
    pb.set_message(format!("Generating {size} thumbnails..."));

    let tickets: Vec<_> = photos
        .iter()
        .map(|photo| (photo, cache.get_or_create(&photo.file_path, size)))
        .collect();

    let (mut generated, mut failed) = (0usize, 0usize);
    for (photo, ticket) in tickets {
        match ticket.wait() {
            Ok(_) => generated += 1,
            Err(err) => {
                failed += 1;
                warn!(photo = %photo.id, error = %err, "no thumbnail");
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message(format!("{generated} ready, {failed} failed"));

    let usage = cache.usage()?;
    println!(
        "Cache {}: {} thumbnails, {}",
        cache.cache_dir().display(),
        usage.entries,
        format_size(usage.bytes)
    );
    Ok(())
}
