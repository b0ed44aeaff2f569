use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, SystemTime};

use image::{Rgb, RgbImage};
use photon_core::config::CacheKeyPolicy;
use photon_core::error::ThumbnailError;
use photon_core::thumbnail::{MediaDecoder, SourceDecoder, PLACEHOLDER_FILE};
use photon_core::{ThumbnailCache, ThumbnailConfig, ThumbnailSize, WorkerPool};

/// Real decoder that counts how often it runs, optionally slowed down so
/// concurrent requests overlap.
struct CountingDecoder {
    inner: MediaDecoder,
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl SourceDecoder for CountingDecoder {
    fn decode(&self, source: &Path) -> Result<RgbImage, ThumbnailError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.inner.decode(source)
    }
}

fn counting_cache(cache_dir: &Path, threads: usize, delay: Duration) -> (ThumbnailCache, Arc<AtomicUsize>) {
    let config = ThumbnailConfig::new(cache_dir);
    let calls = Arc::new(AtomicUsize::new(0));
    let decoder = CountingDecoder {
        inner: MediaDecoder::new(&config),
        calls: Arc::clone(&calls),
        delay,
    };
    let cache =
        ThumbnailCache::with_decoder(config, WorkerPool::new(threads).unwrap(), decoder).unwrap();
    (cache, calls)
}

/// Gradient image, encoded by extension.
fn create_image(path: &Path, width: u32, height: u32) {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    img.save(path).unwrap();
}

// ── Idempotence ──────────────────────────────────────────────────

#[test]
fn test_second_request_does_not_decode() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("IMG_0001.jpg");
    create_image(&source, 1200, 800);

    let (cache, calls) = counting_cache(&tmp.path().join("thumbs"), 2, Duration::ZERO);
    let size = ThumbnailSize::square(256);

    let first = cache.get_or_create_blocking(&source, size).unwrap();
    let second = cache.get_or_create_blocking(&source, size).unwrap();

    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(first.starts_with(tmp.path().join("thumbs")));

    let thumb = image::open(&first).unwrap();
    assert_eq!((thumb.width(), thumb.height()), (256, 171));
}

#[test]
fn test_each_size_is_its_own_entry() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("a.png");
    create_image(&source, 800, 800);

    let (cache, calls) = counting_cache(&tmp.path().join("thumbs"), 2, Duration::ZERO);
    let small = cache
        .get_or_create_blocking(&source, ThumbnailSize::square(64))
        .unwrap();
    let large = cache
        .get_or_create_blocking(&source, ThumbnailSize::new(400, 300))
        .unwrap();

    assert_ne!(small, large);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.usage().unwrap().entries, 2);
    assert_eq!(image::open(&large).unwrap().width(), 300);
}

// ── Concurrency ──────────────────────────────────────────────────

#[test]
fn test_concurrent_requests_share_one_generation() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("burst.jpg");
    create_image(&source, 640, 480);

    let (cache, calls) = counting_cache(&tmp.path().join("thumbs"), 4, Duration::from_millis(200));
    let size = ThumbnailSize::square(128);
    let requesters = 8;
    let barrier = Arc::new(Barrier::new(requesters));

    let handles: Vec<_> = (0..requesters)
        .map(|_| {
            let cache = cache.clone();
            let source = source.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get_or_create(&source, size).wait()
            })
        })
        .collect();

    let paths: Vec<PathBuf> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(paths.iter().all(|p| p == &paths[0]));
    assert_eq!(cache.in_flight(), 0);
    assert_eq!(cache.usage().unwrap().entries, 1);
}

#[test]
fn test_distinct_sources_generate_in_parallel() {
    let tmp = tempfile::tempdir().unwrap();
    let (cache, calls) = counting_cache(&tmp.path().join("thumbs"), 4, Duration::ZERO);
    let size = ThumbnailSize::square(32);

    let tickets: Vec<_> = (0..6)
        .map(|i| {
            let source = tmp.path().join(format!("img_{i}.png"));
            create_image(&source, 100 + i, 80);
            cache.get_or_create(&source, size)
        })
        .collect();

    let paths: Vec<PathBuf> = tickets.into_iter().map(|t| t.wait().unwrap()).collect();
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    let mut unique = paths.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), 6);
}

// ── Failures ─────────────────────────────────────────────────────

#[test]
fn test_corrupt_source_fails_then_succeeds_once_fixed() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("broken.jpg");
    fs::write(&source, b"definitely not a jpeg").unwrap();

    let (cache, _calls) = counting_cache(&tmp.path().join("thumbs"), 1, Duration::ZERO);
    let size = ThumbnailSize::square(64);

    let err = cache.get_or_create_blocking(&source, size).unwrap_err();
    assert!(matches!(err, ThumbnailError::Decode { .. }));
    assert_eq!(cache.usage().unwrap().entries, 0);
    assert_eq!(cache.in_flight(), 0);

    create_image(&source, 200, 100);
    let path = cache.get_or_create_blocking(&source, size).unwrap();
    assert!(path.is_file());
}

#[test]
fn test_failure_falls_back_to_placeholder() {
    let tmp = tempfile::tempdir().unwrap();
    let cache_dir = tmp.path().join("thumbs");
    let (cache, _calls) = counting_cache(&cache_dir, 1, Duration::ZERO);

    let result = cache.get_or_create_blocking(&tmp.path().join("missing.jpg"), ThumbnailSize::square(64));
    assert!(matches!(result, Err(ThumbnailError::SourceMissing(_))));

    let shown = cache.resolve_or_placeholder(result).unwrap();
    assert_eq!(shown, cache_dir.join(PLACEHOLDER_FILE));
    assert!(shown.is_file());
    assert_eq!(cache.usage().unwrap().entries, 0);
}

#[test]
fn test_video_without_ffmpeg_reports_frame_extraction() {
    let tmp = tempfile::tempdir().unwrap();
    let clip = tmp.path().join("clip.mov");
    fs::write(&clip, b"\0\0\0\x14ftypqt  ").unwrap();

    let config = ThumbnailConfig::new(tmp.path().join("thumbs"))
        .with_ffmpeg_program(tmp.path().join("missing-ffmpeg"));
    let cache = ThumbnailCache::new(config, WorkerPool::new(1).unwrap()).unwrap();

    let err = cache
        .get_or_create_blocking(&clip, ThumbnailSize::square(128))
        .unwrap_err();
    assert!(matches!(err, ThumbnailError::FrameExtraction { .. }));
}

// ── Cache keys ───────────────────────────────────────────────────

#[test]
fn test_modified_source_gets_a_fresh_entry() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("edit.jpg");
    create_image(&source, 300, 200);

    let (cache, calls) = counting_cache(&tmp.path().join("thumbs"), 1, Duration::ZERO);
    let size = ThumbnailSize::square(64);
    let before = cache.get_or_create_blocking(&source, size).unwrap();

    let later = SystemTime::now() + Duration::from_secs(60);
    fs::File::options()
        .write(true)
        .open(&source)
        .unwrap()
        .set_modified(later)
        .unwrap();

    assert_eq!(cache.lookup(&source, size), None);
    let after = cache.get_or_create_blocking(&source, size).unwrap();
    assert_ne!(before, after);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_path_only_policy_ignores_mtime() {
    let tmp = tempfile::tempdir().unwrap();
    let source = tmp.path().join("edit.jpg");
    create_image(&source, 300, 200);

    let config = ThumbnailConfig::new(tmp.path().join("thumbs"))
        .with_key_policy(CacheKeyPolicy::PathOnly);
    let cache = ThumbnailCache::new(config, WorkerPool::new(1).unwrap()).unwrap();
    let size = ThumbnailSize::square(64);
    let before = cache.get_or_create_blocking(&source, size).unwrap();

    fs::File::options()
        .write(true)
        .open(&source)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(60))
        .unwrap();

    assert_eq!(cache.lookup(&source, size), Some(before));
}
