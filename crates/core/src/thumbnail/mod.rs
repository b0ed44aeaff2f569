//! On-disk JPEG thumbnail cache.
//!
//! The cache directory is the only record of what exists: a request whose
//! file is already there resolves at once on the calling thread. Misses are
//! generated on a [`WorkerPool`], at most one job per key; callers that ask
//! for a key while its job is running wait for that job's result.

pub mod decode;
pub mod key;
pub mod pool;
pub mod raw;
pub mod resize;

use std::any::Any;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use image::{Rgb, RgbImage};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::ThumbnailConfig;
use crate::error::{Result, ThumbnailError};

pub use decode::{MediaDecoder, SourceDecoder};
pub use key::{CacheKey, ThumbnailSize};
pub use pool::WorkerPool;

pub type ThumbnailResult = std::result::Result<PathBuf, ThumbnailError>;

pub const PLACEHOLDER_FILE: &str = "placeholder.jpg";
const PLACEHOLDER_EDGE: u32 = 256;
const PLACEHOLDER_GREY: u8 = 48;

/// Pending result of one [`ThumbnailCache::get_or_create`] call.
///
/// Dropping a ticket does not cancel the work; the result is discarded when
/// it arrives.
#[derive(Debug)]
pub struct ThumbnailTicket {
    rx: mpsc::Receiver<ThumbnailResult>,
}

impl ThumbnailTicket {
    fn ready(result: ThumbnailResult) -> Self {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(result);
        Self { rx }
    }

    /// Block until the thumbnail is ready or has failed.
    pub fn wait(self) -> ThumbnailResult {
        self.rx.recv().unwrap_or(Err(ThumbnailError::WorkerLost))
    }

    pub fn wait_timeout(&self, timeout: Duration) -> Option<ThumbnailResult> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => Some(Err(ThumbnailError::WorkerLost)),
        }
    }

    /// Non-blocking poll.
    pub fn try_result(&self) -> Option<ThumbnailResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(mpsc::TryRecvError::Empty) => None,
            Err(mpsc::TryRecvError::Disconnected) => Some(Err(ThumbnailError::WorkerLost)),
        }
    }
}

/// Number and total size of cached thumbnails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheUsage {
    pub entries: usize,
    pub bytes: u64,
}

type Waiters = Vec<mpsc::Sender<ThumbnailResult>>;

struct Shared {
    config: ThumbnailConfig,
    decoder: Arc<dyn SourceDecoder>,
    /// Cache file name -> callers waiting on its generation.
    in_flight: Mutex<HashMap<String, Waiters>>,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, HashMap<String, Waiters>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, entry: String, source: PathBuf, dest: PathBuf, size: ThumbnailSize) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.generate(&source, &dest, size)))
            .unwrap_or_else(|payload| {
                Err(ThumbnailError::Decode {
                    path: source.clone(),
                    message: format!("decoder panicked: {}", panic_message(payload.as_ref())),
                })
            });

        match &outcome {
            Ok(path) => debug!(source = %source.display(), thumbnail = %path.display(), "thumbnail generated"),
            Err(err) => warn!(source = %source.display(), error = %err, "thumbnail generation failed"),
        }

        let waiters = self.registry().remove(&entry).unwrap_or_default();
        for tx in waiters {
            let _ = tx.send(outcome.clone());
        }
    }

    fn generate(&self, source: &Path, dest: &Path, size: ThumbnailSize) -> ThumbnailResult {
        if !source.is_file() {
            return Err(ThumbnailError::SourceMissing(source.to_path_buf()));
        }

        let image = self.decoder.decode(source)?;
        let image = resize::resize_to_fit(image, size).map_err(|message| ThumbnailError::Decode {
            path: source.to_path_buf(),
            message,
        })?;
        resize::write_jpeg_atomic(&image, self.config.jpeg_quality, dest).map_err(|message| {
            ThumbnailError::Write {
                path: dest.to_path_buf(),
                message,
            }
        })?;
        Ok(dest.to_path_buf())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Shared handle to a thumbnail cache directory. Cheap to clone.
#[derive(Clone)]
pub struct ThumbnailCache {
    shared: Arc<Shared>,
    pool: WorkerPool,
}

impl ThumbnailCache {
    /// Cache using the default [`MediaDecoder`]. Creates the directory.
    pub fn new(config: ThumbnailConfig, pool: WorkerPool) -> Result<Self> {
        let decoder = MediaDecoder::new(&config);
        Self::with_decoder(config, pool, decoder)
    }

    pub fn with_decoder(
        config: ThumbnailConfig,
        pool: WorkerPool,
        decoder: impl SourceDecoder + 'static,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.cache_dir)?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                decoder: Arc::new(decoder),
                in_flight: Mutex::new(HashMap::new()),
            }),
            pool,
        })
    }

    pub fn config(&self) -> &ThumbnailConfig {
        &self.shared.config
    }

    pub fn cache_dir(&self) -> &Path {
        &self.shared.config.cache_dir
    }

    fn key_for(&self, source: &Path, size: ThumbnailSize) -> std::result::Result<(CacheKey, PathBuf), ThumbnailError> {
        CacheKey::for_source(source, size, self.shared.config.key_policy)
    }

    /// Where the thumbnail for `source` at `size` lives, whether or not it
    /// exists yet.
    pub fn cache_path(&self, source: &Path, size: ThumbnailSize) -> std::result::Result<PathBuf, ThumbnailError> {
        let (key, _) = self.key_for(source, size)?;
        Ok(self.cache_dir().join(key.file_name()))
    }

    /// Cached thumbnail path, if present. Never generates.
    pub fn lookup(&self, source: &Path, size: ThumbnailSize) -> Option<PathBuf> {
        self.cache_path(source, size).ok().filter(|path| path.is_file())
    }

    /// Resolve a thumbnail, generating it in the background on a miss.
    pub fn get_or_create(&self, source: &Path, size: ThumbnailSize) -> ThumbnailTicket {
        let (key, absolute) = match self.key_for(source, size) {
            Ok(resolved) => resolved,
            Err(err) => return ThumbnailTicket::ready(Err(err)),
        };
        let entry = key.file_name();
        let dest = self.cache_dir().join(&entry);
        if dest.is_file() {
            return ThumbnailTicket::ready(Ok(dest));
        }

        let (tx, rx) = mpsc::channel();
        {
            let mut in_flight = self.shared.registry();
            // A job may have finished between the check above and taking the lock.
            if dest.is_file() {
                return ThumbnailTicket::ready(Ok(dest));
            }
            match in_flight.entry(entry.clone()) {
                Entry::Occupied(mut waiting) => {
                    waiting.get_mut().push(tx);
                    debug!(source = %absolute.display(), "joined in-flight thumbnail job");
                    return ThumbnailTicket { rx };
                }
                Entry::Vacant(slot) => {
                    slot.insert(vec![tx]);
                }
            }
        }

        let shared = Arc::clone(&self.shared);
        self.pool
            .spawn(move || shared.run(entry, absolute, dest, size));
        ThumbnailTicket { rx }
    }

    pub fn get_or_create_blocking(&self, source: &Path, size: ThumbnailSize) -> ThumbnailResult {
        self.get_or_create(source, size).wait()
    }

    /// Number of keys currently being generated.
    pub fn in_flight(&self) -> usize {
        self.shared.registry().len()
    }

    /// Static dark grey image to show in place of a failed thumbnail.
    /// Written on first use.
    pub fn placeholder_path(&self) -> Result<PathBuf> {
        let path = self.cache_dir().join(PLACEHOLDER_FILE);
        if !path.is_file() {
            let image = RgbImage::from_pixel(
                PLACEHOLDER_EDGE,
                PLACEHOLDER_EDGE,
                Rgb([PLACEHOLDER_GREY; 3]),
            );
            resize::write_jpeg_atomic(&image, self.shared.config.jpeg_quality, &path).map_err(
                |message| ThumbnailError::Write {
                    path: path.clone(),
                    message,
                },
            )?;
        }
        Ok(path)
    }

    /// The thumbnail on success, the placeholder on failure.
    pub fn resolve_or_placeholder(&self, result: ThumbnailResult) -> Result<PathBuf> {
        match result {
            Ok(path) => Ok(path),
            Err(err) => {
                debug!(error = %err, "using placeholder thumbnail");
                self.placeholder_path()
            }
        }
    }

    /// Walk the cache directory. The placeholder and temporary files are not
    /// counted.
    pub fn usage(&self) -> Result<CacheUsage> {
        let mut usage = CacheUsage::default();
        for entry in WalkDir::new(self.cache_dir()).min_depth(1).max_depth(1) {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy();
            if !entry.file_type().is_file()
                || name == PLACEHOLDER_FILE
                || name.starts_with('.')
                || !name.ends_with(".jpg")
            {
                continue;
            }
            usage.entries += 1;
            usage.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
        Ok(usage)
    }
}

impl std::fmt::Debug for ThumbnailCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailCache")
            .field("cache_dir", &self.cache_dir())
            .field("pool", &self.pool)
            .finish()
    }
}
