use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// What goes into a thumbnail cache key besides the requested size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheKeyPolicy {
    /// Absolute source path only. A file edited in place keeps serving its old
    /// thumbnail.
    PathOnly,
    /// Absolute source path plus the source modification time, so an edited
    /// file gets a fresh entry. Costs one `stat` per lookup.
    #[default]
    PathAndModified,
}

/// Settings for a [`ThumbnailCache`](crate::thumbnail::ThumbnailCache).
#[derive(Debug, Clone)]
pub struct ThumbnailConfig {
    pub cache_dir: PathBuf,
    pub key_policy: CacheKeyPolicy,
    pub jpeg_quality: u8,
    /// Program used to pull a frame out of video files.
    pub ffmpeg_program: PathBuf,
    pub video_frame_offset: Duration,
}

impl ThumbnailConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            key_policy: CacheKeyPolicy::default(),
            jpeg_quality: 85,
            ffmpeg_program: PathBuf::from("ffmpeg"),
            video_frame_offset: Duration::from_secs(1),
        }
    }

    /// Config rooted at the platform cache directory
    /// (e.g. `~/.cache/photon/thumbnails` on Linux).
    pub fn in_user_cache() -> Result<Self> {
        default_cache_dir().map(Self::new).ok_or(Error::NoCacheDir)
    }

    pub fn with_key_policy(mut self, policy: CacheKeyPolicy) -> Self {
        self.key_policy = policy;
        self
    }

    pub fn with_ffmpeg_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.ffmpeg_program = program.into();
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }
}

pub fn default_cache_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "photon").map(|dirs| dirs.cache_dir().join("thumbnails"))
}

/// Options for one catalog load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Read from a private `.extracted.db` copy instead of the catalog itself.
    pub use_staging: bool,
    /// Materialize only root folders; children are fetched on demand.
    pub lazy_folders: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            use_staging: true,
            lazy_folders: false,
        }
    }
}
