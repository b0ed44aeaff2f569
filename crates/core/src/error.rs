use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("directory walk error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("thumbnail error: {0}")]
    Thumbnail(#[from] ThumbnailError),

    #[error("catalog not found: {}", .0.display())]
    CatalogNotFound(PathBuf),

    #[error("failed to stage {}: {message}", .path.display())]
    Staging { path: PathBuf, message: String },

    #[error("a catalog is already loading")]
    AlreadyLoading,

    #[error("catalog load thread panicked")]
    LoadPanicked,

    #[error("folder not found: {0}")]
    FolderNotFound(String),

    #[error("photo not found: {0}")]
    PhotoNotFound(String),

    #[error("rating must be between 0 and 5, got {0}")]
    InvalidRating(u8),

    #[error("no cache directory available; pass one explicitly")]
    NoCacheDir,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure of a single thumbnail request.
///
/// Cloneable so one generation result can be handed to every caller that was
/// waiting on the same cache key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThumbnailError {
    #[error("source file does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("failed to decode {}: {message}", .path.display())]
    Decode { path: PathBuf, message: String },

    #[error("failed to extract a video frame from {}: {message}", .path.display())]
    FrameExtraction { path: PathBuf, message: String },

    #[error("failed to write thumbnail {}: {message}", .path.display())]
    Write { path: PathBuf, message: String },

    #[error("thumbnail worker exited without a result")]
    WorkerLost,
}
