use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::config::CacheKeyPolicy;
use crate::error::ThumbnailError;

/// Requested bounding box. Thumbnails fit inside it and are never upscaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThumbnailSize {
    width: u32,
    height: u32,
}

impl ThumbnailSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn square(edge: u32) -> Self {
        Self::new(edge, edge)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl fmt::Display for ThumbnailSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Identity of one cached thumbnail variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    digest: String,
    size: ThumbnailSize,
}

impl CacheKey {
    /// Key for an absolute source path, optionally salted with its
    /// modification time.
    pub fn new(source: &Path, modified: Option<SystemTime>, size: ThumbnailSize) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(source.to_string_lossy().as_bytes());
        if let Some(modified) = modified {
            let nanos = modified
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or(0);
            hasher.update(b"\0");
            hasher.update(nanos.to_string().as_bytes());
        }
        Self {
            digest: format!("{:x}", hasher.finalize()),
            size,
        }
    }

    /// Resolve `source` to an absolute path and build its key under `policy`.
    /// `PathAndModified` needs to stat the source, so a missing file fails
    /// here.
    pub fn for_source(
        source: &Path,
        size: ThumbnailSize,
        policy: CacheKeyPolicy,
    ) -> Result<(Self, PathBuf), ThumbnailError> {
        let absolute = std::path::absolute(source)
            .map_err(|_| ThumbnailError::SourceMissing(source.to_path_buf()))?;
        let modified = match policy {
            CacheKeyPolicy::PathOnly => None,
            CacheKeyPolicy::PathAndModified => Some(
                std::fs::metadata(&absolute)
                    .and_then(|meta| meta.modified())
                    .map_err(|_| ThumbnailError::SourceMissing(absolute.clone()))?,
            ),
        };
        Ok((Self::new(&absolute, modified, size), absolute))
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn size(&self) -> ThumbnailSize {
        self.size
    }

    /// `<digest>_<width>x<height>.jpg`
    pub fn file_name(&self) -> String {
        format!("{}_{}.jpg", self.digest, self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zero_bounds_become_one_pixel() {
        let size = ThumbnailSize::new(0, 40);
        assert_eq!((size.width(), size.height()), (1, 40));
        assert_eq!(ThumbnailSize::square(0).to_string(), "1x1");
    }

    #[test]
    fn test_file_name_layout() {
        let key = CacheKey::new(Path::new("/photos/a.jpg"), None, ThumbnailSize::new(320, 240));
        let name = key.file_name();
        assert_eq!(key.digest().len(), 64);
        assert!(name.ends_with("_320x240.jpg"));
        assert!(name.starts_with(key.digest()));
    }

    #[test]
    fn test_key_depends_on_path_size_and_mtime() {
        let size = ThumbnailSize::square(256);
        let t0 = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let t1 = t0 + Duration::from_nanos(1);

        let base = CacheKey::new(Path::new("/a.jpg"), Some(t0), size);
        assert_eq!(base, CacheKey::new(Path::new("/a.jpg"), Some(t0), size));
        assert_ne!(base, CacheKey::new(Path::new("/b.jpg"), Some(t0), size));
        assert_ne!(base, CacheKey::new(Path::new("/a.jpg"), Some(t1), size));
        assert_ne!(
            base.file_name(),
            CacheKey::new(Path::new("/a.jpg"), Some(t0), ThumbnailSize::square(128)).file_name()
        );
        assert_ne!(base, CacheKey::new(Path::new("/a.jpg"), None, size));
    }

    #[test]
    fn test_path_only_matches_sha256_of_path() {
        let key = CacheKey::new(Path::new("abc"), None, ThumbnailSize::square(1));
        assert_eq!(
            key.digest(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_for_source_policies() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.jpg");
        std::fs::write(&file, b"x").unwrap();
        let size = ThumbnailSize::square(64);

        let (key, absolute) =
            CacheKey::for_source(&file, size, CacheKeyPolicy::PathAndModified).unwrap();
        assert!(absolute.is_absolute());
        assert_ne!(
            key,
            CacheKey::for_source(&file, size, CacheKeyPolicy::PathOnly).unwrap().0
        );

        let missing = tmp.path().join("gone.jpg");
        assert!(matches!(
            CacheKey::for_source(&missing, size, CacheKeyPolicy::PathAndModified),
            Err(ThumbnailError::SourceMissing(_))
        ));
        assert!(CacheKey::for_source(&missing, size, CacheKeyPolicy::PathOnly).is_ok());
    }
}
