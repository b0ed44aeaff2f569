pub mod catalog;
pub mod config;
pub mod culling;
pub mod domain;
pub mod error;
pub mod hierarchy;
pub mod indexer;
pub mod model;
pub mod staging;
pub mod thumbnail;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::info;

use catalog::CatalogReader;
use error::{Error, Result};
use hierarchy::HierarchyBuilder;
use indexer::PhotoIndexer;
use staging::StagingExtractor;

pub use config::{CacheKeyPolicy, LoadOptions, ThumbnailConfig};
pub use model::{CatalogInfo, CatalogModel, PhotoFilter};
pub use thumbnail::{ThumbnailCache, ThumbnailSize, ThumbnailTicket, WorkerPool};

/// Entry point for turning a catalog file into a [`CatalogModel`].
///
/// One loader runs one load at a time. A second request while a load is in
/// progress fails with [`Error::AlreadyLoading`] instead of queueing.
#[derive(Debug, Clone, Default)]
pub struct CatalogLoader {
    options: LoadOptions,
    loading: Arc<AtomicBool>,
}

/// Clears the loading flag when the load ends, however it ends.
struct LoadGuard(Arc<AtomicBool>);

impl LoadGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::AlreadyLoading)?;
        Ok(Self(Arc::clone(flag)))
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A load running on its own thread.
#[derive(Debug)]
pub struct LoadHandle {
    path: PathBuf,
    thread: JoinHandle<Result<CatalogModel>>,
}

impl LoadHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the model. A panic inside the load surfaces as
    /// [`Error::LoadPanicked`].
    pub fn join(self) -> Result<CatalogModel> {
        self.thread.join().map_err(|_| Error::LoadPanicked)?
    }
}

impl CatalogLoader {
    pub fn new(options: LoadOptions) -> Self {
        Self {
            options,
            loading: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn options(&self) -> LoadOptions {
        self.options
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::Acquire)
    }

    /// Load synchronously on the calling thread.
    pub fn load(&self, path: &Path) -> Result<CatalogModel> {
        if !path.is_file() {
            return Err(Error::CatalogNotFound(path.to_path_buf()));
        }
        let _guard = LoadGuard::acquire(&self.loading)?;
        load_file(path, self.options)
    }

    /// Start a load on a dedicated thread. Missing files and concurrent loads
    /// are reported here, before the thread starts.
    pub fn load_in_background(&self, path: &Path) -> Result<LoadHandle> {
        if !path.is_file() {
            return Err(Error::CatalogNotFound(path.to_path_buf()));
        }
        let guard = LoadGuard::acquire(&self.loading)?;
        let options = self.options;
        let owned = path.to_path_buf();
        let thread = std::thread::Builder::new()
            .name("photon-catalog-load".to_string())
            .spawn(move || {
                let _guard = guard;
                load_file(&owned, options)
            })?;
        Ok(LoadHandle {
            path: path.to_path_buf(),
            thread,
        })
    }

    /// Build a model from an already open catalog connection. No staging, no
    /// loading guard.
    pub fn load_from_connection(
        conn: &Connection,
        mut info: CatalogInfo,
        options: LoadOptions,
    ) -> Result<CatalogModel> {
        let reader = CatalogReader::new(conn)?;
        let mut warnings = reader.warnings();

        if let Some(version) = reader.library_version()? {
            info.version = version;
        }

        let builder = HierarchyBuilder::new(reader.folder_rows()?);
        let mut folders = if options.lazy_folders {
            builder.build_lazy()
        } else {
            builder.build()
        };
        warnings.extend(folders.warnings().iter().cloned());

        let mut indexer = PhotoIndexer::new();
        let photos = indexer.index(reader.photo_rows()?, &mut folders);
        warnings.extend(indexer.into_warnings());

        info!(
            catalog = %info.name,
            folders = folders.catalog_len(),
            photos = photos.len(),
            warnings = warnings.len(),
            "catalog loaded"
        );
        Ok(CatalogModel::new(info, folders, photos, warnings))
    }
}

fn load_file(path: &Path, options: LoadOptions) -> Result<CatalogModel> {
    let last_modified: DateTime<Utc> = std::fs::metadata(path)?.modified()?.into();
    let info = CatalogInfo {
        name: catalog::catalog_name(path),
        path: path.to_path_buf(),
        version: "Unknown".to_string(),
        last_modified,
        loaded_at: Utc::now(),
    };

    // Tables missing from a fresh copy surface again as reader warnings.
    let read_from = if options.use_staging {
        StagingExtractor::new(path).ensure_fresh()?.path
    } else {
        path.to_path_buf()
    };

    info!(catalog = %path.display(), source = %read_from.display(), "loading catalog");
    let conn = catalog::open_read_only(&read_from)?;
    CatalogLoader::load_from_connection(&conn, info, options)
}
