pub mod cull;
pub mod export;
pub mod info;
pub mod ls;
pub mod thumbs;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use photon_core::culling::{OverlayStore, SqliteOverlayStore};
use photon_core::domain::{FolderId, PhotoId, PhotoRecord};
use photon_core::{CatalogLoader, CatalogModel, LoadOptions};
use tracing::debug;

/// `<catalog file name>.culling.db` next to the catalog.
pub(crate) fn culling_store_path(catalog: &Path) -> PathBuf {
    let name = catalog
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "catalog".to_string());
    catalog.with_file_name(format!("{name}.culling.db"))
}

/// Load the catalog and lay stored culling decisions over it.
pub(crate) fn load_model(catalog: &Path, options: LoadOptions) -> Result<CatalogModel> {
    let mut model = CatalogLoader::new(options)
        .load(catalog)
        .with_context(|| format!("failed to load {}", catalog.display()))?;

    let store_path = culling_store_path(catalog);
    if store_path.is_file() {
        let store = SqliteOverlayStore::open(&store_path)?;
        let ids: Vec<PhotoId> = model.photos().iter().map(|p| p.id.clone()).collect();
        let applied = model.apply_overlays(store.load(&ids)?);
        debug!(applied, store = %store_path.display(), "culling overlays applied");
    }
    Ok(model)
}

/// Photos of a folder and its subfolders, or the whole catalog.
pub(crate) fn scoped_photos<'m>(
    model: &'m CatalogModel,
    folder: Option<&str>,
) -> Result<Vec<&'m PhotoRecord>> {
    match folder {
        Some(id) => Ok(model.folder_photos_recursive(&FolderId::from(id))?),
        None => Ok(model.photos().iter().collect()),
    }
}

pub(crate) fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_culling_store_path() {
        assert_eq!(
            culling_store_path(Path::new("/lib/My Catalog.lrcat")),
            PathBuf::from("/lib/My Catalog.lrcat.culling.db")
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(25 * 1024 * 1024), "25.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024 * 1024), "3072.0 GB");
    }
}
