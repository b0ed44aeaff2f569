use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::domain::{CullState, FolderId, FolderNode, PhotoId, PhotoRecord};
use crate::error::{Error, Result};
use crate::hierarchy::FolderTree;
use crate::indexer::PhotoTable;

/// Extensions the browser shows by default.
pub const SUPPORTED_FORMATS: &[&str] = &[
    "jpg", "jpeg", "png", "dng", "cr2", "cr3", "nef", "arw", "orf", "rw2",
];

/// Facts about the catalog a model was loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogInfo {
    pub name: String,
    pub path: PathBuf,
    /// `libraryVersion` preference, or `"Unknown"`.
    pub version: String,
    pub last_modified: DateTime<Utc>,
    pub loaded_at: DateTime<Utc>,
}

impl CatalogInfo {
    /// Info for a catalog that does not come from a file.
    pub fn detached(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: PathBuf::new(),
            version: "Unknown".to_string(),
            last_modified: DateTime::<Utc>::MIN_UTC,
            loaded_at: Utc::now(),
        }
    }
}

/// Predicates for [`CatalogModel::filter`]. Unset fields match everything;
/// set fields are ANDed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhotoFilter {
    /// Extension, case-insensitive, leading dot optional.
    pub format: Option<String>,
    pub min_rating: Option<u8>,
    pub picked: Option<bool>,
    /// Inclusive lower bound on capture time.
    pub captured_from: Option<NaiveDateTime>,
    /// Inclusive upper bound on capture time.
    pub captured_to: Option<NaiveDateTime>,
}

impl PhotoFilter {
    pub fn matches(&self, photo: &PhotoRecord) -> bool {
        if let Some(format) = &self.format {
            let wanted = format.trim_start_matches('.');
            if !photo.file_format.eq_ignore_ascii_case(wanted) {
                return false;
            }
        }
        if let Some(min) = self.min_rating {
            if photo.rating() < min {
                return false;
            }
        }
        if let Some(picked) = self.picked {
            if photo.is_picked() != picked {
                return false;
            }
        }
        if self.captured_from.is_some() || self.captured_to.is_some() {
            let Some(captured) = photo.captured else {
                return false;
            };
            if self.captured_from.is_some_and(|from| captured < from) {
                return false;
            }
            if self.captured_to.is_some_and(|to| captured > to) {
                return false;
            }
        }
        true
    }
}

/// The loaded catalog: folder tree, photo table and load warnings.
///
/// Read-only after construction except for the culling overlay, which is
/// mutated through `&mut self`.
#[derive(Debug, Clone)]
pub struct CatalogModel {
    info: CatalogInfo,
    folders: FolderTree,
    photos: PhotoTable,
    warnings: Vec<String>,
}

impl CatalogModel {
    pub fn new(
        info: CatalogInfo,
        folders: FolderTree,
        photos: PhotoTable,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            info,
            folders,
            photos,
            warnings,
        }
    }

    pub fn info(&self) -> &CatalogInfo {
        &self.info
    }

    pub fn folders(&self) -> &FolderTree {
        &self.folders
    }

    /// All photos in natural order.
    pub fn photos(&self) -> &[PhotoRecord] {
        self.photos.as_slice()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn photo(&self, id: &PhotoId) -> Option<&PhotoRecord> {
        self.photos.get(id)
    }

    pub fn folder(&self, id: &FolderId) -> Option<&FolderNode> {
        self.folders.get(id)
    }

    pub fn root_folders(&self) -> Vec<&FolderNode> {
        self.folders.roots().collect()
    }

    /// Photos directly in a folder, in natural order.
    pub fn folder_photos(&self, id: &FolderId) -> Result<Vec<&PhotoRecord>> {
        let folder = self
            .folders
            .get(id)
            .ok_or_else(|| Error::FolderNotFound(id.to_string()))?;
        Ok(self.resolve(&folder.photos))
    }

    /// Photos in a folder and all folders below it.
    pub fn folder_photos_recursive(&self, id: &FolderId) -> Result<Vec<&PhotoRecord>> {
        if !self.folders.is_known(id) {
            return Err(Error::FolderNotFound(id.to_string()));
        }
        Ok(self.resolve(&self.folders.all_photos(id)))
    }

    /// Children of a folder, loading them first in lazy mode.
    pub fn folder_children(&mut self, id: &FolderId) -> Result<Vec<&FolderNode>> {
        let ids = self.folders.load_children(id)?;
        Ok(ids.iter().filter_map(|child| self.folders.get(child)).collect())
    }

    fn resolve(&self, ids: &[PhotoId]) -> Vec<&PhotoRecord> {
        ids.iter().filter_map(|id| self.photos.get(id)).collect()
    }

    // ── Counts ───────────────────────────────────────────────────────

    /// Folders in the catalog, including ones not loaded yet.
    pub fn total_folder_count(&self) -> usize {
        self.folders.catalog_len()
    }

    pub fn total_photo_count(&self) -> usize {
        self.photos.len()
    }

    pub fn total_file_size(&self) -> u64 {
        self.photos.iter().map(|p| p.file_size).sum()
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Case-insensitive substring match on file name, path and keywords.
    pub fn search(&self, term: &str) -> Vec<&PhotoRecord> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return Vec::new();
        }
        self.photos
            .iter()
            .filter(|photo| {
                photo.file_name.to_lowercase().contains(&term)
                    || photo
                        .file_path
                        .to_string_lossy()
                        .to_lowercase()
                        .contains(&term)
                    || photo
                        .keywords
                        .iter()
                        .any(|k| k.to_lowercase().contains(&term))
            })
            .collect()
    }

    pub fn filter(&self, filter: &PhotoFilter) -> Vec<&PhotoRecord> {
        self.photos.iter().filter(|p| filter.matches(p)).collect()
    }

    pub fn is_format_supported(extension: &str) -> bool {
        let ext = extension.trim_start_matches('.').to_ascii_lowercase();
        SUPPORTED_FORMATS.contains(&ext.as_str())
    }

    // ── Culling ──────────────────────────────────────────────────────

    pub fn set_rating(&mut self, id: &PhotoId, rating: u8) -> Result<()> {
        self.cull_mut(id)?.set_rating(rating)
    }

    pub fn pick(&mut self, id: &PhotoId) -> Result<()> {
        self.cull_mut(id)?.pick();
        Ok(())
    }

    pub fn reject(&mut self, id: &PhotoId) -> Result<()> {
        self.cull_mut(id)?.reject();
        Ok(())
    }

    pub fn clear_flag(&mut self, id: &PhotoId) -> Result<()> {
        self.cull_mut(id)?.clear_flag();
        Ok(())
    }

    pub fn set_color_label(&mut self, id: &PhotoId, label: impl Into<String>) -> Result<()> {
        self.cull_mut(id)?.color_label = label.into();
        Ok(())
    }

    /// Replace overlays for the given photos. Ids not in the catalog are
    /// skipped. Returns how many were applied.
    pub fn apply_overlays(&mut self, overlays: HashMap<PhotoId, CullState>) -> usize {
        let mut applied = 0;
        for (id, cull) in overlays {
            if let Some(photo) = self.photos.get_mut(&id) {
                photo.cull = cull;
                applied += 1;
            }
        }
        debug!(applied, "applied culling overlays");
        applied
    }

    fn cull_mut(&mut self, id: &PhotoId) -> Result<&mut CullState> {
        self.photos
            .get_mut(id)
            .map(|photo| &mut photo.cull)
            .ok_or_else(|| Error::PhotoNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FolderRow, PhotoRow};
    use crate::domain::PickFlag;
    use crate::hierarchy::HierarchyBuilder;
    use crate::indexer::PhotoIndexer;
    use chrono::NaiveDate;

    fn at(year: i32, month: u32, day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn model() -> CatalogModel {
        let mut folders = HierarchyBuilder::new(vec![
            FolderRow::new("1", "", "/photos/", None),
            FolderRow::new("2", "2023/", "/photos/", Some(FolderId::from("1"))),
            FolderRow::new("3", "2023/beach/", "/photos/", Some(FolderId::from("2"))),
        ])
        .build();

        let row = |id: &str, name: &str, ext: &str, folder: &str, captured: Option<&str>| PhotoRow {
            folder_id: Some(FolderId::from(folder)),
            root_path: "/photos/".into(),
            folder_path: if folder == "3" { "2023/beach/" } else { "2023/" }.into(),
            captured: captured.map(str::to_string),
            file_size: Some(100),
            ..PhotoRow::new(id, name, ext)
        };
        let rows = vec![
            row("10", "IMG_0010", "jpg", "2", Some("2023-07-01T12:00:00")),
            PhotoRow {
                rating: Some(4.0),
                pick: Some(1.0),
                ..row("11", "DSC_0011", "NEF", "3", Some("2023-06-01T12:00:00"))
            },
            row("12", "Sunset", "png", "3", None),
        ];
        let photos = PhotoIndexer::new().index(rows, &mut folders);
        CatalogModel::new(CatalogInfo::detached("test"), folders, photos, Vec::new())
    }

    fn ids(photos: &[&PhotoRecord]) -> Vec<String> {
        photos.iter().map(|p| p.id.to_string()).collect()
    }

    #[test]
    fn test_counts_and_folder_listings() {
        let model = model();
        assert_eq!(model.total_folder_count(), 3);
        assert_eq!(model.total_photo_count(), 3);
        assert_eq!(model.total_file_size(), 300);
        assert_eq!(model.root_folders().len(), 1);

        let year = FolderId::from("2");
        assert_eq!(ids(&model.folder_photos(&year).unwrap()), vec!["10"]);
        assert_eq!(
            ids(&model.folder_photos_recursive(&year).unwrap()),
            vec!["10", "11", "12"]
        );
        assert!(matches!(
            model.folder_photos(&FolderId::from("9")),
            Err(Error::FolderNotFound(_))
        ));
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let model = model();
        assert_eq!(ids(&model.search("dsc")), vec!["11"]);
        assert_eq!(ids(&model.search("BEACH")), vec!["11", "12"]);
        assert_eq!(
            model.photo(&PhotoId::from("12")).unwrap().file_path,
            PathBuf::from("/photos/2023/beach/Sunset.png")
        );
        assert!(model.search("   ").is_empty());
        assert!(model.search("nothing-here").is_empty());
    }

    #[test]
    fn test_filter_predicates_are_anded() {
        let model = model();

        let by_format = PhotoFilter {
            format: Some(".nef".into()),
            ..Default::default()
        };
        assert_eq!(ids(&model.filter(&by_format)), vec!["11"]);

        let rated_and_picked = PhotoFilter {
            min_rating: Some(3),
            picked: Some(true),
            ..Default::default()
        };
        assert_eq!(ids(&model.filter(&rated_and_picked)), vec!["11"]);

        let unpicked = PhotoFilter {
            picked: Some(false),
            ..Default::default()
        };
        assert_eq!(ids(&model.filter(&unpicked)), vec!["10", "12"]);

        let june_onwards = PhotoFilter {
            captured_from: Some(at(2023, 6, 1)),
            ..Default::default()
        };
        // Inclusive bound; undated photos are excluded once a bound is set.
        assert_eq!(ids(&model.filter(&june_onwards)), vec!["10", "11"]);

        let window = PhotoFilter {
            captured_from: Some(at(2023, 6, 2)),
            captured_to: Some(at(2023, 7, 1)),
            ..Default::default()
        };
        assert_eq!(ids(&model.filter(&window)), vec!["10"]);

        assert_eq!(model.filter(&PhotoFilter::default()).len(), 3);
    }

    #[test]
    fn test_culling_mutations() {
        let mut model = model();
        let id = PhotoId::from("10");

        model.set_rating(&id, 5).unwrap();
        model.pick(&id).unwrap();
        model.set_color_label(&id, "Green").unwrap();
        let photo = model.photo(&id).unwrap();
        assert_eq!(photo.rating(), 5);
        assert!(photo.is_picked());
        assert_eq!(photo.cull.color_label, "Green");

        model.reject(&id).unwrap();
        assert!(model.photo(&id).unwrap().is_rejected());
        assert!(!model.photo(&id).unwrap().is_picked());
        model.clear_flag(&id).unwrap();
        assert_eq!(model.photo(&id).unwrap().cull.flag, PickFlag::Unflagged);

        assert!(matches!(
            model.set_rating(&id, 6),
            Err(Error::InvalidRating(6))
        ));
        assert!(matches!(
            model.pick(&PhotoId::from("404")),
            Err(Error::PhotoNotFound(_))
        ));
    }

    #[test]
    fn test_apply_overlays_skips_unknown_ids() {
        let mut model = model();
        let mut overlays = HashMap::new();
        overlays.insert(
            PhotoId::from("12"),
            CullState::from_flags(2, true, false, String::new()),
        );
        overlays.insert(PhotoId::from("999"), CullState::default());

        assert_eq!(model.apply_overlays(overlays), 1);
        let photo = model.photo(&PhotoId::from("12")).unwrap();
        assert_eq!(photo.rating(), 2);
        assert!(photo.is_picked());
    }

    #[test]
    fn test_supported_formats() {
        assert!(CatalogModel::is_format_supported("JPG"));
        assert!(CatalogModel::is_format_supported(".cr3"));
        assert!(!CatalogModel::is_format_supported("heic"));
        assert!(!CatalogModel::is_format_supported(""));
    }
}
