use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::{debug, warn};

use crate::catalog::dates::{decode_catalog_seconds, parse_capture_time};
use crate::catalog::PhotoRow;
use crate::domain::{CullState, PhotoId, PhotoRecord, PickFlag};
use crate::hierarchy::{full_path, FolderTree};

/// Photo records in natural order with an id index.
#[derive(Debug, Clone, Default)]
pub struct PhotoTable {
    records: Vec<PhotoRecord>,
    index: HashMap<PhotoId, usize>,
}

impl PhotoTable {
    pub fn get(&self, id: &PhotoId) -> Option<&PhotoRecord> {
        self.index.get(id).map(|&i| &self.records[i])
    }

    pub fn get_mut(&mut self, id: &PhotoId) -> Option<&mut PhotoRecord> {
        let i = *self.index.get(id)?;
        self.records.get_mut(i)
    }

    pub fn contains(&self, id: &PhotoId) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PhotoRecord> {
        self.records.iter()
    }

    pub fn as_slice(&self) -> &[PhotoRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn push(&mut self, record: PhotoRecord) -> bool {
        if self.index.contains_key(&record.id) {
            return false;
        }
        self.index.insert(record.id.clone(), self.records.len());
        self.records.push(record);
        true
    }
}

/// Turns photo rows into records and hangs them on the folder tree.
#[derive(Debug, Default)]
pub struct PhotoIndexer {
    warnings: Vec<String>,
}

impl PhotoIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<String> {
        self.warnings
    }

    /// Build the photo table. Rows are kept newest capture first with
    /// undated photos last; equal keys keep their input order. A file id seen
    /// twice (virtual copies) keeps its first row.
    pub fn index(&mut self, rows: Vec<PhotoRow>, folders: &mut FolderTree) -> PhotoTable {
        let mut records: Vec<PhotoRecord> = rows.into_iter().map(record_from_row).collect();
        records.sort_by(|a, b| match (a.captured, b.captured) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });

        let mut table = PhotoTable::default();
        let mut duplicates = 0usize;
        let mut unattached = 0usize;

        for record in records {
            let id = record.id.clone();
            let folder = record.folder_id.clone();
            if !table.push(record) {
                duplicates += 1;
                continue;
            }
            match folder {
                Some(folder) if folders.attach_photo(&folder, id.clone()) => {}
                Some(folder) => {
                    debug!(photo = %id, folder = %folder, "photo references unknown folder");
                    unattached += 1;
                }
                None => unattached += 1,
            }
        }

        if duplicates > 0 {
            debug!(duplicates, "duplicate file rows ignored");
        }
        if unattached > 0 {
            warn!(photos = unattached, "photos not attached to any folder");
            self.warnings
                .push(format!("{unattached} photos are not in any known folder"));
        }
        debug!(photos = table.len(), "indexed photos");
        table
    }
}

/// Convert one row. Missing or malformed fields take their documented
/// defaults; this never fails.
pub fn record_from_row(row: PhotoRow) -> PhotoRecord {
    let leaf = if row.extension.is_empty() {
        row.base_name.clone()
    } else {
        format!("{}.{}", row.base_name, row.extension)
    };
    let file_path = full_path(&row.root_path, &row.folder_path).join(leaf);

    let rating = row
        .rating
        .map(|r| r.round().clamp(0.0, CullState::MAX_RATING as f64) as u8)
        .unwrap_or(0);

    PhotoRecord {
        id: row.id,
        file_path,
        file_name: row.base_name,
        file_format: row.extension,
        folder_id: row.folder_id,
        file_size: row
            .file_size
            .and_then(|size| u64::try_from(size).ok())
            .unwrap_or(0),
        created: decode_catalog_seconds(row.created),
        modified: decode_catalog_seconds(row.modified),
        captured: row.captured.as_deref().and_then(parse_capture_time),
        width: dimension(row.width),
        height: dimension(row.height),
        orientation: row.orientation.unwrap_or_default(),
        camera_make: row.camera_make.unwrap_or_default(),
        camera_model: row.camera_model.unwrap_or_default(),
        lens_model: row.lens.unwrap_or_default(),
        focal_length: row.focal_length,
        aperture: row.aperture,
        shutter_speed: row.shutter_speed,
        iso: row.iso.and_then(|iso| u32::try_from(iso).ok()),
        keywords: Vec::new(),
        cull: CullState {
            rating,
            flag: row.pick.map(PickFlag::from_catalog).unwrap_or_default(),
            color_label: row.color_label.unwrap_or_default(),
        },
    }
}

fn dimension(value: Option<i64>) -> u32 {
    value.and_then(|v| u32::try_from(v).ok()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FolderRow;
    use crate::domain::FolderId;
    use crate::hierarchy::HierarchyBuilder;
    use chrono::{DateTime, NaiveDate, Utc};
    use std::path::PathBuf;

    fn photo(id: &str, folder: Option<&str>, captured: Option<&str>) -> PhotoRow {
        PhotoRow {
            folder_id: folder.map(FolderId::from),
            captured: captured.map(str::to_string),
            ..PhotoRow::new(id, &format!("IMG_{id}"), "jpg")
        }
    }

    fn tree() -> FolderTree {
        HierarchyBuilder::new(vec![
            FolderRow::new("1", "", "/photos/", None),
            FolderRow::new("2", "2023/", "/photos/", Some(FolderId::from("1"))),
        ])
        .build()
    }

    #[test]
    fn test_record_from_full_row() {
        let row = PhotoRow {
            root_path: "/photos/".into(),
            folder_path: "2023/".into(),
            file_size: Some(2048),
            created: Some(0.5),
            captured: Some("2023-06-15T14:30:05".into()),
            width: Some(6000),
            height: Some(4000),
            orientation: Some("AB".into()),
            camera_model: Some("EOS R5".into()),
            iso: Some(400),
            rating: Some(3.6),
            pick: Some(-1.0),
            color_label: Some("Red".into()),
            ..PhotoRow::new("7", "IMG_0007", "CR2")
        };
        let record = record_from_row(row);

        assert_eq!(record.file_path, PathBuf::from("/photos/2023/IMG_0007.CR2"));
        assert_eq!(record.file_name, "IMG_0007");
        assert_eq!(record.file_format, "CR2");
        assert_eq!(record.file_size, 2048);
        assert_eq!(record.modified, DateTime::<Utc>::MIN_UTC);
        assert_eq!(
            record.captured,
            NaiveDate::from_ymd_opt(2023, 6, 15)
                .unwrap()
                .and_hms_opt(14, 30, 5)
        );
        assert_eq!(record.width, 6000);
        assert_eq!(record.aspect_ratio(), 1.5);
        assert_eq!(record.camera_model, "EOS R5");
        assert_eq!(record.camera_make, "");
        assert_eq!(record.iso, Some(400));
        assert_eq!(record.rating(), 4);
        assert!(record.is_rejected());
        assert!(!record.is_picked());
        assert_eq!(record.cull.color_label, "Red");
    }

    #[test]
    fn test_record_degrades_without_joins() {
        let row = PhotoRow {
            file_size: Some(-5),
            width: Some(-1),
            rating: Some(12.0),
            ..PhotoRow::new("1", "lonely", "png")
        };
        let record = record_from_row(row);
        assert_eq!(record.file_path, PathBuf::from("lonely.png"));
        assert_eq!(record.file_size, 0);
        assert_eq!(record.width, 0);
        assert_eq!(record.rating(), 5);
        assert_eq!(record.cull.flag, PickFlag::Unflagged);
        assert_eq!(record.captured, None);
    }

    #[test]
    fn test_index_orders_dedups_and_attaches() {
        let mut folders = tree();
        let rows = vec![
            photo("3", Some("2"), None),
            photo("1", Some("2"), Some("2023-01-01T00:00:00")),
            photo("2", Some("1"), Some("2024-01-01T00:00:00")),
            photo("1", Some("1"), Some("2020-01-01T00:00:00")),
            photo("4", Some("99"), None),
            photo("5", None, Some("2022-05-05")),
        ];

        let mut indexer = PhotoIndexer::new();
        let table = indexer.index(rows, &mut folders);

        let order: Vec<&str> = table.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(order, vec!["2", "1", "5", "3", "4"]);
        assert_eq!(table.len(), 5);

        // The first row for id 1 wins.
        assert_eq!(
            table.get(&PhotoId::from("1")).unwrap().folder_id,
            Some(FolderId::from("2"))
        );

        let year = folders.get(&FolderId::from("2")).unwrap();
        assert_eq!(year.photos, vec![PhotoId::from("1"), PhotoId::from("3")]);
        let root = folders.get(&FolderId::from("1")).unwrap();
        assert_eq!(root.photos, vec![PhotoId::from("2")]);

        assert!(table.contains(&PhotoId::from("4")));
        assert_eq!(indexer.warnings().len(), 1);
    }
}
