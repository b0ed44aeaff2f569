use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Catalog-local folder id. Kept as a string so numeric stability of the
/// source ids is never assumed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FolderId(String);

/// Catalog-local photo (file) id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhotoId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(FolderId);
string_id!(PhotoId);

/// A folder in the catalog hierarchy.
///
/// Nodes live in the [`FolderTree`](crate::hierarchy::FolderTree) arena; both
/// directions of the parent/child relation are ids into that arena.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderNode {
    pub id: FolderId,
    pub name: String,
    pub full_path: PathBuf,
    /// Linked parent. `None` for every root, including folders whose catalog
    /// parent was missing.
    pub parent_id: Option<FolderId>,
    /// Parent id exactly as recorded in the catalog row.
    pub catalog_parent_id: Option<FolderId>,
    pub root_folder_id: Option<String>,
    pub children: Vec<FolderId>,
    pub photos: Vec<PhotoId>,
    /// Set in lazy mode while children exist in the row set but have not been
    /// materialized yet.
    pub has_unloaded_children: bool,
}

impl FolderNode {
    pub fn photo_count(&self) -> usize {
        self.photos.len()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty() || self.has_unloaded_children
    }

    pub fn has_photos(&self) -> bool {
        !self.photos.is_empty()
    }
}

/// Mutually exclusive curation flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickFlag {
    #[default]
    Unflagged,
    Picked,
    Rejected,
}

impl PickFlag {
    /// Lightroom stores picks as a signed number: positive picked, negative
    /// rejected.
    pub fn from_catalog(pick: f64) -> Self {
        if pick > 0.0 {
            Self::Picked
        } else if pick < 0.0 {
            Self::Rejected
        } else {
            Self::Unflagged
        }
    }
}

/// The user-editable overlay on top of a photo record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CullState {
    pub rating: u8,
    pub flag: PickFlag,
    pub color_label: String,
}

impl CullState {
    pub const MAX_RATING: u8 = 5;

    pub fn is_picked(&self) -> bool {
        self.flag == PickFlag::Picked
    }

    pub fn is_rejected(&self) -> bool {
        self.flag == PickFlag::Rejected
    }

    pub fn set_rating(&mut self, rating: u8) -> Result<()> {
        if rating > Self::MAX_RATING {
            return Err(Error::InvalidRating(rating));
        }
        self.rating = rating;
        Ok(())
    }

    pub fn pick(&mut self) {
        self.flag = PickFlag::Picked;
    }

    pub fn reject(&mut self) {
        self.flag = PickFlag::Rejected;
    }

    pub fn clear_flag(&mut self) {
        self.flag = PickFlag::Unflagged;
    }

    /// Rebuild an overlay from the two stored booleans. A row claiming both
    /// is treated as rejected.
    pub fn from_flags(rating: u8, is_picked: bool, is_rejected: bool, color_label: String) -> Self {
        let flag = match (is_picked, is_rejected) {
            (_, true) => PickFlag::Rejected,
            (true, false) => PickFlag::Picked,
            (false, false) => PickFlag::Unflagged,
        };
        Self {
            rating: rating.min(Self::MAX_RATING),
            flag,
            color_label,
        }
    }
}

/// One photo of the catalog, with its metadata and culling overlay.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoRecord {
    pub id: PhotoId,
    pub file_path: PathBuf,
    pub file_name: String,
    pub file_format: String,
    pub folder_id: Option<FolderId>,
    pub file_size: u64,
    /// `DateTime::<Utc>::MIN_UTC` when the catalog has no value.
    pub created: DateTime<Utc>,
    /// `DateTime::<Utc>::MIN_UTC` when the catalog has no value.
    pub modified: DateTime<Utc>,
    pub captured: Option<NaiveDateTime>,
    pub width: u32,
    pub height: u32,
    pub orientation: String,
    pub camera_make: String,
    pub camera_model: String,
    pub lens_model: String,
    pub focal_length: Option<f64>,
    pub aperture: Option<f64>,
    pub shutter_speed: Option<f64>,
    pub iso: Option<u32>,
    pub keywords: Vec<String>,
    pub cull: CullState,
}

impl PhotoRecord {
    pub fn aspect_ratio(&self) -> f64 {
        if self.height > 0 {
            self.width as f64 / self.height as f64
        } else {
            0.0
        }
    }

    pub fn rating(&self) -> u8 {
        self.cull.rating
    }

    pub fn is_picked(&self) -> bool {
        self.cull.is_picked()
    }

    pub fn is_rejected(&self) -> bool {
        self.cull.is_rejected()
    }
}

/// How a source file has to be decoded to produce a preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Raster,
    Raw,
    Video,
}

const RAW_EXTENSIONS: &[&str] = &[
    "cr2", "cr3", "nef", "nrw", "arw", "srf", "sr2", "dng", "orf", "rw2", "raf", "pef", "srw",
    "3fr", "erf", "kdc", "mos", "mrw", "x3f",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mov", "m4v", "avi", "mkv", "webm", "wmv", "mts", "m2ts", "3gp", "mpg", "mpeg",
];

impl MediaKind {
    /// Classify by extension. Anything not recognized as RAW or video is
    /// handed to the raster decoder, which reports unsupported data itself.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        if RAW_EXTENSIONS.contains(&ext.as_str()) {
            Self::Raw
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Self::Video
        } else {
            Self::Raster
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raster => "raster",
            Self::Raw => "raw",
            Self::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
