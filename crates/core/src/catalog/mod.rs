pub mod dates;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{types::Value, Connection, OpenFlags, OptionalExtension, Row};
use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{FolderId, PhotoId};
use crate::error::{Error, Result};
use schema::{CatalogSchema, FILE_TABLE, FOLDER_TABLE, IMAGE_TABLE, PREFERENCE_TABLE, ROOT_FOLDER_TABLE};

/// One `AgLibraryFolder` row joined with its root folder's absolute path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderRow {
    pub id: FolderId,
    pub path_from_root: String,
    pub root_path: String,
    pub parent_id: Option<FolderId>,
    pub root_folder_id: Option<String>,
}

impl FolderRow {
    pub fn new(
        id: impl Into<FolderId>,
        path_from_root: &str,
        root_path: &str,
        parent_id: Option<FolderId>,
    ) -> Self {
        Self {
            id: id.into(),
            path_from_root: path_from_root.to_string(),
            root_path: root_path.to_string(),
            parent_id,
            root_folder_id: None,
        }
    }
}

/// One file row with its image metadata, folder and root folder. Every joined
/// part may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoRow {
    pub id: PhotoId,
    pub base_name: String,
    pub extension: String,
    pub folder_id: Option<FolderId>,
    pub root_path: String,
    pub folder_path: String,
    pub file_size: Option<i64>,
    pub created: Option<f64>,
    pub modified: Option<f64>,
    pub captured: Option<String>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub orientation: Option<String>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub lens: Option<String>,
    pub focal_length: Option<f64>,
    pub aperture: Option<f64>,
    pub shutter_speed: Option<f64>,
    pub iso: Option<i64>,
    pub rating: Option<f64>,
    pub color_label: Option<String>,
    pub pick: Option<f64>,
}

impl PhotoRow {
    pub fn new(id: impl Into<PhotoId>, base_name: &str, extension: &str) -> Self {
        Self {
            id: id.into(),
            base_name: base_name.to_string(),
            extension: extension.to_string(),
            ..Self::default()
        }
    }
}

/// Query access to a catalog connection.
///
/// The schema is probed once up front; tables and columns that are missing
/// are selected as `NULL`, so an older or partial catalog still loads.
pub struct CatalogReader<'c> {
    conn: &'c Connection,
    schema: CatalogSchema,
}

impl<'c> CatalogReader<'c> {
    pub fn new(conn: &'c Connection) -> Result<Self> {
        let schema = CatalogSchema::probe(conn)?;
        Ok(Self { conn, schema })
    }

    pub fn schema(&self) -> &CatalogSchema {
        &self.schema
    }

    /// Human-readable notes about missing tables and columns. Each one is
    /// also logged.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for table in self.schema.missing_tables() {
            warn!(table, "catalog table missing, treating as empty");
            warnings.push(format!("table {table} not found; treated as empty"));
        }
        for (table, column) in self.schema.missing_columns() {
            warn!(table, column, "catalog column missing, reading as NULL");
            warnings.push(format!("column {table}.{column} not found; read as NULL"));
        }
        warnings
    }

    // ── Preferences ──────────────────────────────────────────────────

    pub fn library_version(&self) -> Result<Option<String>> {
        if !self.schema.has_column(PREFERENCE_TABLE, "name")
            || !self.schema.has_column(PREFERENCE_TABLE, "value")
        {
            return Ok(None);
        }
        let value: Option<Value> = self
            .conn
            .query_row(
                "SELECT value FROM AgLibraryPreference WHERE name = 'libraryVersion' LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.and_then(value_text))
    }

    // ── Folders ──────────────────────────────────────────────────────

    pub fn folder_rows(&self) -> Result<Vec<FolderRow>> {
        if !self.schema.has_column(FOLDER_TABLE, "id_local") {
            return Ok(Vec::new());
        }

        let root_joined = self.schema.has_column(FOLDER_TABLE, "rootFolder")
            && self.schema.has_column(ROOT_FOLDER_TABLE, "id_local");
        let folder = |column| self.schema.column_or_null(FOLDER_TABLE, "f", column);
        let root_path = if root_joined {
            self.schema
                .column_or_null(ROOT_FOLDER_TABLE, "r", "absolutePath")
        } else {
            "NULL".to_string()
        };
        let join = if root_joined {
            "LEFT JOIN AgLibraryRootFolder r ON r.id_local = f.rootFolder"
        } else {
            ""
        };

        let sql = format!(
            "SELECT f.id_local AS id, {} AS path_from_root, {root_path} AS root_path,
                    {} AS parent_id, {} AS root_folder_id
             FROM AgLibraryFolder f {join}",
            folder("pathFromRoot"),
            folder("parentId"),
            folder("rootFolder"),
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], folder_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let total = rows.len();
        let rows: Vec<FolderRow> = rows.into_iter().flatten().collect();
        if rows.len() < total {
            warn!(skipped = total - rows.len(), "folder rows without an id skipped");
        }
        debug!(count = rows.len(), "read folder rows");
        Ok(rows)
    }

    // ── Photos ───────────────────────────────────────────────────────

    /// File rows with a non-empty extension, newest capture first (missing
    /// capture times last), ties by file id.
    pub fn photo_rows(&self) -> Result<Vec<PhotoRow>> {
        if !self.schema.has_column(FILE_TABLE, "id_local")
            || !self.schema.has_column(FILE_TABLE, "extension")
        {
            return Ok(Vec::new());
        }

        let images_joined = self.schema.has_column(IMAGE_TABLE, "rootFile");
        let folder_joined = self.schema.has_column(FILE_TABLE, "folder")
            && self.schema.has_column(FOLDER_TABLE, "id_local");
        let root_joined = folder_joined
            && self.schema.has_column(FOLDER_TABLE, "rootFolder")
            && self.schema.has_column(ROOT_FOLDER_TABLE, "id_local");

        let select = |joined: bool, table: &str, alias: &str, column: &str| {
            if joined {
                self.schema.column_or_null(table, alias, column)
            } else {
                "NULL".to_string()
            }
        };
        let file = |column| select(true, FILE_TABLE, "f", column);
        let image = |column| select(images_joined, IMAGE_TABLE, "i", column);

        let captured = image("captureTime");
        let mut joins = String::new();
        if images_joined {
            joins.push_str(" LEFT JOIN Adobe_images i ON i.rootFile = f.id_local");
        }
        if folder_joined {
            joins.push_str(" LEFT JOIN AgLibraryFolder lf ON lf.id_local = f.folder");
        }
        if root_joined {
            joins.push_str(" LEFT JOIN AgLibraryRootFolder r ON r.id_local = lf.rootFolder");
        }

        let sql = format!(
            "SELECT f.id_local AS id, {} AS base_name, f.extension AS extension,
                    {} AS folder_id, {} AS file_size, {} AS created, {} AS modified,
                    {captured} AS captured, {} AS width, {} AS height, {} AS orientation,
                    {} AS camera_make, {} AS camera_model, {} AS lens,
                    {} AS focal_length, {} AS aperture, {} AS shutter_speed, {} AS iso,
                    {} AS rating, {} AS color_label, {} AS pick,
                    {} AS folder_path, {} AS root_path
             FROM AgLibraryFile f{joins}
             WHERE f.extension IS NOT NULL AND f.extension != ''
             ORDER BY {captured} IS NULL, {captured} DESC, f.id_local",
            file("baseName"),
            file("folder"),
            file("fileSize"),
            file("fileCreateDate"),
            file("fileModDate"),
            image("fileWidth"),
            image("fileHeight"),
            image("orientation"),
            image("cameraMake"),
            image("cameraModel"),
            image("lens"),
            image("focalLength"),
            image("aperture"),
            image("shutterSpeed"),
            image("isoSpeedRating"),
            image("rating"),
            image("colorLabels"),
            image("pick"),
            select(folder_joined, FOLDER_TABLE, "lf", "pathFromRoot"),
            select(root_joined, ROOT_FOLDER_TABLE, "r", "absolutePath"),
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], photo_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let total = rows.len();
        let rows: Vec<PhotoRow> = rows.into_iter().flatten().collect();
        if rows.len() < total {
            warn!(skipped = total - rows.len(), "file rows without an id skipped");
        }
        debug!(count = rows.len(), "read photo rows");
        Ok(rows)
    }

    /// Number of distinct file rows that would be indexed.
    pub fn photo_count(&self) -> Result<usize> {
        if !self.schema.has_column(FILE_TABLE, "extension") {
            return Ok(0);
        }
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM AgLibraryFile WHERE extension IS NOT NULL AND extension != ''",
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }
}

fn folder_from_row(row: &Row<'_>) -> rusqlite::Result<Option<FolderRow>> {
    let Some(id) = value_id(row.get("id")?) else {
        return Ok(None);
    };
    Ok(Some(FolderRow {
        id: FolderId::new(id),
        path_from_root: text(row, "path_from_root")?,
        root_path: text(row, "root_path")?,
        parent_id: value_id(row.get("parent_id")?).map(FolderId::new),
        root_folder_id: value_id(row.get("root_folder_id")?),
    }))
}

fn photo_from_row(row: &Row<'_>) -> rusqlite::Result<Option<PhotoRow>> {
    let Some(id) = value_id(row.get("id")?) else {
        return Ok(None);
    };
    Ok(Some(PhotoRow {
        id: PhotoId::new(id),
        base_name: text(row, "base_name")?,
        extension: text(row, "extension")?,
        folder_id: value_id(row.get("folder_id")?).map(FolderId::new),
        root_path: text(row, "root_path")?,
        folder_path: text(row, "folder_path")?,
        file_size: value_i64(row.get("file_size")?),
        created: value_f64(row.get("created")?),
        modified: value_f64(row.get("modified")?),
        captured: value_text(row.get("captured")?),
        width: value_i64(row.get("width")?),
        height: value_i64(row.get("height")?),
        orientation: value_text(row.get("orientation")?),
        camera_make: value_text(row.get("camera_make")?),
        camera_model: value_text(row.get("camera_model")?),
        lens: value_text(row.get("lens")?),
        focal_length: value_f64(row.get("focal_length")?),
        aperture: value_f64(row.get("aperture")?),
        shutter_speed: value_f64(row.get("shutter_speed")?),
        iso: value_i64(row.get("iso")?),
        rating: value_f64(row.get("rating")?),
        color_label: value_text(row.get("color_label")?),
        pick: value_f64(row.get("pick")?),
    }))
}

// ── Value coercion ───────────────────────────────────────────────────
//
// Catalog columns are loosely typed. Values of an unexpected storage class
// coerce where that is unambiguous and become `None` otherwise.

fn text(row: &Row<'_>, name: &str) -> rusqlite::Result<String> {
    Ok(value_text(row.get(name)?).unwrap_or_default())
}

pub(crate) fn value_text(value: Value) -> Option<String> {
    match value {
        Value::Text(s) => Some(s),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Blob(bytes) => String::from_utf8(bytes).ok(),
        Value::Null => None,
    }
}

pub(crate) fn value_f64(value: Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(i as f64),
        Value::Real(f) if f.is_finite() => Some(f),
        Value::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

pub(crate) fn value_i64(value: Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(i),
        Value::Real(f) if f.is_finite() && f.abs() < i64::MAX as f64 => Some(f.round() as i64),
        Value::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| value_i64(Value::Real(s.parse::<f64>().ok()?)))
        }
        _ => None,
    }
}

/// Ids are rendered as decimal strings whatever their storage class.
pub(crate) fn value_id(value: Value) -> Option<String> {
    match value {
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) if f.is_finite() && f.fract() == 0.0 => Some((f as i64).to_string()),
        Value::Real(f) if f.is_finite() => Some(f.to_string()),
        Value::Text(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

// ── Catalog files ────────────────────────────────────────────────────

/// Quick facts about a catalog file, read without building a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogSummary {
    pub name: String,
    pub path: PathBuf,
    pub version: String,
    pub last_modified: DateTime<Utc>,
    pub photo_count: usize,
}

pub(crate) fn open_read_only(path: &Path) -> Result<Connection> {
    if !path.is_file() {
        return Err(Error::CatalogNotFound(path.to_path_buf()));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

pub(crate) fn catalog_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// True for an existing `.lrcat` file holding the three core tables.
pub fn is_valid_catalog(path: &Path) -> bool {
    let has_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("lrcat"));
    if !has_extension {
        return false;
    }
    let Ok(conn) = open_read_only(path) else {
        return false;
    };
    let Ok(schema) = CatalogSchema::probe(&conn) else {
        return false;
    };
    [FILE_TABLE, FOLDER_TABLE, IMAGE_TABLE]
        .iter()
        .all(|table| schema.has_table(table))
}

pub fn summarize(path: &Path) -> Result<CatalogSummary> {
    let conn = open_read_only(path)?;
    let reader = CatalogReader::new(&conn)?;
    let last_modified = std::fs::metadata(path)?.modified()?.into();
    Ok(CatalogSummary {
        name: catalog_name(path),
        path: path.to_path_buf(),
        version: reader
            .library_version()?
            .unwrap_or_else(|| "Unknown".to_string()),
        last_modified,
        photo_count: reader.photo_count()?,
    })
}
