use std::collections::{HashMap, HashSet};

use rusqlite::Connection;

use crate::error::Result;

pub const FILE_TABLE: &str = "AgLibraryFile";
pub const FOLDER_TABLE: &str = "AgLibraryFolder";
pub const IMAGE_TABLE: &str = "Adobe_images";
pub const ROOT_FOLDER_TABLE: &str = "AgLibraryRootFolder";
pub const PREFERENCE_TABLE: &str = "AgLibraryPreference";

/// Tables copied into the staged catalog, in copy order.
pub const STAGED_TABLES: &[&str] = &[
    FILE_TABLE,
    FOLDER_TABLE,
    IMAGE_TABLE,
    ROOT_FOLDER_TABLE,
    PREFERENCE_TABLE,
];

/// Columns the reader looks for. Anything missing is read as NULL.
pub const EXPECTED_COLUMNS: &[(&str, &[&str])] = &[
    (
        FILE_TABLE,
        &[
            "id_local",
            "baseName",
            "extension",
            "folder",
            "fileSize",
            "fileCreateDate",
            "fileModDate",
        ],
    ),
    (
        FOLDER_TABLE,
        &["id_local", "pathFromRoot", "parentId", "rootFolder"],
    ),
    (
        IMAGE_TABLE,
        &[
            "rootFile",
            "captureTime",
            "fileWidth",
            "fileHeight",
            "orientation",
            "cameraMake",
            "cameraModel",
            "lens",
            "focalLength",
            "aperture",
            "shutterSpeed",
            "isoSpeedRating",
            "rating",
            "colorLabels",
            "pick",
        ],
    ),
    (ROOT_FOLDER_TABLE, &["id_local", "absolutePath"]),
    (PREFERENCE_TABLE, &["name", "value"]),
];

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `(name, declared type)` for every column of `table`; empty when the table
/// does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let columns = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>("name")?, row.get::<_, String>("type")?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// Which of the catalog tables and columns a given file actually has.
/// Catalog schemas drift between versions, so queries are built from this
/// instead of assuming a layout.
#[derive(Debug, Clone, Default)]
pub struct CatalogSchema {
    tables: HashMap<String, HashSet<String>>,
}

impl CatalogSchema {
    pub fn probe(conn: &Connection) -> Result<Self> {
        let mut tables = HashMap::new();
        for &table in STAGED_TABLES {
            let columns = table_columns(conn, table)?;
            if !columns.is_empty() {
                tables.insert(
                    table.to_string(),
                    columns.into_iter().map(|(name, _)| name).collect(),
                );
            }
        }
        Ok(Self { tables })
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|columns| columns.contains(column))
    }

    /// `alias.column` when present, `NULL` otherwise.
    pub fn column_or_null(&self, table: &str, alias: &str, column: &str) -> String {
        if self.has_column(table, column) {
            format!("{alias}.{}", quote_ident(column))
        } else {
            "NULL".to_string()
        }
    }

    pub fn missing_tables(&self) -> Vec<&'static str> {
        STAGED_TABLES
            .iter()
            .copied()
            .filter(|table| !self.has_table(table))
            .collect()
    }

    /// `(table, column)` pairs expected by the reader but absent from a table
    /// that does exist.
    pub fn missing_columns(&self) -> Vec<(&'static str, &'static str)> {
        EXPECTED_COLUMNS
            .iter()
            .filter(|(table, _)| self.has_table(table))
            .flat_map(|&(table, columns)| {
                columns
                    .iter()
                    .filter(move |column| !self.has_column(table, column))
                    .map(move |&column| (table, column))
            })
            .collect()
    }
}
