//! Private working copy of the catalog tables we read.
//!
//! The owning application may hold the catalog file exclusively, so every load
//! reads from a sibling `<catalog>.extracted.db` that holds verbatim copies of
//! a fixed set of tables. The copy is regenerated only when the catalog is
//! newer than it.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params_from_iter, types::Value, Connection, OpenFlags};
use tracing::{debug, info, warn};

use crate::catalog::schema::{quote_ident, table_columns, STAGED_TABLES};
use crate::error::{Error, Result};

/// Outcome of one extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractReport {
    /// `(table, rows copied)` for every table that made it into the copy.
    pub tables_copied: Vec<(String, usize)>,
    /// Whitelisted tables that were absent from the source or failed to copy.
    pub tables_missing: Vec<String>,
}

impl ExtractReport {
    pub fn rows_copied(&self, table: &str) -> Option<usize> {
        self.tables_copied
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, rows)| *rows)
    }
}

/// A staged copy that is ready to be read.
#[derive(Debug, Clone)]
pub struct StagedCatalog {
    pub path: PathBuf,
    /// True when this call regenerated the copy.
    pub refreshed: bool,
    /// Present only when the copy was regenerated.
    pub report: Option<ExtractReport>,
}

pub struct StagingExtractor {
    source: PathBuf,
    destination: PathBuf,
}

/// `<dir>/<file name>.extracted.db` next to the catalog.
pub fn staged_path_for(source: &Path) -> PathBuf {
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "catalog".to_string());
    source.with_file_name(format!("{file_name}.extracted.db"))
}

impl StagingExtractor {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let destination = staged_path_for(&source);
        Self {
            source,
            destination,
        }
    }

    pub fn with_destination(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// True when the copy is missing or older than the catalog.
    pub fn needs_refresh(&self) -> Result<bool> {
        let source_meta = fs::metadata(&self.source)
            .map_err(|_| Error::CatalogNotFound(self.source.clone()))?;
        let Ok(dest_meta) = fs::metadata(&self.destination) else {
            return Ok(true);
        };
        Ok(dest_meta.modified()? < source_meta.modified()?)
    }

    /// Regenerate the copy if needed and return where to read from.
    pub fn ensure_fresh(&self) -> Result<StagedCatalog> {
        if self.needs_refresh()? {
            let report = self.extract()?;
            Ok(StagedCatalog {
                path: self.destination.clone(),
                refreshed: true,
                report: Some(report),
            })
        } else {
            debug!(path = %self.destination.display(), "staged catalog is up to date");
            Ok(StagedCatalog {
                path: self.destination.clone(),
                refreshed: false,
                report: None,
            })
        }
    }

    /// Unconditionally rebuild the copy. A failed run leaves no file behind.
    pub fn extract(&self) -> Result<ExtractReport> {
        if !self.source.is_file() {
            return Err(Error::CatalogNotFound(self.source.clone()));
        }

        info!(
            source = %self.source.display(),
            destination = %self.destination.display(),
            "extracting catalog tables"
        );

        if self.destination.exists() {
            fs::remove_file(&self.destination)?;
        }

        match self.copy_tables() {
            Ok(report) => Ok(report),
            Err(err) => {
                if self.destination.exists() {
                    if let Err(cleanup) = fs::remove_file(&self.destination) {
                        warn!(error = %cleanup, "failed to remove incomplete staged catalog");
                    }
                }
                Err(Error::Staging {
                    path: self.source.clone(),
                    message: err.to_string(),
                })
            }
        }
    }

    fn copy_tables(&self) -> Result<ExtractReport> {
        let source = Connection::open_with_flags(
            &self.source,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let mut dest = Connection::open(&self.destination)?;
        let mut tx = dest.transaction()?;
        let mut report = ExtractReport::default();

        for &table in STAGED_TABLES {
            let columns = table_columns(&source, table)?;
            if columns.is_empty() {
                warn!(table, catalog = %self.source.display(), "table not found in catalog, skipping");
                report.tables_missing.push(table.to_string());
                continue;
            }

            // A table that fails halfway is rolled back on its own.
            let savepoint = tx.savepoint()?;
            match copy_table(&source, &savepoint, table, &columns) {
                Ok(rows) => {
                    savepoint.commit()?;
                    debug!(table, rows, "copied table");
                    report.tables_copied.push((table.to_string(), rows));
                }
                Err(err) => {
                    warn!(table, error = %err, "failed to copy table, skipping");
                    report.tables_missing.push(table.to_string());
                }
            }
        }

        tx.commit()?;
        Ok(report)
    }
}

fn copy_table(
    source: &Connection,
    dest: &Connection,
    table: &str,
    columns: &[(String, String)],
) -> Result<usize> {
    let column_defs: Vec<String> = columns
        .iter()
        .map(|(name, ty)| {
            if ty.is_empty() {
                quote_ident(name)
            } else {
                format!("{} {}", quote_ident(name), ty)
            }
        })
        .collect();
    dest.execute(
        &format!("CREATE TABLE {} ({})", quote_ident(table), column_defs.join(", ")),
        [],
    )?;

    let column_list: Vec<String> = columns.iter().map(|(name, _)| quote_ident(name)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();

    let mut read = source.prepare(&format!(
        "SELECT {} FROM {}",
        column_list.join(", "),
        quote_ident(table)
    ))?;
    let mut write = dest.prepare(&format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        column_list.join(", "),
        placeholders.join(", ")
    ))?;

    let mut rows = read.query([])?;
    let mut copied = 0usize;
    while let Some(row) = rows.next()? {
        let values = (0..columns.len())
            .map(|i| row.get::<_, Value>(i))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        write.execute(params_from_iter(values.iter()))?;
        copied += 1;
    }
    Ok(copied)
}
