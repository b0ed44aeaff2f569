use std::collections::HashMap;
use std::path::Path;

use rusqlite::{params, params_from_iter, Connection};

use crate::domain::{CullState, PhotoId};
use crate::error::Result;

/// Ids bound per `IN (...)` query, well under SQLite's parameter limit.
const LOAD_CHUNK: usize = 500;

/// Persistent culling decisions keyed by photo id. Both operations are
/// idempotent.
pub trait OverlayStore {
    /// Stored overlays for the given ids. Ids with nothing stored are absent
    /// from the result.
    fn load(&self, ids: &[PhotoId]) -> Result<HashMap<PhotoId, CullState>>;

    fn upsert(&self, id: &PhotoId, cull: &CullState) -> Result<()>;
}

/// Overlay store in its own SQLite file, separate from the catalog.
pub struct SqliteOverlayStore {
    conn: Connection,
}

impl SqliteOverlayStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS culling_data (
                photo_id    TEXT PRIMARY KEY,
                rating      INTEGER NOT NULL DEFAULT 0,
                is_picked   INTEGER NOT NULL DEFAULT 0,
                is_rejected INTEGER NOT NULL DEFAULT 0,
                color_label TEXT NOT NULL DEFAULT ''
            );",
        )?;
        Ok(Self { conn })
    }
}

impl OverlayStore for SqliteOverlayStore {
    fn load(&self, ids: &[PhotoId]) -> Result<HashMap<PhotoId, CullState>> {
        let mut out = HashMap::new();
        for chunk in ids.chunks(LOAD_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = self.conn.prepare(&format!(
                "SELECT photo_id, rating, is_picked, is_rejected, color_label
                 FROM culling_data WHERE photo_id IN ({placeholders})"
            ))?;
            let rows = stmt.query_map(params_from_iter(chunk.iter().map(PhotoId::as_str)), |row| {
                let rating: i64 = row.get("rating")?;
                Ok((
                    PhotoId::new(row.get::<_, String>("photo_id")?),
                    CullState::from_flags(
                        rating.clamp(0, CullState::MAX_RATING as i64) as u8,
                        row.get::<_, i64>("is_picked")? != 0,
                        row.get::<_, i64>("is_rejected")? != 0,
                        row.get::<_, Option<String>>("color_label")?.unwrap_or_default(),
                    ),
                ))
            })?;
            for row in rows {
                let (id, cull) = row?;
                out.insert(id, cull);
            }
        }
        Ok(out)
    }

    fn upsert(&self, id: &PhotoId, cull: &CullState) -> Result<()> {
        self.conn.execute(
            "INSERT INTO culling_data (photo_id, rating, is_picked, is_rejected, color_label)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(photo_id) DO UPDATE SET
                rating = excluded.rating,
                is_picked = excluded.is_picked,
                is_rejected = excluded.is_rejected,
                color_label = excluded.color_label",
            params![
                id.as_str(),
                cull.rating as i64,
                cull.is_picked(),
                cull.is_rejected(),
                cull.color_label
            ],
        )?;
        Ok(())
    }
}
