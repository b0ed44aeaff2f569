use std::path::Path;

use anyhow::{bail, Result};
use photon_core::culling::{OverlayStore, SqliteOverlayStore};
use photon_core::domain::{PhotoId, PickFlag};
use photon_core::CatalogModel;

use super::culling_store_path;

/// Requested edits. Flag options are mutually exclusive at the argument
/// level.
#[derive(Debug, Default)]
pub struct Change {
    pub rating: Option<u8>,
    pub pick: bool,
    pub reject: bool,
    pub clear: bool,
    pub label: Option<String>,
}

impl Change {
    fn is_empty(&self) -> bool {
        self.rating.is_none() && !self.pick && !self.reject && !self.clear && self.label.is_none()
    }
}

pub fn run(model: &mut CatalogModel, catalog: &Path, id: &str, change: Change) -> Result<()> {
    if change.is_empty() {
        bail!("nothing to change; pass --rating, --pick, --reject, --clear or --label");
    }

    let id = PhotoId::from(id);
    apply(model, &id, change)?;

    let Some(photo) = model.photo(&id) else {
        bail!("photo not found: {id}");
    };
    let store = SqliteOverlayStore::open(&culling_store_path(catalog))?;
    store.upsert(&id, &photo.cull)?;

    let flag = match photo.cull.flag {
        PickFlag::Picked => "picked",
        PickFlag::Rejected => "rejected",
        PickFlag::Unflagged => "unflagged",
    };
    println!(
        "{} ({}): rating {}, {}, label {:?}",
        photo.file_name, id, photo.cull.rating, flag, photo.cull.color_label
    );
    Ok(())
}

fn apply(model: &mut CatalogModel, id: &PhotoId, change: Change) -> Result<()> {
    if let Some(rating) = change.rating {
        model.set_rating(id, rating)?;
    }
    if change.pick {
        model.pick(id)?;
    } else if change.reject {
        model.reject(id)?;
    } else if change.clear {
        model.clear_flag(id)?;
    }
    if let Some(label) = change.label {
        model.set_color_label(id, label)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_change_is_detected() {
        assert!(Change::default().is_empty());
        assert!(!Change {
            clear: true,
            ..Default::default()
        }
        .is_empty());
    }
}
