use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use photon_core::domain::PhotoRecord;
use photon_core::CatalogModel;
use serde::Serialize;

pub const SUMMARY_FILE: &str = "session-summary.json";

#[derive(Debug, Serialize)]
struct SessionSummary {
    catalog: String,
    exported_at: DateTime<Utc>,
    kept: Vec<String>,
    rejected: Vec<String>,
}

fn leaf_name(photo: &PhotoRecord) -> String {
    photo
        .file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| photo.file_name.clone())
}

fn summarize(model: &CatalogModel) -> SessionSummary {
    let pick = |keep: fn(&PhotoRecord) -> bool| -> Vec<String> {
        model
            .photos()
            .iter()
            .filter(|p| keep(p))
            .map(leaf_name)
            .collect()
    };
    SessionSummary {
        catalog: model.info().name.clone(),
        exported_at: Utc::now(),
        kept: pick(PhotoRecord::is_picked),
        rejected: pick(PhotoRecord::is_rejected),
    }
}

pub fn run(model: &CatalogModel, output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("cannot create {}", output_dir.display()))?;

    let summary = summarize(model);
    let path = output_dir.join(SUMMARY_FILE);
    fs::write(&path, serde_json::to_string_pretty(&summary)?)
        .with_context(|| format!("cannot write {}", path.display()))?;

    println!(
        "Exported session summary to {} ({} kept, {} rejected)",
        path.display(),
        summary.kept.len(),
        summary.rejected.len()
    );
    Ok(())
}
