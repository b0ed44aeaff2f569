use anyhow::Result;
use chrono::NaiveDate;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use photon_core::domain::{PhotoRecord, PickFlag};
use photon_core::{CatalogModel, PhotoFilter};

use super::{format_size, scoped_photos};

pub fn build_filter(
    format: Option<String>,
    min_rating: Option<u8>,
    picked: bool,
    unpicked: bool,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> PhotoFilter {
    let picked = match (picked, unpicked) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    };
    PhotoFilter {
        format,
        min_rating,
        picked,
        captured_from: from.and_then(|d| d.and_hms_opt(0, 0, 0)),
        captured_to: to.and_then(|d| d.and_hms_milli_opt(23, 59, 59, 999)),
    }
}

pub fn run(model: &CatalogModel, folder: Option<&str>, filter: &PhotoFilter, json: bool) -> Result<()> {
    let photos: Vec<&PhotoRecord> = scoped_photos(model, folder)?
        .into_iter()
        .filter(|p| filter.matches(p))
        .collect();
    print_photos(&photos, json)
}

pub fn search(model: &CatalogModel, term: &str, json: bool) -> Result<()> {
    let photos = model.search(term);
    if photos.is_empty() && !json {
        println!("No photos match \"{term}\".");
        return Ok(());
    }
    print_photos(&photos, json)
}

fn print_photos(photos: &[&PhotoRecord], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(photos)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID"),
        Cell::new("File"),
        Cell::new("Fmt"),
        Cell::new("Captured"),
        Cell::new("Size"),
        Cell::new("Rating"),
        Cell::new("Flag"),
    ]);

    for photo in photos {
        let captured = photo
            .captured
            .map(|c| c.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let flag = match photo.cull.flag {
            PickFlag::Picked => Cell::new("picked").fg(Color::Green),
            PickFlag::Rejected => Cell::new("rejected").fg(Color::Red),
            PickFlag::Unflagged => Cell::new(""),
        };
        table.add_row(vec![
            Cell::new(photo.id.as_str()),
            Cell::new(photo.file_path.display()),
            Cell::new(&photo.file_format),
            Cell::new(captured),
            Cell::new(format_size(photo.file_size)),
            Cell::new("*".repeat(photo.rating() as usize)),
            flag,
        ]);
    }

    println!("{table}");
    println!("  {} photos", photos.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_flags_and_days() {
        let day = NaiveDate::from_ymd_opt(2024, 2, 3);
        let filter = build_filter(Some("jpg".into()), Some(3), false, true, day, day);

        assert_eq!(filter.picked, Some(false));
        assert_eq!(filter.min_rating, Some(3));
        assert_eq!(
            filter.captured_from.map(|d| d.to_string()).as_deref(),
            Some("2024-02-03 00:00:00")
        );
        assert_eq!(
            filter.captured_to.map(|d| d.to_string()).as_deref(),
            Some("2024-02-03 23:59:59.999")
        );

        let open = build_filter(None, None, false, false, None, None);
        assert_eq!(open, PhotoFilter::default());
    }
}
