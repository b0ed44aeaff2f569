use anyhow::Result;
use photon_core::domain::FolderNode;
use photon_core::CatalogModel;

use super::format_size;

pub fn run(model: &CatalogModel) -> Result<()> {
    let info = model.info();

    println!();
    println!("  {}", info.name);
    println!("  {}", "-".repeat(info.name.chars().count().max(8)));
    println!("  Path:          {}", info.path.display());
    println!("  Version:       {}", info.version);
    println!(
        "  Last modified: {}",
        info.last_modified.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("  Folders:       {}", model.total_folder_count());
    println!("  Photos:        {}", model.total_photo_count());
    println!("  Total size:    {}", format_size(model.total_file_size()));

    if !model.warnings().is_empty() {
        println!();
        println!("  Warnings");
        println!("  --------");
        for warning in model.warnings() {
            println!("  ! {warning}");
        }
    }

    println!();
    println!("  Folders");
    println!("  -------");
    for root in model.root_folders() {
        print_folder(model, root, 1);
    }
    println!();

    Ok(())
}

fn print_folder(model: &CatalogModel, folder: &FolderNode, depth: usize) {
    let name = if folder.name.is_empty() {
        folder.full_path.display().to_string()
    } else {
        folder.name.clone()
    };
    println!(
        "{}{} ({})",
        "  ".repeat(depth),
        name,
        model.folders().total_photo_count(&folder.id)
    );
    for child in model.folders().children(&folder.id) {
        print_folder(model, child, depth + 1);
    }
}
