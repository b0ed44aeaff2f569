mod commands;

use std::path::PathBuf;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{ArgAction, ArgGroup, Parser, Subcommand};
use photon_core::LoadOptions;
use tracing_subscriber::EnvFilter;

/// photon: browse and cull Lightroom catalogs
#[derive(Parser)]
#[command(name = "photon", version, about)]
struct Cli {
    /// Thumbnail cache directory (defaults to the platform cache directory)
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,

    /// Read the catalog itself instead of a private staged copy
    #[arg(long, global = true)]
    no_staging: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to the catalog (*.lrcat)
    catalog: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show catalog facts, load warnings and the folder tree
    Info,
    /// List photos, optionally filtered
    #[command(group(ArgGroup::new("flag").args(["picked", "unpicked"])))]
    Ls {
        /// Only photos in this folder and below
        #[arg(long)]
        folder: Option<String>,
        /// Only this file format (extension)
        #[arg(long)]
        format: Option<String>,
        /// Minimum star rating (0-5)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=5))]
        min_rating: Option<u8>,
        /// Only picked photos
        #[arg(long)]
        picked: bool,
        /// Only photos that are not picked
        #[arg(long)]
        unpicked: bool,
        /// Captured on or after this day (YYYY-MM-DD)
        #[arg(long, value_parser = parse_day)]
        from: Option<NaiveDate>,
        /// Captured on or before this day (YYYY-MM-DD)
        #[arg(long, value_parser = parse_day)]
        to: Option<NaiveDate>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Search file names, paths and keywords
    Search {
        term: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Generate thumbnails for every photo
    Thumbs {
        /// Bounding box edge in pixels
        #[arg(long, default_value_t = 256)]
        size: u32,
        /// Worker threads (defaults to one per core)
        #[arg(long)]
        threads: Option<usize>,
        /// Only photos in this folder and below
        #[arg(long)]
        folder: Option<String>,
    },
    /// Change the rating, flag or label of a photo
    #[command(group(ArgGroup::new("flag").args(["pick", "reject", "clear"])))]
    Cull {
        /// Photo id
        id: String,
        /// Star rating (0-5)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=5))]
        rating: Option<u8>,
        #[arg(long)]
        pick: bool,
        #[arg(long)]
        reject: bool,
        /// Remove the pick or reject flag
        #[arg(long)]
        clear: bool,
        /// Color label
        #[arg(long)]
        label: Option<String>,
    },
    /// Write kept and rejected file names to session-summary.json
    Export {
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
    },
}

fn parse_day(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = LoadOptions {
        use_staging: !cli.no_staging,
        ..LoadOptions::default()
    };
    let mut model = commands::load_model(&cli.catalog, options)?;

    match cli.command {
        Commands::Info => commands::info::run(&model)?,
        Commands::Ls {
            folder,
            format,
            min_rating,
            picked,
            unpicked,
            from,
            to,
            json,
        } => {
            let filter = commands::ls::build_filter(format, min_rating, picked, unpicked, from, to);
            commands::ls::run(&model, folder.as_deref(), &filter, json)?
        }
        Commands::Search { term, json } => commands::ls::search(&model, &term, json)?,
        Commands::Thumbs {
            size,
            threads,
            folder,
        } => commands::thumbs::run(&model, cli.cache_dir, size, threads, folder.as_deref())?,
        Commands::Cull {
            id,
            rating,
            pick,
            reject,
            clear,
            label,
        } => {
            let change = commands::cull::Change {
                rating,
                pick,
                reject,
                clear,
                label,
            };
            commands::cull::run(&mut model, &cli.catalog, &id, change)?
        }
        Commands::Export { output_dir } => commands::export::run(&model, &output_dir)?,
    }

    Ok(())
}
