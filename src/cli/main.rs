use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};

use geotagger::archive::{NamedBlob, ZipArchiver};
use geotagger::exif::{DescriptiveMetadata, GeoPoint};
use geotagger::pipeline::{ImageRecord, ImageSet};
use geotagger::{config, geocode, pipeline};

#[derive(Parser, Debug)]
#[command(
    name = "geotagger",
    version,
    about = "Edit GPS location and descriptive EXIF metadata of JPEG photos without touching image data"
)]
struct Cli {
    /// JPEG files or directories to process
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Display location and descriptive metadata and exit
    #[arg(long)]
    show: bool,

    /// Latitude in decimal degrees (with --lon)
    #[arg(long, allow_hyphen_values = true, requires = "lon")]
    lat: Option<f64>,

    /// Longitude in decimal degrees (with --lat)
    #[arg(long, allow_hyphen_values = true, requires = "lat")]
    lon: Option<f64>,

    /// Look the location up by place name instead of --lat/--lon
    #[arg(long, value_name = "QUERY", conflicts_with_all = ["lat", "lon"])]
    place: Option<String>,

    /// Only give the location to images that have none
    #[arg(long)]
    only_missing: bool,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    description: Option<String>,

    #[arg(long)]
    artist: Option<String>,

    #[arg(long)]
    copyright: Option<String>,

    #[arg(long)]
    keywords: Option<String>,

    /// Directory exported files are written to
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    output: PathBuf,

    /// Write one ZIP archive instead of individual files
    #[arg(long)]
    zip: bool,

    /// Preview changes without writing any file
    #[arg(long)]
    dry_run: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// The descriptive fields given on the command line.
    fn metadata_edit(&self) -> DescriptiveMetadata {
        DescriptiveMetadata {
            title: self.title.clone(),
            description: self.description.clone(),
            artist: self.artist.clone(),
            copyright: self.copyright.clone(),
            keywords: self.keywords.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }

    let config = config::Config::load(cli.config.as_deref())?;

    // Collect images
    let images = pipeline::collect_images(&cli.paths);
    if images.is_empty() {
        anyhow::bail!("No JPEG files found in the specified paths.");
    }

    let mut set = ImageSet::new(&config);
    let report = set.intake_paths(&images).await?;
    for failure in &report.failures {
        log::error!("  {}: {}", failure.path, failure.error);
    }
    if set.is_empty() {
        anyhow::bail!("No JPEG images could be loaded.");
    }
    log::info!("Loaded {} of {} file(s)", set.len(), images.len());

    // Handle --show
    if cli.show {
        if cli.json {
            let rows: Vec<serde_json::Value> = set.records().iter().map(record_json).collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        } else {
            for record in set.records() {
                print_record(record);
            }
        }
        return Ok(());
    }

    // Location edit
    let point = match (&cli.place, cli.lat, cli.lon) {
        (Some(query), _, _) => Some(lookup_place(&config, query).await?),
        (None, Some(latitude), Some(longitude)) => Some(GeoPoint { latitude, longitude }),
        _ => None,
    };
    if let Some(point) = point {
        if cli.only_missing {
            set.set_location_all(point)?;
        } else {
            let ids: Vec<_> = set.records().iter().map(|r| r.id().clone()).collect();
            for id in &ids {
                set.set_location(id, point)?;
            }
            log::info!("Location applied to {} image(s)", ids.len());
        }
    }

    // Descriptive edit: given flags replace, the rest is kept
    let edit = cli.metadata_edit();
    if edit != DescriptiveMetadata::default() {
        let ids: Vec<_> = set.records().iter().map(|r| r.id().clone()).collect();
        for id in &ids {
            let Some(record) = set.get(id) else { continue };
            let current = record.metadata().clone();
            let merged = DescriptiveMetadata {
                title: edit.title.clone().or(current.title),
                description: edit.description.clone().or(current.description),
                artist: edit.artist.clone().or(current.artist),
                copyright: edit.copyright.clone().or(current.copyright),
                keywords: edit.keywords.clone().or(current.keywords),
            };
            set.set_metadata(id, merged)?;
        }
    }

    if cli.dry_run {
        log::info!("DRY RUN — no files will be written");
        println!();
        println!("  {BOLD}Pending changes:{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(72));
        for record in set.records() {
            print_record(record);
        }
        return Ok(());
    }

    // Export
    let mut written = Vec::new();
    if cli.zip {
        let archive = set.export_all(&ZipArchiver)?;
        written.push(write_blob(&cli.output, &archive)?);
    } else {
        let ids: Vec<_> = set.records().iter().map(|r| r.id().clone()).collect();
        for id in &ids {
            match set.export(id) {
                Ok(blob) => written.push(write_blob(&cli.output, &blob)?),
                Err(e) => log::error!("  {e}"),
            }
        }
    }

    // JSON output
    if cli.json {
        let json = serde_json::json!({
            "intake": report,
            "records": set.records().iter().map(record_json).collect::<Vec<_>>(),
            "written": written.iter().map(|p| p.display().to_string()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    }

    // Summary
    log::info!("Done: {} file(s) written to {}", written.len(), cli.output.display());

    Ok(())
}

async fn lookup_place(config: &config::Config, query: &str) -> Result<GeoPoint> {
    let search = geocode::build_place_search(config)
        .context("Place search is disabled. Enable \"geocoder\" in config.json or use --lat/--lon.")?;
    log::info!("Searching {} for {query:?}", search.name());
    let point = search
        .search(query)
        .await?
        .with_context(|| format!("No place found for {query:?}"))?;
    log::info!("  Found {:.6}, {:.6}", point.latitude, point.longitude);
    Ok(point)
}

fn write_blob(dir: &Path, blob: &NamedBlob) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(&blob.name);
    std::fs::write(&path, &blob.data).with_context(|| format!("Failed to write {}", path.display()))?;
    log::info!("  Wrote {}", path.display());
    Ok(path)
}

fn record_json(record: &ImageRecord) -> serde_json::Value {
    serde_json::json!({
        "id": record.id(),
        "name": record.source().name(),
        "preview": record.preview().url(),
        "location": record.coordinate(),
        "location_edited": record.location_edited(),
        "metadata": record.metadata(),
    })
}

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Max width for the value column before wrapping.
const VAL_WIDTH: usize = 46;
/// Indent for continuation lines (tag column width + " : " = 25 chars + 2 leading spaces).
const INDENT: &str = "                           ";

/// Print location and descriptive metadata of one record.
fn print_record(record: &ImageRecord) {
    println!();
    println!("{BOLD}File:{RESET} {} {DIM}({}){RESET}", record.source().name(), record.id());
    println!("{DIM}{}{RESET}", "═".repeat(72));

    println!("  {BOLD}GPS{RESET}");
    println!("  {DIM}{}{RESET}", "─".repeat(70));
    match record.coordinate() {
        Some(c) => {
            let lat = format!("{:.6} {}", c.latitude(), c.latitude_ref().as_char());
            let lon = format!("{:.6} {}", c.longitude(), c.longitude_ref().as_char());
            if record.location_edited() {
                print_new("GPSLatitude", &lat);
                print_new("GPSLongitude", &lon);
            } else {
                print_row("GPSLatitude", &lat);
                print_row("GPSLongitude", &lon);
            }
        }
        None => println!("  {DIM}(no location){RESET}"),
    }
    println!();

    let meta = record.metadata();
    let desc_fields: Vec<(&str, Option<&str>)> = vec![
        ("Title", meta.title.as_deref()),
        ("Description", meta.description.as_deref()),
        ("Artist", meta.artist.as_deref()),
        ("Copyright", meta.copyright.as_deref()),
        ("Keywords", meta.keywords.as_deref()),
    ];
    println!("  {BOLD}Descriptive Metadata{RESET}");
    println!("  {DIM}{}{RESET}", "─".repeat(70));
    if desc_fields.iter().all(|(_, v)| v.is_none()) {
        println!("  {DIM}(none){RESET}");
    }
    for (tag, val) in &desc_fields {
        if let Some(v) = val {
            print_row(tag, v);
        }
    }
    println!();
}

/// Print a value that will be written (green with *).
fn print_new(tag: &str, val: &str) {
    let tag_col = format!("{:<22}", tag);
    println!("  {GREEN}{tag_col} : {val} *{RESET}");
}

/// Print a single row in the display table.
fn print_row(tag: &str, val: &str) {
    let tag_col = format!("{:<22}", tag);
    let lines = wrap_text(val, VAL_WIDTH);
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            println!("  {tag_col} : {line}");
        } else {
            println!("  {INDENT}{line}");
        }
    }
}

/// Wrap text at word boundaries to fit within max_width.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in s.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(s.to_string());
    }

    lines
}
