use anyhow::{Context, Result};
use img_parts::Bytes;
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::archive::{Archiver, NamedBlob};
use crate::config::{Config, ExportConfig};
use crate::error::GeotagError;
use crate::exif::{self, Coordinate, DescriptiveMetadata, GeoPoint};
use crate::preview::{PreviewHandle, PreviewRegistry};

/// Extensions collected when walking a directory.
const JPEG_EXTENSIONS: &[&str] = &["jpg", "jpeg", "jpe", "jfif"];

/// MIME type prefixes accepted at intake.
const JPEG_MIME_PREFIXES: &[&str] = &["image/jpeg", "image/jpg"];

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_LEN: usize = 9;

/// MIME type for a file path, from its extension.
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" | "jpe" | "jfif" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

/// A file offered for intake: its name, MIME type and bytes. Never modified.
#[derive(Debug, Clone)]
pub struct SourceFile {
    name: String,
    mime_type: String,
    data: Bytes,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self { name: name.into(), mime_type: mime_type.into(), data: data.into() }
    }

    /// Read a file from disk. The MIME type comes from the extension.
    pub async fn open(path: &Path) -> Result<Self> {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, mime_type_for(path), data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn is_jpeg(&self) -> bool {
        is_jpeg_mime(&self.mime_type)
    }
}

fn is_jpeg_mime(mime_type: &str) -> bool {
    let mime_type = mime_type.to_ascii_lowercase();
    JPEG_MIME_PREFIXES.iter().any(|p| mime_type.starts_with(p))
}

/// Random 9-character base-36 identifier of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn random() -> Self {
        let mut rng = rand::rng();
        let id = (0..ID_LEN)
            .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One loaded photo and its pending edits.
#[derive(Debug)]
pub struct ImageRecord {
    id: RecordId,
    source: SourceFile,
    preview: PreviewHandle,
    coordinate: Option<Coordinate>,
    /// Set once the coordinate is edited; only then are GPS tags written.
    location_edited: bool,
    metadata: DescriptiveMetadata,
}

impl ImageRecord {
    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    pub fn preview(&self) -> &PreviewHandle {
        &self.preview
    }

    pub fn coordinate(&self) -> Option<&Coordinate> {
        self.coordinate.as_ref()
    }

    pub fn has_location(&self) -> bool {
        self.coordinate.is_some()
    }

    pub fn location_edited(&self) -> bool {
        self.location_edited
    }

    pub fn metadata(&self) -> &DescriptiveMetadata {
        &self.metadata
    }
}

/// Create a record for a file.
///
/// Always succeeds: a file whose EXIF cannot be read still becomes a record,
/// just without a location and with empty metadata.
pub fn intake(source: SourceFile, previews: &mut PreviewRegistry) -> ImageRecord {
    let id = RecordId::random();
    let preview = previews.issue(&source.name);

    let (coordinate, metadata) = match exif::decode(source.data.clone()) {
        Ok(Some(directory)) => (
            exif::extract_coordinate(&directory),
            exif::extract_descriptive(&directory),
        ),
        Ok(None) => {
            log::debug!("{}: no EXIF data", source.name);
            (None, DescriptiveMetadata::default())
        }
        Err(e) => {
            log::warn!("Failed to read EXIF from {}: {e}", source.name);
            (None, DescriptiveMetadata::default())
        }
    };

    log::info!(
        "Loaded {} ({}, {} bytes){}",
        source.name,
        id,
        source.data.len(),
        if coordinate.is_some() { ", has GPS" } else { "" }
    );

    ImageRecord { id, source, preview, coordinate, location_edited: false, metadata }
}

/// Replace a record's location.
pub fn apply_coordinate_edit(record: &mut ImageRecord, coordinate: Coordinate) {
    record.coordinate = Some(coordinate);
    record.location_edited = true;
}

/// Replace a record's descriptive metadata.
pub fn apply_metadata_edit(record: &mut ImageRecord, metadata: DescriptiveMetadata) {
    record.metadata = metadata;
}

/// Give `coordinate` to every record that has no location yet. Returns how
/// many records changed.
pub fn apply_bulk_coordinate<'a>(
    records: impl IntoIterator<Item = &'a mut ImageRecord>,
    coordinate: Coordinate,
) -> usize {
    let mut changed = 0;
    for record in records.into_iter().filter(|r| !r.has_location()) {
        apply_coordinate_edit(record, coordinate);
        changed += 1;
    }
    changed
}

/// Produce the output file of one record.
///
/// Without an edited location or any descriptive text the original bytes are
/// returned as they are.
pub fn export_record(record: &ImageRecord, export: &ExportConfig) -> Result<NamedBlob, GeotagError> {
    let name = export.output_name(&record.source.name);

    if !record.location_edited && record.metadata.is_blank() {
        log::debug!("{}: nothing to write, exporting original", record.source.name);
        return Ok(NamedBlob::new(name, record.source.data.to_vec()));
    }

    let coordinate = if record.location_edited { record.coordinate.as_ref() } else { None };
    let data = exif::write_metadata(&record.source.data, coordinate, &record.metadata).map_err(|source| {
        GeotagError::Export { name: record.source.name.clone(), source }
    })?;

    log::info!("Exported {name} ({} bytes)", data.len());
    Ok(NamedBlob::new(name, data.to_vec()))
}

/// Export every record and pack the results into one archive, entries named
/// after the original files. The first failing record aborts the export.
pub fn export_all<'a>(
    records: impl IntoIterator<Item = &'a ImageRecord>,
    archiver: &dyn Archiver,
    export: &ExportConfig,
) -> Result<NamedBlob, GeotagError> {
    let mut files = Vec::new();
    for record in records {
        let blob = export_record(record, export)?;
        files.push(NamedBlob::new(record.source.name.clone(), blob.data));
    }

    let data = archiver.build(&files).map_err(GeotagError::Archive)?;
    log::info!(
        "Built {} archive {} with {} images ({} bytes)",
        archiver.name(),
        export.archive_name,
        files.len(),
        data.len()
    );
    Ok(NamedBlob::new(export.archive_name.clone(), data))
}

/// A file that could not be read during intake.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadFailure {
    pub path: String,
    pub error: String,
}

/// Outcome of one intake batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntakeReport {
    /// Records created, in batch order.
    pub accepted: Vec<RecordId>,
    /// Files dropped for not being JPEG.
    pub non_jpeg: usize,
    /// JPEG files dropped because the set was full.
    pub over_capacity: usize,
    pub failures: Vec<ReadFailure>,
}

/// The loaded photos, capped at `max_images`.
///
/// # Example
///
/// ```rust
/// use geotagger::config::Config;
/// use geotagger::exif::GeoPoint;
/// use geotagger::pipeline::{ImageSet, SourceFile};
///
/// let mut set = ImageSet::new(&Config::default());
/// let report = set
///     .intake_batch(vec![SourceFile::new("notes.txt", "text/plain", b"hello".to_vec())])
///     .unwrap();
/// assert_eq!(report.non_jpeg, 1);
///
/// // Validation happens before anything is looked up or encoded.
/// let bad = GeoPoint { latitude: 95.0, longitude: 0.0 };
/// assert!(set.set_location(&"missing".into(), bad).is_err());
/// ```
#[derive(Debug)]
pub struct ImageSet {
    max_images: usize,
    export: ExportConfig,
    records: Vec<ImageRecord>,
    previews: PreviewRegistry,
}

impl ImageSet {
    pub fn new(config: &Config) -> Self {
        Self {
            max_images: config.max_images,
            export: config.export.clone(),
            records: Vec::new(),
            previews: PreviewRegistry::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn remaining_capacity(&self) -> usize {
        self.max_images.saturating_sub(self.records.len())
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    pub fn get(&self, id: &RecordId) -> Option<&ImageRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    /// Preview handles issued and not yet released.
    pub fn live_previews(&self) -> usize {
        self.previews.live()
    }

    fn record_mut(&mut self, id: &RecordId) -> Result<&mut ImageRecord, GeotagError> {
        self.records
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| GeotagError::UnknownRecord(id.to_string()))
    }

    /// Only JPEG candidates count; non-JPEG files are dropped before intake.
    fn check_capacity(&self, jpeg_candidates: usize) -> Result<(), GeotagError> {
        if jpeg_candidates > 0 && self.remaining_capacity() == 0 {
            log::warn!("Image set is full ({} images)", self.max_images);
            return Err(GeotagError::CapacityReached(self.max_images));
        }
        Ok(())
    }

    /// Add a record for `file`, giving it an id not used in the set.
    fn admit(&mut self, file: SourceFile) -> RecordId {
        let mut record = intake(file, &mut self.previews);
        while self.get(&record.id).is_some() {
            log::debug!("Id collision on {}, re-rolling", record.id);
            record.id = RecordId::random();
        }
        let id = record.id.clone();
        self.records.push(record);
        id
    }

    fn log_report(report: &IntakeReport) {
        if report.non_jpeg > 0 {
            log::debug!("Dropped {} non-JPEG file(s)", report.non_jpeg);
        }
        if report.over_capacity > 0 {
            log::warn!("Image limit reached, {} file(s) not added", report.over_capacity);
        }
    }

    /// Intake in-memory files in order. Non-JPEG files are dropped; JPEG files
    /// beyond the remaining capacity are dropped.
    pub fn intake_batch(&mut self, files: Vec<SourceFile>) -> Result<IntakeReport, GeotagError> {
        self.check_capacity(files.iter().filter(|f| f.is_jpeg()).count())?;

        let mut report = IntakeReport::default();
        for file in files {
            if !file.is_jpeg() {
                log::debug!("Skipping {} ({})", file.name, file.mime_type);
                report.non_jpeg += 1;
            } else if self.remaining_capacity() == 0 {
                report.over_capacity += 1;
            } else {
                report.accepted.push(self.admit(file));
            }
        }

        Self::log_report(&report);
        Ok(report)
    }

    /// Intake files from disk, read one at a time. A file that cannot be read
    /// is recorded in the report and the batch goes on.
    pub async fn intake_paths(&mut self, paths: &[PathBuf]) -> Result<IntakeReport, GeotagError> {
        self.check_capacity(paths.iter().filter(|p| is_jpeg_mime(mime_type_for(p))).count())?;

        let mut report = IntakeReport::default();
        for path in paths {
            if !is_jpeg_mime(mime_type_for(path)) {
                log::debug!("Skipping {}", path.display());
                report.non_jpeg += 1;
                continue;
            }
            if self.remaining_capacity() == 0 {
                report.over_capacity += 1;
                continue;
            }
            match SourceFile::open(path).await {
                Ok(file) => report.accepted.push(self.admit(file)),
                Err(e) => {
                    log::warn!("{e:#}");
                    report.failures.push(ReadFailure {
                        path: path.display().to_string(),
                        error: format!("{e:#}"),
                    });
                }
            }
        }

        Self::log_report(&report);
        Ok(report)
    }

    /// Set one record's location. The point is validated first.
    pub fn set_location(&mut self, id: &RecordId, point: GeoPoint) -> Result<(), GeotagError> {
        let coordinate = Coordinate::try_from(point)?;
        apply_coordinate_edit(self.record_mut(id)?, coordinate);
        Ok(())
    }

    /// Give `point` to every record without a location.
    pub fn set_location_all(&mut self, point: GeoPoint) -> Result<usize, GeotagError> {
        let coordinate = Coordinate::try_from(point)?;
        let changed = apply_bulk_coordinate(self.records.iter_mut(), coordinate);
        log::info!("Location applied to {changed} image(s)");
        Ok(changed)
    }

    pub fn set_metadata(&mut self, id: &RecordId, metadata: DescriptiveMetadata) -> Result<(), GeotagError> {
        apply_metadata_edit(self.record_mut(id)?, metadata);
        Ok(())
    }

    /// Remove a record and release its preview.
    pub fn remove(&mut self, id: &RecordId) -> Result<(), GeotagError> {
        let pos = self
            .records
            .iter()
            .position(|r| &r.id == id)
            .ok_or_else(|| GeotagError::UnknownRecord(id.to_string()))?;
        let record = self.records.remove(pos);
        self.previews.release(record.preview);
        Ok(())
    }

    /// Remove every record. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let count = self.records.len();
        for record in self.records.drain(..) {
            self.previews.release(record.preview);
        }
        count
    }

    pub fn export(&self, id: &RecordId) -> Result<NamedBlob, GeotagError> {
        let record = self.get(id).ok_or_else(|| GeotagError::UnknownRecord(id.to_string()))?;
        export_record(record, &self.export)
    }

    pub fn export_all(&self, archiver: &dyn Archiver) -> Result<NamedBlob, GeotagError> {
        export_all(&self.records, archiver, &self.export)
    }
}

/// Collect files from the given paths.
///
/// Files given directly are kept whatever their type (intake drops the ones
/// that are not JPEG). Directories are walked recursively (following
/// symlinks) and only JPEG files are taken from them.
pub fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for path in paths {
        if path.is_file() {
            images.push(path.clone());
        } else if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .map(|e| e.into_path())
                .filter(|p| p.is_file() && has_jpeg_extension(p))
                .collect();
            found.sort();
            images.extend(found);
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    images
}

/// Check if a file has a JPEG extension.
fn has_jpeg_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| JPEG_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
