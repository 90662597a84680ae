use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// A named in-memory file: one exported image, or a finished archive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedBlob {
    pub name: String,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl NamedBlob {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self { name: name.into(), data }
    }
}

/// Packs named files into a single archive.
///
/// The pipeline treats failures as opaque and reports them once.
pub trait Archiver: Send + Sync {
    /// The display name of this archiver (e.g., "zip").
    fn name(&self) -> &str;
    /// Build the archive bytes from `files`, in order.
    fn build(&self, files: &[NamedBlob]) -> Result<Vec<u8>>;
}

/// ZIP archives with deflate compression.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipArchiver;

impl Archiver for ZipArchiver {
    fn name(&self) -> &str {
        "zip"
    }

    fn build(&self, files: &[NamedBlob]) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let names = unique_names(files.iter().map(|f| f.name.as_str()));
        for (file, name) in files.iter().zip(&names) {
            writer
                .start_file(name.as_str(), options)
                .with_context(|| format!("Failed to add {name} to archive"))?;
            writer
                .write_all(&file.data)
                .with_context(|| format!("Failed to write {name} into archive"))?;
            log::debug!("  Archived {name} ({} bytes)", file.data.len());
        }

        let cursor = writer.finish().context("Failed to finish archive")?;
        Ok(cursor.into_inner())
    }
}

/// Make entry names unique: a repeated `name.jpg` becomes `name (2).jpg`,
/// `name (3).jpg`, and so on.
pub fn unique_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut taken = HashSet::new();
    let mut out = Vec::new();

    for name in names {
        let mut candidate = name.to_string();
        let mut n = 2;
        while !taken.insert(candidate.clone()) {
            candidate = numbered(name, n);
            n += 1;
        }
        out.push(candidate);
    }

    out
}

fn numbered(name: &str, n: usize) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({n}).{ext}"),
        _ => format!("{name} ({n})"),
    }
}
