//! # geotagger
//!
//! Edit the GPS location and descriptive EXIF metadata (title, description,
//! artist, copyright, keywords) of JPEG photos, then export them singly or as
//! a ZIP archive. Only the EXIF segment is rewritten; every other byte of the
//! file, including the compressed image data, is carried over unchanged.
//!
//! ## Quick Start
//!
//! The [`pipeline::ImageSet`] handles the whole flow: intake → edit → export.
//!
//! ```rust,no_run
//! use geotagger::archive::ZipArchiver;
//! use geotagger::config::Config;
//! use geotagger::exif::{DescriptiveMetadata, GeoPoint};
//! use geotagger::pipeline::{ImageSet, collect_images};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!     let mut set = ImageSet::new(&config);
//!
//!     // Collect JPEG files from paths (files or directories)
//!     let paths = collect_images(&[PathBuf::from("./photos")]);
//!     let report = set.intake_paths(&paths).await?;
//!
//!     // Place every photo that has no location yet
//!     set.set_location_all(GeoPoint { latitude: 40.4417, longitude: -80.0128 })?;
//!
//!     if let Some(id) = report.accepted.first() {
//!         let metadata = DescriptiveMetadata {
//!             title: Some("Point State Park".into()),
//!             ..Default::default()
//!         };
//!         set.set_metadata(id, metadata)?;
//!     }
//!
//!     let archive = set.export_all(&ZipArchiver)?;
//!     std::fs::write(&archive.name, &archive.data)?;
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! The EXIF codec can be used on its own:
//!
//! ```rust,no_run
//! use geotagger::Bytes;
//! use geotagger::exif::{self, Coordinate, DescriptiveMetadata};
//!
//! # fn main() -> anyhow::Result<()> {
//! let original = Bytes::from(std::fs::read("photo.jpg")?);
//!
//! // 1. Read what is already there
//! if let Some(directory) = exif::decode(original.clone())? {
//!     println!("Location: {:?}", exif::extract_coordinate(&directory));
//!     println!("Artist: {:?}", exif::extract_descriptive(&directory).artist);
//! }
//!
//! // 2. Write a new location, leaving the descriptive tags alone
//! let coordinate = Coordinate::new(40.446193, -79.982170)?;
//! let updated = exif::write_metadata(&original, Some(&coordinate), &DescriptiveMetadata::default())?;
//! std::fs::write("photo-tagged.jpg", &updated)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`exif`] — EXIF decoding, encoding and extraction
//! - [`pipeline`] — Image records, the image set, intake and export
//! - [`archive`] — Archive builder trait and ZIP implementation
//! - [`geocode`] — Place search trait and Nominatim implementation
//! - [`preview`] — Preview handles of loaded images
//! - [`config`] — Configuration types and loading/saving
//! - [`error`] — The crate error type

pub mod archive;
pub mod config;
pub mod error;
pub mod exif;
pub mod geocode;
pub mod pipeline;
pub mod preview;

pub use error::GeotagError;
pub use img_parts::Bytes;
