use thiserror::Error;

use crate::exif::{DecodeError, EncodeError};

/// The primary error type for the geotagger crate.
#[derive(Error, Debug)]
pub enum GeotagError {
    // --- Validation ---
    #[error("Latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),

    #[error("Longitude {0} is outside [-180, 180]")]
    InvalidLongitude(f64),

    #[error("Angle {0} cannot be expressed as degrees/minutes/seconds")]
    AngleOutOfRange(f64),

    // --- Codec ---
    #[error("EXIF decoding failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("EXIF encoding failed: {0}")]
    Encode(#[from] EncodeError),

    // --- Pipeline ---
    #[error("Failed to export {name}: {source}")]
    Export {
        name: String,
        #[source]
        source: EncodeError,
    },

    #[error("Failed to build archive: {0:#}")]
    Archive(anyhow::Error),

    #[error("Image set is full ({0} images)")]
    CapacityReached(usize),

    #[error("No image with id {0}")]
    UnknownRecord(String),
}
