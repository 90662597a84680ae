use serde::{Deserialize, Serialize};

use super::coords::{Coordinate, Dms, LatitudeRef, LongitudeRef, Rational, dms_to_decimal};
use super::directory::{ExifDirectory, Ifd, Tag, TagValue};
use super::text::{decode_ascii_text, decode_wide_text};

/// Keywords convention some tools use in the Software tag.
const KEYWORDS_PREFIX: &str = "Keywords:";

/// The five user-facing descriptive fields.
///
/// `None` means "not present" when read and "leave alone" when written. A
/// blank string is treated like `None` on write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptiveMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub artist: Option<String>,
    pub copyright: Option<String>,
    pub keywords: Option<String>,
}

impl DescriptiveMetadata {
    /// True when no field holds non-whitespace text.
    pub fn is_blank(&self) -> bool {
        self.fields().iter().all(|f| non_blank(f).is_none())
    }

    /// Copy with every field trimmed and blank fields turned into `None`.
    pub fn normalized(&self) -> Self {
        Self {
            title: non_blank(&self.title),
            description: non_blank(&self.description),
            artist: non_blank(&self.artist),
            copyright: non_blank(&self.copyright),
            keywords: non_blank(&self.keywords),
        }
    }

    fn fields(&self) -> [&Option<String>; 5] {
        [&self.title, &self.description, &self.artist, &self.copyright, &self.keywords]
    }
}

fn non_blank(field: &Option<String>) -> Option<String> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Read the GPS position of a directory.
///
/// All four of latitude, latitude ref, longitude and longitude ref must be
/// present and readable, and the result must be a valid coordinate.
pub fn extract_coordinate(directory: &ExifDirectory) -> Option<Coordinate> {
    let gps = directory.gps();

    let lat_ref = reference_char(gps.get(Tag::GpsLatitudeRef)?)?;
    let lon_ref = reference_char(gps.get(Tag::GpsLongitudeRef)?)?;
    LatitudeRef::from_char(lat_ref)?;
    LongitudeRef::from_char(lon_ref)?;

    let latitude = dms_to_decimal(&dms_triplet(gps.get(Tag::GpsLatitude)?)?, lat_ref)?;
    let longitude = dms_to_decimal(&dms_triplet(gps.get(Tag::GpsLongitude)?)?, lon_ref)?;

    match Coordinate::new(latitude, longitude) {
        Ok(coordinate) => Some(coordinate),
        Err(e) => {
            log::debug!("Ignoring GPS position: {e}");
            None
        }
    }
}

/// Read the descriptive fields, preferring the Windows XP tags over the
/// older ASCII ones.
pub fn extract_descriptive(directory: &ExifDirectory) -> DescriptiveMetadata {
    let ifd = directory.primary();

    let keywords = wide_field(ifd, Tag::XpKeywords).or_else(|| {
        ascii_field(ifd, Tag::Software)
            .and_then(|s| s.strip_prefix(KEYWORDS_PREFIX).map(|rest| rest.trim().to_string()))
            .filter(|s| !s.is_empty())
    });

    DescriptiveMetadata {
        title: wide_field(ifd, Tag::XpTitle).or_else(|| ascii_field(ifd, Tag::DocumentName)),
        description: wide_field(ifd, Tag::XpSubject).or_else(|| ascii_field(ifd, Tag::ImageDescription)),
        artist: wide_field(ifd, Tag::XpAuthor).or_else(|| ascii_field(ifd, Tag::Artist)),
        copyright: ascii_field(ifd, Tag::Copyright),
        keywords,
    }
}

fn trimmed(s: String) -> Option<String> {
    let t = s.trim();
    if t.is_empty() { None } else { Some(t.to_string()) }
}

fn wide_field(ifd: &Ifd, tag: Tag) -> Option<String> {
    match ifd.get(tag)? {
        TagValue::Bytes(bytes) => trimmed(decode_wide_text(bytes)),
        other => {
            log::debug!("Tag {:#06x} holds {} data, expected bytes", tag.id(), other.kind_name());
            None
        }
    }
}

fn ascii_field(ifd: &Ifd, tag: Tag) -> Option<String> {
    match ifd.get(tag)? {
        TagValue::Text(s) => trimmed(s.clone()),
        // Some writers store these as UNDEFINED
        TagValue::Bytes(bytes) => trimmed(decode_ascii_text(bytes)),
        _ => None,
    }
}

fn reference_char(value: &TagValue) -> Option<char> {
    match value {
        TagValue::Text(s) => s.trim().chars().next(),
        TagValue::Bytes(b) => b.first().map(|&c| c as char),
        _ => None,
    }
}

fn dms_triplet(value: &TagValue) -> Option<Dms> {
    match value {
        TagValue::Rational(parts) => {
            let parts: [Rational; 3] = parts.as_slice().try_into().ok()?;
            Some(Dms::Rational(parts))
        }
        TagValue::Float(parts) => {
            let parts: [f64; 3] = parts.as_slice().try_into().ok()?;
            Some(Dms::Plain(parts))
        }
        _ => None,
    }
}
