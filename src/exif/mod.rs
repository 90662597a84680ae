//! EXIF reading and writing for JPEG files.
//!
//! Only the primary directory (IFD0) and the GPS directory are decoded. The
//! writer re-encodes those two and carries everything else over untouched:
//!
//! - [`decode`] — JPEG bytes to an [`ExifDirectory`] (or `None` without EXIF)
//! - [`encode`] — splice a directory back into the original JPEG
//! - [`write_metadata`] — decode, apply a [`Coordinate`] and
//!   [`DescriptiveMetadata`], encode
//! - [`extract_coordinate`] / [`extract_descriptive`] — the values the rest
//!   of the crate works with

mod coords;
mod directory;
mod extract;
mod reader;
mod text;
mod writer;

#[cfg(test)]
pub(crate) mod test_support;

pub use coords::{
    Coordinate, Dms, GeoPoint, LatitudeRef, LongitudeRef, Rational, SECONDS_DENOMINATOR, decimal_to_dms,
    dms_to_decimal,
};
pub use directory::{ByteOrder, ExifDirectory, Ifd, IfdKind, Tag, TagValue};
pub use extract::{DescriptiveMetadata, extract_coordinate, extract_descriptive};
pub use reader::{DecodeError, decode, parse_tiff};
pub use text::{decode_ascii_text, decode_wide_text, encode_ascii_text, encode_wide_text};
pub use writer::{EncodeError, MAX_SEGMENT_CONTENTS, apply_coordinate, apply_descriptive, encode, write_metadata};
