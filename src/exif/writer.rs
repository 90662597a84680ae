use std::ops::Range;

use img_parts::Bytes;
use img_parts::jpeg::{Jpeg, JpegSegment};
use thiserror::Error;

use super::coords::{Coordinate, decimal_to_dms};
use super::directory::*;
use super::extract::DescriptiveMetadata;
use super::reader::{APP1, DecodeError, EXIF_PREFIX, decode, find_exif_segment_pos, is_exif_segment};
use super::text::{encode_ascii_text, encode_wide_text};

const APP0: u8 = 0xE0;
const TIFF_HEADER_LEN: usize = 8;

/// Largest APP1 payload: the 16-bit segment length also counts its own two
/// bytes.
pub const MAX_SEGMENT_CONTENTS: usize = u16::MAX as usize - 2;

/// GPS tag version written when a file has none (2.3.0.0).
const GPS_VERSION: [u8; 4] = [2, 3, 0, 0];

/// Why a directory could not be written back into a JPEG.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
    #[error("tag {tag:#06x} holds a {kind} value, which cannot be written")]
    UnsupportedValue { tag: u16, kind: &'static str },

    #[error("EXIF segment would be {0} bytes, over the JPEG segment limit")]
    SegmentTooLarge(usize),

    #[error("directory has {0} entries, more than an IFD can hold")]
    TooManyEntries(usize),

    #[error("coordinate {0} cannot be encoded")]
    InvalidCoordinate(f64),

    #[error("original image is not a readable JPEG: {0}")]
    Container(String),

    #[error("existing EXIF data is unreadable: {0}")]
    Unreadable(#[from] DecodeError),
}

/// Decode the EXIF of `original` (or start from nothing), apply the edits and
/// splice the result back in.
///
/// Fields of `metadata` that are absent or blank are not written; existing
/// values for them stay as they are. `coordinate = None` leaves GPS alone.
/// When the existing EXIF block cannot be read the write is refused rather
/// than dropping it.
pub fn write_metadata(
    original: &Bytes,
    coordinate: Option<&Coordinate>,
    metadata: &DescriptiveMetadata,
) -> Result<Bytes, EncodeError> {
    let mut directory = match decode(original.clone()) {
        Ok(Some(dir)) => dir,
        Ok(None) => {
            log::debug!("No existing EXIF, building a fresh block");
            ExifDirectory::new()
        }
        Err(DecodeError::Container(e)) => return Err(EncodeError::Container(e)),
        Err(e) => return Err(e.into()),
    };

    if let Some(coordinate) = coordinate {
        apply_coordinate(&mut directory, coordinate)?;
    }
    apply_descriptive(&mut directory, metadata);

    encode(&directory, original)
}

/// Write GPS version (if missing), references and DMS rationals.
pub fn apply_coordinate(directory: &mut ExifDirectory, coordinate: &Coordinate) -> Result<(), EncodeError> {
    let lat = decimal_to_dms(coordinate.latitude())
        .map_err(|_| EncodeError::InvalidCoordinate(coordinate.latitude()))?;
    let lon = decimal_to_dms(coordinate.longitude())
        .map_err(|_| EncodeError::InvalidCoordinate(coordinate.longitude()))?;

    let gps = directory.gps_mut();
    if !gps.contains(Tag::GpsVersionId) {
        gps.set(Tag::GpsVersionId, TagValue::Bytes(GPS_VERSION.to_vec()));
    }
    gps.set(Tag::GpsLatitudeRef, TagValue::Text(coordinate.latitude_ref().as_char().to_string()));
    gps.set(Tag::GpsLatitude, TagValue::Rational(lat.to_vec()));
    gps.set(Tag::GpsLongitudeRef, TagValue::Text(coordinate.longitude_ref().as_char().to_string()));
    gps.set(Tag::GpsLongitude, TagValue::Rational(lon.to_vec()));

    log::debug!("  GPS: {}, {}", coordinate.latitude(), coordinate.longitude());
    Ok(())
}

/// Write each non-blank descriptive field into its XP tag and its legacy tag.
pub fn apply_descriptive(directory: &mut ExifDirectory, metadata: &DescriptiveMetadata) {
    let metadata = metadata.normalized();
    let ifd = directory.primary_mut();

    // Title: XPTitle + DocumentName
    if let Some(ref title) = metadata.title {
        ifd.set(Tag::XpTitle, TagValue::Bytes(encode_wide_text(title)));
        ifd.set(Tag::DocumentName, TagValue::Text(title.clone()));
        log::debug!("  Title: {title}");
    }

    // Description: XPSubject + ImageDescription
    if let Some(ref description) = metadata.description {
        ifd.set(Tag::XpSubject, TagValue::Bytes(encode_wide_text(description)));
        ifd.set(Tag::ImageDescription, TagValue::Text(description.clone()));
        log::debug!("  Description: {description}");
    }

    // Artist: XPAuthor + Artist
    if let Some(ref artist) = metadata.artist {
        ifd.set(Tag::XpAuthor, TagValue::Bytes(encode_wide_text(artist)));
        ifd.set(Tag::Artist, TagValue::Text(artist.clone()));
        log::debug!("  Artist: {artist}");
    }

    // Copyright has no XP counterpart
    if let Some(ref copyright) = metadata.copyright {
        ifd.set(Tag::Copyright, TagValue::Text(copyright.clone()));
        log::debug!("  Copyright: {copyright}");
    }

    // Keywords: XPKeywords only, Software is left to the camera
    if let Some(ref keywords) = metadata.keywords {
        ifd.set(Tag::XpKeywords, TagValue::Bytes(encode_wide_text(keywords)));
        log::debug!("  Keywords: {keywords}");
    }
}

/// Serialize `directory` and splice it into `original` in place of its EXIF
/// segment. Every other segment and the scan data are carried over as they
/// are.
pub fn encode(directory: &ExifDirectory, original: &Bytes) -> Result<Bytes, EncodeError> {
    let mut jpeg =
        Jpeg::from_bytes(original.clone()).map_err(|e| EncodeError::Container(e.to_string()))?;

    let tiff = build_tiff(directory)?;
    let contents_len = EXIF_PREFIX.len() + tiff.len();
    if contents_len > MAX_SEGMENT_CONTENTS {
        return Err(EncodeError::SegmentTooLarge(contents_len));
    }

    let mut contents = Vec::with_capacity(contents_len);
    contents.extend_from_slice(EXIF_PREFIX);
    contents.extend_from_slice(&tiff);
    let segment = JpegSegment::new_with_contents(APP1, Bytes::from(contents));

    splice_exif_segment(&mut jpeg, segment);
    Ok(jpeg.encoder().bytes())
}

/// Replace the first EXIF segment in place and drop any others. Without one,
/// insert after the leading APP0 (JFIF) segments.
fn splice_exif_segment(jpeg: &mut Jpeg, segment: JpegSegment) {
    let segments = jpeg.segments_mut();
    match find_exif_segment_pos(segments) {
        Some(pos) => {
            segments[pos] = segment;
            let mut index = 0;
            segments.retain(|s| {
                let keep = index <= pos || !is_exif_segment(s);
                index += 1;
                keep
            });
        }
        None => {
            let pos = segments.iter().take_while(|s| s.marker() == APP0).count();
            segments.insert(pos, segment);
        }
    }
}

/// One slot of a directory table being written.
enum Slot<'a> {
    /// Entry copied as it was in the source block.
    Verbatim([u8; 12]),
    Value(u16, &'a TagValue),
    /// LONG entry pointing at another directory.
    Pointer(u16, u32),
}

impl Slot<'_> {
    fn from_entry(id: u16, entry: &Entry) -> Slot<'_> {
        match entry.original {
            Some(raw) => Slot::Verbatim(raw),
            None => Slot::Value(id, &entry.value),
        }
    }
}

/// Build the TIFF block.
///
/// The source block is kept so entries copied verbatim (unknown tags, the
/// Exif sub-IFD pointer, the IFD1 link) stay valid. The old IFD0 table, a GPS
/// table being replaced and the data of every value that was replaced or
/// removed are zeroed first; new tables and values go into that space when
/// they fit and onto the end of the block otherwise. Without a source block a
/// fresh header is written.
fn build_tiff(directory: &ExifDirectory) -> Result<Vec<u8>, EncodeError> {
    let order = directory.byte_order();
    let keep_gps_table = gps_table_unchanged(directory);

    let (mut out, mut space) = match directory.source() {
        Some(source) => {
            let mut out = source.to_vec();
            let space = reclaim(&mut out, directory, keep_gps_table);
            (out, space)
        }
        None => {
            let mut header = Vec::with_capacity(TIFF_HEADER_LEN);
            header.extend_from_slice(order.marker());
            header.extend_from_slice(&order.u16_bytes(42));
            header.extend_from_slice(&order.u32_bytes(0));
            (header, FreeSpace::default())
        }
    };

    let gps_offset = match &directory.layout().gps_table {
        _ if directory.gps().is_empty() => None,
        Some(table) if keep_gps_table => Some(offset_of(table.start)?),
        _ => {
            let slots: Vec<Slot<'_>> = directory
                .gps()
                .entries()
                .map(|(id, entry)| Slot::from_entry(id, entry))
                .collect();
            Some(write_ifd(&mut out, &mut space, order, &slots, 0)?)
        }
    };

    let pointer_id = Tag::GpsIfdPointer.id();
    let mut slots: Vec<(u16, Slot<'_>)> = directory
        .primary()
        .entries()
        .filter(|(id, _)| *id != pointer_id)
        .map(|(id, entry)| (id, Slot::from_entry(id, entry)))
        .collect();
    if let Some(offset) = gps_offset {
        slots.push((pointer_id, Slot::Pointer(pointer_id, offset)));
    }
    slots.sort_by_key(|(id, _)| *id);
    let slots: Vec<Slot<'_>> = slots.into_iter().map(|(_, slot)| slot).collect();

    let ifd0_offset = write_ifd(&mut out, &mut space, order, &slots, directory.next_ifd())?;
    out[4..8].copy_from_slice(&order.u32_bytes(ifd0_offset));

    Ok(out)
}

/// The GPS IFD holds exactly the entries it was decoded with, so its table
/// can stay where it is.
fn gps_table_unchanged(directory: &ExifDirectory) -> bool {
    let gps = directory.gps();
    let layout = directory.layout();
    layout.gps_table.is_some()
        && !gps.is_empty()
        && gps.len() == layout.gps_entries.len()
        && gps.entries().all(|(_, entry)| entry.original.is_some())
}

/// Ranges of the copied source block that nothing points at any more,
/// handed out first-fit.
#[derive(Debug, Default)]
struct FreeSpace {
    ranges: Vec<Range<usize>>,
}

impl FreeSpace {
    /// Take `len` bytes starting on a word boundary.
    fn take(&mut self, len: usize) -> Option<usize> {
        self.ranges.iter_mut().find_map(|range| {
            let start = range.start + range.start % 2;
            (start + len <= range.end).then(|| {
                range.start = start + len;
                start
            })
        })
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Zero what the new directory no longer uses: the old IFD0 table, the old
/// GPS table unless it is kept, and the out-of-line data of decoded entries
/// that are not carried over. Ranges shared with anything still referenced
/// are left alone. Cleared space at the end of the block is cut off; the
/// rest is returned for reuse.
fn reclaim(out: &mut Vec<u8>, directory: &ExifDirectory, keep_gps_table: bool) -> FreeSpace {
    let order = directory.byte_order();
    let layout = directory.layout();

    let carried: Vec<[u8; 12]> = directory
        .primary()
        .entries()
        .chain(directory.gps().entries())
        .filter_map(|(_, entry)| entry.original)
        .collect();

    let mut live = vec![0..TIFF_HEADER_LEN];
    live.extend(carried.iter().filter_map(|raw| entry_data_range(order, raw)));

    let mut dead = vec![layout.primary_table.clone()];
    match &layout.gps_table {
        Some(table) if keep_gps_table => live.push(table.clone()),
        Some(table) => dead.push(table.clone()),
        None => {}
    }
    dead.extend(
        layout
            .primary_entries
            .iter()
            .chain(&layout.gps_entries)
            .filter(|raw| !carried.contains(raw))
            .filter_map(|raw| entry_data_range(order, raw)),
    );
    dead.retain(|range| range.end <= out.len() && !live.iter().any(|l| overlaps(l, range)));
    dead.sort_by_key(|range| range.start);

    let mut merged: Vec<Range<usize>> = Vec::new();
    for range in dead {
        out[range.clone()].fill(0);
        match merged.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            // One zero byte between two ranges is word padding
            Some(last) if range.start == last.end + 1 && out[last.end] == 0 => last.end = range.end,
            _ => merged.push(range),
        }
    }

    if let Some(last) = merged.last() {
        if out.len() - last.end <= 1 && out[last.end..].iter().all(|&b| b == 0) {
            log::debug!("Trimming {} unused bytes from the end of the EXIF block", out.len() - last.start);
            out.truncate(last.start);
            merged.pop();
        }
    }

    let reusable: usize = merged.iter().map(|r| r.len()).sum();
    if reusable > 0 {
        log::debug!("Cleared {reusable} unused bytes inside the EXIF block");
    }
    FreeSpace { ranges: merged }
}

fn pad_to_word(out: &mut Vec<u8>) {
    if out.len() % 2 == 1 {
        out.push(0);
    }
}

fn offset_of(position: usize) -> Result<u32, EncodeError> {
    u32::try_from(position).map_err(|_| EncodeError::SegmentTooLarge(position))
}

/// Put `data` into free space, or append it word-aligned. Returns its offset.
fn place(out: &mut Vec<u8>, space: &mut FreeSpace, data: &[u8]) -> Result<u32, EncodeError> {
    let at = match space.take(data.len()) {
        Some(at) => {
            out[at..at + data.len()].copy_from_slice(data);
            at
        }
        None => {
            pad_to_word(out);
            let at = out.len();
            out.extend_from_slice(data);
            at
        }
    };
    offset_of(at)
}

/// Write a directory table and the data of its new values, returning the
/// table's offset.
fn write_ifd(
    out: &mut Vec<u8>,
    space: &mut FreeSpace,
    order: ByteOrder,
    slots: &[Slot<'_>],
    next: u32,
) -> Result<u32, EncodeError> {
    let count = u16::try_from(slots.len()).map_err(|_| EncodeError::TooManyEntries(slots.len()))?;

    let mut table = Vec::with_capacity(ifd_table_len(slots.len()));
    table.extend_from_slice(&order.u16_bytes(count));
    for slot in slots {
        let entry = match slot {
            Slot::Verbatim(raw) => *raw,
            Slot::Pointer(id, offset) => make_entry(order, *id, FORMAT_LONG, 1, order.u32_bytes(*offset)),
            Slot::Value(id, value) => {
                let (format, count, data) = serialize_value(*id, value, order)?;
                let field = if data.len() <= 4 {
                    let mut inline = [0u8; 4];
                    inline[..data.len()].copy_from_slice(&data);
                    inline
                } else {
                    order.u32_bytes(place(out, space, &data)?)
                };
                make_entry(order, *id, format, count, field)
            }
        };
        table.extend_from_slice(&entry);
    }
    table.extend_from_slice(&order.u32_bytes(next));

    place(out, space, &table)
}

fn make_entry(order: ByteOrder, tag: u16, format: u16, count: u32, field: [u8; 4]) -> [u8; 12] {
    let mut entry = [0u8; 12];
    entry[0..2].copy_from_slice(&order.u16_bytes(tag));
    entry[2..4].copy_from_slice(&order.u16_bytes(format));
    entry[4..8].copy_from_slice(&order.u32_bytes(count));
    entry[8..12].copy_from_slice(&field);
    entry
}

/// Field type, component count and data bytes for a value.
fn serialize_value(tag: u16, value: &TagValue, order: ByteOrder) -> Result<(u16, u32, Vec<u8>), EncodeError> {
    let (format, count, data) = match value {
        TagValue::Text(s) => {
            let data = encode_ascii_text(s);
            (FORMAT_ASCII, data.len(), data)
        }
        TagValue::Bytes(bytes) => (FORMAT_BYTE, bytes.len(), bytes.clone()),
        TagValue::Integer(values) => {
            if values.iter().all(|&v| v <= u16::MAX as u32) {
                let data: Vec<u8> = values.iter().flat_map(|&v| order.u16_bytes(v as u16)).collect();
                (FORMAT_SHORT, values.len(), data)
            } else {
                let data: Vec<u8> = values.iter().flat_map(|&v| order.u32_bytes(v)).collect();
                (FORMAT_LONG, values.len(), data)
            }
        }
        TagValue::Rational(values) => {
            let data: Vec<u8> = values
                .iter()
                .flat_map(|r| {
                    let mut pair = [0u8; 8];
                    pair[0..4].copy_from_slice(&order.u32_bytes(r.numerator));
                    pair[4..8].copy_from_slice(&order.u32_bytes(r.denominator));
                    pair
                })
                .collect();
            (FORMAT_RATIONAL, values.len(), data)
        }
        TagValue::Float(_) | TagValue::Opaque(_) => {
            return Err(EncodeError::UnsupportedValue { tag, kind: value.kind_name() });
        }
    };

    let count = u32::try_from(count).map_err(|_| EncodeError::SegmentTooLarge(count))?;
    Ok((format, count, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exif::coords::Rational;
    use crate::exif::extract::{extract_coordinate, extract_descriptive};
    use crate::exif::test_support::*;
    use crate::exif::text::decode_wide_text;

    fn metadata(title: &str) -> DescriptiveMetadata {
        DescriptiveMetadata { title: Some(title.to_string()), ..Default::default() }
    }

    /// Everything in the JPEG except the EXIF segment.
    fn non_exif_segments(jpeg: &Bytes) -> Vec<(u8, Vec<u8>)> {
        Jpeg::from_bytes(jpeg.clone())
            .unwrap()
            .segments()
            .iter()
            .filter(|s| !is_exif_segment(s))
            .map(|s| (s.marker(), s.contents().to_vec()))
            .collect()
    }

    // ── write_metadata: fresh EXIF ───────────────────────────────────

    #[test]
    fn write_into_jpeg_without_exif() {
        let original = plain_jpeg();
        let coordinate = Coordinate::new(40.446193, -79.982170).unwrap();
        let out = write_metadata(&original, Some(&coordinate), &metadata("Point State Park")).unwrap();

        let dir = decode(out.clone()).unwrap().unwrap();
        assert_eq!(dir.byte_order(), ByteOrder::LittleEndian);
        let c = extract_coordinate(&dir).unwrap();
        assert!((c.latitude() - 40.446193).abs() < 1e-6);
        assert!((c.longitude() - (-79.982170)).abs() < 1e-6);
        assert_eq!(extract_descriptive(&dir).title.as_deref(), Some("Point State Park"));
        assert_eq!(dir.gps().get(Tag::GpsVersionId), Some(&TagValue::Bytes(vec![2, 3, 0, 0])));
    }

    #[test]
    fn fresh_segment_goes_after_app0() {
        let original = plain_jpeg();
        let out = write_metadata(&original, None, &metadata("x")).unwrap();
        let jpeg = Jpeg::from_bytes(out).unwrap();
        let pos = find_exif_segment_pos(jpeg.segments()).unwrap();
        let leading_app0 = jpeg.segments().iter().take_while(|s| s.marker() == APP0).count();
        assert_eq!(pos, leading_app0);
    }

    #[test]
    fn other_segments_and_scan_data_untouched() {
        let original = plain_jpeg();
        let out = write_metadata(&original, None, &metadata("x")).unwrap();
        assert_eq!(non_exif_segments(&original), non_exif_segments(&out));
        // Entropy-coded data and EOI are at the tail of both files.
        let tail = &original[original.len() - 64..];
        assert!(out.ends_with(tail));
    }

    // ── write_metadata: existing EXIF ────────────────────────────────

    #[test]
    fn unknown_tag_passes_through() {
        let original = jpeg_with_exif(&camera_tiff(ByteOrder::LittleEndian));
        let out = write_metadata(&original, None, &metadata("New title")).unwrap();

        let dir = decode(out).unwrap().unwrap();
        assert_eq!(
            dir.primary().get(Tag::Other(CUSTOM_TAG)),
            Some(&TagValue::Opaque(CUSTOM_VALUE.to_vec()))
        );
        assert_eq!(dir.primary().get(Tag::Other(0x010F)), Some(&TagValue::Opaque(b"Acme\0".to_vec())));
        assert_eq!(extract_descriptive(&dir).title.as_deref(), Some("New title"));
        // Untouched descriptive field survives
        assert_eq!(extract_descriptive(&dir).artist.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn exif_sub_ifd_stays_reachable() {
        let original = jpeg_with_exif(&camera_tiff(ByteOrder::LittleEndian));
        let coordinate = Coordinate::new(-33.8568, 151.2153).unwrap();
        let out = write_metadata(&original, Some(&coordinate), &metadata("Opera House")).unwrap();

        let tiff = tiff_of(&out);
        assert_eq!(exif_sub_ifd_ascii(&tiff, 0x9003).as_deref(), Some(DATE_TIME_ORIGINAL));
    }

    #[test]
    fn big_endian_source_stays_big_endian() {
        let original = jpeg_with_exif(&camera_tiff(ByteOrder::BigEndian));
        let coordinate = Coordinate::new(51.5007, -0.1246).unwrap();
        let out = write_metadata(&original, Some(&coordinate), &metadata("Big Ben")).unwrap();

        let tiff = tiff_of(&out);
        assert_eq!(&tiff[0..2], b"MM");
        let dir = decode(out).unwrap().unwrap();
        let c = extract_coordinate(&dir).unwrap();
        assert!((c.latitude() - 51.5007).abs() < 1e-6);
        assert!((c.longitude() - (-0.1246)).abs() < 1e-6);
        assert_eq!(extract_descriptive(&dir).title.as_deref(), Some("Big Ben"));
        assert_eq!(exif_sub_ifd_ascii(&tiff, 0x9003).as_deref(), Some(DATE_TIME_ORIGINAL));
    }

    #[test]
    fn coordinate_replaces_existing_gps() {
        let original = jpeg_with_exif(&camera_tiff(ByteOrder::LittleEndian));
        let coordinate = Coordinate::new(35.6586, 139.7454).unwrap();
        let out = write_metadata(&original, Some(&coordinate), &DescriptiveMetadata::default()).unwrap();

        let dir = decode(out).unwrap().unwrap();
        assert_eq!(dir.gps().get(Tag::GpsLongitudeRef), Some(&TagValue::Text("E".into())));
        let c = extract_coordinate(&dir).unwrap();
        assert!((c.latitude() - 35.6586).abs() < 1e-6);
        assert!((c.longitude() - 139.7454).abs() < 1e-6);
    }

    #[test]
    fn blank_fields_are_not_written() {
        let original = jpeg_with_exif(&camera_tiff(ByteOrder::LittleEndian));
        let edit = DescriptiveMetadata {
            artist: Some("   ".into()),
            copyright: Some("© 2024 Jane".into()),
            ..Default::default()
        };
        let out = write_metadata(&original, None, &edit).unwrap();
        let dir = decode(out).unwrap().unwrap();
        let meta = extract_descriptive(&dir);
        assert_eq!(meta.artist.as_deref(), Some("Jane Doe"));
        assert_eq!(meta.copyright.as_deref(), Some("© 2024 Jane"));
        assert!(!dir.primary().contains(Tag::XpAuthor));
    }

    #[test]
    fn writes_both_xp_and_legacy_tags() {
        let mut dir = ExifDirectory::new();
        let edit = DescriptiveMetadata {
            title: Some("T".into()),
            description: Some("  D  ".into()),
            artist: Some("A".into()),
            copyright: Some("C".into()),
            keywords: Some("k1; k2".into()),
        };
        apply_descriptive(&mut dir, &edit);
        let ifd = dir.primary();
        assert_eq!(ifd.get(Tag::DocumentName), Some(&TagValue::Text("T".into())));
        assert_eq!(ifd.get(Tag::ImageDescription), Some(&TagValue::Text("D".into())));
        assert_eq!(ifd.get(Tag::Artist), Some(&TagValue::Text("A".into())));
        assert_eq!(ifd.get(Tag::Copyright), Some(&TagValue::Text("C".into())));
        match ifd.get(Tag::XpKeywords) {
            Some(TagValue::Bytes(b)) => assert_eq!(decode_wide_text(b), "k1; k2"),
            other => panic!("unexpected XPKeywords: {other:?}"),
        }
        assert!(!ifd.contains(Tag::Software));
    }

    #[test]
    fn re_encoding_twice_stays_decodable() {
        let original = jpeg_with_exif(&camera_tiff(ByteOrder::LittleEndian));
        let first = write_metadata(&original, None, &metadata("one")).unwrap();
        let second = write_metadata(&first, None, &metadata("two")).unwrap();
        let dir = decode(second.clone()).unwrap().unwrap();
        assert_eq!(extract_descriptive(&dir).title.as_deref(), Some("two"));
        assert_eq!(
            dir.primary().get(Tag::Other(CUSTOM_TAG)),
            Some(&TagValue::Opaque(CUSTOM_VALUE.to_vec()))
        );
        assert_eq!(exif_sub_ifd_ascii(&tiff_of(&second), 0x9003).as_deref(), Some(DATE_TIME_ORIGINAL));
    }

    #[test]
    fn duplicate_exif_segments_collapse_to_one() {
        let tiff = camera_tiff(ByteOrder::LittleEndian);
        let mut jpeg = Jpeg::from_bytes(jpeg_with_exif(&tiff)).unwrap();
        let mut contents = EXIF_PREFIX.to_vec();
        contents.extend_from_slice(&tiff);
        jpeg.segments_mut().insert(2, JpegSegment::new_with_contents(APP1, Bytes::from(contents)));
        let original = jpeg.encoder().bytes();

        let out = write_metadata(&original, None, &metadata("x")).unwrap();
        let jpeg = Jpeg::from_bytes(out).unwrap();
        assert_eq!(jpeg.segments().iter().filter(|s| is_exif_segment(s)).count(), 1);
    }

    // ── replaced data is cleared and its space reused ────────────────

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    #[test]
    fn replaced_location_and_artist_leave_no_trace() {
        let original = jpeg_with_exif(&camera_tiff(ByteOrder::LittleEndian));
        let old_seconds = [46296u32.to_le_bytes(), 1000u32.to_le_bytes()].concat();
        assert!(contains(&original, &old_seconds));
        assert!(contains(&original, b"Jane Doe"));

        let coordinate = Coordinate::new(10.0, 20.0).unwrap();
        let edit = DescriptiveMetadata { artist: Some("Anon".into()), ..Default::default() };
        let out = write_metadata(&original, Some(&coordinate), &edit).unwrap();

        assert!(!contains(&out, &old_seconds));
        assert!(!contains(&out, b"Jane Doe"));

        let dir = decode(out.clone()).unwrap().unwrap();
        let c = extract_coordinate(&dir).unwrap();
        assert!((c.latitude() - 10.0).abs() < 1e-9);
        assert!((c.longitude() - 20.0).abs() < 1e-9);
        assert_eq!(extract_descriptive(&dir).artist.as_deref(), Some("Anon"));
        assert_eq!(
            dir.primary().get(Tag::Other(CUSTOM_TAG)),
            Some(&TagValue::Opaque(CUSTOM_VALUE.to_vec()))
        );
        assert_eq!(exif_sub_ifd_ascii(&tiff_of(&out), 0x9003).as_deref(), Some(DATE_TIME_ORIGINAL));
    }

    #[test]
    fn unchanged_gps_table_stays_in_place() {
        let original = jpeg_with_exif(&camera_tiff(ByteOrder::BigEndian));
        let before = decode(original.clone()).unwrap().unwrap();
        let out = write_metadata(&original, None, &metadata("Same place")).unwrap();
        let after = decode(out).unwrap().unwrap();

        assert_eq!(after.layout().gps_table, before.layout().gps_table);
        assert_eq!(extract_coordinate(&after), extract_coordinate(&before));
    }

    #[test]
    fn repeated_edits_keep_exif_size_bounded() {
        let coordinate = Coordinate::new(48.8584, 2.2945).unwrap();
        let mut jpeg = jpeg_with_exif(&camera_tiff(ByteOrder::LittleEndian));
        jpeg = write_metadata(&jpeg, Some(&coordinate), &metadata("t")).unwrap();
        let settled = tiff_of(&jpeg).len();

        for i in 0..100 {
            let title = if i % 2 == 0 { "u" } else { "t" };
            jpeg = write_metadata(&jpeg, Some(&coordinate), &metadata(title)).unwrap();
        }

        assert!(tiff_of(&jpeg).len() <= settled);
        let dir = decode(jpeg.clone()).unwrap().unwrap();
        assert_eq!(extract_descriptive(&dir).title.as_deref(), Some("t"));
        assert_eq!(extract_descriptive(&dir).artist.as_deref(), Some("Jane Doe"));
        assert!((extract_coordinate(&dir).unwrap().latitude() - 48.8584).abs() < 1e-6);
        assert_eq!(exif_sub_ifd_ascii(&tiff_of(&jpeg), 0x9003).as_deref(), Some(DATE_TIME_ORIGINAL));
    }

    #[test]
    fn free_space_is_taken_word_aligned_first_fit() {
        let mut space = FreeSpace { ranges: vec![9..20, 30..60] };
        assert_eq!(space.take(10), Some(10));
        assert_eq!(space.take(4), Some(30));
        assert_eq!(space.take(40), None);
    }

    // ── encode failures ──────────────────────────────────────────────

    #[test]
    fn encode_rejects_unsupported_values() {
        let mut dir = ExifDirectory::new();
        dir.gps_mut().set(Tag::GpsLatitude, TagValue::Float(vec![1.0, 2.0, 3.0]));
        let err = encode(&dir, &plain_jpeg()).unwrap_err();
        assert_eq!(err, EncodeError::UnsupportedValue { tag: 0x0002, kind: "float" });

        let mut dir = ExifDirectory::new();
        dir.primary_mut().set(Tag::Other(0xABCD), TagValue::Opaque(vec![1, 2, 3]));
        assert!(matches!(encode(&dir, &plain_jpeg()), Err(EncodeError::UnsupportedValue { .. })));
    }

    #[test]
    fn encode_rejects_oversized_segment() {
        let mut dir = ExifDirectory::new();
        dir.primary_mut().set(Tag::Other(0xABCD), TagValue::Bytes(vec![7; 70_000]));
        assert!(matches!(encode(&dir, &plain_jpeg()), Err(EncodeError::SegmentTooLarge(_))));
    }

    #[test]
    fn encode_rejects_non_jpeg() {
        let dir = ExifDirectory::new();
        let result = encode(&dir, &Bytes::from_static(b"GIF89a"));
        assert!(matches!(result, Err(EncodeError::Container(_))));
    }

    #[test]
    fn write_refuses_unreadable_existing_exif() {
        let original = jpeg_with_exif(b"XX\x2a\x00\x08\x00\x00\x00");
        let result = write_metadata(&original, None, &metadata("x"));
        assert_eq!(result, Err(EncodeError::Unreadable(DecodeError::ByteOrder)));
    }

    // ── serialization details ────────────────────────────────────────

    #[test]
    fn integers_pick_short_or_long() {
        let order = ByteOrder::LittleEndian;
        let (format, count, data) = serialize_value(1, &TagValue::Integer(vec![1, 2]), order).unwrap();
        assert_eq!((format, count, data.len()), (FORMAT_SHORT, 2, 4));
        let (format, _, data) = serialize_value(1, &TagValue::Integer(vec![70_000]), order).unwrap();
        assert_eq!((format, data.len()), (FORMAT_LONG, 4));
    }

    #[test]
    fn rationals_serialize_in_order() {
        let order = ByteOrder::BigEndian;
        let value = TagValue::Rational(vec![Rational::new(1, 2)]);
        let (format, count, data) = serialize_value(2, &value, order).unwrap();
        assert_eq!((format, count), (FORMAT_RATIONAL, 1));
        assert_eq!(data, vec![0, 0, 0, 1, 0, 0, 0, 2]);
    }

    #[test]
    fn ifd_entries_are_sorted_and_aligned() {
        let mut dir = ExifDirectory::new();
        dir.primary_mut().set(Tag::XpTitle, TagValue::Bytes(encode_wide_text("odd")));
        dir.primary_mut().set(Tag::Artist, TagValue::Text("abcde".into()));
        dir.gps_mut().set(Tag::GpsLatitudeRef, TagValue::Text("N".into()));
        let tiff = build_tiff(&dir).unwrap();

        let order = ByteOrder::LittleEndian;
        let ifd0 = order.read_u32(&tiff[4..8]) as usize;
        assert_eq!(ifd0 % 2, 0);
        let count = order.read_u16(&tiff[ifd0..ifd0 + 2]) as usize;
        let ids: Vec<u16> = (0..count)
            .map(|i| order.read_u16(&tiff[ifd0 + 2 + i * 12..ifd0 + 4 + i * 12]))
            .collect();
        assert_eq!(ids, vec![0x013B, 0x8825, 0x9C9B]);
    }
}
