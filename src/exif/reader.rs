use img_parts::Bytes;
use img_parts::jpeg::{Jpeg, JpegSegment};
use thiserror::Error;

use super::coords::Rational;
use super::directory::*;
use super::text::decode_ascii_text;

pub(crate) const EXIF_PREFIX: &[u8] = b"Exif\0\0";
pub(crate) const APP1: u8 = 0xE1;

const TIFF_MAGIC: u16 = 42;

/// Why an EXIF block could not be read.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("not a readable JPEG: {0}")]
    Container(String),

    #[error("invalid TIFF byte order marker")]
    ByteOrder,

    #[error("invalid TIFF magic number {0}")]
    Magic(u16),

    #[error("{what} at offset {offset} runs past the end of the EXIF data")]
    Truncated { what: &'static str, offset: usize },
}

/// Decode the EXIF block of a JPEG.
///
/// Returns `Ok(None)` when the image simply has no EXIF segment. An image
/// whose EXIF has no GPS directory decodes to a directory with an empty
/// [`ExifDirectory::gps`]. Errors are reserved for input that is not a JPEG
/// or whose TIFF structure is broken.
pub fn decode(data: Bytes) -> Result<Option<ExifDirectory>, DecodeError> {
    let jpeg = Jpeg::from_bytes(data).map_err(|e| DecodeError::Container(e.to_string()))?;

    let Some(tiff) = exif_payload(&jpeg) else {
        log::debug!("No EXIF segment found");
        return Ok(None);
    };

    parse_tiff(tiff).map(Some)
}

/// The TIFF block of the first EXIF APP1 segment (without the `Exif\0\0`
/// prefix).
pub(crate) fn exif_payload(jpeg: &Jpeg) -> Option<Bytes> {
    let pos = find_exif_segment_pos(jpeg.segments())?;
    let contents = jpeg.segments()[pos].contents();
    Some(Bytes::copy_from_slice(&contents[EXIF_PREFIX.len()..]))
}

/// Find the position of the EXIF APP1 segment.
/// EXIF segments have marker 0xE1 (APP1) and contents starting with "Exif\0\0".
pub(crate) fn find_exif_segment_pos(segments: &[JpegSegment]) -> Option<usize> {
    segments.iter().position(is_exif_segment)
}

pub(crate) fn is_exif_segment(segment: &JpegSegment) -> bool {
    segment.marker() == APP1 && segment.contents().starts_with(EXIF_PREFIX)
}

/// Parse a TIFF block into the primary and GPS directories.
pub fn parse_tiff(tiff: Bytes) -> Result<ExifDirectory, DecodeError> {
    let order = match tiff.get(0..2) {
        Some(b"II") => ByteOrder::LittleEndian,
        Some(b"MM") => ByteOrder::BigEndian,
        _ => return Err(DecodeError::ByteOrder),
    };
    let reader = TiffReader { data: &tiff, order };

    let magic = reader.u16_at(2, "TIFF header")?;
    if magic != TIFF_MAGIC {
        return Err(DecodeError::Magic(magic));
    }

    let ifd0_offset = reader.u32_at(4, "TIFF header")? as usize;
    let (fields, next_ifd) = reader.read_ifd(ifd0_offset, "IFD0")?;

    let mut layout = SourceLayout {
        primary_table: ifd0_offset..ifd0_offset + ifd_table_len(fields.len()),
        primary_entries: fields.iter().map(|f| f.entry).collect(),
        ..SourceLayout::default()
    };

    let mut primary = Ifd::new(IfdKind::Primary);
    let mut gps_offset = None;
    for field in &fields {
        let tag = Tag::from_id(IfdKind::Primary, field.tag);
        if tag == Tag::GpsIfdPointer {
            gps_offset = Some(order.read_u32(&field.value) as usize);
            continue;
        }
        primary.insert_decoded(field.tag, decode_value(tag, field, order), field.entry);
    }

    let mut gps = Ifd::new(IfdKind::Gps);
    if let Some(offset) = gps_offset {
        match reader.read_ifd(offset, "GPS IFD") {
            Ok((fields, _)) => {
                layout.gps_table = Some(offset..offset + ifd_table_len(fields.len()));
                layout.gps_entries = fields.iter().map(|f| f.entry).collect();
                for field in &fields {
                    let tag = Tag::from_id(IfdKind::Gps, field.tag);
                    gps.insert_decoded(field.tag, decode_value(tag, field, order), field.entry);
                }
            }
            Err(e) => log::debug!("Ignoring unreadable GPS IFD: {e}"),
        }
    }

    log::debug!(
        "Decoded EXIF ({:?}): {} primary tags, {} GPS tags",
        order,
        primary.len(),
        gps.len()
    );

    let source = tiff.clone();
    Ok(ExifDirectory::from_parts(order, primary, gps, next_ifd, source, layout))
}

/// One directory entry as it sits in the TIFF block.
struct RawField<'a> {
    tag: u16,
    format: u16,
    /// The 4-byte value/offset field.
    value: [u8; 4],
    /// The whole 12-byte entry.
    entry: [u8; 12],
    /// The value bytes, `None` when the type is unknown or they lie outside
    /// the block.
    data: Option<&'a [u8]>,
}

struct TiffReader<'a> {
    data: &'a [u8],
    order: ByteOrder,
}

impl<'a> TiffReader<'a> {
    fn slice(&self, offset: usize, len: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or(DecodeError::Truncated { what, offset })
    }

    fn u16_at(&self, offset: usize, what: &'static str) -> Result<u16, DecodeError> {
        Ok(self.order.read_u16(self.slice(offset, 2, what)?))
    }

    fn u32_at(&self, offset: usize, what: &'static str) -> Result<u32, DecodeError> {
        Ok(self.order.read_u32(self.slice(offset, 4, what)?))
    }

    /// Read a directory table and its next-IFD link.
    fn read_ifd(&self, offset: usize, what: &'static str) -> Result<(Vec<RawField<'a>>, u32), DecodeError> {
        let count = self.u16_at(offset, what)? as usize;
        let table = self.slice(offset + 2, count * 12, what)?;
        let next = self.u32_at(offset + 2 + count * 12, what)?;

        let fields = table
            .chunks_exact(12)
            .map(|chunk| {
                let mut entry = [0u8; 12];
                entry.copy_from_slice(chunk);
                let mut value = [0u8; 4];
                value.copy_from_slice(&chunk[8..12]);

                let tag = self.order.read_u16(&chunk[0..2]);
                let format = self.order.read_u16(&chunk[2..4]);
                let count = self.order.read_u32(&chunk[4..8]) as usize;
                let data = self.value_data(format, count, &chunk[8..12]);

                RawField { tag, format, value, entry, data }
            })
            .collect();

        Ok((fields, next))
    }

    fn value_data(&self, format: u16, count: usize, field: &'a [u8]) -> Option<&'a [u8]> {
        let len = format_size(format)?.checked_mul(count)?;
        if len <= 4 {
            Some(&field[..len])
        } else {
            let offset = self.order.read_u32(field) as usize;
            self.slice(offset, len, "tag value").ok()
        }
    }
}

/// Turn raw entry data into a [`TagValue`]. Tags the crate does not use stay
/// opaque; known tags with unreadable data become an empty opaque value (the
/// entry itself is still carried over verbatim).
fn decode_value(tag: Tag, field: &RawField<'_>, order: ByteOrder) -> TagValue {
    if let Tag::Other(_) = tag {
        return TagValue::Opaque(field.data.map(<[u8]>::to_vec).unwrap_or_default());
    }
    let Some(data) = field.data else {
        log::debug!("Tag {:#06x} has unreadable data", field.tag);
        return TagValue::Opaque(Vec::new());
    };

    match field.format {
        FORMAT_BYTE | FORMAT_UNDEFINED => TagValue::Bytes(data.to_vec()),
        FORMAT_ASCII => TagValue::Text(decode_ascii_text(data)),
        FORMAT_SHORT => TagValue::Integer(
            data.chunks_exact(2).map(|c| order.read_u16(c) as u32).collect(),
        ),
        FORMAT_LONG => TagValue::Integer(data.chunks_exact(4).map(|c| order.read_u32(c)).collect()),
        FORMAT_RATIONAL => TagValue::Rational(
            data.chunks_exact(8)
                .map(|c| Rational::new(order.read_u32(&c[0..4]), order.read_u32(&c[4..8])))
                .collect(),
        ),
        FORMAT_SBYTE => TagValue::Float(data.iter().map(|&b| b as i8 as f64).collect()),
        FORMAT_SSHORT => TagValue::Float(
            data.chunks_exact(2).map(|c| order.read_u16(c) as i16 as f64).collect(),
        ),
        FORMAT_SLONG => TagValue::Float(
            data.chunks_exact(4).map(|c| order.read_u32(c) as i32 as f64).collect(),
        ),
        FORMAT_SRATIONAL => TagValue::Float(
            data.chunks_exact(8)
                .map(|c| {
                    let num = order.read_u32(&c[0..4]) as i32 as f64;
                    let den = order.read_u32(&c[4..8]) as i32 as f64;
                    num / den
                })
                .collect(),
        ),
        FORMAT_FLOAT => TagValue::Float(
            data.chunks_exact(4).map(|c| f32::from_bits(order.read_u32(c)) as f64).collect(),
        ),
        FORMAT_DOUBLE => TagValue::Float(
            data.chunks_exact(8).map(|c| f64::from_bits(order.read_u64(c))).collect(),
        ),
        _ => TagValue::Opaque(data.to_vec()),
    }
}
