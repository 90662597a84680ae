//! Fixture builders shared by the codec tests. The TIFF builder lays out
//! blocks the way cameras do (tables first, then a data area) and does not
//! go through the crate's own writer.

use std::io::Cursor;

use img_parts::Bytes;
use img_parts::jpeg::{Jpeg, JpegSegment};

use super::directory::*;

pub(crate) const CUSTOM_TAG: u16 = 0xC4A5;
pub(crate) const CUSTOM_VALUE: &[u8] = b"PrintIM\x000300";
pub(crate) const DATE_TIME_ORIGINAL: &str = "2024:05:01 10:00:00";

/// A small real JPEG (8x8, no EXIF) produced by the `image` encoder.
pub(crate) fn plain_jpeg() -> Bytes {
    let img = image::RgbImage::from_pixel(8, 8, image::Rgb([200, 120, 40]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .unwrap();
    Bytes::from(buf)
}

/// `plain_jpeg()` with an EXIF APP1 segment holding `tiff`, right after APP0.
pub(crate) fn jpeg_with_exif(tiff: &[u8]) -> Bytes {
    let mut jpeg = Jpeg::from_bytes(plain_jpeg()).unwrap();
    let mut contents = b"Exif\0\0".to_vec();
    contents.extend_from_slice(tiff);
    let segment = JpegSegment::new_with_contents(0xE1, Bytes::from(contents));
    jpeg.segments_mut().insert(1, segment);
    jpeg.encoder().bytes()
}

/// A phone-like block: Make, Orientation, Artist, an unknown UNDEFINED tag,
/// an Exif sub-IFD with DateTimeOriginal, and GPS for
/// 40°26'46.296"N 79°58'55.812"W.
pub(crate) fn camera_tiff(order: ByteOrder) -> Vec<u8> {
    let mut b = TiffBuilder::new(order);
    b.primary_ascii(0x010F, "Acme");
    b.primary_short(0x0112, 1);
    b.primary_ascii(0x013B, "Jane Doe");
    b.primary_raw(CUSTOM_TAG, FORMAT_UNDEFINED, CUSTOM_VALUE.len() as u32, CUSTOM_VALUE.to_vec());
    b.exif_ascii(0x9003, DATE_TIME_ORIGINAL);
    b.gps_bytes(0x0000, &[2, 3, 0, 0]);
    b.gps_ascii(0x0001, "N");
    b.gps_rationals(0x0002, &[(40, 1), (26, 1), (46296, 1000)]);
    b.gps_ascii(0x0003, "W");
    b.gps_rationals(0x0004, &[(79, 1), (58, 1), (55812, 1000)]);
    b.build()
}

struct RawEntry {
    tag: u16,
    format: u16,
    count: u32,
    data: Vec<u8>,
}

pub(crate) struct TiffBuilder {
    order: ByteOrder,
    primary: Vec<RawEntry>,
    exif: Vec<RawEntry>,
    gps: Vec<RawEntry>,
}

impl TiffBuilder {
    pub(crate) fn new(order: ByteOrder) -> Self {
        Self { order, primary: Vec::new(), exif: Vec::new(), gps: Vec::new() }
    }

    fn ascii(s: &str) -> (u32, Vec<u8>) {
        let mut data = s.as_bytes().to_vec();
        data.push(0);
        (data.len() as u32, data)
    }

    pub(crate) fn primary_raw(&mut self, tag: u16, format: u16, count: u32, data: Vec<u8>) {
        self.primary.push(RawEntry { tag, format, count, data });
    }

    pub(crate) fn primary_ascii(&mut self, tag: u16, s: &str) {
        let (count, data) = Self::ascii(s);
        self.primary_raw(tag, FORMAT_ASCII, count, data);
    }

    pub(crate) fn primary_bytes(&mut self, tag: u16, bytes: &[u8]) {
        self.primary_raw(tag, FORMAT_BYTE, bytes.len() as u32, bytes.to_vec());
    }

    pub(crate) fn primary_short(&mut self, tag: u16, v: u16) {
        let data = self.order.u16_bytes(v).to_vec();
        self.primary_raw(tag, FORMAT_SHORT, 1, data);
    }

    pub(crate) fn primary_long(&mut self, tag: u16, v: u32) {
        let data = self.order.u32_bytes(v).to_vec();
        self.primary_raw(tag, FORMAT_LONG, 1, data);
    }

    pub(crate) fn exif_ascii(&mut self, tag: u16, s: &str) {
        let (count, data) = Self::ascii(s);
        self.exif.push(RawEntry { tag, format: FORMAT_ASCII, count, data });
    }

    pub(crate) fn gps_ascii(&mut self, tag: u16, s: &str) {
        let (count, data) = Self::ascii(s);
        self.gps.push(RawEntry { tag, format: FORMAT_ASCII, count, data });
    }

    pub(crate) fn gps_bytes(&mut self, tag: u16, bytes: &[u8]) {
        self.gps.push(RawEntry { tag, format: FORMAT_BYTE, count: bytes.len() as u32, data: bytes.to_vec() });
    }

    pub(crate) fn gps_rationals(&mut self, tag: u16, values: &[(u32, u32)]) {
        let mut data = Vec::new();
        for &(n, d) in values {
            data.extend_from_slice(&self.order.u32_bytes(n));
            data.extend_from_slice(&self.order.u32_bytes(d));
        }
        self.gps.push(RawEntry { tag, format: FORMAT_RATIONAL, count: values.len() as u32, data });
    }

    pub(crate) fn gps_doubles(&mut self, tag: u16, values: &[f64]) {
        let mut data = Vec::new();
        for v in values {
            let bits = v.to_bits();
            let bytes = match self.order {
                ByteOrder::LittleEndian => bits.to_le_bytes(),
                ByteOrder::BigEndian => bits.to_be_bytes(),
            };
            data.extend_from_slice(&bytes);
        }
        self.gps.push(RawEntry { tag, format: FORMAT_DOUBLE, count: values.len() as u32, data });
    }

    fn table_size(entries: usize) -> usize {
        2 + entries * 12 + 4
    }

    pub(crate) fn build(mut self) -> Vec<u8> {
        let order = self.order;
        let has_exif = !self.exif.is_empty();
        let has_gps = !self.gps.is_empty();

        // Pointer placeholders, patched once table offsets are known.
        if has_exif {
            self.primary_long(0x8769, 0);
        }
        if has_gps {
            self.primary_long(0x8825, 0);
        }
        self.primary.sort_by_key(|e| e.tag);
        self.exif.sort_by_key(|e| e.tag);
        self.gps.sort_by_key(|e| e.tag);

        let ifd0_offset = 8;
        let exif_offset = ifd0_offset + Self::table_size(self.primary.len());
        let gps_offset = exif_offset + if has_exif { Self::table_size(self.exif.len()) } else { 0 };
        let data_offset = gps_offset + if has_gps { Self::table_size(self.gps.len()) } else { 0 };

        for entry in &mut self.primary {
            if has_exif && entry.tag == 0x8769 {
                entry.data = order.u32_bytes(exif_offset as u32).to_vec();
            }
            if has_gps && entry.tag == 0x8825 {
                entry.data = order.u32_bytes(gps_offset as u32).to_vec();
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(order.marker());
        out.extend_from_slice(&order.u16_bytes(42));
        out.extend_from_slice(&order.u32_bytes(ifd0_offset as u32));

        let mut data_area: Vec<u8> = Vec::new();
        let mut write_table = |out: &mut Vec<u8>, entries: &[RawEntry]| {
            out.extend_from_slice(&order.u16_bytes(entries.len() as u16));
            for e in entries {
                out.extend_from_slice(&order.u16_bytes(e.tag));
                out.extend_from_slice(&order.u16_bytes(e.format));
                out.extend_from_slice(&order.u32_bytes(e.count));
                if e.data.len() <= 4 {
                    let mut field = [0u8; 4];
                    field[..e.data.len()].copy_from_slice(&e.data);
                    out.extend_from_slice(&field);
                } else {
                    if data_area.len() % 2 == 1 {
                        data_area.push(0);
                    }
                    let offset = data_offset + data_area.len();
                    out.extend_from_slice(&order.u32_bytes(offset as u32));
                    data_area.extend_from_slice(&e.data);
                }
            }
            out.extend_from_slice(&order.u32_bytes(0));
        };

        write_table(&mut out, &self.primary);
        if has_exif {
            write_table(&mut out, &self.exif);
        }
        if has_gps {
            write_table(&mut out, &self.gps);
        }
        assert_eq!(out.len(), data_offset);
        out.extend_from_slice(&data_area);
        out
    }
}

/// Independent lookup of an ASCII tag in the Exif sub-IFD of a TIFF block,
/// following IFD0's 0x8769 pointer.
pub(crate) fn exif_sub_ifd_ascii(tiff: &[u8], wanted: u16) -> Option<String> {
    let order = match &tiff[0..2] {
        b"II" => ByteOrder::LittleEndian,
        b"MM" => ByteOrder::BigEndian,
        _ => return None,
    };
    let find = |ifd: usize, tag: u16| -> Option<(u16, u32, [u8; 4])> {
        let count = order.read_u16(tiff.get(ifd..ifd + 2)?) as usize;
        (0..count).find_map(|i| {
            let e = tiff.get(ifd + 2 + i * 12..ifd + 14 + i * 12)?;
            (order.read_u16(&e[0..2]) == tag).then(|| {
                (order.read_u16(&e[2..4]), order.read_u32(&e[4..8]), [e[8], e[9], e[10], e[11]])
            })
        })
    };

    let ifd0 = order.read_u32(&tiff[4..8]) as usize;
    let (_, _, ptr) = find(ifd0, 0x8769)?;
    let exif_ifd = order.read_u32(&ptr) as usize;
    let (format, count, field) = find(exif_ifd, wanted)?;
    if format != FORMAT_ASCII {
        return None;
    }
    let count = count as usize;
    let bytes = if count <= 4 {
        field[..count].to_vec()
    } else {
        let offset = order.read_u32(&field) as usize;
        tiff.get(offset..offset + count)?.to_vec()
    };
    Some(String::from_utf8_lossy(&bytes).trim_end_matches('\0').to_string())
}

/// The TIFF block inside a JPEG's EXIF segment.
pub(crate) fn tiff_of(jpeg: &Bytes) -> Vec<u8> {
    let jpeg = Jpeg::from_bytes(jpeg.clone()).unwrap();
    let segment = jpeg
        .segments()
        .iter()
        .find(|s| s.marker() == 0xE1 && s.contents().starts_with(b"Exif\0\0"))
        .unwrap();
    segment.contents()[6..].to_vec()
}
