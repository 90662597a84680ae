use std::collections::BTreeMap;
use std::ops::Range;

use img_parts::Bytes;

use super::coords::Rational;

// TIFF field types
pub(crate) const FORMAT_BYTE: u16 = 1;
pub(crate) const FORMAT_ASCII: u16 = 2;
pub(crate) const FORMAT_SHORT: u16 = 3;
pub(crate) const FORMAT_LONG: u16 = 4;
pub(crate) const FORMAT_RATIONAL: u16 = 5;
pub(crate) const FORMAT_SBYTE: u16 = 6;
pub(crate) const FORMAT_UNDEFINED: u16 = 7;
pub(crate) const FORMAT_SSHORT: u16 = 8;
pub(crate) const FORMAT_SLONG: u16 = 9;
pub(crate) const FORMAT_SRATIONAL: u16 = 10;
pub(crate) const FORMAT_FLOAT: u16 = 11;
pub(crate) const FORMAT_DOUBLE: u16 = 12;
pub(crate) const FORMAT_IFD: u16 = 13;

/// Size in bytes of one component of the given TIFF field type.
pub(crate) fn format_size(format: u16) -> Option<usize> {
    match format {
        FORMAT_BYTE | FORMAT_ASCII | FORMAT_SBYTE | FORMAT_UNDEFINED => Some(1),
        FORMAT_SHORT | FORMAT_SSHORT => Some(2),
        FORMAT_LONG | FORMAT_SLONG | FORMAT_FLOAT | FORMAT_IFD => Some(4),
        FORMAT_RATIONAL | FORMAT_SRATIONAL | FORMAT_DOUBLE => Some(8),
        _ => None,
    }
}

/// Length of a directory table with `entries` entries: the count, the
/// entries and the next-IFD link.
pub(crate) fn ifd_table_len(entries: usize) -> usize {
    2 + entries * 12 + 4
}

/// Where the value of a raw 12-byte entry lives, when it does not fit in the
/// entry itself.
pub(crate) fn entry_data_range(order: ByteOrder, entry: &[u8; 12]) -> Option<Range<usize>> {
    let format = order.read_u16(&entry[2..4]);
    let count = order.read_u32(&entry[4..8]) as usize;
    let len = format_size(format)?.checked_mul(count)?;
    if len <= 4 {
        return None;
    }
    let start = order.read_u32(&entry[8..12]) as usize;
    Some(start..start.checked_add(len)?)
}

/// Byte order of a TIFF block (`II` = little-endian, `MM` = big-endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    pub(crate) fn marker(self) -> &'static [u8; 2] {
        match self {
            Self::LittleEndian => b"II",
            Self::BigEndian => b"MM",
        }
    }

    pub(crate) fn read_u16(self, b: &[u8]) -> u16 {
        let a = [b[0], b[1]];
        match self {
            Self::LittleEndian => u16::from_le_bytes(a),
            Self::BigEndian => u16::from_be_bytes(a),
        }
    }

    pub(crate) fn read_u32(self, b: &[u8]) -> u32 {
        let a = [b[0], b[1], b[2], b[3]];
        match self {
            Self::LittleEndian => u32::from_le_bytes(a),
            Self::BigEndian => u32::from_be_bytes(a),
        }
    }

    pub(crate) fn read_u64(self, b: &[u8]) -> u64 {
        let a = [b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]];
        match self {
            Self::LittleEndian => u64::from_le_bytes(a),
            Self::BigEndian => u64::from_be_bytes(a),
        }
    }

    pub(crate) fn u16_bytes(self, v: u16) -> [u8; 2] {
        match self {
            Self::LittleEndian => v.to_le_bytes(),
            Self::BigEndian => v.to_be_bytes(),
        }
    }

    pub(crate) fn u32_bytes(self, v: u32) -> [u8; 4] {
        match self {
            Self::LittleEndian => v.to_le_bytes(),
            Self::BigEndian => v.to_be_bytes(),
        }
    }
}

/// Which directory a tag id belongs to. Ids overlap between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfdKind {
    /// IFD0, the "0th" primary image directory.
    Primary,
    /// The GPS sub-directory.
    Gps,
}

/// The tags this crate reads or writes. Everything else is carried as
/// [`Tag::Other`] and passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    // IFD0
    DocumentName,
    ImageDescription,
    Software,
    Artist,
    Copyright,
    GpsIfdPointer,
    XpTitle,
    XpAuthor,
    XpKeywords,
    XpSubject,
    // GPS IFD
    GpsVersionId,
    GpsLatitudeRef,
    GpsLatitude,
    GpsLongitudeRef,
    GpsLongitude,
    Other(u16),
}

impl Tag {
    pub fn id(self) -> u16 {
        match self {
            Self::DocumentName => 0x010D,
            Self::ImageDescription => 0x010E,
            Self::Software => 0x0131,
            Self::Artist => 0x013B,
            Self::Copyright => 0x8298,
            Self::GpsIfdPointer => 0x8825,
            Self::XpTitle => 0x9C9B,
            Self::XpAuthor => 0x9C9D,
            Self::XpKeywords => 0x9C9E,
            Self::XpSubject => 0x9C9F,
            Self::GpsVersionId => 0x0000,
            Self::GpsLatitudeRef => 0x0001,
            Self::GpsLatitude => 0x0002,
            Self::GpsLongitudeRef => 0x0003,
            Self::GpsLongitude => 0x0004,
            Self::Other(id) => id,
        }
    }

    pub fn from_id(ifd: IfdKind, id: u16) -> Self {
        match (ifd, id) {
            (IfdKind::Primary, 0x010D) => Self::DocumentName,
            (IfdKind::Primary, 0x010E) => Self::ImageDescription,
            (IfdKind::Primary, 0x0131) => Self::Software,
            (IfdKind::Primary, 0x013B) => Self::Artist,
            (IfdKind::Primary, 0x8298) => Self::Copyright,
            (IfdKind::Primary, 0x8825) => Self::GpsIfdPointer,
            (IfdKind::Primary, 0x9C9B) => Self::XpTitle,
            (IfdKind::Primary, 0x9C9D) => Self::XpAuthor,
            (IfdKind::Primary, 0x9C9E) => Self::XpKeywords,
            (IfdKind::Primary, 0x9C9F) => Self::XpSubject,
            (IfdKind::Gps, 0x0000) => Self::GpsVersionId,
            (IfdKind::Gps, 0x0001) => Self::GpsLatitudeRef,
            (IfdKind::Gps, 0x0002) => Self::GpsLatitude,
            (IfdKind::Gps, 0x0003) => Self::GpsLongitudeRef,
            (IfdKind::Gps, 0x0004) => Self::GpsLongitude,
            (_, id) => Self::Other(id),
        }
    }
}

/// A decoded tag value.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    /// ASCII string, terminator stripped.
    Text(String),
    /// SHORT or LONG components.
    Integer(Vec<u32>),
    /// BYTE or UNDEFINED data (the XP tags live here).
    Bytes(Vec<u8>),
    Rational(Vec<Rational>),
    /// Signed and floating point components. Read-only.
    Float(Vec<f64>),
    /// Raw data of a tag the codec does not interpret. Read-only.
    Opaque(Vec<u8>),
}

impl TagValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Bytes(_) => "byte",
            Self::Rational(_) => "rational",
            Self::Float(_) => "float",
            Self::Opaque(_) => "opaque",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Entry {
    pub(crate) value: TagValue,
    /// The 12-byte directory entry this value was decoded from. Present only
    /// while the value is unchanged; the writer copies it verbatim.
    pub(crate) original: Option<[u8; 12]>,
}

/// One image file directory: tag id → value, kept sorted by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Ifd {
    kind: IfdKind,
    entries: BTreeMap<u16, Entry>,
}

impl Ifd {
    pub fn new(kind: IfdKind) -> Self {
        Self { kind, entries: BTreeMap::new() }
    }

    pub fn kind(&self) -> IfdKind {
        self.kind
    }

    pub fn get(&self, tag: Tag) -> Option<&TagValue> {
        self.entries.get(&tag.id()).map(|e| &e.value)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.entries.contains_key(&tag.id())
    }

    /// Set a value, replacing whatever was decoded for this tag.
    pub fn set(&mut self, tag: Tag, value: TagValue) {
        self.entries.insert(tag.id(), Entry { value, original: None });
    }

    pub fn remove(&mut self, tag: Tag) -> Option<TagValue> {
        self.entries.remove(&tag.id()).map(|e| e.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tags in ascending id order.
    pub fn tags(&self) -> impl Iterator<Item = Tag> + '_ {
        self.entries.keys().map(|&id| Tag::from_id(self.kind, id))
    }

    pub(crate) fn insert_decoded(&mut self, id: u16, value: TagValue, original: [u8; 12]) {
        self.entries.insert(id, Entry { value, original: Some(original) });
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (u16, &Entry)> {
        self.entries.iter().map(|(&id, e)| (id, e))
    }
}

/// Where IFD0 and the GPS IFD sat in the source block, and the raw entries
/// they held. The writer clears and reuses what the new directory drops.
#[derive(Debug, Clone, PartialEq, Default)]
pub(crate) struct SourceLayout {
    pub(crate) primary_table: Range<usize>,
    pub(crate) primary_entries: Vec<[u8; 12]>,
    /// `None` when the block had no readable GPS IFD.
    pub(crate) gps_table: Option<Range<usize>>,
    pub(crate) gps_entries: Vec<[u8; 12]>,
}

/// The decoded EXIF block of one JPEG: the primary directory and the GPS
/// directory. Other sub-directories (Exif, Interop, the IFD1 thumbnail) are
/// not decoded; they stay where they are in the source block and are reached
/// through entries that are carried over verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct ExifDirectory {
    byte_order: ByteOrder,
    primary: Ifd,
    gps: Ifd,
    /// IFD0's link to IFD1 in the source block.
    next_ifd: u32,
    /// The TIFF block this directory was decoded from.
    source: Option<Bytes>,
    layout: SourceLayout,
}

impl Default for ExifDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl ExifDirectory {
    /// An empty little-endian directory, for images without EXIF.
    pub fn new() -> Self {
        Self {
            byte_order: ByteOrder::LittleEndian,
            primary: Ifd::new(IfdKind::Primary),
            gps: Ifd::new(IfdKind::Gps),
            next_ifd: 0,
            source: None,
            layout: SourceLayout::default(),
        }
    }

    pub(crate) fn from_parts(
        byte_order: ByteOrder,
        primary: Ifd,
        gps: Ifd,
        next_ifd: u32,
        source: Bytes,
        layout: SourceLayout,
    ) -> Self {
        Self { byte_order, primary, gps, next_ifd, source: Some(source), layout }
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn primary(&self) -> &Ifd {
        &self.primary
    }

    pub fn primary_mut(&mut self) -> &mut Ifd {
        &mut self.primary
    }

    pub fn gps(&self) -> &Ifd {
        &self.gps
    }

    pub fn gps_mut(&mut self) -> &mut Ifd {
        &mut self.gps
    }

    pub(crate) fn next_ifd(&self) -> u32 {
        self.next_ifd
    }

    pub(crate) fn source(&self) -> Option<&Bytes> {
        self.source.as_ref()
    }

    pub(crate) fn layout(&self) -> &SourceLayout {
        &self.layout
    }
}
