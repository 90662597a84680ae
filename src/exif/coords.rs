use serde::{Deserialize, Serialize};

use crate::error::GeotagError;

/// Fixed denominator for the seconds component of a DMS triplet.
pub const SECONDS_DENOMINATOR: u32 = 1000;

/// An unsigned EXIF rational (numerator / denominator).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rational {
    pub numerator: u32,
    pub denominator: u32,
}

impl Rational {
    pub fn new(numerator: u32, denominator: u32) -> Self {
        Self { numerator, denominator }
    }

    /// Whole-number rational (`n/1`).
    pub fn whole(n: u32) -> Self {
        Self::new(n, 1)
    }

    /// `None` for a zero denominator.
    pub fn to_f64(self) -> Option<f64> {
        if self.denominator == 0 {
            None
        } else {
            Some(self.numerator as f64 / self.denominator as f64)
        }
    }
}

/// A degrees/minutes/seconds triplet as found in a GPS IFD.
///
/// Well-formed files carry three rationals. Some older encoders wrote plain
/// numbers instead; those are accepted for reading only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dms {
    Rational([Rational; 3]),
    Plain([f64; 3]),
}

/// Hemisphere reference for a latitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LatitudeRef {
    #[serde(rename = "N")]
    North,
    #[serde(rename = "S")]
    South,
}

/// Hemisphere reference for a longitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LongitudeRef {
    #[serde(rename = "E")]
    East,
    #[serde(rename = "W")]
    West,
}

impl LatitudeRef {
    pub fn for_value(latitude: f64) -> Self {
        if latitude < 0.0 { Self::South } else { Self::North }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::North => 'N',
            Self::South => 'S',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'N' => Some(Self::North),
            'S' => Some(Self::South),
            _ => None,
        }
    }
}

impl LongitudeRef {
    pub fn for_value(longitude: f64) -> Self {
        if longitude < 0.0 { Self::West } else { Self::East }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::East => 'E',
            Self::West => 'W',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'E' => Some(Self::East),
            'W' => Some(Self::West),
            _ => None,
        }
    }
}

/// A plain latitude/longitude pair, as exchanged with the map view and the
/// place search. Not validated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// A validated GPS position.
///
/// The hemisphere references are always derived from the signs, so
/// `latitude_ref` is `S` exactly when `latitude < 0` (and likewise `W` for
/// longitude). Edits replace the whole value.
///
/// # Example
///
/// ```rust
/// use geotagger::exif::{Coordinate, LongitudeRef};
///
/// let c = Coordinate::new(40.446193, -79.982170).unwrap();
/// assert_eq!(c.longitude_ref(), LongitudeRef::West);
///
/// assert!(Coordinate::new(95.0, 0.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
    latitude_ref: LatitudeRef,
    longitude_ref: LongitudeRef,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeotagError> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(GeotagError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(GeotagError::InvalidLongitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
            latitude_ref: LatitudeRef::for_value(latitude),
            longitude_ref: LongitudeRef::for_value(longitude),
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn latitude_ref(&self) -> LatitudeRef {
        self.latitude_ref
    }

    pub fn longitude_ref(&self) -> LongitudeRef {
        self.longitude_ref
    }

    pub fn to_point(&self) -> GeoPoint {
        GeoPoint { latitude: self.latitude, longitude: self.longitude }
    }
}

impl TryFrom<GeoPoint> for Coordinate {
    type Error = GeotagError;

    fn try_from(point: GeoPoint) -> Result<Self, Self::Error> {
        Self::new(point.latitude, point.longitude)
    }
}

/// Convert decimal degrees to the DMS rational triplet EXIF stores.
///
/// Degrees and minutes are whole rationals, seconds keep three decimals
/// (denominator [`SECONDS_DENOMINATOR`]). The sign is dropped; the hemisphere
/// travels separately as a reference letter. Range checks specific to
/// latitude belong to [`Coordinate::new`]; this only rejects `|decimal| > 180`.
pub fn decimal_to_dms(decimal: f64) -> Result<[Rational; 3], GeotagError> {
    if !decimal.is_finite() || decimal.abs() > 180.0 {
        return Err(GeotagError::AngleOutOfRange(decimal));
    }

    let abs = decimal.abs();
    let degrees = abs.floor();
    let minutes_float = (abs - degrees) * 60.0;
    let minutes = minutes_float.floor();
    let seconds_float = (minutes_float - minutes) * 60.0;
    let seconds_num = (seconds_float * SECONDS_DENOMINATOR as f64).round();

    Ok([
        Rational::whole(degrees as u32),
        Rational::whole(minutes as u32),
        Rational::new(seconds_num as u32, SECONDS_DENOMINATOR),
    ])
}

/// Convert a DMS triplet and its reference letter back to decimal degrees.
///
/// Negated for `S` and `W`. Returns `None` when a rational has a zero
/// denominator or a plain component is not finite.
pub fn dms_to_decimal(dms: &Dms, reference: char) -> Option<f64> {
    let [d, m, s] = match dms {
        Dms::Rational([d, m, s]) => [d.to_f64()?, m.to_f64()?, s.to_f64()?],
        Dms::Plain(parts) => *parts,
    };
    if !(d.is_finite() && m.is_finite() && s.is_finite()) {
        return None;
    }

    let decimal = d + m / 60.0 + s / 3600.0;
    match reference.to_ascii_uppercase() {
        'S' | 'W' => Some(-decimal),
        _ => Some(decimal),
    }
}
