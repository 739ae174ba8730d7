//! Caption metadata for a photo: capture date and place, read from EXIF.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDateTime;
use exif::{In, Tag, Value};
use tracing::debug;

use crate::geocode::Geocoder;

/// Date and place for one photo; either may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhotoMetadata {
    /// Capture date formatted as `dd.mm.yyyy`.
    pub date: Option<String>,
    pub place: Option<String>,
}

/// A GPS position in decimal degrees (south and west negative).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Source of caption metadata. Lookups never fail; problems degrade to
/// missing fields.
pub trait MetadataProvider {
    fn lookup(&self, path: &Path) -> PhotoMetadata;

    /// Called once per slideshow cycle, after the working set was rebuilt.
    fn begin_cycle(&self) {}
}

/// Reads `DateTimeOriginal` and the GPS block, resolving positions through a
/// [`Geocoder`].
pub struct ExifMetadataProvider<G> {
    geocoder: G,
}

impl<G: Geocoder> ExifMetadataProvider<G> {
    pub fn new(geocoder: G) -> Self {
        Self { geocoder }
    }
}

impl<G: Geocoder> MetadataProvider for ExifMetadataProvider<G> {
    fn lookup(&self, path: &Path) -> PhotoMetadata {
        let exif = match read_exif(path) {
            Ok(exif) => exif,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "no usable EXIF metadata");
                return PhotoMetadata::default();
            }
        };

        let date = exif
            .get_field(Tag::DateTimeOriginal, In::PRIMARY)
            .and_then(|field| ascii_value(&field.value))
            .and_then(|raw| format_capture_date(&raw));
        let place = gps_coordinate(&exif).map(|at| {
            debug!(path = %path.display(), lat = at.latitude, lon = at.longitude, "gps position");
            self.geocoder.place_name(at)
        });

        PhotoMetadata { date, place }
    }

    fn begin_cycle(&self) {
        self.geocoder.begin_cycle();
    }
}

fn read_exif(path: &Path) -> Result<exif::Exif, exif::Error> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    exif::Reader::new().read_from_container(&mut reader)
}

fn ascii_value(value: &Value) -> Option<String> {
    match value {
        Value::Ascii(parts) => parts
            .first()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned()),
        _ => None,
    }
}

/// Reformat an EXIF timestamp (`YYYY:MM:DD HH:MM:SS`) as `DD.MM.YYYY`.
#[must_use]
pub fn format_capture_date(raw: &str) -> Option<String> {
    let raw = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    NaiveDateTime::parse_from_str(raw, "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|ts| ts.format("%d.%m.%Y").to_string())
}

fn gps_coordinate(exif: &exif::Exif) -> Option<Coordinate> {
    let latitude = signed_degrees(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, 'S')?;
    let longitude = signed_degrees(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, 'W')?;
    Some(Coordinate {
        latitude,
        longitude,
    })
}

fn signed_degrees(exif: &exif::Exif, value_tag: Tag, ref_tag: Tag, negative: char) -> Option<f64> {
    let degrees = dms_to_degrees(&exif.get_field(value_tag, In::PRIMARY)?.value)?;
    let reference = exif
        .get_field(ref_tag, In::PRIMARY)
        .and_then(|field| ascii_value(&field.value))
        .unwrap_or_default();
    if reference.trim().starts_with(negative) {
        Some(-degrees)
    } else {
        Some(degrees)
    }
}

/// Degrees, minutes and seconds as stored in EXIF rationals.
fn dms_to_degrees(value: &Value) -> Option<f64> {
    match value {
        Value::Rational(parts) if parts.len() >= 3 => {
            let degrees = parts[0].to_f64();
            let minutes = parts[1].to_f64();
            let seconds = parts[2].to_f64();
            Some(degrees + minutes / 60.0 + seconds / 3600.0)
        }
        _ => None,
    }
}
