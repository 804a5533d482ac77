//! Photo metadata extraction.
//!
//! Two independent sets of metadata come out of an upload:
//!
//! - [`PhotoMeta`], derived from the image bytes themselves (container
//!   format, EXIF capture date, GPS position). The date label it carries is
//!   the key adventures are grouped by.
//! - Provider metadata, derived only from what the client declared for the
//!   file (name, content type, size). It is attached to the stored object.

use crate::error::{AlbumError, Result};
use chrono::{NaiveDate, NaiveDateTime};
use exif::{In, Reader, Tag, Value};
use image::{ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Cursor;
use tracing::debug;

/// Extension used when the container is recognized but has no canonical one
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Format of the adventure grouping key
pub const DATE_LABEL_FORMAT: &str = "%Y-%m-%d";

const CAPTURE_DATE_TAGS: [Tag; 3] = [Tag::DateTimeOriginal, Tag::DateTimeDigitized, Tag::DateTime];

/// A file received in an upload batch
#[derive(Debug, Clone, Default)]
pub struct UploadedFile {
    /// Filename declared by the client
    pub file_name: Option<String>,
    /// Content type declared by the client
    pub content_type: Option<String>,
    /// Raw file content
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            ..Default::default()
        }
    }
}

/// Capture position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Metadata read from the image bytes of one upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoMeta {
    /// EXIF capture time, local to the camera
    pub capture_date: Option<NaiveDateTime>,
    /// Calendar date of the capture (`YYYY-MM-DD`)
    pub date_label: Option<String>,
    /// Extension matching the detected container, not the uploaded filename
    pub expected_extension: String,
    /// GPS position, when the camera recorded one
    pub location: Option<GeoPoint>,
}

impl PhotoMeta {
    pub fn capture_day(&self) -> Option<NaiveDate> {
        self.capture_date.map(|dt| dt.date())
    }
}

/// Extract capture date, extension and location from raw image bytes.
///
/// Bytes that are not a decodable image container fail with
/// [`AlbumError::MetadataExtraction`], including ones that merely start
/// with a known signature. A valid image without EXIF data is
/// not an error: its date fields are simply `None`.
pub fn extract_meta_data(bytes: &[u8]) -> Result<PhotoMeta> {
    match image::guess_format(bytes) {
        Ok(format) => {
            check_container(bytes, format)?;
            let exif = if carries_exif(format) {
                read_exif(bytes)?
            } else {
                None
            };
            let extension = format
                .extensions_str()
                .first()
                .copied()
                .unwrap_or(DEFAULT_EXTENSION);
            Ok(build_meta(exif.as_ref(), extension))
        }
        // HEIF and friends are unknown to `image`; let the EXIF reader decide.
        Err(_) => {
            let exif = read_exif(bytes)?;
            Ok(build_meta(exif.as_ref(), DEFAULT_EXTENSION))
        }
    }
}

/// Containers whose decoder is compiled in
fn decodable(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Jpeg
            | ImageFormat::Png
            | ImageFormat::WebP
            | ImageFormat::Tiff
            | ImageFormat::Gif
            | ImageFormat::Bmp
    )
}

/// Magic bytes alone are not enough; the header must decode too.
fn check_container(bytes: &[u8], format: ImageFormat) -> Result<()> {
    if !decodable(format) {
        return Err(AlbumError::MetadataExtraction(format!(
            "unsupported image format {format:?}"
        )));
    }

    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(|e| AlbumError::MetadataExtraction(format!("invalid {format:?} image: {e}")))?;

    debug!(format = ?format, width, height, "Image header decoded");
    Ok(())
}

fn carries_exif(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Jpeg | ImageFormat::Tiff | ImageFormat::Png | ImageFormat::WebP
    )
}

fn read_exif(bytes: &[u8]) -> Result<Option<exif::Exif>> {
    match Reader::new().read_from_container(&mut Cursor::new(bytes)) {
        Ok(exif) => Ok(Some(exif)),
        Err(exif::Error::NotFound(container)) => {
            debug!(container = container, "No EXIF block in image");
            Ok(None)
        }
        Err(e) => Err(AlbumError::MetadataExtraction(e.to_string())),
    }
}

fn build_meta(exif: Option<&exif::Exif>, extension: &str) -> PhotoMeta {
    let capture_date = exif.and_then(capture_date);
    PhotoMeta {
        capture_date,
        date_label: capture_date.map(|dt| dt.format(DATE_LABEL_FORMAT).to_string()),
        expected_extension: extension.to_string(),
        location: exif.and_then(location),
    }
}

fn capture_date(exif: &exif::Exif) -> Option<NaiveDateTime> {
    CAPTURE_DATE_TAGS.iter().find_map(|tag| {
        let field = exif.get_field(*tag, In::PRIMARY)?;
        match field.value {
            Value::Ascii(ref parts) => parts.first().and_then(|raw| parse_exif_datetime(raw)),
            _ => None,
        }
    })
}

/// EXIF datetimes carry no zone; they stay naive local time.
fn parse_exif_datetime(raw: &[u8]) -> Option<NaiveDateTime> {
    let dt = exif::DateTime::from_ascii(raw).ok()?;
    NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())?.and_hms_opt(
        dt.hour.into(),
        dt.minute.into(),
        dt.second.into(),
    )
}

fn location(exif: &exif::Exif) -> Option<GeoPoint> {
    let latitude = gps_coordinate(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, b'S')?;
    let longitude = gps_coordinate(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, b'W')?;
    Some(GeoPoint {
        latitude,
        longitude,
    })
}

fn gps_coordinate(exif: &exif::Exif, value_tag: Tag, ref_tag: Tag, negative_ref: u8) -> Option<f64> {
    let dms = match exif.get_field(value_tag, In::PRIMARY)?.value {
        Value::Rational(ref parts) if parts.len() >= 3 => {
            parts[0].to_f64() + parts[1].to_f64() / 60.0 + parts[2].to_f64() / 3600.0
        }
        _ => return None,
    };

    let negative = match exif.get_field(ref_tag, In::PRIMARY).map(|f| &f.value) {
        Some(Value::Ascii(parts)) => parts
            .first()
            .and_then(|r| r.first())
            .map(|c| c.eq_ignore_ascii_case(&negative_ref))
            .unwrap_or(false),
        _ => false,
    };

    Some(if negative { -dms } else { dms })
}

/// Build the descriptive tags attached to the stored object.
///
/// Only the client's declared values are used; nothing is re-derived from
/// the bytes.
pub fn extract_provider_metadata(file: &UploadedFile) -> HashMap<String, String> {
    let mut metadata = HashMap::new();

    if let Some(ref name) = file.file_name {
        metadata.insert("original-filename".to_string(), name.clone());
    }
    if let Some(ref content_type) = file.content_type {
        metadata.insert("content-type".to_string(), content_type.clone());
    }
    metadata.insert("content-length".to_string(), file.bytes.len().to_string());

    metadata
}
