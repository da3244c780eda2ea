//! Capture-time extraction from embedded image metadata.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, warn};

/// Fixed pattern of EXIF date/time values.
const EXIF_DATETIME_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Used only when neither an embedded timestamp nor an mtime is available.
pub fn sentinel_capture_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1999, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Where a record's effective capture time came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    Embedded,
    ModificationTime,
    Sentinel,
}

/// Fallback chain: embedded timestamp, then mtime, then the sentinel.
pub fn effective_capture_time(
    embedded: Option<NaiveDateTime>,
    modified_at: Option<NaiveDateTime>,
) -> (NaiveDateTime, CaptureSource) {
    match (embedded, modified_at) {
        (Some(taken), _) => (taken, CaptureSource::Embedded),
        (None, Some(mtime)) => (mtime, CaptureSource::ModificationTime),
        (None, None) => (sentinel_capture_time(), CaptureSource::Sentinel),
    }
}

/// Filesystem mtime as a naive UTC timestamp, truncated to microseconds so
/// it survives the round trip through the catalog unchanged.
pub fn modification_time(modified: SystemTime) -> NaiveDateTime {
    let utc: DateTime<Utc> = modified.into();
    let naive = utc.naive_utc();
    naive
        .with_nanosecond(naive.nanosecond() / 1_000 * 1_000)
        .unwrap_or(naive)
}

/// Read the capture time embedded in an image.
///
/// Prefers `DateTimeOriginal` over `DateTimeDigitized`. Every failure (not
/// an image, corrupt container, missing or unparseable tag) is logged and
/// yields `None`.
pub fn extract_capture_time(path: &Path) -> Option<NaiveDateTime> {
    let reader = match image::ImageReader::open(path).and_then(|r| r.with_guessed_format()) {
        Ok(reader) => reader,
        Err(e) => {
            warn!("EXIF: Cannot open {}: {}", path.display(), e);
            return None;
        }
    };

    let format = match reader.format() {
        Some(format) => format,
        None => {
            warn!("EXIF: Cannot identify image file {}", path.display());
            return None;
        }
    };

    if skips_embedded_metadata(format) {
        debug!("EXIF: Skipping EXIF read for format {:?} on {}", format, path.display());
        return None;
    }

    let file = File::open(path).ok()?;
    let mut bufreader = BufReader::new(file);
    let exif = match exif::Reader::new().read_from_container(&mut bufreader) {
        Ok(exif) => exif,
        Err(e) => {
            debug!("EXIF: No EXIF data in {} ({:?}): {}", path.display(), format, e);
            return None;
        }
    };

    for tag in [exif::Tag::DateTimeOriginal, exif::Tag::DateTimeDigitized] {
        let Some(field) = exif.get_field(tag, exif::In::PRIMARY) else {
            continue;
        };
        let Some(text) = decode_value(&field.value) else {
            continue;
        };
        match parse_exif_datetime(&text) {
            Some(taken) => return Some(taken),
            None => {
                warn!("EXIF: Could not parse date string '{}' from {} in {}", text, tag, path.display());
            }
        }
    }

    debug!("EXIF: DateTimeOriginal/DateTimeDigitized not found or empty in {}", path.display());
    None
}

/// Simple raster formats rarely carry usable date tags.
fn skips_embedded_metadata(format: image::ImageFormat) -> bool {
    matches!(
        format,
        image::ImageFormat::Gif | image::ImageFormat::Png | image::ImageFormat::WebP
    )
}

/// Text of an ASCII or byte-encoded tag value, NUL padding and whitespace
/// stripped. Non-UTF-8 bytes are dropped.
fn decode_value(value: &exif::Value) -> Option<String> {
    let bytes: &[u8] = match value {
        exif::Value::Ascii(parts) => parts.first()?.as_slice(),
        exif::Value::Undefined(bytes, _) => bytes.as_slice(),
        exif::Value::Byte(bytes) => bytes.as_slice(),
        _ => return None,
    };

    let text: String = String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect();
    let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

pub fn parse_exif_datetime(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), EXIF_DATETIME_FORMAT).ok()
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Minimal JPEG files carrying an EXIF APP1 segment.

    use exif::experimental::Writer;
    use exif::{Field, In, Tag, Value};
    use std::io::Cursor;
    use std::path::Path;

    pub fn jpeg_with_exif(fields: &[(Tag, &str)]) -> Vec<u8> {
        let fields: Vec<Field> = fields
            .iter()
            .map(|(tag, text)| Field {
                tag: *tag,
                ifd_num: In::PRIMARY,
                value: Value::Ascii(vec![text.as_bytes().to_vec()]),
            })
            .collect();

        let mut writer = Writer::new();
        for field in &fields {
            writer.push_field(field);
        }
        let mut tiff = Cursor::new(Vec::new());
        writer.write(&mut tiff, false).unwrap();
        let tiff = tiff.into_inner();

        let segment_len = (2 + 6 + tiff.len()) as u16;
        let mut jpeg = vec![0xFF, 0xD8, 0xFF, 0xE1];
        jpeg.extend_from_slice(&segment_len.to_be_bytes());
        jpeg.extend_from_slice(b"Exif\0\0");
        jpeg.extend_from_slice(&tiff);
        jpeg.extend_from_slice(&[0xFF, 0xD9]);
        jpeg
    }

    pub fn write_jpeg_with_exif(path: &Path, fields: &[(Tag, &str)]) {
        std::fs::write(path, jpeg_with_exif(fields)).unwrap();
    }

    /// A JPEG with no metadata segment at all.
    pub fn write_bare_jpeg(path: &Path) {
        std::fs::write(path, [0xFFu8, 0xD8, 0xFF, 0xD9]).unwrap();
    }
}
