use super::{Extraction, ExtractionError, Extractor, RawRecord};
use crate::scan_index::{FileSignature, ScanIndex, index_key};
use chrono::NaiveDateTime;
use exif::{In, Rational, Reader, Tag, Value};
use indicatif::ProgressBar;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Scans a camera roll for image files and decodes GPS position and capture
/// time from their EXIF metadata.
pub struct ExifExtractor {
    root: PathBuf,
    extensions: Vec<String>,
}

impl ExifExtractor {
    pub fn new(root: PathBuf, extensions: Vec<String>) -> ExifExtractor {
        ExifExtractor { root, extensions }
    }
}

impl Extractor for ExifExtractor {
    fn extract(&self, index: &mut ScanIndex) -> Result<Extraction, Box<dyn std::error::Error>> {
        println!("Searching for photos in {}...", self.root.display());

        let photo_files: Vec<_> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|entry| {
                entry.file_type().is_file() && has_extension(entry.path(), &self.extensions)
            })
            .collect();

        println!("Found {} photos", photo_files.len());

        let mut extraction = Extraction {
            files_seen: photo_files.len(),
            ..Extraction::default()
        };

        // sequential on purpose: the index is committed per file
        let progress = ProgressBar::new(photo_files.len() as u64);
        for entry in photo_files {
            progress.inc(1);
            let path = entry.path();

            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let Ok(signature) = FileSignature::of(&metadata) else {
                continue;
            };

            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let key = index_key(relative);
            if !index.is_dirty(&key, signature) {
                continue;
            }

            let identity = relative.to_string_lossy().replace('\\', "/");
            match read_exif_record(path, &identity) {
                Ok(record) => extraction.records.push(record),
                Err(e) => {
                    println!("✗ {}", e);
                    extraction.records.push(RawRecord::unlocated(identity));
                }
            }
            extraction.files_processed += 1;
            index.commit(key, signature);
        }
        progress.finish_and_clear();

        println!(
            "✓ Extracted {} of {} photos ({} unchanged since last run)",
            extraction.files_processed,
            extraction.files_seen,
            extraction.files_seen - extraction.files_processed
        );
        Ok(extraction)
    }

    fn name(&self) -> &'static str {
        "EXIF scan"
    }
}

pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .is_some_and(|ext| extensions.iter().any(|known| *known == ext))
}

fn read_exif_record(path: &Path, identity: &str) -> Result<RawRecord, ExtractionError> {
    let file = File::open(path).map_err(|source| ExtractionError::Unreadable {
        path: identity.to_string(),
        source,
    })?;
    let mut reader = BufReader::new(file);
    let exif = Reader::new()
        .read_from_container(&mut reader)
        .map_err(|e| ExtractionError::Decode {
            path: identity.to_string(),
            message: e.to_string(),
        })?;

    Ok(RawRecord {
        file: identity.to_string(),
        lat: gps_degrees(&exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, 'S'),
        lng: gps_degrees(&exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, 'W'),
        time: capture_time(&exif),
    })
}

/// Decode one GPS axis: a degree/minute/second rational triple plus a
/// hemisphere reference character.
fn gps_degrees(exif: &exif::Exif, value_tag: Tag, ref_tag: Tag, negative_ref: char) -> Option<f64> {
    let field = exif.get_field(value_tag, In::PRIMARY)?;
    let Value::Rational(ref dms) = field.value else {
        return None;
    };
    if dms.len() < 3 {
        return None;
    }

    let reference = exif
        .get_field(ref_tag, In::PRIMARY)
        .and_then(|field| match field.value {
            Value::Ascii(ref parts) => parts
                .first()
                .and_then(|bytes| bytes.first())
                .map(|b| *b as char),
            _ => None,
        });

    Some(dms_to_degrees(dms, reference, negative_ref))
}

/// ((d, m, s), 'N'/'E'/'S'/'W') → signed decimal degrees. A missing
/// reference defaults to the positive hemisphere.
fn dms_to_degrees(dms: &[Rational], reference: Option<char>, negative_ref: char) -> f64 {
    let degrees = dms[0].to_f64() + dms[1].to_f64() / 60.0 + dms[2].to_f64() / 3600.0;
    if reference == Some(negative_ref) {
        -degrees
    } else {
        degrees
    }
}

fn capture_time(exif: &exif::Exif) -> Option<String> {
    for tag in [Tag::DateTimeOriginal, Tag::DateTime] {
        let Some(field) = exif.get_field(tag, In::PRIMARY) else {
            continue;
        };
        let Value::Ascii(ref parts) = field.value else {
            continue;
        };
        let Some(bytes) = parts.first() else {
            continue;
        };
        let raw = String::from_utf8_lossy(bytes);
        // EXIF writes "2019:03:10 09:00:00"
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw.trim(), "%Y:%m:%d %H:%M:%S") {
            return Some(dt.format("%Y-%m-%d %H:%M:%S").to_string());
        }
    }
    None
}

/// Capture time alone, for adapters that locate a photo by other means.
pub fn exif_time_string(path: &Path) -> Option<String> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = Reader::new().read_from_container(&mut reader).ok()?;
    capture_time(&exif)
}
