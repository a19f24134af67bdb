use super::{Extraction, ExtractionError, Extractor, RawRecord};
use crate::scan_index::{FileSignature, ScanIndex, index_key};
use regex::Regex;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Reads the JSON sidecars of a Google Photos Takeout export. Only the
/// year-album folders ("Photos from 2015", ...) are scanned; each sidecar
/// carries the media file's location and capture time.
pub struct TakeoutExtractor {
    root: PathBuf,
    year_dir: Regex,
}

/// The two sidecar fields this pipeline consumes, resolved here once rather
/// than probed downstream.
#[derive(Deserialize)]
struct Sidecar {
    #[serde(rename = "geoData", default)]
    geo_data: Option<GeoData>,
    #[serde(rename = "photoTakenTime", default)]
    photo_taken_time: Option<PhotoTakenTime>,
}

#[derive(Deserialize)]
struct GeoData {
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
}

#[derive(Deserialize)]
struct PhotoTakenTime {
    #[serde(default)]
    formatted: Option<String>,
}

impl TakeoutExtractor {
    pub fn new(root: PathBuf) -> TakeoutExtractor {
        TakeoutExtractor {
            root,
            year_dir: Regex::new(r"^Photos from (\d{4})$").expect("year folder pattern compiles"),
        }
    }

    fn year_folders(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut folders = Vec::new();
        for entry in self.root.read_dir()? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            if self.year_dir.is_match(&name.to_string_lossy()) {
                folders.push(entry.path());
            }
        }
        folders.sort();
        Ok(folders)
    }
}

impl Extractor for TakeoutExtractor {
    fn extract(&self, index: &mut ScanIndex) -> Result<Extraction, Box<dyn std::error::Error>> {
        if !self.root.exists() {
            println!("No takeout export found at {}", self.root.display());
            return Ok(Extraction::default());
        }

        let mut extraction = Extraction::default();

        for folder in self.year_folders()? {
            println!("Reading sidecars in {}...", folder.display());

            let sidecars: Vec<_> = WalkDir::new(&folder)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|entry| {
                    entry.file_type().is_file()
                        && entry.path().extension().is_some_and(|ext| ext == "json")
                })
                .collect();

            extraction.files_seen += sidecars.len();

            for entry in sidecars {
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

                let identity = media_identity(path);
                match read_sidecar(path, &identity) {
                    Ok(record) => extraction.records.push(record),
                    Err(e) => {
                        println!("✗ {}", e);
                        extraction.records.push(RawRecord::unlocated(identity));
                    }
                }
                extraction.files_processed += 1;
                index.commit(key, signature);
            }
        }

        println!(
            "✓ Extracted {} of {} sidecars ({} unchanged since last run)",
            extraction.files_processed,
            extraction.files_seen,
            extraction.files_seen - extraction.files_processed
        );
        Ok(extraction)
    }

    fn name(&self) -> &'static str {
        "Takeout import"
    }
}

/// The media file a sidecar describes: its own name minus the `.json`
/// suffix. A bare stem (old exports) is assumed to be a jpg.
fn media_identity(sidecar_path: &Path) -> String {
    let name = sidecar_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.strip_suffix(".json").unwrap_or(&name);
    if Path::new(stem).extension().is_some() {
        stem.to_string()
    } else {
        format!("{stem}.jpg")
    }
}

fn read_sidecar(path: &Path, identity: &str) -> Result<RawRecord, ExtractionError> {
    let file = File::open(path).map_err(|source| ExtractionError::Unreadable {
        path: identity.to_string(),
        source,
    })?;
    let sidecar: Sidecar =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| ExtractionError::Decode {
            path: identity.to_string(),
            message: e.to_string(),
        })?;

    let (lat, lng) = match sidecar.geo_data {
        Some(geo) => (geo.latitude, geo.longitude),
        None => (None, None),
    };

    Ok(RawRecord {
        file: identity.to_string(),
        lat,
        lng,
        time: sidecar.photo_taken_time.and_then(|t| t.formatted),
    })
}
