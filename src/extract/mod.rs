pub mod exif;
pub mod landmark;
pub mod takeout;

use crate::scan_index::ScanIndex;
use thiserror::Error;

/// One raw observation as produced by an adapter, pre-validation and
/// pre-normalization.
#[derive(Debug, Clone, Default)]
pub struct RawRecord {
    pub file: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub time: Option<String>,
}

impl RawRecord {
    pub fn unlocated(file: String) -> RawRecord {
        RawRecord {
            file,
            ..RawRecord::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct Extraction {
    pub records: Vec<RawRecord>,
    pub files_seen: usize,
    pub files_processed: usize,
}

/// Per-file extraction failure. Callers downgrade these to unlocated
/// records at the record boundary; one bad file never aborts a batch.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {path}: {message}")]
    Decode { path: String, message: String },
    #[error("landmark detection failed for {path}: {message}")]
    Service { path: String, message: String },
}

// extract RawRecords from a source of photo metadata, skipping files the
// scan index already knows
pub trait Extractor {
    fn extract(&self, index: &mut ScanIndex) -> Result<Extraction, Box<dyn std::error::Error>>;

    fn name(&self) -> &'static str;
}
