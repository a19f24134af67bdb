use super::exif::{exif_time_string, has_extension};
use super::{Extraction, ExtractionError, Extractor, RawRecord};
use crate::scan_index::{FileSignature, ScanIndex, index_key};
use serde::Deserialize;
use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

/// One recognition candidate from the external landmark service.
#[derive(Debug, Clone, Deserialize)]
pub struct LandmarkCandidate {
    pub description: String,
    pub score: f64,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// Boundary to the landmark-recognition service: raw image bytes in, scored
/// candidates out. Authentication and transport live behind it.
pub trait LandmarkDetector {
    fn detect(&self, bytes: &[u8]) -> Result<Vec<LandmarkCandidate>, Box<dyn Error>>;
}

/// Detector that pipes the image into an external command and reads a JSON
/// candidate array from its stdout.
pub struct CommandDetector {
    program: String,
    args: Vec<String>,
    max_results: usize,
}

impl CommandDetector {
    pub fn new(command: &[String], max_results: usize) -> Option<CommandDetector> {
        let (program, args) = command.split_first()?;
        Some(CommandDetector {
            program: program.clone(),
            args: args.to_vec(),
            max_results,
        })
    }
}

impl LandmarkDetector for CommandDetector {
    fn detect(&self, bytes: &[u8]) -> Result<Vec<LandmarkCandidate>, Box<dyn Error>> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        {
            let mut stdin = child.stdin.take().ok_or("detector stdin unavailable")?;
            stdin.write_all(bytes)?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(format!("detector exited with {}", output.status).into());
        }

        let mut candidates: Vec<LandmarkCandidate> = serde_json::from_slice(&output.stdout)?;
        candidates.truncate(self.max_results);
        Ok(candidates)
    }
}

/// Locates photos without GPS tags by asking the landmark service. Calls are
/// strictly sequential with a fixed pause after every call, success or
/// failure — the service enforces a queries-per-second ceiling.
pub struct LandmarkExtractor<D: LandmarkDetector> {
    root: PathBuf,
    extensions: Vec<String>,
    detector: D,
    pause: Duration,
}

impl<D: LandmarkDetector> LandmarkExtractor<D> {
    pub fn new(
        root: PathBuf,
        extensions: Vec<String>,
        detector: D,
        pause: Duration,
    ) -> LandmarkExtractor<D> {
        LandmarkExtractor {
            root,
            extensions,
            detector,
            pause,
        }
    }
}

impl<D: LandmarkDetector> Extractor for LandmarkExtractor<D> {
    fn extract(&self, index: &mut ScanIndex) -> Result<Extraction, Box<dyn std::error::Error>> {
        println!("Searching for photos in {}...", self.root.display());

        let photo_files: Vec<_> = walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|entry| {
                entry.file_type().is_file() && has_extension(entry.path(), &self.extensions)
            })
            .collect();

        let mut extraction = Extraction {
            files_seen: photo_files.len(),
            ..Extraction::default()
        };

        for entry in photo_files {
            let path = entry.path();

            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let Ok(signature) = FileSignature::of(&metadata) else {
                continue;
            };

            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let key = format!("landmark:{}", index_key(relative));
            if !index.is_dirty(&key, signature) {
                continue;
            }

            let identity = relative.to_string_lossy().replace('\\', "/");
            extraction.files_processed += 1;

            let bytes = match fs::read(path) {
                Ok(bytes) => bytes,
                Err(source) => {
                    let e = ExtractionError::Unreadable {
                        path: identity.clone(),
                        source,
                    };
                    println!("✗ {}", e);
                    extraction.records.push(RawRecord::unlocated(identity));
                    index.commit(key, signature);
                    continue;
                }
            };

            match self.detector.detect(&bytes) {
                Ok(candidates) => {
                    let record = match pick_best(&candidates) {
                        Some(best) => {
                            println!(
                                "  → {}: {} (score {:.3})",
                                identity, best.description, best.score
                            );
                            RawRecord {
                                file: identity,
                                lat: best.lat,
                                lng: best.lng,
                                time: exif_time_string(path),
                            }
                        }
                        None => RawRecord::unlocated(identity),
                    };
                    extraction.records.push(record);
                }
                Err(e) => {
                    let e = ExtractionError::Service {
                        path: identity.clone(),
                        message: e.to_string(),
                    };
                    println!("✗ {}", e);
                    extraction.records.push(RawRecord::unlocated(identity));
                }
            }
            index.commit(key, signature);

            // the pace floor applies to failed calls too
            thread::sleep(self.pause);
        }

        println!(
            "✓ Recognized landmarks for {} of {} photos",
            extraction
                .records
                .iter()
                .filter(|r| r.lat.is_some())
                .count(),
            extraction.files_processed
        );
        Ok(extraction)
    }

    fn name(&self) -> &'static str {
        "Landmark recognition"
    }
}

/// Highest-confidence candidate that actually carries a location.
fn pick_best(candidates: &[LandmarkCandidate]) -> Option<&LandmarkCandidate> {
    candidates
        .iter()
        .filter(|c| c.lat.is_some() && c.lng.is_some())
        .max_by(|a, b| a.score.total_cmp(&b.score))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::fs;

    fn candidate(description: &str, score: f64, coords: Option<(f64, f64)>) -> LandmarkCandidate {
        LandmarkCandidate {
            description: description.to_string(),
            score,
            lat: coords.map(|c| c.0),
            lng: coords.map(|c| c.1),
        }
    }

    struct StubDetector {
        responses: RefCell<Vec<Result<Vec<LandmarkCandidate>, String>>>,
    }

    impl LandmarkDetector for StubDetector {
        fn detect(&self, _bytes: &[u8]) -> Result<Vec<LandmarkCandidate>, Box<dyn Error>> {
            self.responses
                .borrow_mut()
                .remove(0)
                .map_err(|message| message.into())
        }
    }

    #[test]
    fn picks_highest_score_with_a_location() {
        let candidates = vec![
            candidate("unlocated wonder", 0.99, None),
            candidate("Gyeongbokgung", 0.72, Some((37.58, 126.98))),
            candidate("N Seoul Tower", 0.81, Some((37.55, 126.99))),
        ];
        let best = pick_best(&candidates).unwrap();
        assert_eq!(best.description, "N Seoul Tower");
    }

    #[test]
    fn no_located_candidate_means_no_pick() {
        let candidates = vec![candidate("unlocated wonder", 0.99, None)];
        assert!(pick_best(&candidates).is_none());
    }

    #[test]
    fn detector_results_become_records_and_failures_unlocated() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("a.jpg"), b"not really a jpg").unwrap();
        fs::write(root.path().join("b.jpg"), b"also not a jpg").unwrap();

        let detector = StubDetector {
            responses: RefCell::new(vec![
                Ok(vec![candidate("N Seoul Tower", 0.9, Some((37.55, 126.99)))]),
                Err("quota exceeded".to_string()),
            ]),
        };
        let extractor = LandmarkExtractor::new(
            root.path().to_path_buf(),
            vec!["jpg".to_string()],
            detector,
            Duration::ZERO,
        );

        let mut index = ScanIndex::default();
        let extraction = extractor.extract(&mut index).unwrap();

        assert_eq!(extraction.records.len(), 2);
        let located: Vec<_> = extraction
            .records
            .iter()
            .filter(|r| r.lat.is_some())
            .collect();
        assert_eq!(located.len(), 1);
        assert_eq!(located[0].lat, Some(37.55));

        // both files are committed, failures included
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn processed_photos_are_not_resubmitted() {
        let root = tempfile::tempdir().unwrap();
        fs::write(root.path().join("a.jpg"), b"bytes").unwrap();

        let detector = StubDetector {
            responses: RefCell::new(vec![Ok(vec![])]),
        };
        let extractor = LandmarkExtractor::new(
            root.path().to_path_buf(),
            vec!["jpg".to_string()],
            detector,
            Duration::ZERO,
        );

        let mut index = ScanIndex::default();
        extractor.extract(&mut index).unwrap();
        // a second run finds nothing dirty and never calls the detector
        let second = extractor.extract(&mut index).unwrap();
        assert_eq!(second.files_processed, 0);
    }
}
