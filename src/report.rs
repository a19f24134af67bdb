use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fs;
use std::io;
use std::path::Path;

/// One located observation, as persisted in the canonical per-file report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocatedRecord {
    pub file: String,
    pub lat: f64,
    pub lng: f64,
    pub time: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnlocatedRecord {
    pub file: String,
}

/// The cumulative located/unlocated report pair. The JSON files are the
/// source of truth; the CSV view is regenerated from them on every run.
#[derive(Default)]
pub struct Reports {
    pub located: Vec<LocatedRecord>,
    pub unlocated: Vec<UnlocatedRecord>,
}

impl Reports {
    pub fn load(located_path: &Path, unlocated_path: &Path) -> Reports {
        Reports {
            located: load_json_array(located_path),
            unlocated: load_json_array(unlocated_path),
        }
    }

    /// Append this run's records, keeping the first occurrence of each
    /// identity: `(file, lat, lng, time)` for located records, `file` for
    /// unlocated ones.
    pub fn absorb(&mut self, located: Vec<LocatedRecord>, unlocated: Vec<UnlocatedRecord>) {
        let mut seen: HashSet<(String, u64, u64, Option<String>)> = self
            .located
            .iter()
            .map(located_key)
            .collect();
        for record in located {
            if seen.insert(located_key(&record)) {
                self.located.push(record);
            }
        }

        let mut seen_files: HashSet<String> =
            self.unlocated.iter().map(|r| r.file.clone()).collect();
        for record in unlocated {
            if seen_files.insert(record.file.clone()) {
                self.unlocated.push(record);
            }
        }
    }

    pub fn write(&self, located_path: &Path, unlocated_path: &Path) -> io::Result<()> {
        write_json_array(located_path, &self.located)?;
        write_json_array(unlocated_path, &self.unlocated)
    }

    /// Regenerate the scan-report CSV (`path, has_gps, lat, lng, has_time,
    /// time`) from the merged JSON state.
    pub fn write_csv(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["path", "has_gps", "lat", "lng", "has_time", "time"])?;

        for record in &self.located {
            let has_time = if record.time.is_some() { "Y" } else { "N" };
            let lat = record.lat.to_string();
            let lng = record.lng.to_string();
            writer.write_record([
                record.file.as_str(),
                "Y",
                lat.as_str(),
                lng.as_str(),
                has_time,
                record.time.as_deref().unwrap_or(""),
            ])?;
        }
        for record in &self.unlocated {
            writer.write_record([record.file.as_str(), "N", "", "", "N", ""])?;
        }

        writer.flush()?;
        Ok(())
    }
}

fn located_key(record: &LocatedRecord) -> (String, u64, u64, Option<String>) {
    (
        record.file.clone(),
        record.lat.to_bits(),
        record.lng.to_bits(),
        record.time.clone(),
    )
}

/// Missing or unparsable report files start empty; one bad file never takes
/// the accumulated state down with it.
fn load_json_array<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return Vec::new(),
    };
    match serde_json::from_str(&content) {
        Ok(records) => records,
        Err(e) => {
            println!("⚠ report {} is unreadable ({}), starting fresh", path.display(), e);
            Vec::new()
        }
    }
}

fn write_json_array<T: Serialize>(path: &Path, records: &[T]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(records)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    fs::write(path, content)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn located(file: &str, lat: f64, lng: f64, time: Option<&str>) -> LocatedRecord {
        LocatedRecord {
            file: file.to_string(),
            lat,
            lng,
            time: time.map(str::to_string),
        }
    }

    #[test]
    fn absorb_deduplicates_by_identity() {
        let mut reports = Reports::default();
        reports.absorb(
            vec![located("a.jpg", 37.5, 127.0, Some("2019-03-10 09:00:00"))],
            vec![UnlocatedRecord { file: "b.jpg".to_string() }],
        );
        // same observation again, plus a genuinely new one
        reports.absorb(
            vec![
                located("a.jpg", 37.5, 127.0, Some("2019-03-10 09:00:00")),
                located("a.jpg", 40.75, -73.99, Some("2025-09-29 12:00:00")),
            ],
            vec![
                UnlocatedRecord { file: "b.jpg".to_string() },
                UnlocatedRecord { file: "c.jpg".to_string() },
            ],
        );

        assert_eq!(reports.located.len(), 2);
        assert_eq!(reports.unlocated.len(), 2);
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let with_path = dir.path().join("photos_with.json");
        let without_path = dir.path().join("photos_without.json");

        let mut reports = Reports::default();
        reports.absorb(
            vec![located("a.jpg", 37.5, 127.0, None)],
            vec![UnlocatedRecord { file: "b.jpg".to_string() }],
        );
        reports.write(&with_path, &without_path).unwrap();

        let loaded = Reports::load(&with_path, &without_path);
        assert_eq!(loaded.located, reports.located);
        assert_eq!(loaded.unlocated, reports.unlocated);
    }

    #[test]
    fn missing_and_corrupt_reports_load_empty() {
        let dir = tempfile::tempdir().unwrap();
        let with_path = dir.path().join("photos_with.json");
        fs::write(&with_path, "[{broken").unwrap();

        let loaded = Reports::load(&with_path, &dir.path().join("absent.json"));
        assert!(loaded.located.is_empty());
        assert!(loaded.unlocated.is_empty());
    }

    #[test]
    fn csv_is_regenerated_with_flag_columns() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("exif_scan_report.csv");

        let mut reports = Reports::default();
        reports.absorb(
            vec![located("2019/a.jpg", 37.5, 127.0, Some("2019-03-10 09:00:00"))],
            vec![UnlocatedRecord { file: "2019/b.jpg".to_string() }],
        );
        reports.write_csv(&csv_path).unwrap();

        let content = fs::read_to_string(&csv_path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("path,has_gps,lat,lng,has_time,time"));
        assert_eq!(
            lines.next(),
            Some("2019/a.jpg,Y,37.5,127,Y,2019-03-10 09:00:00")
        );
        assert_eq!(lines.next(), Some("2019/b.jpg,N,,,N,"));

        // a second write replaces rather than appends
        reports.write_csv(&csv_path).unwrap();
        assert_eq!(fs::read_to_string(&csv_path).unwrap().lines().count(), 3);
    }
}
