use crate::coordinate::HashableCoord;
use geo::Point;
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;

/// Year-bucketed coordinate store, persisted as a source-embeddable
/// assignment (`var heatDataByYear = {...};`) the map page loads directly.
///
/// Buckets are 4-digit year labels plus the synthetic `"all"` bucket holding
/// the union of everything ever merged. Merging is union-only: a coordinate,
/// once committed, is never removed by a later run.
pub struct HeatStore {
    decimals: u32,
    buckets: BTreeMap<String, HashSet<HashableCoord>>,
}

pub const ALL_BUCKET: &str = "all";

impl HeatStore {
    pub fn empty(decimals: u32) -> HeatStore {
        HeatStore {
            decimals,
            buckets: BTreeMap::new(),
        }
    }

    /// Load a persisted store. A missing file starts empty; an unparsable
    /// one is warned about and also starts empty, never fatal.
    pub fn load(path: &Path, decimals: u32) -> HeatStore {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => {
                println!("No existing {} found, starting fresh", path.display());
                return HeatStore::empty(decimals);
            }
        };

        match parse_assignment(&content) {
            Some(raw) => {
                let mut store = HeatStore::empty(decimals);
                for (bucket, coords) in raw {
                    let set = store.buckets.entry(bucket).or_default();
                    for [lat, lng] in coords {
                        set.insert(HashableCoord::new(Point::new(lng, lat), decimals));
                    }
                }
                store
            }
            None => {
                println!(
                    "⚠ existing {} is unreadable, starting fresh",
                    path.display()
                );
                HeatStore::empty(decimals)
            }
        }
    }

    /// Union-merge a batch of rounded coordinates. Records without a year
    /// contribute only to the `"all"` bucket. Idempotent: re-merging the
    /// same batch changes nothing.
    pub fn merge(&mut self, incoming: &[(Point, Option<String>)]) {
        for (point, year) in incoming {
            let coord = HashableCoord::new(*point, self.decimals);
            self.buckets
                .entry(ALL_BUCKET.to_string())
                .or_default()
                .insert(coord.clone());
            if let Some(year) = year {
                self.buckets.entry(year.clone()).or_default().insert(coord);
            }
        }
    }

    pub fn bucket_len(&self, bucket: &str) -> usize {
        self.buckets.get(bucket).map_or(0, |set| set.len())
    }

    /// Bucket sizes in output order: `"all"` first, then years ascending.
    pub fn summary(&self) -> Vec<(String, usize)> {
        self.ordered_keys()
            .into_iter()
            .map(|key| {
                let len = self.bucket_len(&key);
                (key, len)
            })
            .collect()
    }

    fn ordered_keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.buckets.len());
        if self.buckets.contains_key(ALL_BUCKET) {
            keys.push(ALL_BUCKET.to_string());
        }
        // BTreeMap iteration is already ascending for the year labels
        keys.extend(self.buckets.keys().filter(|k| *k != ALL_BUCKET).cloned());
        keys
    }

    /// Persist the store. If a prior version exists on disk it is copied to
    /// the backup path first, on every write.
    pub fn write(&self, path: &Path, backup_path: &Path) -> io::Result<()> {
        if path.exists() {
            fs::copy(path, backup_path)?;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let keys = self.ordered_keys();
        let mut out = String::from("var heatDataByYear = {\n");
        for (i, key) in keys.iter().enumerate() {
            let mut coords: Vec<[f64; 2]> = self.buckets[key]
                .iter()
                .map(|c| [c.point().y(), c.point().x()])
                .collect();
            coords.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));

            let row = serde_json::to_string(&coords)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            let comma = if i + 1 < keys.len() { "," } else { "" };
            out.push_str(&format!("  \"{}\": {}{}\n", key, row, comma));
        }
        out.push_str("};");

        fs::write(path, out)
    }
}

fn parse_assignment(content: &str) -> Option<BTreeMap<String, Vec<[f64; 2]>>> {
    let re = Regex::new(r"(?s)var heatDataByYear = (\{.*?\});").ok()?;
    let captured = re.captures(content)?.get(1)?.as_str();
    serde_json::from_str(captured).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seoul() -> Point {
        Point::new(127.0, 37.5)
    }

    fn nyc() -> Point {
        Point::new(-73.99, 40.75)
    }

    #[test]
    fn merge_partitions_by_year_and_feeds_all() {
        let mut store = HeatStore::empty(2);
        store.merge(&[
            (seoul(), Some("2019".to_string())),
            (nyc(), None),
        ]);
        assert_eq!(store.bucket_len(ALL_BUCKET), 2);
        assert_eq!(store.bucket_len("2019"), 1);
        // the year-less record lands nowhere but "all"
        assert_eq!(store.summary().len(), 2);
    }

    #[test]
    fn merge_is_idempotent() {
        let batch = vec![
            (seoul(), Some("2019".to_string())),
            (nyc(), Some("2025".to_string())),
        ];
        let mut once = HeatStore::empty(2);
        once.merge(&batch);
        let mut twice = HeatStore::empty(2);
        twice.merge(&batch);
        twice.merge(&batch);

        assert_eq!(once.summary(), twice.summary());
    }

    #[test]
    fn duplicate_coordinates_collapse_within_a_bucket() {
        let mut store = HeatStore::empty(2);
        store.merge(&[
            (Point::new(127.1234, 37.5678), Some("2019".to_string())),
            (Point::new(127.1201, 37.5699), Some("2019".to_string())),
        ]);
        // both round to (37.57, 127.12)
        assert_eq!(store.bucket_len("2019"), 1);
    }

    #[test]
    fn write_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heat_data.js");
        let backup = dir.path().join("heat_data_backup.js");

        let mut store = HeatStore::empty(2);
        store.merge(&[
            (seoul(), Some("2019".to_string())),
            (nyc(), Some("2025".to_string())),
        ]);
        store.write(&path, &backup).unwrap();

        let loaded = HeatStore::load(&path, 2);
        assert_eq!(loaded.bucket_len(ALL_BUCKET), 2);
        assert_eq!(loaded.bucket_len("2019"), 1);
        assert_eq!(loaded.bucket_len("2025"), 1);
    }

    #[test]
    fn all_bucket_is_written_first() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heat_data.js");

        let mut store = HeatStore::empty(2);
        store.merge(&[(seoul(), Some("2019".to_string()))]);
        store.write(&path, &dir.path().join("backup.js")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let all_pos = content.find("\"all\"").unwrap();
        let year_pos = content.find("\"2019\"").unwrap();
        assert!(all_pos < year_pos);
        assert!(content.starts_with("var heatDataByYear = {"));
        assert!(content.ends_with("};"));
    }

    #[test]
    fn backup_is_taken_on_every_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heat_data.js");
        let backup = dir.path().join("heat_data_backup.js");

        let mut store = HeatStore::empty(2);
        store.merge(&[(seoul(), Some("2019".to_string()))]);
        store.write(&path, &backup).unwrap();
        assert!(!backup.exists());

        let first = fs::read_to_string(&path).unwrap();
        store.merge(&[(nyc(), Some("2025".to_string()))]);
        store.write(&path, &backup).unwrap();
        assert_eq!(fs::read_to_string(&backup).unwrap(), first);

        let second = fs::read_to_string(&path).unwrap();
        store.write(&path, &backup).unwrap();
        assert_eq!(fs::read_to_string(&backup).unwrap(), second);
    }

    #[test]
    fn corrupt_store_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heat_data.js");
        fs::write(&path, "var heatDataByYear = {oops};").unwrap();
        let store = HeatStore::load(&path, 2);
        assert_eq!(store.summary().len(), 0);
    }

    #[test]
    fn merging_into_loaded_store_absorbs_existing_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heat_data.js");
        fs::write(
            &path,
            "var heatDataByYear = {\n  \"all\": [[37.5,127.0]],\n  \"2019\": [[37.5,127.0]]\n};",
        )
        .unwrap();

        let mut store = HeatStore::load(&path, 2);
        store.merge(&[(seoul(), Some("2019".to_string()))]);
        assert_eq!(store.bucket_len("2019"), 1);
        assert_eq!(store.bucket_len(ALL_BUCKET), 1);
    }
}
