use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Content signature for one file: byte size plus modification time in Unix
/// milliseconds. Any difference in either component marks the file dirty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSignature {
    pub size: u64,
    pub mtime: i64,
}

impl FileSignature {
    pub fn of(metadata: &fs::Metadata) -> io::Result<FileSignature> {
        let modified = metadata.modified()?;
        let mtime = match modified.duration_since(UNIX_EPOCH) {
            Ok(since) => since.as_millis() as i64,
            Err(before) => -(before.duration().as_millis() as i64),
        };
        Ok(FileSignature {
            size: metadata.len(),
            mtime,
        })
    }
}

/// Persistent mapping from normalized relative path to the signature observed
/// at last successful processing. Entries are only added or overwritten;
/// stale entries for deleted files are acceptable drift.
#[derive(Default)]
pub struct ScanIndex {
    entries: HashMap<String, FileSignature>,
}

/// Index key: relative path with forward slashes, case-folded.
pub fn index_key(relative_path: &Path) -> String {
    relative_path
        .to_string_lossy()
        .replace('\\', "/")
        .to_lowercase()
}

impl ScanIndex {
    /// Load the persisted index. A missing or unparsable file yields an
    /// empty index (reprocess everything), never a skip-everything state.
    pub fn load(path: &Path) -> ScanIndex {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => return ScanIndex::default(),
        };
        match serde_json::from_str::<HashMap<String, FileSignature>>(&content) {
            Ok(entries) => ScanIndex { entries },
            Err(e) => {
                println!(
                    "⚠ scan index {} is unreadable ({}), reprocessing everything",
                    path.display(),
                    e
                );
                ScanIndex::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, content)
    }

    pub fn is_dirty(&self, key: &str, current: FileSignature) -> bool {
        self.entries.get(key) != Some(&current)
    }

    pub fn commit(&mut self, key: String, signature: FileSignature) {
        self.entries.insert(key, signature);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
