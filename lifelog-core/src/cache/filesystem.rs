//! JSON-file cache store with year/month partitioning.
//!
//! Layout: `{root}/{YYYY}/{MM}/{YYYY-MM-DD}.json`
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place) under a single write lock
//! - Legacy bare-array entries load as unconfirmed days
//! - Corrupt entries are removed on read and treated as absent
//! - Scans walk the directory tree, parsing dates from file names

use super::entry::{CachedDay, ScanMap};
use super::store::{CacheError, CacheStore};
use chrono::{Datelike, NaiveDate};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// The filesystem cache.
pub struct FsCacheStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Root directory of the cache.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the file for a day: `{root}/{YYYY}/{MM}/{YYYY-MM-DD}.json`
    pub fn path(&self, day: NaiveDate) -> PathBuf {
        self.root
            .join(format!("{:04}", day.year()))
            .join(format!("{:02}", day.month()))
            .join(format!("{}.json", day.format("%Y-%m-%d")))
    }

    fn io_err(path: &Path, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Subdirectories of `dir` whose names are `len` ASCII digits.
    fn numeric_dirs(dir: &Path, len: usize) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .filter(|e| {
                let name = e.file_name();
                let name = name.to_string_lossy();
                name.len() == len && name.bytes().all(|b| b.is_ascii_digit())
            })
            .map(|e| e.path())
            .collect()
    }
}

impl CacheStore for FsCacheStore {
    fn read(&self, day: NaiveDate) -> Option<CachedDay> {
        let path = self.path(day);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %path.display(), "unreadable cache file: {e}");
                return None;
            }
        };

        match CachedDay::from_json(day, &bytes) {
            Ok(entry) if entry.date == day => Some(entry),
            Ok(entry) => {
                warn!(
                    path = %path.display(),
                    data_date = %entry.date,
                    "removing cache file stored under the wrong day"
                );
                let _ = fs::remove_file(&path);
                None
            }
            Err(e) => {
                // Remove so the next run refetches instead of failing again.
                warn!(path = %path.display(), "removing corrupt cache file: {e}");
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    fn write(&self, entry: &CachedDay) -> Result<(), CacheError> {
        let payload = entry.to_json()?;
        let path = self.path(entry.date);
        let tmp_path = path.with_extension("json.tmp");

        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| Self::io_err(dir, e))?;
        }
        fs::write(&tmp_path, &payload).map_err(|e| Self::io_err(&tmp_path, e))?;

        // Atomic rename
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            Self::io_err(&path, e)
        })?;

        debug!(path = %path.display(), records = entry.records.len(), "cache entry written");
        Ok(())
    }

    fn scan(&self, as_of: NaiveDate) -> ScanMap {
        let mut result = ScanMap::new();

        for year_dir in Self::numeric_dirs(&self.root, 4) {
            for month_dir in Self::numeric_dirs(&year_dir, 2) {
                let Ok(files) = fs::read_dir(&month_dir) else {
                    continue;
                };
                for file in files.filter_map(|f| f.ok()) {
                    let path = file.path();
                    if path.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    let Some(day) = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                    else {
                        continue;
                    };
                    if day > as_of {
                        continue;
                    }
                    if let Some(entry) = self.read(day) {
                        result.insert(day, entry.scan_result());
                    }
                }
            }
        }

        result
    }

    fn location(&self, day: NaiveDate) -> String {
        self.path(day).display().to_string()
    }
}
