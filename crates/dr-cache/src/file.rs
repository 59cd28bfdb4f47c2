//! File-based cache implementation.
//!
//! [`FileCache`] stores each entry as one file under `{root}/entries/`, named
//! after its key. See [`entry`](crate::entry) for the file format.
//!
//! Writes go to a temporary file in the same directory which is then renamed
//! into place, so concurrent readers never observe a partially-written entry.
//! Concurrent writers of the same key race; the last rename wins.
//!
//! On construction, [`FileCache`] validates a `VERSION` file in the cache root.
//! If the version mismatches or is missing, the entire cache directory is wiped
//! and recreated. This ensures stale caches from previous builds are never used.
//!
//! A crash between creating and renaming a temporary file leaves it behind.
//! [`clear`](CacheStore::clear) and [`cleanup_expired`](CacheStore::cleanup_expired)
//! delete such leftovers once they are older than [`TEMP_FILE_GRACE`].
//!
//! Every I/O error is logged and swallowed: reads degrade to misses and writes
//! to no-ops.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::NamedTempFile;

use crate::CacheStore;
use crate::entry::{CacheEntry, EntryHeader, now_ms};
use crate::stats::{CacheCounters, CacheStats};

/// Extension of entry files. Temporary files never carry it.
const ENTRY_EXTENSION: &str = "entry";

/// Age after which a non-entry file in `entries/` counts as an abandoned
/// temporary file. Younger ones may belong to an in-flight write.
const TEMP_FILE_GRACE: Duration = Duration::from_secs(60);

/// File-based [`CacheStore`] rooted at a directory on disk.
///
/// Directory layout:
/// ```text
/// {root}/
/// +-- VERSION              # contains the cache version string
/// +-- entries/
///     +-- {key}.entry      # one file per cache entry
/// ```
#[derive(Debug)]
pub struct FileCache {
    root: PathBuf,
    counters: CacheCounters,
}

impl FileCache {
    /// Create a new file-based cache at `root`, validating the cache version.
    ///
    /// If the `VERSION` file inside `root` does not match `version`, the entire
    /// cache directory is removed and recreated with the new version. Errors
    /// during validation are logged but never fatal.
    #[must_use]
    pub fn new(root: PathBuf, version: &str) -> Self {
        validate_version(&root, version);
        Self {
            root,
            counters: CacheCounters::default(),
        }
    }

    /// Cache root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entries_dir(&self) -> PathBuf {
        self.root.join("entries")
    }

    /// Path for `key`, or `None` if the key cannot be used as a file name.
    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        if !is_valid_key(key) {
            tracing::debug!(key, "Rejected cache key");
            return None;
        }
        Some(self.entries_dir().join(format!("{key}.{ENTRY_EXTENSION}")))
    }

    /// All entry files currently on disk.
    fn entry_files(&self) -> Vec<PathBuf> {
        let Ok(dir) = fs::read_dir(self.entries_dir()) else {
            return Vec::new();
        };
        dir.filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == ENTRY_EXTENSION))
            .collect()
    }

    /// Delete non-entry files in `entries/` last modified at least `grace` ago.
    fn remove_stale_temp_files(&self, grace: Duration) -> usize {
        let Ok(dir) = fs::read_dir(self.entries_dir()) else {
            return 0;
        };
        let now = SystemTime::now();
        let removed = dir
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_none_or(|ext| ext != ENTRY_EXTENSION))
            .filter(|e| {
                e.metadata().is_ok_and(|meta| {
                    meta.is_file()
                        && meta
                            .modified()
                            .is_ok_and(|at| now.duration_since(at).unwrap_or_default() >= grace)
                })
            })
            .filter(|e| fs::remove_file(e.path()).is_ok())
            .count();
        if removed > 0 {
            tracing::debug!(removed, "Removed abandoned temporary cache files");
        }
        removed
    }

    /// Read the entry at `path` if present and live at `now`.
    ///
    /// Expired entries are deleted.
    fn read_live(path: &Path, key: &str, now: u64) -> io::Result<Option<CacheEntry>> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let header = EntryHeader::read_from(&mut file)?;
        if header.key != key {
            return Ok(None);
        }
        if header.is_expired_at(now) {
            drop(file);
            tracing::debug!(key, "Evicting expired cache entry");
            remove_file_quietly(path);
            return Ok(None);
        }

        // Header is valid and live, read the content
        let mut content = Vec::new();
        file.read_to_end(&mut content)?;
        Ok(Some(header.into_entry(content)))
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let dir = self.entries_dir();
        fs::create_dir_all(&dir)?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(bytes)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl CacheStore for FileCache {
    fn get(&self, key: &str) -> Option<CacheEntry> {
        let entry = self.entry_path(key).and_then(|path| {
            Self::read_live(&path, key, now_ms()).unwrap_or_else(|e| {
                tracing::debug!(key, error = %e, "Failed to read cache entry");
                None
            })
        });

        if entry.is_some() {
            self.counters.record_hit();
        } else {
            self.counters.record_miss();
        }
        entry
    }

    fn put(&self, entry: &CacheEntry) {
        let Some(path) = self.entry_path(&entry.key) else {
            return;
        };
        let result = entry
            .encode()
            .and_then(|bytes| self.write_atomic(&path, &bytes));
        if let Err(e) = result {
            tracing::warn!(key = %entry.key, error = %e, "Failed to write cache entry");
        }
    }

    fn remove(&self, key: &str) -> bool {
        self.entry_path(key)
            .is_some_and(|path| fs::remove_file(path).is_ok())
    }

    fn clear(&self) -> usize {
        let removed = self
            .entry_files()
            .into_iter()
            .filter(|path| fs::remove_file(path).is_ok())
            .count();
        self.remove_stale_temp_files(TEMP_FILE_GRACE);
        self.counters.reset();
        tracing::debug!(removed, "Cleared cache");
        removed
    }

    fn cleanup_expired(&self) -> usize {
        let now = now_ms();
        let removed = self
            .entry_files()
            .into_iter()
            .filter(|path| {
                let expired = File::open(path)
                    .and_then(|mut file| EntryHeader::read_from(&mut file))
                    .is_ok_and(|header| header.is_expired_at(now));
                expired && fs::remove_file(path).is_ok()
            })
            .count();
        self.remove_stale_temp_files(TEMP_FILE_GRACE);
        tracing::debug!(removed, "Removed expired cache entries");
        removed
    }

    fn stats(&self) -> CacheStats {
        let files = self.entry_files();
        let total_size_bytes = files
            .iter()
            .filter_map(|path| fs::metadata(path).ok())
            .map(|meta| meta.len())
            .sum();
        self.counters
            .snapshot(files.len() as u64, total_size_bytes)
    }
}

/// Keys become file names, so only a safe character set is accepted.
fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 128
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

fn remove_file_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        tracing::debug!(path = %path.display(), error = %e, "Failed to remove cache file");
    }
}

/// Validate the cache version, wiping the directory on mismatch.
fn validate_version(root: &Path, version: &str) {
    let version_file = root.join("VERSION");

    // Try to read the existing version
    match fs::read_to_string(&version_file) {
        Ok(stored) if stored == version => {
            // Version matches, keep cache
            tracing::debug!("cache version matches: {version}");
            return;
        }
        Ok(stored) => {
            tracing::info!(
                "cache version mismatch (stored={stored}, current={version}), wiping cache"
            );
        }
        Err(_) => {
            tracing::info!("no cache VERSION file found, initializing cache");
        }
    }

    // Wipe and recreate
    if root.exists()
        && let Err(e) = fs::remove_dir_all(root)
    {
        tracing::warn!("failed to remove cache directory: {e}");
    }
    if let Err(e) = fs::create_dir_all(root) {
        tracing::warn!("failed to create cache directory: {e}");
        return;
    }
    if let Err(e) = fs::write(&version_file, version) {
        tracing::warn!("failed to write cache VERSION file: {e}");
    }
}
