//! Per-instance scratch directory for converters that only work with files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tempfile::TempDir;

/// Lazily created temporary directory, removed by [`ScratchDir::release`].
#[derive(Debug)]
pub(crate) struct ScratchDir {
    prefix: &'static str,
    dir: Mutex<Option<TempDir>>,
    counter: AtomicU64,
}

/// Input and output paths reserved for one render.
#[derive(Debug)]
pub(crate) struct ScratchFiles {
    pub input: PathBuf,
    pub output: PathBuf,
}

impl ScratchFiles {
    /// Best-effort removal once the render is done.
    pub fn remove(&self) {
        let _ = fs::remove_file(&self.input);
        let _ = fs::remove_file(&self.output);
    }
}

impl ScratchDir {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            dir: Mutex::new(None),
            counter: AtomicU64::new(0),
        }
    }

    /// Reserve a unique input/output pair, creating the directory on first use.
    pub fn reserve(&self, input_ext: &str, output_ext: &str) -> io::Result<ScratchFiles> {
        let mut guard = self.dir.lock().unwrap_or_else(PoisonError::into_inner);
        let dir = match guard.take() {
            Some(dir) => dir,
            None => tempfile::Builder::new().prefix(self.prefix).tempdir()?,
        };
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let files = ScratchFiles {
            input: dir.path().join(format!("diagram-{n}.{input_ext}")),
            output: dir.path().join(format!("diagram-{n}.{output_ext}")),
        };
        *guard = Some(dir);
        Ok(files)
    }

    /// Path of the directory, if it has been created.
    #[cfg(test)]
    pub fn path(&self) -> Option<PathBuf> {
        self.dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|dir| dir.path().to_path_buf())
    }

    /// Delete the directory. Safe to call repeatedly.
    pub fn release(&self) {
        let dir = self
            .dir
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dir) = dir {
            let path: &Path = dir.path();
            tracing::debug!(path = %path.display(), "Removing scratch directory");
            if let Err(e) = dir.close() {
                tracing::warn!(error = %e, "Failed to remove scratch directory");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_unique_paths() {
        let scratch = ScratchDir::new("dr-test-");
        let a = scratch.reserve("mmd", "svg").unwrap();
        let b = scratch.reserve("mmd", "svg").unwrap();

        assert_ne!(a.input, b.input);
        assert_eq!(a.input.parent(), b.input.parent());
        assert_eq!(a.output.extension().unwrap(), "svg");
    }

    #[test]
    fn test_release_is_idempotent() {
        let scratch = ScratchDir::new("dr-test-");
        scratch.reserve("mmd", "svg").unwrap();
        let path = scratch.path().unwrap();
        assert!(path.exists());

        scratch.release();
        assert!(!path.exists());
        scratch.release();
        assert!(scratch.path().is_none());
    }
}
