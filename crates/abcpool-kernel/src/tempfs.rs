//! Run-scoped temporary storage.
//!
//! One uniquely named root directory per run; every worker gets an
//! exclusive subdirectory under it. Names combine caller context with a
//! monotonically increasing counter, so no two workers ever share a path.
//! The whole tree is removed by `purge()` or on drop, unless the caller
//! asked to keep it.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use abcpool_types::Result;
use tempfile::TempDir;

/// Scoped temp storage shared read-only across workers.
#[derive(Debug)]
pub struct TempFileSystem {
    // None once purged or released to the caller via `keep`.
    root: Option<TempDir>,
    root_path: PathBuf,
    counter: AtomicU64,
    keep: bool,
}

impl TempFileSystem {
    /// Create the run root under `parent`, named `<prefix><random>`.
    ///
    /// With `keep` set, the tree survives purge/drop (debugging aid).
    pub fn new(parent: &Path, prefix: &str, keep: bool) -> Result<Self> {
        let root = tempfile::Builder::new().prefix(prefix).tempdir_in(parent)?;
        let root_path = root.path().to_path_buf();
        tracing::debug!(root = %root_path.display(), "created temp root");
        Ok(Self {
            root: Some(root),
            root_path,
            counter: AtomicU64::new(0),
            keep,
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.root_path
    }

    /// Create an exclusive subdirectory. `context` distinguishes siblings
    /// in listings (e.g. `sim-1000-8812`); the counter guarantees
    /// uniqueness even for identical context strings.
    pub fn create_subdir(&self, context: &str) -> Result<PathBuf> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = self.root_path.join(format!("{context}-{n:04}"));
        std::fs::create_dir(&path)?;
        Ok(path)
    }

    /// Reserve a unique file path under `parent` without creating the file.
    pub fn file_path(&self, parent: &Path, prefix: &str) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        parent.join(format!("{prefix}{n:04}"))
    }

    /// Remove the entire tree now. Idempotent; a no-op when keeping temps.
    pub fn purge(&mut self) -> Result<()> {
        if let Some(root) = self.root.take() {
            if self.keep {
                tracing::info!(root = %self.root_path.display(), "keeping temp files");
                let _ = root.keep();
            } else {
                tracing::debug!(root = %self.root_path.display(), "purging temp files");
                root.close()?;
            }
        }
        Ok(())
    }
}

impl Drop for TempFileSystem {
    fn drop(&mut self) {
        // The TempDir guard deletes on drop; with `keep` set, release it
        // first so an unpurged drop still leaves the tree behind.
        if self.keep {
            if let Some(root) = self.root.take() {
                let _ = root.keep();
            }
        }
    }
}
