//! Speaking recordings stored as files, addressed by opaque handles.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use uuid::Uuid;

use bandscore_core::traits::RecordingStore;

/// Recording blobs under `<root>/recordings`. A handle is `<uuid>.<ext>`.
#[derive(Debug, Clone)]
pub struct FileRecordings {
    dir: PathBuf,
}

impl FileRecordings {
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join("recordings"),
        }
    }

    /// Store audio bytes and return the new handle.
    pub fn put(&self, audio: &[u8], extension: &str) -> Result<String> {
        let extension = extension.trim_start_matches('.');
        anyhow::ensure!(
            !extension.is_empty() && extension.chars().all(|c| c.is_ascii_alphanumeric()),
            "invalid recording extension: {extension:?}"
        );
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        let handle = format!("{}.{extension}", Uuid::new_v4());
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(audio)?;
        tmp.persist(self.dir.join(&handle))
            .with_context(|| format!("failed to store recording {handle}"))?;
        tracing::debug!(handle = %handle, bytes = audio.len(), "recording stored");
        Ok(handle)
    }

    /// Path of a handle's blob. `None` for handles that are not plain file
    /// names.
    pub fn path(&self, handle: &str) -> Option<PathBuf> {
        let valid = !handle.is_empty()
            && !handle.starts_with('.')
            && handle
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
        valid.then(|| self.dir.join(handle))
    }
}

impl RecordingStore for FileRecordings {
    fn resolve(&self, handle: &str) -> bool {
        self.path(handle).is_some_and(|p| p.is_file())
    }

    fn release(&self, handle: &str) -> Result<()> {
        let Some(path) = self.path(handle) else {
            return Ok(());
        };
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to release {handle}")),
        }
    }
}
