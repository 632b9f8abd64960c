//! bandscore-store: durable storage for attempts, reports and profiles.
//!
//! Implements the repository traits from `bandscore-core` twice: as JSON
//! files under a data directory, and in memory.

pub mod fs;
pub mod memory;
pub mod recordings;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use bandscore_core::traits::{
    AttemptRepository, ProfileRepository, RecordingStore, ReportRepository,
};

pub use fs::{FileAttempts, FileProfiles, FileReports};
pub use memory::{MemoryAttempts, MemoryProfiles, MemoryRecordings, MemoryReports};
pub use recordings::FileRecordings;

/// Every store the engine needs, behind trait objects.
#[derive(Clone)]
pub struct Stores {
    pub attempts: Arc<dyn AttemptRepository>,
    pub reports: Arc<dyn ReportRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub recordings: Arc<dyn RecordingStore>,
}

impl Stores {
    /// File-backed stores rooted at `data_dir`, created if missing.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create data dir: {}", data_dir.display()))?;
        tracing::debug!(data_dir = %data_dir.display(), "opened file stores");
        Ok(Self {
            attempts: Arc::new(FileAttempts::new(data_dir)),
            reports: Arc::new(FileReports::new(data_dir)),
            profiles: Arc::new(FileProfiles::new(data_dir)),
            recordings: Arc::new(FileRecordings::new(data_dir)),
        })
    }

    /// Process-local stores.
    pub fn in_memory() -> Self {
        Self {
            attempts: Arc::new(MemoryAttempts::default()),
            reports: Arc::new(MemoryReports::default()),
            profiles: Arc::new(MemoryProfiles::default()),
            recordings: Arc::new(MemoryRecordings::default()),
        }
    }
}
