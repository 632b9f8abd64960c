//! JSON-file repositories under a data directory.
//!
//! Layout:
//!
//! ```text
//! <root>/attempts/<user>.json
//! <root>/profiles/<user>.json
//! <root>/reports/<module>/<input_hash>.json
//! ```
//!
//! Every write goes to a temp file in the target directory and is renamed
//! into place, so readers never see a partial document.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use bandscore_core::model::Module;
use bandscore_core::profile::LearnerProfile;
use bandscore_core::report::StoredReport;
use bandscore_core::snapshot::AttemptSnapshot;
use bandscore_core::traits::{
    AttemptRepository, InsertOutcome, ProfileRepository, ReportRepository,
};

const SUBJECTIVE: [Module; 2] = [Module::Writing, Module::Speaking];

/// File stem for a caller-supplied key. Anything outside `[A-Za-z0-9_-]`
/// is percent-encoded so keys can never escape their directory.
pub(crate) fn file_stem(key: &str) -> String {
    let mut stem = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'-' || b == b'_' {
            stem.push(b as char);
        } else {
            stem.push_str(&format!("%{b:02X}"));
        }
    }
    if stem.is_empty() {
        stem.push('%');
    }
    stem
}

fn temp_in(dir: &Path, bytes: &[u8]) -> Result<NamedTempFile> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).context("failed to serialize document")
}

/// Replace `path` atomically.
fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().context("document path has no parent")?;
    temp_in(dir, &encode(value)?)?
        .persist(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

/// Create `path` atomically unless it already exists. Returns `false` when
/// another writer got there first.
fn create_atomic<T: Serialize>(path: &Path, value: &T) -> Result<bool> {
    let dir = path.parent().context("document path has no parent")?;
    match temp_in(dir, &encode(value)?)?.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => {
            Err(anyhow::Error::new(e.error).context(format!("failed to write {}", path.display())))
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match std::fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .with_context(|| format!("failed to parse {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(anyhow::Error::new(e).context(format!("failed to read {}", path.display()))),
    }
}

/// Run blocking file I/O off the async executor.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("file I/O task panicked")?
}

/// Attempt snapshots, one file per user.
#[derive(Debug, Clone)]
pub struct FileAttempts {
    dir: PathBuf,
}

impl FileAttempts {
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join("attempts"),
        }
    }

    fn path(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(user_id)))
    }
}

#[async_trait]
impl AttemptRepository for FileAttempts {
    async fn load(&self, user_id: &str) -> Result<Option<AttemptSnapshot>> {
        let path = self.path(user_id);
        blocking(move || read_json(&path)).await
    }

    async fn save(&self, user_id: &str, snapshot: &AttemptSnapshot) -> Result<()> {
        let path = self.path(user_id);
        let snapshot = snapshot.clone();
        blocking(move || write_atomic(&path, &snapshot)).await
    }

    async fn clear(&self, user_id: &str) -> Result<()> {
        let path = self.path(user_id);
        blocking(move || match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
        })
        .await
    }
}

/// Score reports, one file per `(module, input_hash)`.
#[derive(Debug, Clone)]
pub struct FileReports {
    dir: PathBuf,
}

impl FileReports {
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join("reports"),
        }
    }

    fn path(&self, module: Module, input_hash: &str) -> PathBuf {
        self.dir
            .join(module.to_string())
            .join(format!("{}.json", file_stem(input_hash)))
    }

    /// Every readable report. Unparseable files are skipped with a warning.
    fn scan(dir: &Path) -> Result<Vec<StoredReport>> {
        let mut reports = Vec::new();
        for module in SUBJECTIVE {
            let module_dir = dir.join(module.to_string());
            let entries = match std::fs::read_dir(&module_dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("failed to list {}", module_dir.display()))
                }
            };
            for entry in entries {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                match read_json::<StoredReport>(&path) {
                    Ok(Some(report)) => reports.push(report),
                    Ok(None) => {}
                    Err(e) => tracing::warn!("skipping {}: {e:#}", path.display()),
                }
            }
        }
        reports.sort_by_key(|r| r.created_at);
        Ok(reports)
    }
}

#[async_trait]
impl ReportRepository for FileReports {
    async fn find_by_hash(&self, module: Module, input_hash: &str) -> Result<Option<StoredReport>> {
        let path = self.path(module, input_hash);
        blocking(move || read_json(&path)).await
    }

    async fn insert_unique(&self, report: StoredReport) -> Result<InsertOutcome> {
        let path = self.path(report.module, &report.input_hash);
        blocking(move || {
            if create_atomic(&path, &report)? {
                return Ok(InsertOutcome::Inserted);
            }
            let winner: StoredReport = read_json(&path)?
                .with_context(|| format!("{} vanished after a conflict", path.display()))?;
            Ok(InsertOutcome::Conflict(Box::new(winner)))
        })
        .await
    }

    async fn latest_for(&self, user_id: &str, module: Module) -> Result<Option<StoredReport>> {
        let user_id = user_id.to_string();
        Ok(self
            .list_for(&user_id)
            .await?
            .into_iter()
            .rev()
            .find(|r| r.module == module))
    }

    async fn list_for(&self, user_id: &str) -> Result<Vec<StoredReport>> {
        let dir = self.dir.clone();
        let user_id = user_id.to_string();
        let reports = blocking(move || FileReports::scan(&dir)).await?;
        Ok(reports.into_iter().filter(|r| r.user_id == user_id).collect())
    }
}

/// Learner profiles, one file per user.
#[derive(Debug, Clone)]
pub struct FileProfiles {
    dir: PathBuf,
}

impl FileProfiles {
    pub fn new(root: &Path) -> Self {
        Self {
            dir: root.join("profiles"),
        }
    }

    fn path(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(user_id)))
    }
}

#[async_trait]
impl ProfileRepository for FileProfiles {
    async fn load(&self, user_id: &str) -> Result<Option<LearnerProfile>> {
        let path = self.path(user_id);
        blocking(move || read_json(&path)).await
    }

    async fn save(&self, profile: &LearnerProfile) -> Result<()> {
        let path = self.path(&profile.user_id);
        let profile = profile.clone();
        blocking(move || write_atomic(&path, &profile)).await
    }
}
