//! In-memory repositories. Nothing survives the process; useful for
//! embedding the engine in tests and for one-shot grading.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use bandscore_core::model::Module;
use bandscore_core::profile::LearnerProfile;
use bandscore_core::report::StoredReport;
use bandscore_core::snapshot::AttemptSnapshot;
use bandscore_core::traits::{
    AttemptRepository, InsertOutcome, ProfileRepository, RecordingStore, ReportRepository,
};

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
pub struct MemoryAttempts {
    rows: Mutex<HashMap<String, AttemptSnapshot>>,
}

#[async_trait]
impl AttemptRepository for MemoryAttempts {
    async fn load(&self, user_id: &str) -> anyhow::Result<Option<AttemptSnapshot>> {
        Ok(guard(&self.rows).get(user_id).cloned())
    }

    async fn save(&self, user_id: &str, snapshot: &AttemptSnapshot) -> anyhow::Result<()> {
        guard(&self.rows).insert(user_id.to_string(), snapshot.clone());
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> anyhow::Result<()> {
        guard(&self.rows).remove(user_id);
        Ok(())
    }
}

/// Reports in insertion order, unique on `(module, input_hash)`.
#[derive(Debug, Default)]
pub struct MemoryReports {
    rows: Mutex<Vec<StoredReport>>,
}

impl MemoryReports {
    pub fn len(&self) -> usize {
        guard(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReportRepository for MemoryReports {
    async fn find_by_hash(
        &self,
        module: Module,
        input_hash: &str,
    ) -> anyhow::Result<Option<StoredReport>> {
        Ok(guard(&self.rows)
            .iter()
            .find(|r| r.module == module && r.input_hash == input_hash)
            .cloned())
    }

    async fn insert_unique(&self, report: StoredReport) -> anyhow::Result<InsertOutcome> {
        let mut rows = guard(&self.rows);
        if let Some(existing) = rows
            .iter()
            .find(|r| r.module == report.module && r.input_hash == report.input_hash)
        {
            return Ok(InsertOutcome::Conflict(Box::new(existing.clone())));
        }
        rows.push(report);
        Ok(InsertOutcome::Inserted)
    }

    async fn latest_for(
        &self,
        user_id: &str,
        module: Module,
    ) -> anyhow::Result<Option<StoredReport>> {
        Ok(guard(&self.rows)
            .iter()
            .filter(|r| r.user_id == user_id && r.module == module)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn list_for(&self, user_id: &str) -> anyhow::Result<Vec<StoredReport>> {
        let mut reports: Vec<StoredReport> = guard(&self.rows)
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        reports.sort_by_key(|r| r.created_at);
        Ok(reports)
    }
}

#[derive(Debug, Default)]
pub struct MemoryProfiles {
    rows: Mutex<HashMap<String, LearnerProfile>>,
}

#[async_trait]
impl ProfileRepository for MemoryProfiles {
    async fn load(&self, user_id: &str) -> anyhow::Result<Option<LearnerProfile>> {
        Ok(guard(&self.rows).get(user_id).cloned())
    }

    async fn save(&self, profile: &LearnerProfile) -> anyhow::Result<()> {
        guard(&self.rows).insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }
}

/// Handle registry standing in for blob storage.
#[derive(Debug, Default)]
pub struct MemoryRecordings {
    live: Mutex<HashSet<String>>,
}

impl MemoryRecordings {
    /// Register a handle as stored audio.
    pub fn insert(&self, handle: impl Into<String>) {
        guard(&self.live).insert(handle.into());
    }
}

impl RecordingStore for MemoryRecordings {
    fn resolve(&self, handle: &str) -> bool {
        guard(&self.live).contains(handle)
    }

    fn release(&self, handle: &str) -> anyhow::Result<()> {
        guard(&self.live).remove(handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::stored;

    #[tokio::test]
    async fn unique_insert_reports_winner() {
        let reports = MemoryReports::default();
        let first = stored("u1", Module::Writing, "abc", 0);
        let second = stored("u2", Module::Writing, "abc", 5);

        assert!(matches!(
            reports.insert_unique(first.clone()).await.unwrap(),
            InsertOutcome::Inserted
        ));
        match reports.insert_unique(second).await.unwrap() {
            InsertOutcome::Conflict(winner) => assert_eq!(winner.id, first.id),
            InsertOutcome::Inserted => panic!("duplicate key inserted"),
        }
        assert_eq!(reports.len(), 1);

        // Same hash under another module is a different key.
        let speaking = stored("u1", Module::Speaking, "abc", 10);
        assert!(matches!(
            reports.insert_unique(speaking).await.unwrap(),
            InsertOutcome::Inserted
        ));
    }

    #[tokio::test]
    async fn latest_and_listing_follow_created_at() {
        let reports = MemoryReports::default();
        reports
            .insert_unique(stored("u1", Module::Writing, "b", 20))
            .await
            .unwrap();
        reports
            .insert_unique(stored("u1", Module::Writing, "a", 10))
            .await
            .unwrap();
        reports
            .insert_unique(stored("u2", Module::Writing, "c", 30))
            .await
            .unwrap();

        let latest = reports.latest_for("u1", Module::Writing).await.unwrap().unwrap();
        assert_eq!(latest.input_hash, "b");
        let listed = reports.list_for("u1").await.unwrap();
        let hashes: Vec<&str> = listed.iter().map(|r| r.input_hash.as_str()).collect();
        assert_eq!(hashes, ["a", "b"]);
        assert!(reports.latest_for("u1", Module::Speaking).await.unwrap().is_none());
    }

    #[test]
    fn recordings_release_is_idempotent() {
        let store = MemoryRecordings::default();
        store.insert("rec-1");
        assert!(store.resolve("rec-1"));
        store.release("rec-1").unwrap();
        store.release("rec-1").unwrap();
        assert!(!store.resolve("rec-1"));
    }
}
