//! In-crate test doubles for the collaborator traits.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::model::Module;
use crate::profile::LearnerProfile;
use crate::report::StoredReport;
use crate::snapshot::AttemptSnapshot;
use crate::traits::{
    AttemptRepository, GenerateRequest, GenerateResponse, InsertOutcome, LlmProvider, ModelInfo,
    ProfileRepository, RecordingStore, ReportRepository, TokenUsage,
};

/// Backend returning a fixed body, optionally slowly or as an error.
pub struct FakeBackend {
    pub body: Mutex<String>,
    pub structured: bool,
    pub fail: bool,
    pub delay: Duration,
    pub calls: AtomicU32,
    pub last_request: Mutex<Option<GenerateRequest>>,
}

impl FakeBackend {
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: Mutex::new(body.into()),
            structured: false,
            fail: false,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn supports_structured_output(&self) -> bool {
        self.structured
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            anyhow::bail!("connection refused");
        }
        let content = self.body.lock().unwrap().clone();
        let structured = if self.structured {
            serde_json::from_str(&content).ok()
        } else {
            None
        };
        Ok(GenerateResponse {
            content,
            structured,
            model: request.model.clone(),
            token_usage: TokenUsage::default(),
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        Vec::new()
    }
}

#[derive(Default)]
pub struct MemReports {
    pub rows: Mutex<Vec<StoredReport>>,
}

#[async_trait]
impl ReportRepository for MemReports {
    async fn find_by_hash(
        &self,
        module: Module,
        hash: &str,
    ) -> anyhow::Result<Option<StoredReport>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.module == module && r.input_hash == hash)
            .cloned())
    }

    async fn insert_unique(&self, report: StoredReport) -> anyhow::Result<InsertOutcome> {
        let mut rows = self.rows.lock().unwrap();
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
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id && r.module == module)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn list_for(&self, user_id: &str) -> anyhow::Result<Vec<StoredReport>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemProfiles {
    pub rows: Mutex<HashMap<String, LearnerProfile>>,
    /// Pause after reading, widening the window between load and save.
    pub load_delay: Duration,
}

#[async_trait]
impl ProfileRepository for MemProfiles {
    async fn load(&self, user_id: &str) -> anyhow::Result<Option<LearnerProfile>> {
        let found = self.rows.lock().unwrap().get(user_id).cloned();
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        Ok(found)
    }

    async fn save(&self, profile: &LearnerProfile) -> anyhow::Result<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemAttempts {
    pub rows: Mutex<HashMap<String, AttemptSnapshot>>,
    pub saves: AtomicU32,
}

impl MemAttempts {
    pub fn saves(&self) -> u32 {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttemptRepository for MemAttempts {
    async fn load(&self, user_id: &str) -> anyhow::Result<Option<AttemptSnapshot>> {
        Ok(self.rows.lock().unwrap().get(user_id).cloned())
    }

    async fn save(&self, user_id: &str, snapshot: &AttemptSnapshot) -> anyhow::Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.rows
            .lock()
            .unwrap()
            .insert(user_id.to_string(), snapshot.clone());
        Ok(())
    }

    async fn clear(&self, user_id: &str) -> anyhow::Result<()> {
        self.rows.lock().unwrap().remove(user_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemBlobs {
    pub live: Mutex<Vec<String>>,
    pub released: Mutex<Vec<String>>,
}

impl RecordingStore for MemBlobs {
    fn resolve(&self, handle: &str) -> bool {
        self.live.lock().unwrap().iter().any(|h| h == handle)
    }

    fn release(&self, handle: &str) -> anyhow::Result<()> {
        self.live.lock().unwrap().retain(|h| h != handle);
        self.released.lock().unwrap().push(handle.to_string());
        Ok(())
    }
}
