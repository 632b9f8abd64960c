//! LLM-backed scoring for writing and speaking.
//!
//! Each `(module, input_hash)` is scored at most once. The hash covers the
//! pipeline version, the task prompt and the candidate response, so changing
//! any of them yields a fresh grade while repeats are served from storage.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::ScoringError;
use crate::model::Module;
use crate::profile::{LearnerProfile, ProfileAggregator, DEFAULT_WEAKNESS_CAP};
use crate::report::{response_schema, ScoreReport, StoredReport};
use crate::traits::{
    extract_json_object, GenerateRequest, GenerateResponse, InsertOutcome, LlmProvider,
    ProfileRepository, ReportRepository, ResponseSchema,
};

/// Bump when prompts or validation change so old grades are not reused.
pub const DEFAULT_PIPELINE_VERSION: &str = "bandscore-v1";

const SYSTEM_PROMPT: &str = "You are a certified IELTS examiner. Grade the candidate's response \
against the public band descriptors. Reply with a single JSON object and nothing else.";

/// Configuration for the scoring pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub pipeline_version: String,
    /// Model identifier passed to the backend.
    pub model: String,
    pub max_tokens: u32,
    /// Recurring weaknesses kept per profile.
    pub weakness_cap: usize,
    /// Optional system prompt override.
    pub system_prompt_override: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline_version: DEFAULT_PIPELINE_VERSION.to_string(),
            model: "gpt-4.1-mini".to_string(),
            max_tokens: 2048,
            weakness_cap: DEFAULT_WEAKNESS_CAP,
            system_prompt_override: None,
        }
    }
}

/// One response to grade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringRequest {
    pub user_id: String,
    pub module: Module,
    /// Writing task or speaking part number, when known.
    pub task: Option<u8>,
    /// The task prompt shown to the candidate.
    pub prompt_text: String,
    /// The candidate's essay or speaking transcript.
    pub response_text: String,
}

/// A stored report and whether it came from the cache.
#[derive(Debug, Clone)]
pub struct ScoredReport {
    pub stored: StoredReport,
    pub cache_hit: bool,
}

/// `sha256(version ‖ prompt ‖ response)` with each field length-prefixed,
/// hex encoded.
pub fn input_hash(pipeline_version: &str, prompt: &str, response: &str) -> String {
    let mut hasher = Sha256::new();
    for field in [pipeline_version, prompt, response] {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

type KeyLock = Arc<tokio::sync::Mutex<()>>;

/// Async locks by key. An entry lives only while someone holds or waits on it.
struct KeyedLocks<K> {
    // Never held across an await.
    locks: Mutex<HashMap<K, KeyLock>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn acquire(&self, key: &K) -> KeyLock {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Call after dropping the guard.
    fn release(&self, key: &K, lock: KeyLock) {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        // Clones are only taken under this mutex, so a count of two is
        // the map's and ours: no waiter can be left on a removed lock.
        let idle = Arc::strong_count(&lock) == 2;
        if idle && locks.get(key).is_some_and(|l| Arc::ptr_eq(l, &lock)) {
            locks.remove(key);
        }
    }
}

struct Inner {
    provider: Arc<dyn LlmProvider>,
    reports: Arc<dyn ReportRepository>,
    profiles: Arc<dyn ProfileRepository>,
    aggregator: ProfileAggregator,
    config: PipelineConfig,
    inflight: KeyedLocks<(Module, String)>,
    // Load, fold and save of one profile must not interleave.
    profile_locks: KeyedLocks<String>,
}

/// The subjective scoring pipeline. Cheap to clone.
#[derive(Clone)]
pub struct SubjectivePipeline {
    inner: Arc<Inner>,
}

impl SubjectivePipeline {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        reports: Arc<dyn ReportRepository>,
        profiles: Arc<dyn ProfileRepository>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                reports,
                profiles,
                aggregator: ProfileAggregator::new(config.weakness_cap),
                config,
                inflight: KeyedLocks::new(),
                profile_locks: KeyedLocks::new(),
            }),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Start scoring on a background task.
    ///
    /// The task runs to completion and persists its result even if the
    /// handle is dropped.
    pub fn spawn(&self, request: ScoringRequest) -> JoinHandle<Result<ScoredReport, ScoringError>> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.score(request).await })
    }

    /// Score and wait for the result.
    pub async fn score(&self, request: ScoringRequest) -> Result<ScoredReport, ScoringError> {
        self.spawn(request)
            .await
            .map_err(|e| ScoringError::TaskFailed(e.to_string()))?
    }
}

impl Inner {
    #[tracing::instrument(skip_all, fields(module = %request.module, user = %request.user_id))]
    async fn score(&self, request: ScoringRequest) -> Result<ScoredReport, ScoringError> {
        if request.module.is_objective() {
            return Err(ScoringError::NotSubjective(request.module));
        }
        if request.response_text.trim().is_empty() {
            return Err(ScoringError::EmptyResponse);
        }

        let hash = input_hash(
            &self.config.pipeline_version,
            &request.prompt_text,
            &request.response_text,
        );
        if let Some(stored) = self.cached(request.module, &hash).await? {
            return Ok(self.hit(&request, stored).await);
        }

        let key = (request.module, hash);
        let lock = self.inflight.acquire(&key);
        let result = {
            let _guard = lock.lock().await;
            // Whoever held the lock before us may have stored the report.
            match self.cached(key.0, &key.1).await {
                Ok(Some(stored)) => Ok(self.hit(&request, stored).await),
                Ok(None) => self.grade(&request, &key.1).await,
                Err(e) => Err(e),
            }
        };
        self.inflight.release(&key, lock);
        result
    }

    async fn cached(
        &self,
        module: Module,
        hash: &str,
    ) -> Result<Option<StoredReport>, ScoringError> {
        let found = self
            .reports
            .find_by_hash(module, hash)
            .await
            .map_err(ScoringError::Storage)?;
        if let Some(stored) = &found {
            tracing::debug!(id = %stored.id, "score cache hit");
        }
        Ok(found)
    }

    /// Serve a stored report. One scored for another learner is still
    /// folded into the requester's profile, once per report.
    async fn hit(&self, request: &ScoringRequest, stored: StoredReport) -> ScoredReport {
        if stored.user_id != request.user_id {
            if let Err(e) = self
                .update_profile(&request.user_id, &stored, Utc::now())
                .await
            {
                tracing::warn!(user = %request.user_id, "profile update failed: {e:#}");
            }
        }
        ScoredReport {
            stored,
            cache_hit: true,
        }
    }

    async fn grade(
        &self,
        request: &ScoringRequest,
        hash: &str,
    ) -> Result<ScoredReport, ScoringError> {
        let previous = self
            .reports
            .latest_for(&request.user_id, request.module)
            .await
            .map_err(ScoringError::Storage)?;

        let response = self
            .provider
            .generate(&self.build_request(request))
            .await
            .map_err(ScoringError::BackendUnavailable)?;
        let value = parse_output(&response)?;
        let report = ScoreReport::from_model_output(
            request.module,
            &value,
            previous.as_ref().map(|p| &p.report),
        )?;

        let stored = StoredReport {
            id: Uuid::new_v4(),
            user_id: request.user_id.clone(),
            module: request.module,
            task: request.task,
            input_hash: hash.to_string(),
            pipeline_version: self.config.pipeline_version.clone(),
            model: response.model.clone(),
            created_at: Utc::now(),
            token_usage: response.token_usage.clone(),
            report,
        };

        match self
            .reports
            .insert_unique(stored.clone())
            .await
            .map_err(ScoringError::Storage)?
        {
            InsertOutcome::Inserted => {}
            InsertOutcome::Conflict(winner) => {
                tracing::debug!(id = %winner.id, "lost insert race; using stored report");
                return Ok(self.hit(request, *winner).await);
            }
        }

        tracing::info!(
            id = %stored.id,
            overall = stored.report.overall_band,
            latency_ms = response.latency_ms,
            "response scored"
        );
        if let Err(e) = self
            .update_profile(&stored.user_id, &stored, stored.created_at)
            .await
        {
            tracing::warn!(user = %stored.user_id, "profile update failed: {e:#}");
        }
        Ok(ScoredReport {
            stored,
            cache_hit: false,
        })
    }

    fn build_request(&self, request: &ScoringRequest) -> GenerateRequest {
        let module = request.module;
        let keys: Vec<&str> = module.criteria().iter().map(|c| c.as_str()).collect();
        let (task_label, response_label) = match module {
            Module::Speaking => ("Speaking part", "Transcript of the candidate's answer"),
            _ => ("Writing task", "Candidate's essay"),
        };
        let task_line = request
            .task
            .map(|n| format!("{task_label} {n}"))
            .unwrap_or_else(|| task_label.to_string());

        let prompt = format!(
            "{task_line}:\n{}\n\n{response_label}:\n{}\n\n\
             Return JSON with: overall_band, criteria {{{keys}}} (bands 0-9 in half steps), \
             band_rationale {{{keys}}} (lists of short strings), top_3_weaknesses \
             (exactly 3 objects with area, pattern, impact), next_steps_7_days \
             (objects with focus, exercise, success_metric), delta_vs_last_attempt \
             {{overall, criteria}} (zeros are fine).",
            request.prompt_text,
            request.response_text,
            keys = keys.join(", "),
        );

        let response_schema = self
            .provider
            .supports_structured_output()
            .then(|| ResponseSchema {
                name: format!("{module}_score_report"),
                schema: response_schema(module),
            });

        GenerateRequest {
            model: self.config.model.clone(),
            prompt,
            system_prompt: Some(
                self.config
                    .system_prompt_override
                    .clone()
                    .unwrap_or_else(|| SYSTEM_PROMPT.to_string()),
            ),
            max_tokens: self.config.max_tokens,
            temperature: 0.0,
            response_schema,
        }
    }

    async fn update_profile(
        &self,
        user_id: &str,
        stored: &StoredReport,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let key = user_id.to_string();
        let lock = self.profile_locks.acquire(&key);
        let result = {
            let _guard = lock.lock().await;
            self.fold_into(user_id, stored, at).await
        };
        self.profile_locks.release(&key, lock);
        result
    }

    async fn fold_into(
        &self,
        user_id: &str,
        stored: &StoredReport,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut profile = self
            .profiles
            .load(user_id)
            .await?
            .unwrap_or_else(|| LearnerProfile::new(user_id, at));
        if self.aggregator.fold_report(&mut profile, stored, at) {
            self.profiles.save(&profile).await?;
        }
        Ok(())
    }
}

/// Backend output as JSON. Structured output wins; otherwise the raw text,
/// then the largest `{...}` span as a degraded fallback.
fn parse_output(response: &GenerateResponse) -> Result<serde_json::Value, ScoringError> {
    if let Some(value) = &response.structured {
        return Ok(value.clone());
    }
    if let Ok(value) = serde_json::from_str(response.content.trim()) {
        return Ok(value);
    }
    let span = extract_json_object(&response.content).ok_or_else(|| {
        ScoringError::MalformedOutput("no JSON object in backend output".to_string())
    })?;
    tracing::warn!("backend output was not pure JSON; using extracted object");
    serde_json::from_str(span).map_err(|e| ScoringError::MalformedOutput(e.to_string()))
}
