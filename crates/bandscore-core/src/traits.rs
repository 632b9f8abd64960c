//! Collaborator traits: LLM backends, durable stores, recording storage.
//!
//! Implemented by the `bandscore-providers` and `bandscore-store` crates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::Module;
use crate::profile::LearnerProfile;
use crate::report::StoredReport;
use crate::snapshot::AttemptSnapshot;

// ---------------------------------------------------------------------------
// LLM Provider trait
// ---------------------------------------------------------------------------

/// Trait for LLM backends that grade responses.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "openai").
    fn name(&self) -> &str;

    /// Whether `generate` honours [`GenerateRequest::response_schema`].
    fn supports_structured_output(&self) -> bool;

    /// Generate a completion for a prompt.
    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse>;

    /// List available models for this provider.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// JSON schema the backend should constrain its output to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSchema {
    /// Schema name, required by some APIs.
    pub name: String,
    pub schema: serde_json::Value,
}

/// Request to an LLM backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier (e.g. "gpt-4.1").
    pub model: String,
    /// The main prompt.
    pub prompt: String,
    /// Optional system prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature. Scoring always uses 0.
    pub temperature: f64,
    /// Structured-output schema, when the backend supports one.
    #[serde(default)]
    pub response_schema: Option<ResponseSchema>,
}

/// Response from an LLM backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// The raw response text.
    pub content: String,
    /// Parsed JSON when the backend ran in structured-output mode.
    #[serde(default)]
    pub structured: Option<serde_json::Value>,
    /// Model that actually generated the response.
    pub model: String,
    /// Token usage.
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Token accounting for one backend call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
    pub estimated_cost_usd: f64,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier.
    pub id: String,
    /// Human-readable model name.
    pub name: String,
    /// Provider name.
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
    /// Whether the model accepts a response schema.
    pub structured_output: bool,
}

// ---------------------------------------------------------------------------
// Durable stores
// ---------------------------------------------------------------------------

/// Persisted attempt snapshots, one per user.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    async fn load(&self, user_id: &str) -> anyhow::Result<Option<AttemptSnapshot>>;

    /// Replace the user's snapshot. Must be atomic: a reader sees either
    /// the old or the new snapshot, never a partial write.
    async fn save(&self, user_id: &str, snapshot: &AttemptSnapshot) -> anyhow::Result<()>;

    async fn clear(&self, user_id: &str) -> anyhow::Result<()>;
}

/// Result of a unique insert keyed by `(module, input_hash)`.
#[derive(Debug, Clone)]
pub enum InsertOutcome {
    Inserted,
    /// Another writer got there first; carries the winner's report.
    Conflict(Box<StoredReport>),
}

/// Subjective score reports.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn find_by_hash(
        &self,
        module: Module,
        input_hash: &str,
    ) -> anyhow::Result<Option<StoredReport>>;

    /// Insert unless a report with the same `(module, input_hash)` exists.
    async fn insert_unique(&self, report: StoredReport) -> anyhow::Result<InsertOutcome>;

    /// Most recent report for a user and module.
    async fn latest_for(
        &self,
        user_id: &str,
        module: Module,
    ) -> anyhow::Result<Option<StoredReport>>;

    /// All reports for a user, oldest first.
    async fn list_for(&self, user_id: &str) -> anyhow::Result<Vec<StoredReport>>;
}

/// Long-lived learner profiles.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn load(&self, user_id: &str) -> anyhow::Result<Option<LearnerProfile>>;

    async fn save(&self, profile: &LearnerProfile) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// Recording storage
// ---------------------------------------------------------------------------

/// Blob storage for speaking recordings, addressed by opaque handle.
pub trait RecordingStore: Send + Sync {
    /// Whether the handle still resolves to stored audio.
    fn resolve(&self, handle: &str) -> bool;

    /// Release the blob behind a handle. Releasing a missing handle is not
    /// an error.
    fn release(&self, handle: &str) -> anyhow::Result<()>;
}

// ---------------------------------------------------------------------------
// JSON extraction fallback
// ---------------------------------------------------------------------------

/// Degraded fallback for backends without structured output: the largest
/// `{...}` span of the text, from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
