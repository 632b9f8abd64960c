//! Mock provider for testing and offline use.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use bandscore_core::model::Module;
use bandscore_core::traits::{
    GenerateRequest, GenerateResponse, LlmProvider, ModelInfo, TokenUsage,
};

use crate::error::ProviderError;

/// A mock LLM provider for exercising the scoring pipeline without real
/// API calls.
///
/// By default it answers every request with a well-formed score report for
/// the module named in the prompt, with every criterion at the same band.
pub struct MockProvider {
    /// Fixed reply text. `None` means "canned report".
    fixed_response: Option<String>,
    band: f64,
    structured: bool,
    fail: bool,
    /// Number of calls made.
    call_count: AtomicU32,
    /// Last request received.
    last_request: Mutex<Option<GenerateRequest>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            fixed_response: None,
            band: 6.0,
            structured: true,
            fail: false,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that always replies with the same text.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            fixed_response: Some(response.to_string()),
            structured: false,
            ..Self::default()
        }
    }

    /// Band used for every criterion of the canned report.
    pub fn with_band(mut self, band: f64) -> Self {
        self.band = band;
        self
    }

    /// Toggle structured-output support.
    pub fn structured(mut self, structured: bool) -> Self {
        self.structured = structured;
        self
    }

    /// Make every call fail as if the backend were down.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Get the number of calls made to this provider.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Get the last request made to this provider.
    pub fn last_request(&self) -> Option<GenerateRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn canned_report(&self, module: Module) -> Value {
        let mut criteria = Map::new();
        let mut rationale = Map::new();
        for criterion in module.criteria() {
            criteria.insert(criterion.as_str().to_string(), json!(self.band));
            rationale.insert(
                criterion.as_str().to_string(),
                json!([format!("Consistent with band {} descriptors.", self.band)]),
            );
        }
        json!({
            "overall_band": self.band,
            "criteria": criteria,
            "band_rationale": rationale,
            "top_3_weaknesses": [
                {"area": "grammar", "pattern": "article omission", "impact": "medium"},
                {"area": "lexical", "pattern": "repetition of common words", "impact": "medium"},
                {"area": "coherence", "pattern": "weak paragraph links", "impact": "low"}
            ],
            "next_steps_7_days": [
                {
                    "focus": "articles",
                    "exercise": "Rewrite one paragraph a day checking every noun phrase",
                    "success_metric": "Fewer than 2 article errors per 250 words"
                }
            ],
            "delta_vs_last_attempt": {"overall": 0.0, "criteria": {}}
        })
    }
}

/// The pipeline labels speaking prompts "Speaking part"; anything else is
/// treated as writing.
fn module_of(request: &GenerateRequest) -> Module {
    if request.prompt.starts_with("Speaking part") {
        Module::Speaking
    } else {
        Module::Writing
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn supports_structured_output(&self) -> bool {
        self.structured
    }

    async fn generate(&self, request: &GenerateRequest) -> anyhow::Result<GenerateResponse> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(request.clone());

        if self.fail {
            return Err(ProviderError::NetworkError("mock backend is down".into()).into());
        }

        let (content, structured) = match &self.fixed_response {
            Some(text) => (text.clone(), None),
            None => {
                let report = self.canned_report(module_of(request));
                let structured =
                    (self.structured && request.response_schema.is_some()).then(|| report.clone());
                (report.to_string(), structured)
            }
        };

        let prompt_tokens = (request.prompt.len() / 4) as u32; // Rough estimate
        let completion_tokens = (content.len() / 4) as u32;

        Ok(GenerateResponse {
            content,
            structured,
            model: request.model.clone(),
            token_usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
                estimated_cost_usd: 0.0,
            },
            latency_ms: 1,
        })
    }

    fn available_models(&self) -> Vec<ModelInfo> {
        vec![ModelInfo {
            id: "mock-model".into(),
            name: "Mock Model".into(),
            provider: "mock".into(),
            max_context: 100_000,
            structured_output: self.structured,
        }]
    }
}
