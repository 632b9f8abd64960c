//! Configuration and provider factory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use bandscore_core::pipeline::{PipelineConfig, DEFAULT_PIPELINE_VERSION};
use bandscore_core::profile::DEFAULT_WEAKNESS_CAP;
use bandscore_core::timer::TimingPolicy;
use bandscore_core::traits::LlmProvider;

use crate::anthropic::AnthropicProvider;
use crate::mock::MockProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

/// Configuration for a single scoring backend.
///
/// Note: Custom Debug impl masks API keys to prevent accidental exposure in logs.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    OpenAI {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        org_id: Option<String>,
    },
    Anthropic {
        api_key: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
    /// Offline backend. Replies with a canned report unless `response` is set.
    Mock {
        #[serde(default)]
        response: Option<String>,
    },
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderConfig::OpenAI {
                api_key: _,
                base_url,
                org_id,
            } => f
                .debug_struct("OpenAI")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .field("org_id", org_id)
                .finish(),
            ProviderConfig::Anthropic {
                api_key: _,
                base_url,
            } => f
                .debug_struct("Anthropic")
                .field("api_key", &"***")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Ollama { base_url } => f
                .debug_struct("Ollama")
                .field("base_url", base_url)
                .finish(),
            ProviderConfig::Mock { response } => f
                .debug_struct("Mock")
                .field("response", response)
                .finish(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

/// Top-level bandscore configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BandscoreConfig {
    /// Provider configurations keyed by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Default provider to use.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    /// Default model to use.
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Tag folded into every input hash; bump it to invalidate cached reports.
    #[serde(default = "default_pipeline_version")]
    pub pipeline_version: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Where attempts, reports, profiles and recordings live.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_autosave_interval_ms")]
    pub autosave_interval_ms: u64,
    /// Recurring weaknesses kept per learner profile.
    #[serde(default = "default_weakness_cap")]
    pub weakness_cap: usize,
    #[serde(default)]
    pub timing: TimingPolicy,
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_model() -> String {
    "gpt-4.1-mini".to_string()
}
fn default_pipeline_version() -> String {
    DEFAULT_PIPELINE_VERSION.to_string()
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./bandscore-data")
}
fn default_autosave_interval_ms() -> u64 {
    2000
}
fn default_weakness_cap() -> usize {
    DEFAULT_WEAKNESS_CAP
}

impl Default for BandscoreConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider(),
            default_model: default_model(),
            pipeline_version: default_pipeline_version(),
            max_tokens: default_max_tokens(),
            data_dir: default_data_dir(),
            autosave_interval_ms: default_autosave_interval_ms(),
            weakness_cap: default_weakness_cap(),
            timing: TimingPolicy::default(),
        }
    }
}

impl BandscoreConfig {
    /// Pipeline settings, with `model` overriding the configured default.
    pub fn pipeline_config(&self, model: Option<&str>) -> PipelineConfig {
        PipelineConfig {
            pipeline_version: self.pipeline_version.clone(),
            model: model.unwrap_or(&self.default_model).to_string(),
            max_tokens: self.max_tokens,
            weakness_cap: self.weakness_cap,
            system_prompt_override: None,
        }
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_millis(self.autosave_interval_ms.max(1))
    }

    /// Build the named provider, or the default one. `mock` is always
    /// available even when not configured.
    pub fn resolve_provider(&self, name: Option<&str>) -> Result<Arc<dyn LlmProvider>> {
        let name = name.unwrap_or(&self.default_provider);
        let provider = match self.providers.get(name) {
            Some(config) => create_provider(config)?,
            None if name == "mock" => create_provider(&ProviderConfig::Mock { response: None })?,
            None => {
                let mut known: Vec<&str> = self.providers.keys().map(String::as_str).collect();
                known.sort_unstable();
                anyhow::bail!(
                    "provider '{name}' is not configured (configured: {})",
                    if known.is_empty() {
                        "none".to_string()
                    } else {
                        known.join(", ")
                    }
                );
            }
        };
        Ok(Arc::from(provider))
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = std::env::var(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

/// Resolve env vars in a provider config.
fn resolve_provider_config(config: &ProviderConfig) -> ProviderConfig {
    match config {
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => ProviderConfig::OpenAI {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
            org_id: org_id.as_ref().map(|o| resolve_env_vars(o)),
        },
        ProviderConfig::Anthropic { api_key, base_url } => ProviderConfig::Anthropic {
            api_key: resolve_env_vars(api_key),
            base_url: base_url.as_ref().map(|u| resolve_env_vars(u)),
        },
        ProviderConfig::Ollama { base_url } => ProviderConfig::Ollama {
            base_url: resolve_env_vars(base_url),
        },
        ProviderConfig::Mock { response } => ProviderConfig::Mock {
            response: response.clone(),
        },
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `bandscore.toml` in the current directory
/// 2. `~/.config/bandscore/config.toml`
///
/// Environment variable overrides: `BANDSCORE_OPENAI_KEY`, `BANDSCORE_ANTHROPIC_KEY`.
pub fn load_config() -> Result<BandscoreConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<BandscoreConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("bandscore.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = toml::from_str::<BandscoreConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config");
            config
        }
        None => BandscoreConfig::default(),
    };

    // Apply env var overrides
    if let Ok(key) = std::env::var("BANDSCORE_ANTHROPIC_KEY") {
        config
            .providers
            .entry("anthropic".into())
            .or_insert(ProviderConfig::Anthropic {
                api_key: String::new(),
                base_url: None,
            });
        if let Some(ProviderConfig::Anthropic { api_key, .. }) =
            config.providers.get_mut("anthropic")
        {
            *api_key = key;
        }
    }

    if let Ok(key) = std::env::var("BANDSCORE_OPENAI_KEY") {
        config
            .providers
            .entry("openai".into())
            .or_insert(ProviderConfig::OpenAI {
                api_key: String::new(),
                base_url: None,
                org_id: None,
            });
        if let Some(ProviderConfig::OpenAI { api_key, .. }) = config.providers.get_mut("openai") {
            *api_key = key;
        }
    }

    config.providers = config
        .providers
        .iter()
        .map(|(k, v)| (k.clone(), resolve_provider_config(v)))
        .collect();

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("bandscore"))
}

/// Create a provider instance from its configuration.
pub fn create_provider(config: &ProviderConfig) -> Result<Box<dyn LlmProvider>> {
    Ok(match config {
        ProviderConfig::Anthropic { api_key, base_url } => {
            Box::new(AnthropicProvider::new(api_key, base_url.clone())?)
        }
        ProviderConfig::OpenAI {
            api_key,
            base_url,
            org_id,
        } => Box::new(OpenAiProvider::new(
            api_key,
            base_url.clone(),
            org_id.clone(),
        )?),
        ProviderConfig::Ollama { base_url } => Box::new(OllamaProvider::new(base_url)?),
        ProviderConfig::Mock { response } => match response {
            Some(text) => Box::new(MockProvider::with_fixed_response(text)),
            None => Box::new(MockProvider::new()),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_BANDSCORE_TEST_VAR", "hello");
        assert_eq!(resolve_env_vars("${_BANDSCORE_TEST_VAR}"), "hello");
        assert_eq!(
            resolve_env_vars("prefix_${_BANDSCORE_TEST_VAR}_suffix"),
            "prefix_hello_suffix"
        );
        std::env::remove_var("_BANDSCORE_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = BandscoreConfig::default();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.weakness_cap, 10);
        assert_eq!(config.autosave_interval(), Duration::from_secs(2));
        assert_eq!(config.pipeline_version, DEFAULT_PIPELINE_VERSION);
    }

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
default_provider = "anthropic"
default_model = "claude-sonnet-4-20250514"
pipeline_version = "bandscore-v2"
data_dir = "/var/lib/bandscore"

[timing]
reading_secs = 1800

[providers.anthropic]
type = "anthropic"
api_key = "sk-test"

[providers.openai]
type = "openai"
api_key = "sk-openai"

[providers.local]
type = "ollama"
base_url = "http://localhost:11434"

[providers.offline]
type = "mock"
"#;
        let config: BandscoreConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.providers.len(), 4);
        assert!(matches!(
            config.providers.get("anthropic"),
            Some(ProviderConfig::Anthropic { .. })
        ));
        assert!(matches!(
            config.providers.get("offline"),
            Some(ProviderConfig::Mock { response: None })
        ));
        assert_eq!(config.timing.reading_secs, 1800);
        assert_eq!(config.timing.writing_secs, TimingPolicy::default().writing_secs);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/bandscore"));

        let pipeline = config.pipeline_config(None);
        assert_eq!(pipeline.pipeline_version, "bandscore-v2");
        assert_eq!(pipeline.model, "claude-sonnet-4-20250514");
        assert_eq!(config.pipeline_config(Some("x")).model, "x");
    }

    #[test]
    fn debug_masks_api_keys() {
        let config = ProviderConfig::OpenAI {
            api_key: "sk-secret".into(),
            base_url: None,
            org_id: None,
        };
        let printed = format!("{config:?}");
        assert!(!printed.contains("sk-secret"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn resolve_provider_by_name() {
        let config = BandscoreConfig::default();
        let mock = config.resolve_provider(Some("mock")).unwrap();
        assert_eq!(mock.name(), "mock");

        let err = config.resolve_provider(None).err().unwrap();
        assert!(err.to_string().contains("'openai' is not configured"));
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bandscore.toml");
        std::fs::write(&path, "default_provider = \"mock\"\nweakness_cap = 5\n").unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.default_provider, "mock");
        assert_eq!(config.weakness_cap, 5);

        assert!(load_config_from(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
