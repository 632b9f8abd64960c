//! bandscore-providers: scoring backends.
//!
//! Implements the `LlmProvider` trait for OpenAI, Anthropic, Ollama and an
//! offline mock, plus the `bandscore.toml` configuration that selects them.

pub mod anthropic;
pub mod config;
pub mod error;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{create_provider, load_config, load_config_from, BandscoreConfig, ProviderConfig};
pub use error::ProviderError;
pub use mock::MockProvider;
