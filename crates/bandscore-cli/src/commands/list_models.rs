//! The `bandscore list-models` command.

use std::path::PathBuf;

use anyhow::Result;

use bandscore_providers::ollama::OllamaProvider;
use bandscore_providers::{create_provider, ProviderConfig};

pub async fn execute(provider_filter: Option<String>, config_path: Option<PathBuf>) -> Result<()> {
    let config = bandscore_providers::load_config_from(config_path.as_deref())?;

    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();

    let mut found_any = false;

    for name in names {
        if provider_filter.as_ref().is_some_and(|filter| filter != name) {
            continue;
        }
        let provider_config = &config.providers[name];

        let models = match provider_config {
            // Installed models are only known by asking the server.
            ProviderConfig::Ollama { base_url } => {
                match OllamaProvider::new(base_url)?.list_models_async().await {
                    Ok(models) => models,
                    Err(e) => {
                        tracing::warn!(provider = %name, "skipping: {e}");
                        continue;
                    }
                }
            }
            other => create_provider(other)?.available_models(),
        };

        if !models.is_empty() {
            found_any = true;
            println!("Provider: {name}");
            for model in &models {
                let context = if model.max_context > 0 {
                    format!("{}K context", model.max_context / 1000)
                } else {
                    "context unknown".to_string()
                };
                println!(
                    "  {} - {} ({context}, {})",
                    model.id,
                    model.name,
                    if model.structured_output {
                        "structured output"
                    } else {
                        "JSON extraction"
                    },
                );
            }
            println!();
        }
    }

    if !found_any {
        println!("No providers configured. Run `bandscore init` to create a config file.");
    }

    Ok(())
}
