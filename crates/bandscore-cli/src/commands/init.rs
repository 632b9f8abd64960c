//! The `bandscore init` command.

use anyhow::{Context, Result};

use bandscore_core::sample::sample_paper;

pub fn execute() -> Result<()> {
    if std::path::Path::new("bandscore.toml").exists() {
        println!("bandscore.toml already exists, skipping.");
    } else {
        std::fs::write("bandscore.toml", SAMPLE_CONFIG)?;
        println!("Created bandscore.toml");
    }

    std::fs::create_dir_all("papers")?;
    let paper_path = std::path::Path::new("papers/practice-1.json");
    if paper_path.exists() {
        println!("papers/practice-1.json already exists, skipping.");
    } else {
        let json = serde_json::to_string_pretty(&sample_paper())
            .context("failed to serialize practice paper")?;
        std::fs::write(paper_path, json)?;
        println!("Created papers/practice-1.json");
    }

    println!("\nNext steps:");
    println!("  1. Edit bandscore.toml with your API keys");
    println!("  2. Run: bandscore validate --paper papers/practice-1.json");
    println!("  3. Run: bandscore grade --paper papers/practice-1.json --module reading --answers answers.json");
    println!("  4. Run: bandscore score --paper papers/practice-1.json --module writing --task 2 --response essay.txt");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# bandscore configuration

default_provider = "openai"
default_model = "gpt-4.1-mini"
pipeline_version = "bandscore-v1"
data_dir = "./bandscore-data"
autosave_interval_ms = 2000
weakness_cap = 10

[timing]
listening_secs = 1800
listening_check_secs = 120
listening_transfer_secs = 600
reading_secs = 3600
writing_secs = 3600
speaking_secs = 840

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"

[providers.mock]
type = "mock"
"#;
