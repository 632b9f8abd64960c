//! The `bandscore score` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use bandscore_core::model::Module;
use bandscore_core::pipeline::{ScoringRequest, SubjectivePipeline};
use bandscore_store::Stores;

pub struct ScoreArgs {
    pub paper: PathBuf,
    pub module: Module,
    pub task: u8,
    pub response: PathBuf,
    pub user: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub format: String,
    pub config: Option<PathBuf>,
}

pub async fn execute(args: ScoreArgs) -> Result<()> {
    if !matches!(args.format.as_str(), "markdown" | "json") {
        anyhow::bail!(
            "unknown format '{}' (expected markdown or json)",
            args.format
        );
    }

    let config = bandscore_providers::load_config_from(args.config.as_deref())?;
    let paper = bandscore_core::parser::parse_paper(&args.paper)?;

    let prompt_text = match args.module {
        Module::Writing => paper
            .writing_task(args.task)
            .map(|t| t.prompt.clone())
            .with_context(|| format!("paper has no writing task {}", args.task))?,
        Module::Speaking => paper
            .speaking_part(args.task)
            .map(|p| {
                let mut prompt = p.prompt.clone();
                for question in &p.questions {
                    prompt.push('\n');
                    prompt.push_str(question);
                }
                prompt
            })
            .with_context(|| format!("paper has no speaking part {}", args.task))?,
        other => anyhow::bail!("{other} is graded from the answer key; use `bandscore grade`"),
    };
    let response_text = std::fs::read_to_string(&args.response)
        .with_context(|| format!("failed to read response: {}", args.response.display()))?;

    let provider = config.resolve_provider(args.provider.as_deref())?;
    let stores = Stores::open(&config.data_dir)?;
    let pipeline = SubjectivePipeline::new(
        provider,
        stores.reports,
        stores.profiles,
        config.pipeline_config(args.model.as_deref()),
    );

    let scored = pipeline
        .score(ScoringRequest {
            user_id: args.user,
            module: args.module,
            task: Some(args.task),
            prompt_text,
            response_text,
        })
        .await?;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&scored.stored)?);
        return Ok(());
    }

    let stored = &scored.stored;
    println!(
        "{} task {} for {} (report {}{})\n",
        stored.module,
        args.task,
        stored.user_id,
        stored.id,
        if scored.cache_hit { ", cached" } else { "" }
    );
    println!("{}", stored.report.to_markdown());
    Ok(())
}
