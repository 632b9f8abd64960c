//! bandscore CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use bandscore_core::model::{DeliveryMode, Module};

mod commands;

#[derive(Parser)]
#[command(name = "bandscore", version, about = "Exam attempt and scoring engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate exam papers (JSON or TOML)
    Validate {
        /// Path to a paper file or a directory of papers
        #[arg(long)]
        paper: PathBuf,
    },

    /// Grade a listening or reading answer sheet against a paper's key
    Grade {
        /// Paper file
        #[arg(long)]
        paper: PathBuf,

        /// Module to grade: listening or reading
        #[arg(long)]
        module: Module,

        /// JSON object mapping question numbers to answers
        #[arg(long)]
        answers: PathBuf,

        /// Delivery mode: computer or paper
        #[arg(long, default_value = "computer")]
        mode: DeliveryMode,

        /// Output format: table or json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Score a writing or speaking response with the configured backend
    Score {
        /// Paper file the task comes from
        #[arg(long)]
        paper: PathBuf,

        /// Module to score: writing or speaking
        #[arg(long)]
        module: Module,

        /// Writing task or speaking part number
        #[arg(long)]
        task: u8,

        /// File holding the essay or transcript
        #[arg(long)]
        response: PathBuf,

        /// Learner id the report is filed under
        #[arg(long, default_value = "local")]
        user: String,

        /// Provider name from the config (default: config's default_provider)
        #[arg(long)]
        provider: Option<String>,

        /// Model override
        #[arg(long)]
        model: Option<String>,

        /// Output format: markdown or json
        #[arg(long, default_value = "markdown")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show a learner's profile and report history
    Profile {
        /// Learner id
        #[arg(long, default_value = "local")]
        user: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// List available models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and a practice paper
    Init,
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "bandscore=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { paper } => commands::validate::execute(paper),
        Commands::Grade {
            paper,
            module,
            answers,
            mode,
            format,
        } => commands::grade::execute(paper, module, answers, mode, format).await,
        Commands::Score {
            paper,
            module,
            task,
            response,
            user,
            provider,
            model,
            format,
            config,
        } => {
            commands::score::execute(commands::score::ScoreArgs {
                paper,
                module,
                task,
                response,
                user,
                provider,
                model,
                format,
                config,
            })
            .await
        }
        Commands::Profile { user, config } => commands::profile::execute(user, config).await,
        Commands::ListModels { provider, config } => {
            commands::list_models::execute(provider, config).await
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
