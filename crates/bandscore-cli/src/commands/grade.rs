//! The `bandscore grade` command.
//!
//! Runs an answer sheet through a full attempt: enter the module, set each
//! answer, submit. Attempt state is kept in memory only.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;

use bandscore_core::attempt::Action;
use bandscore_core::controller::{ControllerDeps, ExamController, ModuleOutcome};
use bandscore_core::model::{AnswerValue, DeliveryMode, ExamPaper, Module, Question};
use bandscore_core::objective::ObjectiveResult;
use bandscore_core::timer::TimingPolicy;
use bandscore_store::Stores;

pub async fn execute(
    paper_path: PathBuf,
    module: Module,
    answers_path: PathBuf,
    mode: DeliveryMode,
    format: String,
) -> Result<()> {
    if !module.is_objective() {
        anyhow::bail!("{module} is scored by a backend; use `bandscore score`");
    }

    let paper = Arc::new(bandscore_core::parser::parse_paper(&paper_path)?);
    let content = std::fs::read_to_string(&answers_path)
        .with_context(|| format!("failed to read answers: {}", answers_path.display()))?;
    let raw: BTreeMap<String, String> = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse answers: {}", answers_path.display()))?;

    let mut answers = Vec::with_capacity(raw.len());
    for (key, text) in raw {
        let number: u32 = key
            .trim()
            .parse()
            .with_context(|| format!("answer key '{key}' is not a question number"))?;
        answers.push((number, answer_value(&paper, module, number, text)?));
    }

    let stores = Stores::in_memory();
    let deps = ControllerDeps {
        attempts: stores.attempts,
        recordings: stores.recordings,
        pipeline: None,
        timing: TimingPolicy::default(),
    };
    let now = Utc::now();
    let controller = ExamController::resume_or_start(paper, "local", mode, deps, now)
        .await?
        .controller;

    controller.enter_module(module, now).await?;
    for (number, value) in answers {
        controller
            .dispatch(
                Action::SetAnswer {
                    module,
                    number,
                    value,
                },
                now,
            )
            .await?;
    }

    let result = match controller.submit_module(module, now).await? {
        ModuleOutcome::Objective(result) => result,
        _ => anyhow::bail!("{module} could not be scored against this paper"),
    };

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        "table" => print_result(&result),
        other => anyhow::bail!("unknown format '{other}' (expected table or json)"),
    }
    Ok(())
}

/// The answer shape a question's widget would produce.
fn answer_value(
    paper: &ExamPaper,
    module: Module,
    number: u32,
    text: String,
) -> Result<AnswerValue> {
    let question = paper
        .questions(module)
        .into_iter()
        .find(|q| q.number() == number)
        .with_context(|| format!("{module} has no question {number}"))?;
    Ok(match question {
        Question::Text { .. } => AnswerValue::Text(text),
        Question::MultipleChoice { .. } => AnswerValue::Choice(text),
        Question::MapLabel { .. } | Question::Matching { .. } | Question::Tfng { .. } => {
            AnswerValue::Dropdown(text)
        }
    })
}

fn print_result(result: &ObjectiveResult) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["#", "Given", "Expected", "Result"]);
    for verdict in &result.verdicts {
        table.add_row(vec![
            Cell::new(verdict.number),
            Cell::new(verdict.given.as_deref().unwrap_or("-")),
            Cell::new(&verdict.expected),
            Cell::new(if verdict.correct { "correct" } else { "wrong" }),
        ]);
    }
    println!("{table}");
    println!(
        "\n{}: {}/{} correct, band {:.1}",
        result.module, result.raw_score, result.total, result.band
    );
}
