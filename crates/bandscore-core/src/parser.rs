//! Exam paper loader.
//!
//! Loads papers from JSON or TOML files and directories, and validates them.
//! A paper that fails validation is refused as a whole; lints are advisory.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::ContentError;
use crate::matcher::{alternatives, normalize};
use crate::model::{ExamPaper, Module, Question, OBJECTIVE_QUESTION_COUNT};

const LISTENING_SECTIONS: usize = 4;
const READING_PASSAGES: usize = 3;
const WRITING_TASKS: usize = 2;
const SPEAKING_PARTS: usize = 3;

const JUDGEMENTS: [&str; 5] = ["true", "false", "not given", "yes", "no"];

/// On-disk paper encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaperFormat {
    Json,
    Toml,
}

impl PaperFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "json" => Some(PaperFormat::Json),
            "toml" => Some(PaperFormat::Toml),
            _ => None,
        }
    }
}

/// Parse and validate a paper file. The format follows the extension.
pub fn parse_paper(path: &Path) -> Result<ExamPaper> {
    let format = PaperFormat::from_path(path)
        .with_context(|| format!("unsupported paper extension: {}", path.display()))?;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read exam paper: {}", path.display()))?;

    parse_paper_str(&content, format)
        .with_context(|| format!("invalid exam paper: {}", path.display()))
}

/// Parse and validate a paper from a string.
pub fn parse_paper_str(content: &str, format: PaperFormat) -> Result<ExamPaper, ContentError> {
    let paper: ExamPaper = match format {
        PaperFormat::Json => {
            serde_json::from_str(content).map_err(|e| ContentError::Parse(e.to_string()))?
        }
        PaperFormat::Toml => {
            toml::from_str(content).map_err(|e| ContentError::Parse(e.to_string()))?
        }
    };
    validate_paper(&paper)?;
    Ok(paper)
}

/// Recursively load all `.json` and `.toml` papers from a directory.
/// Invalid papers are skipped with a warning.
pub fn load_paper_directory(dir: &Path) -> Result<Vec<ExamPaper>> {
    let mut papers = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            papers.extend(load_paper_directory(&path)?);
        } else if PaperFormat::from_path(&path).is_some() {
            match parse_paper(&path) {
                Ok(paper) => papers.push(paper),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    papers.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(papers)
}

/// Structural validation. Returns the first violation found.
pub fn validate_paper(paper: &ExamPaper) -> Result<(), ContentError> {
    if paper.id.trim().is_empty() {
        return Err(ContentError::MissingId);
    }
    check_count("listening sections", LISTENING_SECTIONS, paper.listening.len())?;
    check_count("reading passages", READING_PASSAGES, paper.reading.len())?;

    for module in [Module::Listening, Module::Reading] {
        let questions = paper.questions(module);
        let what = match module {
            Module::Listening => "listening questions",
            _ => "reading questions",
        };
        check_count(what, OBJECTIVE_QUESTION_COUNT as usize, questions.len())?;
        for (i, q) in questions.iter().enumerate() {
            let expected = i as u32 + 1;
            if q.number() != expected {
                return Err(ContentError::BadNumbering {
                    module,
                    position: i + 1,
                    expected,
                    found: q.number(),
                });
            }
            check_answer(module, q)?;
        }

        if let Some(table) = paper.band_table(module) {
            table
                .validate(OBJECTIVE_QUESTION_COUNT)
                .map_err(|reason| ContentError::BadBandTable { module, reason })?;
        }
    }

    check_count("writing tasks", WRITING_TASKS, paper.writing.len())?;
    for (i, task) in paper.writing.iter().enumerate() {
        check_part("writing task", i, task.number, &task.prompt)?;
    }
    check_count("speaking parts", SPEAKING_PARTS, paper.speaking.len())?;
    for (i, part) in paper.speaking.iter().enumerate() {
        check_part("speaking part", i, part.number, &part.prompt)?;
    }

    Ok(())
}

fn check_count(what: &'static str, expected: usize, found: usize) -> Result<(), ContentError> {
    if expected != found {
        return Err(ContentError::WrongCount {
            what,
            expected,
            found,
        });
    }
    Ok(())
}

fn check_answer(module: Module, q: &Question) -> Result<(), ContentError> {
    let number = q.number();
    if alternatives(q.answer()).next().is_none() {
        return Err(ContentError::EmptyAnswer { module, number });
    }

    if let Some(options) = q.options() {
        for alt in alternatives(q.answer()) {
            if !options.iter().any(|o| normalize(&o.key) == normalize(alt)) {
                return Err(ContentError::UnknownOption {
                    module,
                    number,
                    answer: alt.to_string(),
                });
            }
        }
    }

    if let Question::Tfng { answer, .. } = q {
        if alternatives(answer).any(|alt| !JUDGEMENTS.contains(&normalize(alt).as_str())) {
            return Err(ContentError::BadJudgementAnswer {
                module,
                number,
                answer: answer.clone(),
            });
        }
    }
    Ok(())
}

fn check_part(
    what: &'static str,
    index: usize,
    number: u8,
    prompt: &str,
) -> Result<(), ContentError> {
    let expected = index + 1;
    if number as usize != expected {
        return Err(ContentError::BadTask {
            what,
            number,
            reason: format!("expected number {expected}"),
        });
    }
    if prompt.trim().is_empty() {
        return Err(ContentError::BadTask {
            what,
            number,
            reason: "prompt is empty".into(),
        });
    }
    Ok(())
}

/// An advisory finding on a valid paper.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// Where in the paper (e.g. "listening part 2").
    pub location: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Check a paper for likely authoring mistakes.
pub fn lint_paper(paper: &ExamPaper) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut warn = |location: Option<String>, message: String| {
        warnings.push(ValidationWarning { location, message });
    };

    // Table rows that leave raw scores uncovered
    for module in [Module::Listening, Module::Reading] {
        let Some(table) = paper.band_table(module) else {
            continue;
        };
        let gaps = table.gaps(OBJECTIVE_QUESTION_COUNT);
        if !gaps.is_empty() {
            warn(
                Some(format!("{module} band table")),
                format!("raw scores {gaps:?} are not covered and convert to band 0"),
            );
        }
        if !table.is_monotonic(OBJECTIVE_QUESTION_COUNT) {
            warn(
                Some(format!("{module} band table")),
                "a higher raw score yields a lower band".into(),
            );
        }
    }

    for (i, section) in paper.listening.iter().enumerate() {
        let location = Some(format!("listening part {}", i + 1));
        if section.audio.is_empty() {
            warn(location.clone(), "no audio sources".into());
        }
        if section.transcript.trim().is_empty() {
            warn(location, "transcript is empty".into());
        }
    }

    for module in [Module::Listening, Module::Reading] {
        for q in paper.questions(module) {
            if let Some(options) = q.options() {
                let mut seen = HashSet::new();
                for o in options {
                    if !seen.insert(normalize(&o.key)) {
                        warn(
                            Some(format!("{module} question {}", q.number())),
                            format!("duplicate option key '{}'", o.key),
                        );
                    }
                }
            }
            if q.prompt().trim().is_empty() {
                warn(
                    Some(format!("{module} question {}", q.number())),
                    "prompt is empty".into(),
                );
            }
        }
    }

    for task in &paper.writing {
        let location = Some(format!("writing task {}", task.number));
        if task.min_words == 0 {
            warn(location.clone(), "min_words is not set".into());
        }
        if task.model_answer.is_none() {
            warn(location, "no model answer".into());
        }
    }

    warnings
}
