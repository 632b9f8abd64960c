//! Objective scoring for listening and reading.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::bands::BandTable;
use crate::matcher::{is_correct, MatchMode};
use crate::model::{AnswerValue, ExamPaper, Module};

/// One scored key entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEntry {
    pub number: u32,
    pub answer: String,
    pub mode: MatchMode,
}

/// The ordered answer key of an objective module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerKey {
    pub module: Module,
    pub entries: Vec<KeyEntry>,
}

impl AnswerKey {
    /// Build the key from the paper's questions. `None` for subjective
    /// modules.
    pub fn from_paper(paper: &ExamPaper, module: Module) -> Option<Self> {
        if !module.is_objective() {
            return None;
        }
        let entries = paper
            .questions(module)
            .into_iter()
            .map(|q| KeyEntry {
                number: q.number(),
                answer: q.answer().to_string(),
                mode: q.match_mode(),
            })
            .collect();
        Some(Self { module, entries })
    }

    pub fn total(&self) -> u32 {
        self.entries.len() as u32
    }
}

/// Per-question outcome, kept for result rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionVerdict {
    pub number: u32,
    pub given: Option<String>,
    pub expected: String,
    pub correct: bool,
}

/// Raw score and band for one objective module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveResult {
    pub module: Module,
    pub raw_score: u32,
    pub total: u32,
    pub band: f64,
    pub verdicts: Vec<QuestionVerdict>,
}

impl ObjectiveResult {
    pub fn incorrect(&self) -> impl Iterator<Item = &QuestionVerdict> {
        self.verdicts.iter().filter(|v| !v.correct)
    }
}

/// Answer key plus conversion table for one module.
#[derive(Debug, Clone)]
pub struct ObjectiveScorer<'a> {
    key: AnswerKey,
    table: &'a BandTable,
}

impl<'a> ObjectiveScorer<'a> {
    pub fn new(key: AnswerKey, table: &'a BandTable) -> Self {
        Self { key, table }
    }

    /// Scorer for one of the paper's objective modules.
    pub fn for_paper(paper: &'a ExamPaper, module: Module) -> Option<Self> {
        let key = AnswerKey::from_paper(paper, module)?;
        let table = paper.band_table(module)?;
        Some(Self::new(key, table))
    }

    /// Score a sparse answer map. Missing entries count as incorrect.
    pub fn score(&self, answers: &BTreeMap<u32, AnswerValue>) -> ObjectiveResult {
        let verdicts: Vec<QuestionVerdict> = self
            .key
            .entries
            .iter()
            .map(|entry| {
                let given = answers.get(&entry.number).map(|a| a.as_str().to_string());
                let correct = given
                    .as_deref()
                    .is_some_and(|g| is_correct(g, &entry.answer, entry.mode));
                QuestionVerdict {
                    number: entry.number,
                    given,
                    expected: entry.answer.clone(),
                    correct,
                }
            })
            .collect();

        let raw_score = verdicts.iter().filter(|v| v.correct).count() as u32;
        let band = self.table.lookup(raw_score);
        tracing::debug!(module = %self.key.module, raw_score, band, "objective module scored");

        ObjectiveResult {
            module: self.key.module,
            raw_score,
            total: self.key.total(),
            band,
            verdicts,
        }
    }
}
