//! Core data model types for bandscore.
//!
//! Exam papers, their questions, and the small closed vocabularies (modules,
//! delivery modes, scoring criteria, answer values) the rest of the engine
//! matches on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::bands::BandTable;
use crate::matcher::MatchMode;

/// The four skills of an exam. Each has independent timing and scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Module {
    Listening,
    Reading,
    Writing,
    Speaking,
}

impl Module {
    pub const ALL: [Module; 4] = [
        Module::Listening,
        Module::Reading,
        Module::Writing,
        Module::Speaking,
    ];

    /// Listening and reading are scored against an answer key.
    pub fn is_objective(self) -> bool {
        matches!(self, Module::Listening | Module::Reading)
    }

    /// The fixed criterion set a subjective report for this module carries.
    /// Empty for objective modules.
    pub fn criteria(self) -> &'static [Criterion] {
        match self {
            Module::Writing => &[
                Criterion::Task,
                Criterion::Coherence,
                Criterion::Lexical,
                Criterion::Grammar,
            ],
            Module::Speaking => &[
                Criterion::Fluency,
                Criterion::Lexical,
                Criterion::Grammar,
                Criterion::Pronunciation,
            ],
            Module::Listening | Module::Reading => &[],
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Module::Listening => write!(f, "listening"),
            Module::Reading => write!(f, "reading"),
            Module::Writing => write!(f, "writing"),
            Module::Speaking => write!(f, "speaking"),
        }
    }
}

impl FromStr for Module {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "listening" | "l" => Ok(Module::Listening),
            "reading" | "r" => Ok(Module::Reading),
            "writing" | "w" => Ok(Module::Writing),
            "speaking" | "s" => Ok(Module::Speaking),
            other => Err(format!("unknown module: {other}")),
        }
    }
}

/// Timing regime, selected once per attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    #[default]
    Computer,
    Paper,
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Computer => write!(f, "computer"),
            DeliveryMode::Paper => write!(f, "paper"),
        }
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "computer" | "cd" | "computer-delivered" => Ok(DeliveryMode::Computer),
            "paper" | "pb" | "paper-based" => Ok(DeliveryMode::Paper),
            other => Err(format!("unknown delivery mode: {other}")),
        }
    }
}

/// A named sub-score of a subjective report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Task,
    Coherence,
    Lexical,
    Grammar,
    Fluency,
    Pronunciation,
}

impl Criterion {
    pub fn as_str(self) -> &'static str {
        match self {
            Criterion::Task => "task",
            Criterion::Coherence => "coherence",
            Criterion::Lexical => "lexical",
            Criterion::Grammar => "grammar",
            Criterion::Fluency => "fluency",
            Criterion::Pronunciation => "pronunciation",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Criterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task" => Ok(Criterion::Task),
            "coherence" => Ok(Criterion::Coherence),
            "lexical" => Ok(Criterion::Lexical),
            "grammar" => Ok(Criterion::Grammar),
            "fluency" => Ok(Criterion::Fluency),
            "pronunciation" => Ok(Criterion::Pronunciation),
            other => Err(format!("unknown criterion: {other}")),
        }
    }
}

/// A candidate's answer to one objective question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum AnswerValue {
    /// Free text typed into a gap.
    Text(String),
    /// Key of the selected option of a multiple-choice question.
    Choice(String),
    /// Key picked from a dropdown (matching, map labels, TFNG).
    Dropdown(String),
}

impl AnswerValue {
    pub fn as_str(&self) -> &str {
        match self {
            AnswerValue::Text(s) | AnswerValue::Choice(s) | AnswerValue::Dropdown(s) => s,
        }
    }
}

/// One selectable option of a choice-style question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// Option key, e.g. "A".
    pub key: String,
    /// Display text.
    pub text: String,
}

/// An objective question, discriminated by its `type` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Question {
    /// Gap fill / short answer.
    Text {
        number: u32,
        prompt: String,
        answer: String,
        #[serde(default)]
        max_words: Option<u32>,
    },
    MultipleChoice {
        number: u32,
        prompt: String,
        options: Vec<ChoiceOption>,
        answer: String,
    },
    /// Label a map or diagram from a lettered list.
    MapLabel {
        number: u32,
        prompt: String,
        options: Vec<ChoiceOption>,
        answer: String,
    },
    /// Match items to a list via a dropdown.
    Matching {
        number: u32,
        prompt: String,
        options: Vec<ChoiceOption>,
        answer: String,
    },
    /// True / False / Not Given (or Yes / No / Not Given).
    Tfng {
        number: u32,
        prompt: String,
        answer: String,
    },
}

impl Question {
    pub fn number(&self) -> u32 {
        match self {
            Question::Text { number, .. }
            | Question::MultipleChoice { number, .. }
            | Question::MapLabel { number, .. }
            | Question::Matching { number, .. }
            | Question::Tfng { number, .. } => *number,
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            Question::Text { prompt, .. }
            | Question::MultipleChoice { prompt, .. }
            | Question::MapLabel { prompt, .. }
            | Question::Matching { prompt, .. }
            | Question::Tfng { prompt, .. } => prompt,
        }
    }

    /// The authoritative key, possibly holding `/`-separated alternatives.
    pub fn answer(&self) -> &str {
        match self {
            Question::Text { answer, .. }
            | Question::MultipleChoice { answer, .. }
            | Question::MapLabel { answer, .. }
            | Question::Matching { answer, .. }
            | Question::Tfng { answer, .. } => answer,
        }
    }

    pub fn options(&self) -> Option<&[ChoiceOption]> {
        match self {
            Question::MultipleChoice { options, .. }
            | Question::MapLabel { options, .. }
            | Question::Matching { options, .. } => Some(options),
            Question::Text { .. } | Question::Tfng { .. } => None,
        }
    }

    pub fn match_mode(&self) -> MatchMode {
        match self {
            Question::Tfng { .. } => MatchMode::Strict,
            _ => MatchMode::Word,
        }
    }
}

/// One of the four listening sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListeningSection {
    pub title: String,
    /// Ordered audio sources; players try them in order.
    #[serde(default)]
    pub audio: Vec<String>,
    /// Protected until the attempt is submitted.
    #[serde(default)]
    pub transcript: String,
    pub questions: Vec<Question>,
}

/// One of the three reading passages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingPassage {
    pub title: String,
    pub text: String,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WritingTask {
    pub number: u8,
    pub prompt: String,
    #[serde(default)]
    pub min_words: u32,
    /// Protected until the attempt is submitted.
    #[serde(default)]
    pub model_answer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakingPart {
    pub number: u8,
    pub prompt: String,
    #[serde(default)]
    pub questions: Vec<String>,
    /// Preparation time before speaking, in seconds.
    #[serde(default)]
    pub prep_secs: u32,
}

/// Band conversion tables for the answer-key modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandTables {
    pub listening: BandTable,
    pub reading: BandTable,
}

/// A complete exam paper (one test form).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExamPaper {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub listening: Vec<ListeningSection>,
    pub reading: Vec<ReadingPassage>,
    pub writing: Vec<WritingTask>,
    pub speaking: Vec<SpeakingPart>,
    pub band_tables: BandTables,
}

/// Number of scored questions in each objective module.
pub const OBJECTIVE_QUESTION_COUNT: u32 = 40;

impl ExamPaper {
    /// All questions of an objective module in paper order.
    pub fn questions(&self, module: Module) -> Vec<&Question> {
        match module {
            Module::Listening => self
                .listening
                .iter()
                .flat_map(|s| s.questions.iter())
                .collect(),
            Module::Reading => self
                .reading
                .iter()
                .flat_map(|p| p.questions.iter())
                .collect(),
            Module::Writing | Module::Speaking => Vec::new(),
        }
    }

    pub fn band_table(&self, module: Module) -> Option<&BandTable> {
        match module {
            Module::Listening => Some(&self.band_tables.listening),
            Module::Reading => Some(&self.band_tables.reading),
            Module::Writing | Module::Speaking => None,
        }
    }

    /// How many navigable items a module has: questions for objective
    /// modules, tasks for writing, parts for speaking.
    pub fn item_count(&self, module: Module) -> u32 {
        match module {
            Module::Listening | Module::Reading => self.questions(module).len() as u32,
            Module::Writing => self.writing.len() as u32,
            Module::Speaking => self.speaking.len() as u32,
        }
    }

    pub fn writing_task(&self, number: u8) -> Option<&WritingTask> {
        self.writing.iter().find(|t| t.number == number)
    }

    pub fn speaking_part(&self, number: u8) -> Option<&SpeakingPart> {
        self.speaking.iter().find(|p| p.number == number)
    }

    /// Transcripts and model answers, which are only shown with results.
    pub fn protected_content(&self) -> ProtectedContent {
        ProtectedContent {
            transcripts: self
                .listening
                .iter()
                .map(|s| s.transcript.clone())
                .collect(),
            model_answers: self
                .writing
                .iter()
                .filter_map(|t| t.model_answer.clone().map(|a| (t.number, a)))
                .collect(),
        }
    }
}

/// Content withheld from candidates until the attempt is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedContent {
    pub transcripts: Vec<String>,
    pub model_answers: Vec<(u8, String)>,
}
