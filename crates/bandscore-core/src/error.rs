//! Error taxonomy for the attempt and scoring engine.
//!
//! Each layer gets its own enum so callers can decide locally whether an
//! error is recoverable (reject and re-prompt) or must propagate (scoring
//! backend failures). None of these are ever converted into a default score.

use thiserror::Error;

use crate::model::Module;

/// A structural problem with an exam paper or a submission payload.
///
/// Raised before any state is touched; the paper is refused as a whole.
#[derive(Debug, Error, PartialEq)]
pub enum ContentError {
    #[error("failed to parse exam paper: {0}")]
    Parse(String),

    #[error("expected {expected} {what}, found {found}")]
    WrongCount {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{module} question numbers must run 1..={expected} in order; position {position} is numbered {found}")]
    BadNumbering {
        module: Module,
        position: usize,
        expected: u32,
        found: u32,
    },

    #[error("{module} question {number} has an empty answer key")]
    EmptyAnswer { module: Module, number: u32 },

    #[error("{module} question {number}: answer '{answer}' is not one of the option keys")]
    UnknownOption {
        module: Module,
        number: u32,
        answer: String,
    },

    #[error("{module} question {number}: '{answer}' is not TRUE/FALSE/NOT GIVEN or YES/NO/NOT GIVEN")]
    BadJudgementAnswer {
        module: Module,
        number: u32,
        answer: String,
    },

    #[error("{module} band table: {reason}")]
    BadBandTable { module: Module, reason: String },

    #[error("{what} {number}: {reason}")]
    BadTask {
        what: &'static str,
        number: u8,
        reason: String,
    },

    #[error("exam paper id is empty")]
    MissingId,
}

/// A rejected attempt mutation. The attempt is left unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AttemptError {
    #[error("no attempt has been started")]
    NotStarted,

    #[error("{0} has not been entered")]
    NotEntered(Module),

    #[error("time is up for {0}; answers are locked")]
    TimeExpired(Module),

    #[error("{0} has already been submitted")]
    ModuleSubmitted(Module),

    #[error("the attempt has been submitted; answers are read-only")]
    AttemptSubmitted,

    #[error("{module} has {count} questions; {number} is out of range")]
    QuestionOutOfRange {
        module: Module,
        number: u32,
        count: u32,
    },

    #[error("{action} is not available in {module}")]
    WrongModule { action: &'static str, module: Module },

    #[error("no recording with handle '{0}'")]
    UnknownRecording(String),

    #[error("{0} has side effects; use the controller's dedicated call")]
    NotDispatchable(&'static str),
}

/// Failure of the subjective scoring pipeline.
///
/// Callers decide whether to offer a retry; retrying with the same input is
/// safe because the cache check runs before any backend call.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("{0} is not scored by the subjective pipeline")]
    NotSubjective(Module),

    #[error("response is empty")]
    EmptyResponse,

    #[error("scoring unavailable: {0:#}")]
    BackendUnavailable(#[source] anyhow::Error),

    #[error("scoring unavailable: backend output is not valid JSON: {0}")]
    MalformedOutput(String),

    #[error("scoring unavailable: backend output failed validation: {0}")]
    SchemaViolation(String),

    #[error("score storage failed: {0:#}")]
    Storage(#[source] anyhow::Error),

    #[error("scoring task failed: {0}")]
    TaskFailed(String),
}

impl ScoringError {
    /// Whether this is the "scoring unavailable" condition a UI should offer
    /// a retry for.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            ScoringError::BackendUnavailable(_)
                | ScoringError::MalformedOutput(_)
                | ScoringError::SchemaViolation(_)
        )
    }
}

/// A persisted snapshot that cannot be resumed. The caller starts fresh.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot has no version field")]
    MissingVersion,

    #[error("snapshot version {0} is not supported")]
    UnsupportedVersion(u64),

    #[error("snapshot belongs to test '{found}', not '{expected}'")]
    TestMismatch { expected: String, found: String },

    #[error("snapshot holds no started attempt")]
    Empty,

    #[error("snapshot is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Recordings referenced by a resumed attempt whose backing storage is gone.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{} recording(s) lost, please re-record: {}", handles.len(), handles.join(", "))]
pub struct RecordingLost {
    pub handles: Vec<String>,
}
