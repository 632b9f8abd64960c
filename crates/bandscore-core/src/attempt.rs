//! The attempt state machine.
//!
//! An [`Attempt`] is plain state; every mutation goes through
//! [`Attempt::apply`] with an [`Action`] and the wall-clock time it happened
//! at. Rejected actions return an [`AttemptError`] and leave the state
//! untouched. Persistence is not this module's concern: callers snapshot the
//! state on a heartbeat (see `autosave`).

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AttemptError;
use crate::model::{AnswerValue, DeliveryMode, Module};
use crate::timer::{remaining_secs, TickOutcome};
use crate::traits::RecordingStore;

/// Timing and submission state of one entered module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleProgress {
    pub started_at: DateTime<Utc>,
    pub initial_secs: u32,
    /// Remaining seconds as of the last tick. Derived; re-computed on
    /// restore rather than trusted.
    #[serde(skip)]
    pub time_left_secs: u32,
    pub question_count: u32,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    /// The zero crossing has already been reported.
    #[serde(default)]
    pub expired: bool,
}

impl ModuleProgress {
    pub fn remaining_at(&self, now: DateTime<Utc>) -> u32 {
        remaining_secs(self.initial_secs, self.started_at, now)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    NotEntered,
    InProgress,
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    NotStarted,
    InProgress,
    SubmittedAll,
}

/// A writing task draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WritingDraft {
    pub text: String,
    pub word_count: u32,
}

impl WritingDraft {
    pub fn new(text: String) -> Self {
        let word_count = count_words(&text);
        Self { text, word_count }
    }
}

pub fn count_words(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

/// Reference to a speaking recording held by a [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingRef {
    pub handle: String,
    pub part: u8,
    pub created_at: DateTime<Utc>,
}

/// One user event or timer event.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    StartNewAttempt {
        test_id: String,
        mode: DeliveryMode,
    },
    EnterModule {
        module: Module,
        total_secs: u32,
        question_count: u32,
    },
    Tick {
        module: Module,
    },
    SetAnswer {
        module: Module,
        number: u32,
        value: AnswerValue,
    },
    ClearAnswer {
        module: Module,
        number: u32,
    },
    ToggleFlag {
        module: Module,
        number: u32,
    },
    SetCurrentQuestion {
        number: u32,
    },
    SetWritingDraft {
        task: u8,
        text: String,
    },
    SetSpeakingNotes {
        text: String,
    },
    SetSpeakingTranscript {
        part: u8,
        text: String,
    },
    AddRecording(RecordingRef),
    RemoveRecording {
        handle: String,
    },
    SubmitModule {
        module: Module,
    },
    SubmitAll,
    Reset,
}

/// What an accepted action did.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    Changed,
    /// Accepted but nothing changed (idempotent re-entry, repeat submit).
    Unchanged,
    Tick(TickOutcome),
    /// Recordings whose storage the caller must release.
    Released(Vec<RecordingRef>),
}

/// One candidate's run through one exam instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    test_id: Option<String>,
    #[serde(default)]
    mode: DeliveryMode,
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    modules: BTreeMap<Module, ModuleProgress>,
    #[serde(default)]
    answers: BTreeMap<Module, BTreeMap<u32, AnswerValue>>,
    #[serde(default)]
    flagged: BTreeMap<Module, BTreeSet<u32>>,
    #[serde(default)]
    current_module: Option<Module>,
    #[serde(default = "first_question")]
    current_question: u32,
    #[serde(default)]
    writing_drafts: BTreeMap<u8, WritingDraft>,
    #[serde(default)]
    speaking_notes: String,
    #[serde(default)]
    speaking_transcripts: BTreeMap<u8, String>,
    #[serde(default)]
    speaking_recordings: Vec<RecordingRef>,
    #[serde(default)]
    submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    last_saved_at: Option<DateTime<Utc>>,
    /// Bumped on every persisted change; the autosave heartbeat compares it
    /// against the last flushed revision.
    #[serde(skip)]
    revision: u64,
}

fn first_question() -> u32 {
    1
}

impl Attempt {
    /// A fresh attempt for `test_id`.
    pub fn start(test_id: impl Into<String>, mode: DeliveryMode, now: DateTime<Utc>) -> Self {
        let mut attempt = Attempt::default();
        attempt.reset_to(Some(test_id.into()), mode, Some(now));
        attempt
    }

    // -- accessors ---------------------------------------------------------

    pub fn test_id(&self) -> Option<&str> {
        self.test_id.as_deref()
    }

    pub fn mode(&self) -> DeliveryMode {
        self.mode
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved_at
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn current_module(&self) -> Option<Module> {
        self.current_module
    }

    pub fn current_question(&self) -> u32 {
        self.current_question
    }

    pub fn module(&self, module: Module) -> Option<&ModuleProgress> {
        self.modules.get(&module)
    }

    pub fn answers(&self, module: Module) -> Option<&BTreeMap<u32, AnswerValue>> {
        self.answers.get(&module)
    }

    pub fn answer(&self, module: Module, number: u32) -> Option<&AnswerValue> {
        self.answers.get(&module).and_then(|a| a.get(&number))
    }

    pub fn is_flagged(&self, module: Module, number: u32) -> bool {
        self.flagged
            .get(&module)
            .is_some_and(|f| f.contains(&number))
    }

    pub fn flagged(&self, module: Module) -> Vec<u32> {
        self.flagged
            .get(&module)
            .map(|f| f.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn writing_drafts(&self) -> &BTreeMap<u8, WritingDraft> {
        &self.writing_drafts
    }

    pub fn speaking_notes(&self) -> &str {
        &self.speaking_notes
    }

    pub fn speaking_transcripts(&self) -> &BTreeMap<u8, String> {
        &self.speaking_transcripts
    }

    pub fn recordings(&self) -> &[RecordingRef] {
        &self.speaking_recordings
    }

    pub fn module_state(&self, module: Module) -> ModuleState {
        match self.modules.get(&module) {
            None => ModuleState::NotEntered,
            Some(p) if p.submitted_at.is_some() => ModuleState::Submitted,
            Some(_) => ModuleState::InProgress,
        }
    }

    pub fn phase(&self) -> AttemptPhase {
        if self.test_id.is_none() {
            AttemptPhase::NotStarted
        } else if self.submitted_at.is_some() {
            AttemptPhase::SubmittedAll
        } else {
            AttemptPhase::InProgress
        }
    }

    /// Transcripts and model answers may be shown once the whole attempt
    /// is submitted.
    pub fn protected_content_visible(&self) -> bool {
        self.submitted_at.is_some()
    }

    // -- reducer -----------------------------------------------------------

    /// Apply one action at wall-clock time `now`.
    pub fn apply(&mut self, action: Action, now: DateTime<Utc>) -> Result<Applied, AttemptError> {
        match action {
            Action::StartNewAttempt { test_id, mode } => {
                self.reset_to(Some(test_id), mode, Some(now));
                Ok(Applied::Changed)
            }
            Action::Reset => {
                let released = std::mem::take(&mut self.speaking_recordings);
                self.reset_to(None, DeliveryMode::default(), None);
                Ok(Applied::Released(released))
            }
            Action::EnterModule {
                module,
                total_secs,
                question_count,
            } => self.enter_module(module, total_secs, question_count, now),
            Action::Tick { module } => self.tick(module, now).map(Applied::Tick),
            Action::SetAnswer {
                module,
                number,
                value,
            } => {
                check_objective(module, "set_answer")?;
                self.check_question(module, number, now)?;
                self.answers.entry(module).or_default().insert(number, value);
                self.touch(now);
                Ok(Applied::Changed)
            }
            Action::ClearAnswer { module, number } => {
                check_objective(module, "clear_answer")?;
                self.check_question(module, number, now)?;
                if let Some(a) = self.answers.get_mut(&module) {
                    a.remove(&number);
                }
                self.touch(now);
                Ok(Applied::Changed)
            }
            Action::ToggleFlag { module, number } => {
                self.check_question(module, number, now)?;
                let flags = self.flagged.entry(module).or_default();
                if !flags.remove(&number) {
                    flags.insert(number);
                }
                self.touch(now);
                Ok(Applied::Changed)
            }
            Action::SetCurrentQuestion { number } => {
                let module = self.current_module.ok_or(AttemptError::NotStarted)?;
                self.check_attempt_open()?;
                let progress = self
                    .modules
                    .get(&module)
                    .ok_or(AttemptError::NotEntered(module))?;
                check_range(module, number, progress.question_count)?;
                self.current_question = number;
                self.touch(now);
                Ok(Applied::Changed)
            }
            Action::SetWritingDraft { task, text } => {
                let progress = self.check_writable(Module::Writing, now)?;
                check_range(Module::Writing, task as u32, progress.question_count)?;
                self.writing_drafts.insert(task, WritingDraft::new(text));
                self.touch(now);
                Ok(Applied::Changed)
            }
            Action::SetSpeakingNotes { text } => {
                self.check_writable(Module::Speaking, now)?;
                self.speaking_notes = text;
                self.touch(now);
                Ok(Applied::Changed)
            }
            Action::SetSpeakingTranscript { part, text } => {
                let progress = self.check_writable(Module::Speaking, now)?;
                check_range(Module::Speaking, part as u32, progress.question_count)?;
                self.speaking_transcripts.insert(part, text);
                self.touch(now);
                Ok(Applied::Changed)
            }
            Action::AddRecording(recording) => {
                self.check_writable(Module::Speaking, now)?;
                self.speaking_recordings.push(recording);
                self.touch(now);
                Ok(Applied::Changed)
            }
            Action::RemoveRecording { handle } => {
                self.check_attempt_open()?;
                let pos = self
                    .speaking_recordings
                    .iter()
                    .position(|r| r.handle == handle)
                    .ok_or_else(|| AttemptError::UnknownRecording(handle.clone()))?;
                let removed = self.speaking_recordings.remove(pos);
                self.touch(now);
                Ok(Applied::Released(vec![removed]))
            }
            Action::SubmitModule { module } => {
                self.check_attempt_open()?;
                let progress = self
                    .modules
                    .get_mut(&module)
                    .ok_or(AttemptError::NotEntered(module))?;
                if progress.submitted_at.is_some() {
                    return Ok(Applied::Unchanged);
                }
                progress.submitted_at = Some(now);
                progress.time_left_secs = progress.remaining_at(now);
                self.revision += 1;
                Ok(Applied::Changed)
            }
            Action::SubmitAll => {
                if self.test_id.is_none() {
                    return Err(AttemptError::NotStarted);
                }
                if self.submitted_at.is_some() {
                    return Ok(Applied::Unchanged);
                }
                self.submitted_at = Some(now);
                self.revision += 1;
                Ok(Applied::Changed)
            }
        }
    }

    fn enter_module(
        &mut self,
        module: Module,
        total_secs: u32,
        question_count: u32,
        now: DateTime<Utc>,
    ) -> Result<Applied, AttemptError> {
        if self.test_id.is_none() {
            return Err(AttemptError::NotStarted);
        }
        self.check_attempt_open()?;
        if self.modules.contains_key(&module) {
            return Ok(Applied::Unchanged);
        }
        self.modules.insert(
            module,
            ModuleProgress {
                started_at: now,
                initial_secs: total_secs,
                time_left_secs: total_secs,
                question_count,
                submitted_at: None,
                expired: false,
            },
        );
        self.current_module = Some(module);
        self.current_question = 1;
        self.revision += 1;
        tracing::debug!(%module, total_secs, question_count, "module entered");
        Ok(Applied::Changed)
    }

    fn tick(&mut self, module: Module, now: DateTime<Utc>) -> Result<TickOutcome, AttemptError> {
        let progress = self
            .modules
            .get_mut(&module)
            .ok_or(AttemptError::NotEntered(module))?;
        progress.time_left_secs = progress.remaining_at(now);
        if progress.submitted_at.is_some() || progress.expired {
            return Ok(TickOutcome::Finished);
        }
        if progress.time_left_secs == 0 {
            progress.expired = true;
            self.revision += 1;
            tracing::info!(%module, "module time expired");
            return Ok(TickOutcome::Expired);
        }
        Ok(TickOutcome::Running {
            left: progress.time_left_secs,
        })
    }

    /// Re-derive every module's remaining time. Used after restoring a
    /// snapshot; does not report expiry (the next tick does).
    pub fn refresh_timers(&mut self, now: DateTime<Utc>) {
        for progress in self.modules.values_mut() {
            progress.time_left_secs = progress.remaining_at(now);
        }
    }

    /// Drop recordings whose blobs no longer resolve. Returns their handles.
    pub fn prune_lost_recordings(&mut self, store: &dyn RecordingStore) -> Vec<String> {
        let (kept, lost): (Vec<_>, Vec<_>) = std::mem::take(&mut self.speaking_recordings)
            .into_iter()
            .partition(|r| store.resolve(&r.handle));
        self.speaking_recordings = kept;
        if !lost.is_empty() {
            self.revision += 1;
        }
        lost.into_iter().map(|r| r.handle).collect()
    }

    // -- convenience wrappers ----------------------------------------------

    pub fn enter(
        &mut self,
        module: Module,
        total_secs: u32,
        question_count: u32,
        now: DateTime<Utc>,
    ) -> Result<Applied, AttemptError> {
        self.apply(
            Action::EnterModule {
                module,
                total_secs,
                question_count,
            },
            now,
        )
    }

    pub fn set_answer(
        &mut self,
        module: Module,
        number: u32,
        value: AnswerValue,
        now: DateTime<Utc>,
    ) -> Result<Applied, AttemptError> {
        self.apply(
            Action::SetAnswer {
                module,
                number,
                value,
            },
            now,
        )
    }

    pub fn tick_module(
        &mut self,
        module: Module,
        now: DateTime<Utc>,
    ) -> Result<TickOutcome, AttemptError> {
        self.tick(module, now)
    }

    /// Reset and release every held recording through `store`. Release
    /// failures are logged; the attempt is reset regardless.
    pub fn reset_attempt(&mut self, store: &dyn RecordingStore, now: DateTime<Utc>) {
        if let Ok(Applied::Released(recordings)) = self.apply(Action::Reset, now) {
            release_all(store, &recordings);
        }
    }

    // -- guards --------------------------------------------------------------

    fn check_attempt_open(&self) -> Result<(), AttemptError> {
        if self.submitted_at.is_some() {
            return Err(AttemptError::AttemptSubmitted);
        }
        Ok(())
    }

    /// The module must be entered, unsubmitted and not out of time.
    fn check_writable(
        &self,
        module: Module,
        now: DateTime<Utc>,
    ) -> Result<&ModuleProgress, AttemptError> {
        if self.test_id.is_none() {
            return Err(AttemptError::NotStarted);
        }
        self.check_attempt_open()?;
        let progress = self
            .modules
            .get(&module)
            .ok_or(AttemptError::NotEntered(module))?;
        if progress.submitted_at.is_some() {
            return Err(AttemptError::ModuleSubmitted(module));
        }
        if progress.expired || progress.remaining_at(now) == 0 {
            return Err(AttemptError::TimeExpired(module));
        }
        Ok(progress)
    }

    fn check_question(
        &self,
        module: Module,
        number: u32,
        now: DateTime<Utc>,
    ) -> Result<(), AttemptError> {
        let progress = self.check_writable(module, now)?;
        check_range(module, number, progress.question_count)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.last_saved_at = Some(now);
        self.revision += 1;
    }

    fn reset_to(
        &mut self,
        test_id: Option<String>,
        mode: DeliveryMode,
        now: Option<DateTime<Utc>>,
    ) {
        let revision = self.revision + 1;
        *self = Attempt {
            test_id,
            mode,
            started_at: now,
            current_question: 1,
            revision,
            ..Attempt::default()
        };
    }
}

fn check_range(module: Module, number: u32, count: u32) -> Result<(), AttemptError> {
    if number == 0 || number > count {
        return Err(AttemptError::QuestionOutOfRange {
            module,
            number,
            count,
        });
    }
    Ok(())
}

fn check_objective(module: Module, action: &'static str) -> Result<(), AttemptError> {
    if !module.is_objective() {
        return Err(AttemptError::WrongModule { action, module });
    }
    Ok(())
}

pub(crate) fn release_all(store: &dyn RecordingStore, recordings: &[RecordingRef]) {
    for recording in recordings {
        if let Err(e) = store.release(&recording.handle) {
            tracing::warn!(handle = %recording.handle, "failed to release recording: {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Mutex;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
    }

    fn started() -> Attempt {
        let mut a = Attempt::start("test-1", DeliveryMode::Computer, t0());
        a.enter(Module::Reading, 3600, 40, t0()).unwrap();
        a
    }

    #[derive(Default)]
    struct Blobs {
        live: Mutex<Vec<String>>,
        released: Mutex<Vec<String>>,
    }

    impl RecordingStore for Blobs {
        fn resolve(&self, handle: &str) -> bool {
            self.live.lock().unwrap().iter().any(|h| h == handle)
        }

        fn release(&self, handle: &str) -> anyhow::Result<()> {
            self.live.lock().unwrap().retain(|h| h != handle);
            self.released.lock().unwrap().push(handle.to_string());
            Ok(())
        }
    }

    #[test]
    fn new_attempt_phases() {
        let mut a = Attempt::default();
        assert_eq!(a.phase(), AttemptPhase::NotStarted);
        a.apply(
            Action::StartNewAttempt {
                test_id: "t".into(),
                mode: DeliveryMode::Paper,
            },
            t0(),
        )
        .unwrap();
        assert_eq!(a.phase(), AttemptPhase::InProgress);
        assert_eq!(a.mode(), DeliveryMode::Paper);
        assert_eq!(a.started_at(), Some(t0()));
        a.apply(Action::SubmitAll, t0()).unwrap();
        assert_eq!(a.phase(), AttemptPhase::SubmittedAll);
        assert!(a.protected_content_visible());
    }

    #[test]
    fn switching_tests_resets_everything() {
        let mut a = started();
        a.set_answer(Module::Reading, 3, AnswerValue::Text("x".into()), t0())
            .unwrap();
        a.apply(
            Action::StartNewAttempt {
                test_id: "test-2".into(),
                mode: DeliveryMode::Computer,
            },
            t0(),
        )
        .unwrap();
        assert_eq!(a.test_id(), Some("test-2"));
        assert!(a.answers(Module::Reading).is_none());
        assert_eq!(a.module_state(Module::Reading), ModuleState::NotEntered);
    }

    #[test]
    fn reentry_keeps_the_clock() {
        let mut a = started();
        let later = t0() + Duration::minutes(10);
        a.apply(Action::SetCurrentQuestion { number: 12 }, later)
            .unwrap();
        let before = a.module(Module::Reading).cloned().unwrap();
        let applied = a.enter(Module::Reading, 999, 40, later).unwrap();
        assert_eq!(applied, Applied::Unchanged);
        let after = a.module(Module::Reading).unwrap();
        assert_eq!(after.started_at, before.started_at);
        assert_eq!(after.time_left_secs, before.time_left_secs);
        assert_eq!(after.initial_secs, 3600);
        assert_eq!(a.current_question(), 12);
    }

    #[test]
    fn tick_self_corrects_after_long_gap() {
        let mut a = started();
        let outcome = a
            .tick_module(Module::Reading, t0() + Duration::seconds(5))
            .unwrap();
        assert_eq!(outcome, TickOutcome::Running { left: 3595 });

        // Replaying an older tick after a newer one still lands on the formula.
        let gap = t0() + Duration::milliseconds(1_234_567);
        a.tick_module(Module::Reading, gap).unwrap();
        a.tick_module(Module::Reading, t0() + Duration::seconds(1)).unwrap();
        a.tick_module(Module::Reading, gap).unwrap();
        assert_eq!(
            a.module(Module::Reading).unwrap().time_left_secs,
            3600 - 1234
        );
    }

    #[test]
    fn expiry_reported_once_and_locks_answers() {
        let mut a = started();
        let end = t0() + Duration::seconds(3600);
        assert_eq!(a.tick_module(Module::Reading, end).unwrap(), TickOutcome::Expired);
        assert_eq!(a.tick_module(Module::Reading, end).unwrap(), TickOutcome::Finished);
        assert_eq!(
            a.tick_module(Module::Reading, end + Duration::seconds(30))
                .unwrap(),
            TickOutcome::Finished
        );

        let before = a.clone();
        let err = a
            .set_answer(Module::Reading, 1, AnswerValue::Text("late".into()), end)
            .unwrap_err();
        assert_eq!(err, AttemptError::TimeExpired(Module::Reading));
        assert_eq!(a, before);
    }

    #[test]
    fn answers_rejected_when_time_ran_out_without_a_tick() {
        let mut a = started();
        let err = a
            .set_answer(
                Module::Reading,
                1,
                AnswerValue::Text("x".into()),
                t0() + Duration::hours(2),
            )
            .unwrap_err();
        assert_eq!(err, AttemptError::TimeExpired(Module::Reading));
    }

    #[test]
    fn mutations_before_entering_are_rejected() {
        let mut a = Attempt::start("t", DeliveryMode::Computer, t0());
        assert_eq!(
            a.tick_module(Module::Listening, t0()).unwrap_err(),
            AttemptError::NotEntered(Module::Listening)
        );
        assert_eq!(
            a.set_answer(Module::Listening, 1, AnswerValue::Text("a".into()), t0())
                .unwrap_err(),
            AttemptError::NotEntered(Module::Listening)
        );
        assert_eq!(
            Attempt::default()
                .enter(Module::Reading, 60, 40, t0())
                .unwrap_err(),
            AttemptError::NotStarted
        );
    }

    #[test]
    fn answer_flag_and_cursor_updates() {
        let mut a = started();
        let t1 = t0() + Duration::seconds(20);
        a.set_answer(Module::Reading, 2, AnswerValue::Dropdown("C".into()), t1)
            .unwrap();
        assert_eq!(a.answer(Module::Reading, 2).map(|v| v.as_str()), Some("C"));
        assert_eq!(a.last_saved_at(), Some(t1));

        a.apply(
            Action::ClearAnswer {
                module: Module::Reading,
                number: 2,
            },
            t1,
        )
        .unwrap();
        assert!(a.answer(Module::Reading, 2).is_none());

        let flag = Action::ToggleFlag {
            module: Module::Reading,
            number: 9,
        };
        a.apply(flag.clone(), t1).unwrap();
        assert!(a.is_flagged(Module::Reading, 9));
        a.apply(flag, t1).unwrap();
        assert!(!a.is_flagged(Module::Reading, 9));

        assert!(matches!(
            a.apply(Action::SetCurrentQuestion { number: 41 }, t1),
            Err(AttemptError::QuestionOutOfRange { count: 40, .. })
        ));
        assert!(a
            .set_answer(Module::Reading, 0, AnswerValue::Text("x".into()), t1)
            .is_err());
        a.apply(Action::SetCurrentQuestion { number: 40 }, t1)
            .unwrap();
        assert_eq!(a.current_question(), 40);
    }

    #[test]
    fn submitted_module_and_attempt_are_read_only() {
        let mut a = started();
        a.apply(
            Action::SubmitModule {
                module: Module::Reading,
            },
            t0(),
        )
        .unwrap();
        assert_eq!(a.module_state(Module::Reading), ModuleState::Submitted);
        assert_eq!(
            a.apply(
                Action::SubmitModule {
                    module: Module::Reading
                },
                t0()
            )
            .unwrap(),
            Applied::Unchanged
        );
        assert_eq!(
            a.set_answer(Module::Reading, 1, AnswerValue::Text("x".into()), t0())
                .unwrap_err(),
            AttemptError::ModuleSubmitted(Module::Reading)
        );

        a.apply(Action::SubmitAll, t0()).unwrap();
        assert_eq!(
            a.enter(Module::Writing, 3600, 2, t0()).unwrap_err(),
            AttemptError::AttemptSubmitted
        );
    }

    #[test]
    fn writing_drafts_count_words() {
        let mut a = started();
        a.enter(Module::Writing, 3600, 2, t0()).unwrap();
        a.apply(
            Action::SetWritingDraft {
                task: 1,
                text: "The chart  shows\nthree trends.".into(),
            },
            t0(),
        )
        .unwrap();
        assert_eq!(a.writing_drafts()[&1].word_count, 5);
        assert!(matches!(
            a.apply(
                Action::SetWritingDraft {
                    task: 3,
                    text: "x".into()
                },
                t0()
            ),
            Err(AttemptError::QuestionOutOfRange { count: 2, .. })
        ));
        assert_eq!(
            a.set_answer(Module::Writing, 1, AnswerValue::Text("x".into()), t0())
                .unwrap_err(),
            AttemptError::WrongModule {
                action: "set_answer",
                module: Module::Writing
            }
        );
        assert!(matches!(
            a.apply(
                Action::SetSpeakingNotes { text: "x".into() },
                t0()
            ),
            Err(AttemptError::NotEntered(Module::Speaking))
        ));
    }

    #[test]
    fn reset_releases_recordings() {
        let blobs = Blobs::default();
        blobs.live.lock().unwrap().extend(["r1".to_string(), "r2".to_string()]);

        let mut a = started();
        a.enter(Module::Speaking, 840, 3, t0()).unwrap();
        for (handle, part) in [("r1", 1), ("r2", 2)] {
            a.apply(
                Action::AddRecording(RecordingRef {
                    handle: handle.into(),
                    part,
                    created_at: t0(),
                }),
                t0(),
            )
            .unwrap();
        }
        let rev = a.revision();
        a.reset_attempt(&blobs, t0());

        assert_eq!(a.phase(), AttemptPhase::NotStarted);
        assert!(a.recordings().is_empty());
        assert!(a.revision() > rev);
        assert_eq!(*blobs.released.lock().unwrap(), vec!["r1", "r2"]);
        assert!(blobs.live.lock().unwrap().is_empty());
    }

    #[test]
    fn lost_recordings_are_pruned() {
        let blobs = Blobs::default();
        blobs.live.lock().unwrap().push("kept".into());
        let mut a = started();
        a.enter(Module::Speaking, 840, 3, t0()).unwrap();
        for handle in ["kept", "gone"] {
            a.apply(
                Action::AddRecording(RecordingRef {
                    handle: handle.into(),
                    part: 1,
                    created_at: t0(),
                }),
                t0(),
            )
            .unwrap();
        }
        assert_eq!(a.prune_lost_recordings(&blobs), vec!["gone".to_string()]);
        assert_eq!(a.recordings().len(), 1);
    }
}
