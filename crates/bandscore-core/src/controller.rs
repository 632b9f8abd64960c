//! The exam controller: owns one user's attempt and routes module
//! submissions to the right scorer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::attempt::{release_all, Action, Applied, Attempt, ModuleState};
use crate::autosave::{Autosaver, SharedAttempt};
use crate::error::{AttemptError, RecordingLost, ScoringError};
use crate::model::{DeliveryMode, ExamPaper, Module, ProtectedContent};
use crate::objective::{ObjectiveResult, ObjectiveScorer};
use crate::pipeline::{ScoredReport, ScoringRequest, SubjectivePipeline};
use crate::timer::{TickOutcome, TimingPolicy};
use crate::traits::{AttemptRepository, RecordingStore};

/// Collaborators the controller needs.
#[derive(Clone)]
pub struct ControllerDeps {
    pub attempts: Arc<dyn AttemptRepository>,
    pub recordings: Arc<dyn RecordingStore>,
    /// Without a pipeline, writing and speaking submit unscored.
    pub pipeline: Option<SubjectivePipeline>,
    pub timing: TimingPolicy,
}

/// Background scoring of a subjective module, one job per task or part.
#[derive(Debug)]
pub struct ScoringHandle {
    jobs: Vec<(u8, JoinHandle<Result<ScoredReport, ScoringError>>)>,
}

impl ScoringHandle {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Wait for every job. Results are keyed by task or part number.
    pub async fn wait(self) -> Vec<(u8, Result<ScoredReport, ScoringError>)> {
        let (numbers, handles): (Vec<u8>, Vec<_>) = self.jobs.into_iter().unzip();
        let results = futures::future::join_all(handles).await;
        numbers
            .into_iter()
            .zip(results)
            .map(|(n, r)| {
                (
                    n,
                    r.map_err(|e| ScoringError::TaskFailed(e.to_string()))
                        .and_then(|inner| inner),
                )
            })
            .collect()
    }
}

/// What submitting a module produced.
#[derive(Debug)]
pub enum ModuleOutcome {
    Objective(ObjectiveResult),
    Subjective(ScoringHandle),
    /// Subjective module submitted with no scoring pipeline configured.
    Unscored,
    AlreadySubmitted,
}

/// A controller plus what was found while resuming.
pub struct Resumed {
    pub controller: ExamController,
    /// Whether a persisted snapshot was resumed.
    pub resumed: bool,
    pub lost: Option<RecordingLost>,
}

pub struct ExamController {
    paper: Arc<ExamPaper>,
    user_id: String,
    attempt: SharedAttempt,
    saver: Autosaver,
    deps: ControllerDeps,
}

impl ExamController {
    /// Resume the user's persisted attempt for this paper, or start fresh.
    ///
    /// A snapshot that cannot be resumed (other test, unknown version) is
    /// discarded with a warning.
    pub async fn resume_or_start(
        paper: Arc<ExamPaper>,
        user_id: impl Into<String>,
        mode: DeliveryMode,
        deps: ControllerDeps,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Resumed> {
        let user_id = user_id.into();
        let restored = match deps.attempts.load(&user_id).await? {
            Some(snapshot) => match snapshot.restore(&paper.id, now, deps.recordings.as_ref()) {
                Ok(restored) => Some(restored),
                Err(e) => {
                    tracing::warn!(user = %user_id, "discarding saved attempt: {e}");
                    None
                }
            },
            None => None,
        };

        let (attempt, resumed, lost) = match restored {
            Some(r) => (r.attempt, true, r.lost),
            None => (Attempt::start(paper.id.clone(), mode, now), false, None),
        };
        tracing::info!(user = %user_id, test = %paper.id, resumed, "attempt ready");

        let attempt: SharedAttempt = Arc::new(tokio::sync::Mutex::new(attempt));
        let saver = Autosaver::new(attempt.clone(), deps.attempts.clone(), user_id.clone());
        let controller = ExamController {
            paper,
            user_id,
            attempt,
            saver,
            deps,
        };
        controller.flush().await;
        Ok(Resumed {
            controller,
            resumed,
            lost,
        })
    }

    pub fn paper(&self) -> &ExamPaper {
        &self.paper
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Shared handle to the attempt, for readers and the heartbeat.
    pub fn attempt(&self) -> SharedAttempt {
        self.attempt.clone()
    }

    pub fn autosaver(&self) -> &Autosaver {
        &self.saver
    }

    /// Copy of the current state.
    pub async fn state(&self) -> Attempt {
        self.attempt.lock().await.clone()
    }

    /// Discard the current attempt and start a new one for this paper.
    pub async fn start_new(
        &self,
        mode: DeliveryMode,
        now: DateTime<Utc>,
    ) -> Result<(), AttemptError> {
        let released = {
            let mut attempt = self.attempt.lock().await;
            let released = attempt.recordings().to_vec();
            attempt.apply(
                Action::StartNewAttempt {
                    test_id: self.paper.id.clone(),
                    mode,
                },
                now,
            )?;
            released
        };
        release_all(self.deps.recordings.as_ref(), &released);
        self.flush().await;
        Ok(())
    }

    /// Enter a module with the configured duration for the attempt's mode.
    pub async fn enter_module(
        &self,
        module: Module,
        now: DateTime<Utc>,
    ) -> Result<Applied, AttemptError> {
        let mut attempt = self.attempt.lock().await;
        let total_secs = self.deps.timing.module_secs(module, attempt.mode());
        let applied = attempt.apply(
            Action::EnterModule {
                module,
                total_secs,
                question_count: self.paper.item_count(module),
            },
            now,
        )?;
        drop(attempt);
        if applied == Applied::Changed {
            self.flush().await;
        }
        Ok(applied)
    }

    /// Apply an editing action. Lifecycle actions have side effects and go
    /// through their own calls.
    pub async fn dispatch(
        &self,
        action: Action,
        now: DateTime<Utc>,
    ) -> Result<Applied, AttemptError> {
        let name = match &action {
            Action::StartNewAttempt { .. } => Some("start_new_attempt"),
            Action::EnterModule { .. } => Some("enter_module"),
            Action::Tick { .. } => Some("tick"),
            Action::SubmitModule { .. } => Some("submit_module"),
            Action::SubmitAll => Some("submit_all"),
            Action::Reset => Some("reset_attempt"),
            _ => None,
        };
        if let Some(name) = name {
            return Err(AttemptError::NotDispatchable(name));
        }

        let applied = self.attempt.lock().await.apply(action, now)?;
        if let Applied::Released(recordings) = &applied {
            release_all(self.deps.recordings.as_ref(), recordings);
        }
        Ok(applied)
    }

    /// Advance a module's clock. On the zero crossing the module is
    /// submitted and scored, once.
    pub async fn tick(
        &self,
        module: Module,
        now: DateTime<Utc>,
    ) -> Result<(TickOutcome, Option<ModuleOutcome>), AttemptError> {
        let outcome = self.attempt.lock().await.tick_module(module, now)?;
        if outcome != TickOutcome::Expired {
            return Ok((outcome, None));
        }
        tracing::info!(%module, "time up; submitting module");
        let submitted = self.submit_module(module, now).await?;
        Ok((outcome, Some(submitted)))
    }

    /// Submit one module and start scoring it.
    pub async fn submit_module(
        &self,
        module: Module,
        now: DateTime<Utc>,
    ) -> Result<ModuleOutcome, AttemptError> {
        let mut attempt = self.attempt.lock().await;
        if attempt.apply(Action::SubmitModule { module }, now)? == Applied::Unchanged {
            return Ok(ModuleOutcome::AlreadySubmitted);
        }

        let outcome = if module.is_objective() {
            let empty = Default::default();
            let answers = attempt.answers(module).unwrap_or(&empty);
            match ObjectiveScorer::for_paper(&self.paper, module) {
                Some(scorer) => ModuleOutcome::Objective(scorer.score(answers)),
                None => ModuleOutcome::Unscored,
            }
        } else {
            let requests = self.subjective_requests(&attempt, module);
            match &self.deps.pipeline {
                Some(pipeline) => ModuleOutcome::Subjective(ScoringHandle {
                    jobs: requests
                        .into_iter()
                        .map(|(n, req)| (n, pipeline.spawn(req)))
                        .collect(),
                }),
                None => {
                    tracing::warn!(%module, "no scoring backend configured; module left unscored");
                    ModuleOutcome::Unscored
                }
            }
        };
        drop(attempt);
        self.flush().await;
        Ok(outcome)
    }

    /// Submit every entered module still open, then the attempt.
    pub async fn submit_all(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(Module, ModuleOutcome)>, AttemptError> {
        let open: Vec<Module> = {
            let attempt = self.attempt.lock().await;
            Module::ALL
                .into_iter()
                .filter(|m| attempt.module_state(*m) == ModuleState::InProgress)
                .collect()
        };
        let mut outcomes = Vec::new();
        for module in open {
            outcomes.push((module, self.submit_module(module, now).await?));
        }
        self.attempt.lock().await.apply(Action::SubmitAll, now)?;
        self.flush().await;
        Ok(outcomes)
    }

    /// Abandon the attempt: release recordings and forget the snapshot.
    pub async fn reset(&self, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.attempt
            .lock()
            .await
            .reset_attempt(self.deps.recordings.as_ref(), now);
        self.deps.attempts.clear(&self.user_id).await?;
        self.flush().await;
        Ok(())
    }

    /// Transcripts and model answers, once the attempt is submitted.
    pub async fn protected_content(&self) -> Option<ProtectedContent> {
        self.attempt
            .lock()
            .await
            .protected_content_visible()
            .then(|| self.paper.protected_content())
    }

    fn subjective_requests(&self, attempt: &Attempt, module: Module) -> Vec<(u8, ScoringRequest)> {
        let request = |task: u8, prompt_text: String, response_text: String| ScoringRequest {
            user_id: self.user_id.clone(),
            module,
            task: Some(task),
            prompt_text,
            response_text,
        };
        match module {
            Module::Writing => self
                .paper
                .writing
                .iter()
                .map(|task| {
                    let text = attempt
                        .writing_drafts()
                        .get(&task.number)
                        .map(|d| d.text.clone())
                        .unwrap_or_default();
                    (task.number, request(task.number, task.prompt.clone(), text))
                })
                .collect(),
            Module::Speaking => self
                .paper
                .speaking
                .iter()
                .map(|part| {
                    let mut prompt = part.prompt.clone();
                    for q in &part.questions {
                        prompt.push('\n');
                        prompt.push_str(q);
                    }
                    let transcript = attempt
                        .speaking_transcripts()
                        .get(&part.number)
                        .cloned()
                        .unwrap_or_default();
                    (part.number, request(part.number, prompt, transcript))
                })
                .collect(),
            Module::Listening | Module::Reading => Vec::new(),
        }
    }

    async fn flush(&self) {
        if let Err(e) = self.saver.flush().await {
            tracing::warn!(user = %self.user_id, "failed to save attempt: {e:#}");
        }
    }
}
