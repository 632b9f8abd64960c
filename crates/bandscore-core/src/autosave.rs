//! Autosave heartbeat.
//!
//! Mutations only bump the attempt's revision. A background task snapshots
//! the whole attempt on a fixed interval when the revision moved, so a burst
//! of keystrokes costs one write. Submit and reset flush explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::attempt::{Attempt, AttemptPhase};
use crate::snapshot::AttemptSnapshot;
use crate::traits::AttemptRepository;

/// The attempt as shared between the controller and the heartbeat.
pub type SharedAttempt = Arc<Mutex<Attempt>>;

pub const DEFAULT_AUTOSAVE_INTERVAL: Duration = Duration::from_secs(2);

struct SaverInner {
    attempt: SharedAttempt,
    repo: Arc<dyn AttemptRepository>,
    user_id: String,
    flushed: AtomicU64,
    // Serializes flushes so snapshots land in capture order.
    write: Mutex<()>,
}

/// Persists an attempt's snapshot when it changed.
#[derive(Clone)]
pub struct Autosaver {
    inner: Arc<SaverInner>,
}

impl Autosaver {
    pub fn new(
        attempt: SharedAttempt,
        repo: Arc<dyn AttemptRepository>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(SaverInner {
                attempt,
                repo,
                user_id: user_id.into(),
                flushed: AtomicU64::new(0),
                write: Mutex::new(()),
            }),
        }
    }

    /// Revision of the last snapshot written.
    pub fn flushed_revision(&self) -> u64 {
        self.inner.flushed.load(Ordering::SeqCst)
    }

    /// Write a snapshot if the attempt changed since the last flush.
    /// Returns whether anything was written.
    pub async fn flush(&self) -> anyhow::Result<bool> {
        let _write = self.inner.write.lock().await;
        let (snapshot, revision) = {
            let attempt = self.inner.attempt.lock().await;
            let revision = attempt.revision();
            if revision == self.flushed_revision() {
                return Ok(false);
            }
            if attempt.phase() == AttemptPhase::NotStarted {
                // Nothing to resume; reset already cleared the store.
                self.inner.flushed.store(revision, Ordering::SeqCst);
                return Ok(false);
            }
            (AttemptSnapshot::capture(&attempt, Utc::now()), revision)
        };

        self.inner.repo.save(&self.inner.user_id, &snapshot).await?;
        self.inner.flushed.store(revision, Ordering::SeqCst);
        tracing::trace!(user = %self.inner.user_id, revision, "attempt snapshot saved");
        Ok(true)
    }

    /// Start the heartbeat.
    pub fn spawn(&self, interval: Duration) -> AutosaveHandle {
        let saver = self.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // Skip immediate first tick
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        saver.flush_logged().await;
                        break;
                    }
                    _ = ticker.tick() => {
                        saver.flush_logged().await;
                    }
                }
            }
        });
        AutosaveHandle {
            stop: Some(stop_tx),
            task,
        }
    }

    async fn flush_logged(&self) {
        if let Err(e) = self.flush().await {
            tracing::warn!(user = %self.inner.user_id, "autosave failed: {e:#}");
        }
    }
}

/// Running heartbeat. Dropping the handle also stops it after a final
/// flush, but only [`AutosaveHandle::shutdown`] waits for that flush.
pub struct AutosaveHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl AutosaveHandle {
    /// Stop the heartbeat after one last flush.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::warn!("autosave task ended abnormally: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerValue, DeliveryMode, Module};
    use crate::testing::MemAttempts;

    fn shared() -> SharedAttempt {
        let now = Utc::now();
        let mut attempt = Attempt::start("cam-18-2", DeliveryMode::Computer, now);
        attempt.enter(Module::Reading, 3600, 40, now).unwrap();
        Arc::new(Mutex::new(attempt))
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_coalesces_bursts() {
        let repo = Arc::new(MemAttempts::default());
        let attempt = shared();
        let saver = Autosaver::new(attempt.clone(), repo.clone(), "u1");
        let handle = saver.spawn(DEFAULT_AUTOSAVE_INTERVAL);

        {
            let mut a = attempt.lock().await;
            for n in 1..=10 {
                a.set_answer(Module::Reading, n, AnswerValue::Text("x".into()), Utc::now())
                    .unwrap();
            }
        }
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(repo.saves(), 1);

        // Idle heartbeats write nothing.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(repo.saves(), 1);

        attempt
            .lock()
            .await
            .set_answer(Module::Reading, 11, AnswerValue::Text("y".into()), Utc::now())
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(repo.saves(), 2);

        let saved = repo.rows.lock().unwrap()["u1"].clone();
        assert_eq!(saved.attempt.answers(Module::Reading).unwrap().len(), 11);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn explicit_flush_skips_clean_state() {
        let repo = Arc::new(MemAttempts::default());
        let attempt = shared();
        let saver = Autosaver::new(attempt.clone(), repo.clone(), "u1");

        assert!(saver.flush().await.unwrap());
        assert!(!saver.flush().await.unwrap());
        assert_eq!(saver.flushed_revision(), attempt.lock().await.revision());
    }

    #[tokio::test]
    async fn shutdown_flushes_pending_changes() {
        let repo = Arc::new(MemAttempts::default());
        let attempt = shared();
        let saver = Autosaver::new(attempt.clone(), repo.clone(), "u1");
        let handle = saver.spawn(Duration::from_secs(3600));
        handle.shutdown().await;
        assert_eq!(repo.saves(), 1);
    }

    #[tokio::test]
    async fn reset_attempt_is_not_written() {
        let repo = Arc::new(MemAttempts::default());
        let attempt = Arc::new(Mutex::new(Attempt::default()));
        attempt
            .lock()
            .await
            .apply(crate::attempt::Action::Reset, Utc::now())
            .unwrap();
        let saver = Autosaver::new(attempt, repo.clone(), "u1");
        assert!(!saver.flush().await.unwrap());
        assert_eq!(repo.saves(), 0);
    }
}
