//! Versioned attempt snapshots.
//!
//! A snapshot is the whole attempt serialized at a point in time. Loading
//! checks the version before touching anything else, and a snapshot for a
//! different test is discarded rather than merged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::attempt::Attempt;
use crate::error::{RecordingLost, SnapshotError};
use crate::traits::RecordingStore;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptSnapshot {
    pub version: u64,
    pub saved_at: DateTime<Utc>,
    pub attempt: Attempt,
}

/// A snapshot successfully turned back into a live attempt.
#[derive(Debug)]
pub struct Restored {
    pub attempt: Attempt,
    /// Recordings that no longer resolve and must be re-captured.
    pub lost: Option<RecordingLost>,
}

impl AttemptSnapshot {
    pub fn capture(attempt: &Attempt, now: DateTime<Utc>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: now,
            attempt: attempt.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a persisted snapshot, refusing unknown versions.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let version = value
            .get("version")
            .and_then(|v| v.as_u64())
            .ok_or(SnapshotError::MissingVersion)?;
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Turn the snapshot back into an attempt for `test_id`.
    ///
    /// Timers are re-derived from their start timestamps at `now`, and
    /// recordings the store can no longer resolve are dropped and reported.
    pub fn restore(
        self,
        test_id: &str,
        now: DateTime<Utc>,
        recordings: &dyn RecordingStore,
    ) -> Result<Restored, SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }
        let found = self.attempt.test_id().ok_or(SnapshotError::Empty)?;
        if found != test_id {
            return Err(SnapshotError::TestMismatch {
                expected: test_id.to_string(),
                found: found.to_string(),
            });
        }

        let mut attempt = self.attempt;
        attempt.refresh_timers(now);
        let lost = attempt.prune_lost_recordings(recordings);
        let lost = if lost.is_empty() {
            None
        } else {
            tracing::warn!(count = lost.len(), "resumed attempt references lost recordings");
            Some(RecordingLost { handles: lost })
        };

        Ok(Restored { attempt, lost })
    }
}
