//! Wall-clock module countdowns.
//!
//! Remaining time is always derived from the module start timestamp, never
//! decremented, so it self-corrects after the process was suspended or
//! restarted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{DeliveryMode, Module};

/// Seconds left for a module started at `started_at` with `initial_secs`.
///
/// `max(0, initial − floor((now − started_at) / 1000ms))`. A `now` earlier
/// than `started_at` counts as no time elapsed.
pub fn remaining_secs(initial_secs: u32, started_at: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let elapsed_ms = (now - started_at).num_milliseconds().max(0);
    let elapsed_secs = elapsed_ms / 1000;
    (initial_secs as i64 - elapsed_secs).max(0) as u32
}

/// What a tick observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Time remains.
    Running { left: u32 },
    /// This tick is the zero crossing. Reported once per module.
    Expired,
    /// The module was already expired or submitted.
    Finished,
}

/// Module durations. Listening adds a regime-dependent allowance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingPolicy {
    #[serde(default = "default_listening")]
    pub listening_secs: u32,
    /// On-screen answer check time for computer-delivered listening.
    #[serde(default = "default_check")]
    pub listening_check_secs: u32,
    /// Answer-sheet transfer time for paper-based listening.
    #[serde(default = "default_transfer")]
    pub listening_transfer_secs: u32,
    #[serde(default = "default_reading")]
    pub reading_secs: u32,
    #[serde(default = "default_writing")]
    pub writing_secs: u32,
    #[serde(default = "default_speaking")]
    pub speaking_secs: u32,
}

fn default_listening() -> u32 {
    30 * 60
}
fn default_check() -> u32 {
    2 * 60
}
fn default_transfer() -> u32 {
    10 * 60
}
fn default_reading() -> u32 {
    60 * 60
}
fn default_writing() -> u32 {
    60 * 60
}
fn default_speaking() -> u32 {
    14 * 60
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            listening_secs: default_listening(),
            listening_check_secs: default_check(),
            listening_transfer_secs: default_transfer(),
            reading_secs: default_reading(),
            writing_secs: default_writing(),
            speaking_secs: default_speaking(),
        }
    }
}

impl TimingPolicy {
    /// Total seconds granted when entering `module` under `mode`.
    pub fn module_secs(&self, module: Module, mode: DeliveryMode) -> u32 {
        match module {
            Module::Listening => {
                self.listening_secs
                    + match mode {
                        DeliveryMode::Computer => self.listening_check_secs,
                        DeliveryMode::Paper => self.listening_transfer_secs,
                    }
            }
            Module::Reading => self.reading_secs,
            Module::Writing => self.writing_secs,
            Module::Speaking => self.speaking_secs,
        }
    }
}

/// Format seconds as `MM:SS` (or `H:MM:SS` past an hour).
pub fn format_clock(secs: u32) -> String {
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m:02}:{s:02}")
    }
}
