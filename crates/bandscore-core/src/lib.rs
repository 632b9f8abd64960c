//! bandscore-core: Exam attempt state machine and band scoring engine.
//!
//! This crate defines the exam data model, the timed attempt state machine
//! with its snapshots and autosave heartbeat, deterministic scoring for
//! listening and reading, and the LLM-backed scoring pipeline for writing
//! and speaking. Storage and LLM backends plug in through [`traits`].

pub mod attempt;
pub mod autosave;
pub mod bands;
pub mod controller;
pub mod error;
pub mod matcher;
pub mod model;
pub mod objective;
pub mod parser;
pub mod pipeline;
pub mod profile;
pub mod report;
pub mod sample;
pub mod snapshot;
pub mod timer;
pub mod traits;

#[cfg(test)]
mod testing;
