//! # stratum-orchestrator
//!
//! Chunked build orchestration engine for Stratum.
//!
//! This crate provides:
//! - The phase state machine and its persisted state document
//! - Builder, fix and review prompts
//! - The fix-attempt loop and recovery decision
//! - Pipeline stages around the build (init, architect, review)
//! - A fail-open activity log

mod activity;
mod categorize;
mod orchestrator;
mod pipeline;
mod prompt;
mod recovery;
mod state;
mod state_machine;

pub use activity::ActivityLogger;
pub use categorize::{categorize, ErrorCategory};
pub use orchestrator::{BuildOutcome, Orchestrator, ProjectDocuments};
pub use pipeline::{architect, init_project, reset_current_phase, review, REVIEW_FOCUS_AREAS};
pub use prompt::{
    attempt_line, build_architect_prompt, build_fix_prompt, build_phase_prompt,
    build_review_prompt, parse_phase_summary, PhaseSummary, PHASE_SUMMARY_ARTIFACT,
};
pub use recovery::{
    manual_fix_path, write_manual_fix, FailureReport, RecoveryChoice, RecoveryDecider,
    ScriptedDecider,
};
pub use state::{Artifacts, HistoryEntry, HistoryOutcome, StateDocument, StateStore};
pub use state_machine::{transition, ChunkState, PhaseEntry, PhaseEvent, MAX_FIX_ATTEMPTS};
