//! Pure phase state machine
//!
//! No async, no I/O. The driver applies an event, then persists the result.
//! Invalid transitions return a state error and leave the chunk untouched.
//!
//! ```text
//! pending -> in_progress -> completed (verified)
//!                        -> failed -> completed (skipped)
//!                                  -> in_progress (retry / resume)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stratum_core::{PhaseRuntimeState, PhaseSpec, PhaseStatus, Resolution, Result, StratumError};

/// Fix attempts allowed per phase before recovery
pub const MAX_FIX_ATTEMPTS: u32 = 2;

/// A phase and its runtime state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseEntry {
    pub spec: PhaseSpec,
    #[serde(default)]
    pub runtime: PhaseRuntimeState,
}

/// Ordered phases plus the index of the one being worked on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkState {
    pub current_phase_index: usize,
    pub phases: Vec<PhaseEntry>,
}

/// Events that move the current phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Begin (or re-enter) work on a pending or in-progress phase
    Start,
    /// Consume one fix attempt
    FixAttempt,
    /// Verification passed
    Pass,
    /// Fix attempts exhausted
    Fail,
    /// Operator skipped the failed phase
    Skip,
    /// Operator asked to rerun the failed phase from scratch
    Retry,
    /// Continue a failed phase after a pause, keeping its attempt count
    Resume,
    /// Operator reset the current phase
    Reset,
}

impl ChunkState {
    pub fn new(phases: Vec<PhaseSpec>) -> Self {
        Self {
            current_phase_index: 0,
            phases: phases
                .into_iter()
                .map(|spec| PhaseEntry {
                    spec,
                    runtime: PhaseRuntimeState::default(),
                })
                .collect(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current_phase_index >= self.phases.len()
    }

    pub fn current(&self) -> Option<&PhaseEntry> {
        self.phases.get(self.current_phase_index)
    }

    pub fn completed_count(&self) -> usize {
        self.phases
            .iter()
            .filter(|p| p.runtime.status == PhaseStatus::Completed)
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.phases.iter().filter(|p| p.runtime.is_skipped()).count()
    }
}

fn invalid(entry: &PhaseEntry, event: PhaseEvent) -> StratumError {
    StratumError::State(format!(
        "Invalid transition: phase '{}' is {} (fix attempts {}) and cannot handle {:?}",
        entry.spec.name, entry.runtime.status, entry.runtime.fix_attempts, event
    ))
}

fn complete(runtime: &mut PhaseRuntimeState, resolution: Resolution, now: DateTime<Utc>) {
    runtime.status = PhaseStatus::Completed;
    runtime.resolution = Some(resolution);
    runtime.fix_attempts = 0;
    if runtime.completed_at.is_none() {
        runtime.completed_at = Some(now);
    }
}

/// Apply `event` to the current phase
///
/// `current_phase_index` only moves on `Pass` and `Skip`, by exactly one.
pub fn transition(chunk: &mut ChunkState, event: PhaseEvent, now: DateTime<Utc>) -> Result<()> {
    let index = chunk.current_phase_index;
    let Some(entry) = chunk.phases.get_mut(index) else {
        return Err(StratumError::State(format!(
            "Build is complete ({} phases); no current phase for {:?}",
            chunk.phases.len(),
            event
        )));
    };
    let runtime = &mut entry.runtime;

    match (runtime.status, event) {
        (PhaseStatus::Pending | PhaseStatus::InProgress, PhaseEvent::Start) => {
            runtime.status = PhaseStatus::InProgress;
        }

        (PhaseStatus::InProgress, PhaseEvent::FixAttempt)
            if runtime.fix_attempts < MAX_FIX_ATTEMPTS =>
        {
            runtime.fix_attempts += 1;
        }

        (PhaseStatus::InProgress, PhaseEvent::Pass) => {
            complete(runtime, Resolution::Verified, now);
            chunk.current_phase_index += 1;
        }

        (PhaseStatus::InProgress, PhaseEvent::Fail) => {
            runtime.status = PhaseStatus::Failed;
        }

        (PhaseStatus::Failed, PhaseEvent::Skip) => {
            complete(runtime, Resolution::Skipped, now);
            chunk.current_phase_index += 1;
        }

        (PhaseStatus::Failed, PhaseEvent::Retry) => {
            runtime.status = PhaseStatus::InProgress;
            runtime.fix_attempts = 0;
        }

        (PhaseStatus::Failed, PhaseEvent::Resume) => {
            runtime.status = PhaseStatus::InProgress;
        }

        (PhaseStatus::Pending | PhaseStatus::InProgress | PhaseStatus::Failed, PhaseEvent::Reset) => {
            runtime.status = PhaseStatus::Pending;
            runtime.fix_attempts = 0;
        }

        _ => return Err(invalid(entry, event)),
    }

    tracing::debug!(
        phase_name = %entry.spec.name,
        ?event,
        status = %entry.runtime.status,
        fix_attempts = entry.runtime.fix_attempts,
        "Phase transition"
    );
    Ok(())
}

impl std::fmt::Display for ChunkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Phases: {}/{} complete ({} skipped)",
            self.completed_count(),
            self.phases.len(),
            self.skipped_count()
        )?;
        for (idx, entry) in self.phases.iter().enumerate() {
            let marker = if idx == self.current_phase_index { ">" } else { " " };
            let mut status = entry.runtime.status.to_string();
            if entry.runtime.is_skipped() {
                status.push_str(" (skipped)");
            }
            if entry.runtime.fix_attempts > 0 {
                status.push_str(&format!(
                    " [fix {}/{}]",
                    entry.runtime.fix_attempts, MAX_FIX_ATTEMPTS
                ));
            }
            let milestone = if entry.spec.is_milestone { " *" } else { "" };
            writeln!(
                f,
                "{} {:>2}. {}{} - {}",
                marker,
                idx + 1,
                entry.spec.name,
                milestone,
                status
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(n: usize) -> ChunkState {
        ChunkState::new(
            (1..=n)
                .map(|i| PhaseSpec::new(format!("Phase {}", i), "goal"))
                .collect(),
        )
    }

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_happy_path_advances_by_one() {
        let mut state = chunk(2);
        transition(&mut state, PhaseEvent::Start, now()).unwrap();
        assert_eq!(state.phases[0].runtime.status, PhaseStatus::InProgress);

        transition(&mut state, PhaseEvent::Pass, now()).unwrap();
        assert_eq!(state.current_phase_index, 1);
        let first = &state.phases[0].runtime;
        assert_eq!(first.status, PhaseStatus::Completed);
        assert_eq!(first.resolution, Some(Resolution::Verified));
        assert!(first.completed_at.is_some());

        transition(&mut state, PhaseEvent::Start, now()).unwrap();
        transition(&mut state, PhaseEvent::Pass, now()).unwrap();
        assert!(state.is_complete());
        assert!(transition(&mut state, PhaseEvent::Start, now()).is_err());
    }

    #[test]
    fn test_fix_attempts_are_bounded() {
        let mut state = chunk(1);
        transition(&mut state, PhaseEvent::Start, now()).unwrap();
        transition(&mut state, PhaseEvent::FixAttempt, now()).unwrap();
        transition(&mut state, PhaseEvent::FixAttempt, now()).unwrap();
        assert_eq!(state.phases[0].runtime.fix_attempts, 2);

        let err = transition(&mut state, PhaseEvent::FixAttempt, now()).unwrap_err();
        assert!(matches!(err, StratumError::State(_)));
        assert_eq!(state.phases[0].runtime.fix_attempts, 2);
    }

    #[test]
    fn test_pass_after_fixes_resets_counter() {
        let mut state = chunk(1);
        transition(&mut state, PhaseEvent::Start, now()).unwrap();
        transition(&mut state, PhaseEvent::FixAttempt, now()).unwrap();
        transition(&mut state, PhaseEvent::Pass, now()).unwrap();
        assert_eq!(state.phases[0].runtime.fix_attempts, 0);
    }

    #[test]
    fn test_skip_is_distinguishable() {
        let mut state = chunk(2);
        transition(&mut state, PhaseEvent::Start, now()).unwrap();
        transition(&mut state, PhaseEvent::FixAttempt, now()).unwrap();
        transition(&mut state, PhaseEvent::FixAttempt, now()).unwrap();
        transition(&mut state, PhaseEvent::Fail, now()).unwrap();
        assert_eq!(state.phases[0].runtime.status, PhaseStatus::Failed);
        assert_eq!(state.current_phase_index, 0);

        transition(&mut state, PhaseEvent::Skip, now()).unwrap();
        let runtime = &state.phases[0].runtime;
        assert_eq!(runtime.status, PhaseStatus::Completed);
        assert!(runtime.is_skipped());
        assert_eq!(runtime.fix_attempts, 0);
        assert_eq!(state.current_phase_index, 1);
        assert_eq!(state.skipped_count(), 1);
    }

    #[test]
    fn test_retry_and_resume_from_failed() {
        let mut state = chunk(1);
        transition(&mut state, PhaseEvent::Start, now()).unwrap();
        transition(&mut state, PhaseEvent::FixAttempt, now()).unwrap();
        transition(&mut state, PhaseEvent::Fail, now()).unwrap();

        transition(&mut state, PhaseEvent::Resume, now()).unwrap();
        assert_eq!(state.phases[0].runtime.status, PhaseStatus::InProgress);
        assert_eq!(state.phases[0].runtime.fix_attempts, 1);

        transition(&mut state, PhaseEvent::Fail, now()).unwrap();
        transition(&mut state, PhaseEvent::Retry, now()).unwrap();
        assert_eq!(state.phases[0].runtime.status, PhaseStatus::InProgress);
        assert_eq!(state.phases[0].runtime.fix_attempts, 0);
        assert_eq!(state.current_phase_index, 0);
    }

    #[test]
    fn test_invalid_transitions_leave_state_untouched() {
        let mut state = chunk(1);
        let before = state.clone();
        assert!(transition(&mut state, PhaseEvent::Pass, now()).is_err());
        assert!(transition(&mut state, PhaseEvent::Skip, now()).is_err());
        assert!(transition(&mut state, PhaseEvent::FixAttempt, now()).is_err());
        assert_eq!(state, before);
    }

    #[test]
    fn test_completed_at_never_cleared_or_moved() {
        let mut state = chunk(1);
        let first = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        transition(&mut state, PhaseEvent::Start, first).unwrap();
        transition(&mut state, PhaseEvent::Pass, first).unwrap();

        // Re-enter the phase by hand and complete it again later
        state.current_phase_index = 0;
        state.phases[0].runtime.status = PhaseStatus::InProgress;
        transition(&mut state, PhaseEvent::Pass, Utc::now()).unwrap();
        assert_eq!(state.phases[0].runtime.completed_at, Some(first));
    }

    #[test]
    fn test_reset_current_phase() {
        let mut state = chunk(1);
        transition(&mut state, PhaseEvent::Start, now()).unwrap();
        transition(&mut state, PhaseEvent::FixAttempt, now()).unwrap();
        transition(&mut state, PhaseEvent::Fail, now()).unwrap();
        transition(&mut state, PhaseEvent::Reset, now()).unwrap();
        assert_eq!(state.phases[0].runtime.status, PhaseStatus::Pending);
        assert_eq!(state.phases[0].runtime.fix_attempts, 0);
    }

    #[test]
    fn test_display_marks_current_phase() {
        let mut state = chunk(2);
        transition(&mut state, PhaseEvent::Start, now()).unwrap();
        transition(&mut state, PhaseEvent::Pass, now()).unwrap();
        let text = state.to_string();
        assert!(text.starts_with("Phases: 1/2 complete (0 skipped)"));
        assert!(text.contains(">  2. Phase 2 - pending"));
    }
}
