//! Recovery decision after fix attempts run out
//!
//! The orchestrator never guesses: a [`RecoveryDecider`] must return an
//! explicit [`RecoveryChoice`]. Pausing writes `.stratum/manual-fix.md` so an
//! operator can pick up where the Builder left off.

use crate::categorize::{categorize, ErrorCategory};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use stratum_core::persist::write_atomic;
use stratum_core::{PhaseSpec, Result, STRATUM_DIR};
use stratum_verify::VerificationResult;

/// Error output kept in the failure report
const REPORT_ERROR_CHARS: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryChoice {
    /// Persist a manual-fix file and halt
    Pause,
    /// Mark the phase completed-as-skipped and advance
    Skip,
    /// Rerun the phase from scratch with a fresh attempt budget
    Retry,
}

impl std::fmt::Display for RecoveryChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pause => write!(f, "pause"),
            Self::Skip => write!(f, "skip"),
            Self::Retry => write!(f, "retry"),
        }
    }
}

impl std::str::FromStr for RecoveryChoice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "p" | "pause" => Ok(Self::Pause),
            "s" | "skip" => Ok(Self::Skip),
            "r" | "retry" => Ok(Self::Retry),
            other => Err(format!("Unknown recovery choice: {}", other)),
        }
    }
}

/// Everything the operator sees when a phase exhausts its fixes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReport {
    pub phase_index: usize,
    pub total_phases: usize,
    pub phase: PhaseSpec,
    pub attempts: u32,
    pub category: ErrorCategory,
    pub error_output: String,
    pub attempt_log: Vec<String>,
}

impl FailureReport {
    pub fn new(
        phase_index: usize,
        total_phases: usize,
        phase: &PhaseSpec,
        attempts: u32,
        error_output: &str,
        attempt_log: &[String],
    ) -> Self {
        Self {
            phase_index,
            total_phases,
            phase: phase.clone(),
            attempts,
            category: categorize(error_output),
            error_output: error_output.to_string(),
            attempt_log: attempt_log.to_vec(),
        }
    }

    /// Report for a failed gate run
    ///
    /// The category comes from the raw output of the failing checks, so the
    /// gate's own labels and advisories never decide it.
    pub fn from_verification(
        phase_index: usize,
        total_phases: usize,
        phase: &PhaseSpec,
        attempts: u32,
        result: &VerificationResult,
        attempt_log: &[String],
    ) -> Self {
        let mut report = Self::new(
            phase_index,
            total_phases,
            phase,
            attempts,
            &result.error_output,
            attempt_log,
        );
        if !result.failure_output.trim().is_empty() {
            report.category = categorize(&result.failure_output);
        }
        report
    }

    /// Short one-paragraph summary for the terminal
    pub fn summary(&self) -> String {
        format!(
            "Phase {}/{} '{}' failed verification after {} fix attempt(s).\n\
             Category: {}\nSuggestion: {}",
            self.phase_index + 1,
            self.total_phases,
            self.phase.name,
            self.attempts,
            self.category,
            self.category.suggestion()
        )
    }

    /// Known-issue line recorded when the phase is skipped
    pub fn known_issue(&self) -> String {
        format!(
            "Phase '{}' skipped after failed verification ({})",
            self.phase.name, self.category
        )
    }

    /// Markdown body of `.stratum/manual-fix.md`
    pub fn to_markdown(&self) -> String {
        let mut doc = String::new();

        doc.push_str(&format!("# Manual fix needed: {}\n\n", self.phase.name));
        doc.push_str(&format!(
            "Phase {} of {}. The build is paused; fix the errors below, then run \
             `stratum build` to re-verify and continue.\n\n",
            self.phase_index + 1,
            self.total_phases
        ));

        doc.push_str("## Goal\n\n");
        doc.push_str(&self.phase.goal);
        doc.push_str("\n\n");

        if !self.phase.tasks.is_empty() {
            doc.push_str("## Tasks\n\n");
            for task in &self.phase.tasks {
                doc.push_str(&format!("- {}\n", task));
            }
            doc.push('\n');
        }

        doc.push_str("## Diagnosis\n\n");
        doc.push_str(&format!("- Category: {}\n", self.category));
        doc.push_str(&format!("- Suggestion: {}\n", self.category.suggestion()));
        doc.push_str(&format!("- Fix attempts used: {}\n\n", self.attempts));

        if !self.attempt_log.is_empty() {
            doc.push_str("## Attempts\n\n");
            for (idx, line) in self.attempt_log.iter().enumerate() {
                doc.push_str(&format!("{}. {}\n", idx + 1, line));
            }
            doc.push('\n');
        }

        doc.push_str("## Last error output\n\n```\n");
        let errors: String = self.error_output.trim().chars().take(REPORT_ERROR_CHARS).collect();
        doc.push_str(&errors);
        doc.push_str("\n```\n");
        doc
    }
}

/// Path of the manual-fix context file for a project
pub fn manual_fix_path(project_root: &Path) -> PathBuf {
    project_root.join(STRATUM_DIR).join("manual-fix.md")
}

/// Write the manual-fix context file and return its path
pub async fn write_manual_fix(project_root: &Path, report: &FailureReport) -> Result<PathBuf> {
    let path = manual_fix_path(project_root);
    write_atomic(&path, &report.to_markdown()).await?;
    tracing::info!(path = %path.display(), "Wrote manual fix context");
    Ok(path)
}

/// Chooses what happens to a phase that exhausted its fix attempts
#[async_trait]
pub trait RecoveryDecider: Send + Sync {
    async fn decide(&self, report: &FailureReport) -> RecoveryChoice;
}

/// Decider that replays canned choices, pausing once they run out
#[derive(Default)]
pub struct ScriptedDecider {
    choices: Mutex<VecDeque<RecoveryChoice>>,
    reports: Mutex<Vec<FailureReport>>,
}

impl ScriptedDecider {
    pub fn new(choices: impl IntoIterator<Item = RecoveryChoice>) -> Self {
        Self {
            choices: Mutex::new(choices.into_iter().collect()),
            reports: Mutex::new(Vec::new()),
        }
    }

    /// Reports seen so far
    pub fn reports(&self) -> Vec<FailureReport> {
        self.reports.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl RecoveryDecider for ScriptedDecider {
    async fn decide(&self, report: &FailureReport) -> RecoveryChoice {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report.clone());
        }
        self.choices
            .lock()
            .ok()
            .and_then(|mut c| c.pop_front())
            .unwrap_or(RecoveryChoice::Pause)
    }
}
