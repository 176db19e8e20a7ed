//! The verification gate a phase must pass before it may advance

use crate::design::CommandDesignReviewer;
use crate::review::{DesignReviewer, ReviewResult, VisualReviewer};
use crate::runner::{CommandTestRunner, TestResult, TestRunner};
use crate::visual::DevServerCheck;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use stratum_core::{ProjectType, VerificationConfig, VerificationLevel};

/// Outcome of one gate run; recomputed on every attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub passed: bool,
    pub level: VerificationLevel,
    pub test_result: Option<TestResult>,
    pub visual_result: Option<ReviewResult>,
    pub design_result: Option<ReviewResult>,
    pub summary: String,
    /// What the Builder needs to see to fix the phase
    pub error_output: String,
    /// Raw output of the failing checks, without labels or advisories
    #[serde(default)]
    pub failure_output: String,
}

/// Runs tests, and for full verification the visual and design reviewers
///
/// Fails iff tests fail or the design review reports a critical issue. A
/// check that cannot be launched is reported as skipped and does not fail
/// the gate. A test timeout is a failure.
pub struct VerificationGate {
    tests: Box<dyn TestRunner>,
    visual: Option<Box<dyn VisualReviewer>>,
    design: Option<Box<dyn DesignReviewer>>,
}

impl VerificationGate {
    pub fn new(tests: impl TestRunner + 'static) -> Self {
        Self {
            tests: Box::new(tests),
            visual: None,
            design: None,
        }
    }

    pub fn with_visual(mut self, visual: impl VisualReviewer + 'static) -> Self {
        self.visual = Some(Box::new(visual));
        self
    }

    pub fn with_design(mut self, design: impl DesignReviewer + 'static) -> Self {
        self.design = Some(Box::new(design));
        self
    }

    /// Gate built from `.stratum/config.toml` verification settings
    pub fn from_config(config: &VerificationConfig) -> Self {
        let tests = CommandTestRunner::new(Duration::from_secs(config.test_timeout_secs))
            .with_command(config.test_command.as_deref());
        let visual = DevServerCheck::new(Duration::from_secs(config.server_startup_timeout_secs))
            .with_script(config.dev_server_script.clone());

        let gate = Self::new(tests).with_visual(visual);
        match config.design_review_command.as_deref().and_then(|command| {
            CommandDesignReviewer::new(
                command,
                Duration::from_secs(config.design_review_timeout_secs),
            )
        }) {
            Some(design) => gate.with_design(design),
            None => gate,
        }
    }

    pub async fn verify(
        &self,
        project: &Path,
        level: VerificationLevel,
        spec: &str,
        project_types: &[ProjectType],
    ) -> VerificationResult {
        let mut summary = Vec::new();
        let mut errors = Vec::new();
        let mut failures = Vec::new();
        let mut advisories = Vec::new();

        let test_result = if self.tests.has_test_command(project, project_types) {
            match self.tests.run(project, project_types).await {
                Ok(result) => {
                    let counts = result
                        .counts
                        .map(|c| format!(" ({} passed, {} failed)", c.passed, c.failed))
                        .unwrap_or_default();
                    if result.passed {
                        summary.push(format!("tests passed{}", counts));
                    } else {
                        summary.push(format!("tests failed{}", counts));
                        let output = result.output();
                        errors.push(format!("Tests failed:\n{}", output));
                        failures.push(output);
                    }
                    Some(result)
                }
                Err(e) => {
                    tracing::warn!("Test runner unavailable: {}", e);
                    summary.push(format!("tests skipped ({})", e));
                    None
                }
            }
        } else {
            summary.push("tests skipped (no test command)".to_string());
            None
        };

        let mut visual_result = None;
        let mut design_result = None;
        if level == VerificationLevel::Full {
            let visual = match &self.visual {
                Some(reviewer) => reviewer.review(project, spec).await,
                None => ReviewResult::skipped("no visual reviewer"),
            };
            summary.push(visual.describe("visual"));
            advisories.extend(visual.issues.iter().map(|i| i.to_string()));
            visual_result = Some(visual);

            let design = match &self.design {
                Some(reviewer) => reviewer.review(project, spec).await,
                None => ReviewResult::skipped("no design review tool configured"),
            };
            summary.push(design.describe("design"));
            for issue in &design.issues {
                if issue.severity == stratum_core::Severity::Critical {
                    errors.push(format!("Design review: {}", issue));
                    failures.push(issue.message.clone());
                } else {
                    advisories.push(issue.to_string());
                }
            }
            design_result = Some(design);
        }

        let tests_ok = test_result.as_ref().map_or(true, |r| r.passed);
        let critical = design_result.as_ref().map_or(0, ReviewResult::critical_count);
        let passed = tests_ok && critical == 0;

        let mut error_output = errors.join("\n\n");
        if !advisories.is_empty() {
            if !error_output.is_empty() {
                error_output.push_str("\n\n");
            }
            error_output.push_str("Advisory:\n");
            for advisory in &advisories {
                error_output.push_str(&format!("- {}\n", advisory));
            }
        }

        let summary = summary.join("; ");
        tracing::info!(passed, level = %level, summary = %summary, "Verification finished");

        VerificationResult {
            passed,
            level,
            test_result,
            visual_result,
            design_result,
            summary,
            error_output,
            failure_output: failures.join("\n\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{Issue, StaticReviewer};
    use crate::runner::ScriptedTestRunner;
    use stratum_core::Severity;
    use tempfile::TempDir;

    fn critical_design() -> StaticReviewer {
        StaticReviewer(ReviewResult::completed(vec![Issue::new(
            Severity::Critical,
            "Button has no accessible name",
        )]))
    }

    #[tokio::test]
    async fn test_passing_tests_pass_gate() {
        let dir = TempDir::new().unwrap();
        let gate = VerificationGate::new(ScriptedTestRunner::new().pass());
        let result = gate
            .verify(dir.path(), VerificationLevel::Tests, "", &[])
            .await;
        assert!(result.passed);
        assert!(result.summary.contains("tests passed (1 passed, 0 failed)"));
        assert!(result.visual_result.is_none());
        assert!(result.error_output.is_empty());
    }

    #[tokio::test]
    async fn test_failing_tests_fail_gate() {
        let dir = TempDir::new().unwrap();
        let gate = VerificationGate::new(ScriptedTestRunner::new().fail("assertion failed: left == right"));
        let result = gate
            .verify(dir.path(), VerificationLevel::Tests, "", &[])
            .await;
        assert!(!result.passed);
        assert!(result.error_output.contains("assertion failed"));
        assert_eq!(result.failure_output, "assertion failed: left == right");
    }

    #[tokio::test]
    async fn test_no_test_command_passes() {
        let dir = TempDir::new().unwrap();
        let gate = VerificationGate::new(ScriptedTestRunner::new().without_command());
        let result = gate
            .verify(dir.path(), VerificationLevel::Tests, "", &[])
            .await;
        assert!(result.passed);
        assert!(result.test_result.is_none());
        assert!(result.summary.contains("no test command"));
    }

    #[tokio::test]
    async fn test_critical_design_issue_fails_only_full_level() {
        let dir = TempDir::new().unwrap();
        let gate = VerificationGate::new(ScriptedTestRunner::new().pass()).with_design(critical_design());

        let tests_only = gate
            .verify(dir.path(), VerificationLevel::Tests, "", &[])
            .await;
        assert!(tests_only.passed);
        assert!(tests_only.design_result.is_none());

        let full = gate.verify(dir.path(), VerificationLevel::Full, "", &[]).await;
        assert!(!full.passed);
        assert!(full.error_output.contains("Button has no accessible name"));
    }

    #[tokio::test]
    async fn test_non_critical_issues_are_advisory() {
        let dir = TempDir::new().unwrap();
        let gate = VerificationGate::new(ScriptedTestRunner::new().pass())
            .with_visual(StaticReviewer(ReviewResult::completed(vec![Issue::new(
                Severity::Serious,
                "Dev server did not become ready within 60s",
            )])))
            .with_design(StaticReviewer(ReviewResult::completed(vec![Issue::new(
                Severity::Minor,
                "Low contrast",
            )])));

        let result = gate.verify(dir.path(), VerificationLevel::Full, "", &[]).await;
        assert!(result.passed);
        assert!(result.error_output.starts_with("Advisory:"));
        assert!(result.failure_output.is_empty());
        assert!(result.error_output.contains("Low contrast"));
    }

    #[tokio::test]
    async fn test_missing_reviewers_are_skipped() {
        let dir = TempDir::new().unwrap();
        let gate = VerificationGate::new(ScriptedTestRunner::new().pass());
        let result = gate.verify(dir.path(), VerificationLevel::Full, "", &[]).await;
        assert!(result.passed);
        assert!(!result.visual_result.unwrap().ran);
        assert!(result.summary.contains("design skipped (no design review tool configured)"));
    }

    #[tokio::test]
    async fn test_from_config_on_empty_project() {
        let dir = TempDir::new().unwrap();
        let gate = VerificationGate::from_config(&VerificationConfig::default());
        let result = gate.verify(dir.path(), VerificationLevel::Full, "", &[]).await;
        assert!(result.passed);
        assert!(result.summary.contains("visual skipped (no dev server script)"));
    }
}
