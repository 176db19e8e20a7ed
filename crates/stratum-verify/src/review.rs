//! Optional reviewers run for milestone phases

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use stratum_core::Severity;

/// A single finding from a reviewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Issue {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            file: None,
        }
    }

    pub fn in_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "[{}] {}: {}", self.severity, file, self.message),
            None => write!(f, "[{}] {}", self.severity, self.message),
        }
    }
}

/// Outcome of a reviewer run
///
/// `ran == false` means the reviewer could not run; the reason is in `note`
/// and the result is advisory only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub ran: bool,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ReviewResult {
    pub fn completed(issues: Vec<Issue>) -> Self {
        Self {
            ran: true,
            issues,
            note: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            ran: false,
            issues: Vec::new(),
            note: Some(reason.into()),
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }

    pub fn critical_count(&self) -> usize {
        self.count(Severity::Critical)
    }

    /// One-line description for summaries
    pub fn describe(&self, name: &str) -> String {
        if !self.ran {
            return format!(
                "{} skipped ({})",
                name,
                self.note.as_deref().unwrap_or("not available")
            );
        }
        if self.issues.is_empty() {
            return format!("{} clean", name);
        }
        format!(
            "{}: {} issue(s), {} critical",
            name,
            self.issues.len(),
            self.critical_count()
        )
    }
}

/// Checks that the app actually comes up
#[async_trait]
pub trait VisualReviewer: Send + Sync {
    async fn review(&self, project: &Path, spec: &str) -> ReviewResult;
}

/// Design and accessibility review of UI source files
#[async_trait]
pub trait DesignReviewer: Send + Sync {
    async fn review(&self, project: &Path, spec: &str) -> ReviewResult;
}

/// Reviewer that always returns the same result
pub struct StaticReviewer(pub ReviewResult);

#[async_trait]
impl VisualReviewer for StaticReviewer {
    async fn review(&self, _project: &Path, _spec: &str) -> ReviewResult {
        self.0.clone()
    }
}

#[async_trait]
impl DesignReviewer for StaticReviewer {
    async fn review(&self, _project: &Path, _spec: &str) -> ReviewResult {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe() {
        assert_eq!(ReviewResult::skipped("no script").describe("visual"), "visual skipped (no script)");
        assert_eq!(ReviewResult::completed(vec![]).describe("design"), "design clean");

        let result = ReviewResult::completed(vec![
            Issue::new(Severity::Critical, "Missing alt text").in_file("src/Hero.tsx"),
            Issue::new(Severity::Minor, "Low contrast"),
        ]);
        assert_eq!(result.critical_count(), 1);
        assert_eq!(result.describe("design"), "design: 2 issue(s), 1 critical");
        assert_eq!(
            result.issues[0].to_string(),
            "[critical] src/Hero.tsx: Missing alt text"
        );
    }
}
