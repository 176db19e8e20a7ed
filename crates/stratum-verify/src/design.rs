//! Design and accessibility review through an external tool
//!
//! The tool is invoked once per UI source file as `<command> <file>` and must
//! print JSON on stdout, either a list of issues or `{"issues": [...]}`:
//!
//! ```json
//! [{"severity": "critical", "message": "Image has no alt text"}]
//! ```

use crate::review::{DesignReviewer, Issue, ReviewResult};
use crate::runner::TestCommand;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use stratum_core::Severity;
use tokio::process::Command;
use walkdir::WalkDir;

const UI_EXTENSIONS: &[&str] = &["tsx", "jsx", "vue", "svelte", "html"];
const SKIP_DIRS: &[&str] = &["node_modules", ".git", ".stratum", "dist", "build", ".next", "target"];

#[derive(Debug, Deserialize)]
struct RawIssue {
    #[serde(default)]
    severity: String,
    #[serde(alias = "description")]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawReport {
    List(Vec<RawIssue>),
    Wrapped { issues: Vec<RawIssue> },
}

/// Parse the tool's JSON output; unknown severities count as moderate
fn parse_issues(stdout: &str, file: &str) -> Option<Vec<Issue>> {
    let report: RawReport = serde_json::from_str(stdout.trim()).ok()?;
    let raw = match report {
        RawReport::List(issues) => issues,
        RawReport::Wrapped { issues } => issues,
    };
    Some(
        raw.into_iter()
            .map(|r| {
                let severity = r.severity.parse().unwrap_or(Severity::Moderate);
                Issue::new(severity, r.message).in_file(file)
            })
            .collect(),
    )
}

/// UI source files under `root`, relative and sorted
pub fn ui_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SKIP_DIRS.contains(&name))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| UI_EXTENSIONS.contains(&ext))
        })
        .filter_map(|e| e.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect();
    files.sort();
    files
}

/// Runs a configured review command against every UI file
pub struct CommandDesignReviewer {
    command: TestCommand,
    timeout_per_file: Duration,
}

impl CommandDesignReviewer {
    /// `None` if `command` is blank
    pub fn new(command: &str, timeout_per_file: Duration) -> Option<Self> {
        Some(Self {
            command: TestCommand::parse(command)?,
            timeout_per_file,
        })
    }

    async fn review_file(&self, project: &Path, file: &str) -> Option<Vec<Issue>> {
        let child = Command::new(&self.command.program)
            .args(&self.command.args)
            .arg(file)
            .current_dir(project)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(file = %file, "Design review failed to launch: {}", e);
                return None;
            }
        };

        match tokio::time::timeout(self.timeout_per_file, child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let issues = parse_issues(&stdout, file);
                if issues.is_none() {
                    tracing::warn!(file = %file, "Design review output was not valid JSON");
                }
                issues
            }
            Ok(Err(e)) => {
                tracing::warn!(file = %file, "Design review failed: {}", e);
                None
            }
            Err(_) => {
                tracing::warn!(
                    file = %file,
                    "Design review timed out after {}s",
                    self.timeout_per_file.as_secs()
                );
                None
            }
        }
    }
}

#[async_trait]
impl DesignReviewer for CommandDesignReviewer {
    async fn review(&self, project: &Path, _spec: &str) -> ReviewResult {
        let files = ui_files(project);
        if files.is_empty() {
            return ReviewResult::skipped("no UI files");
        }

        let mut issues = Vec::new();
        let mut reviewed = 0usize;
        for file in &files {
            let file = file.to_string_lossy();
            if let Some(found) = self.review_file(project, &file).await {
                reviewed += 1;
                issues.extend(found);
            }
        }

        if reviewed == 0 {
            return ReviewResult::skipped(format!("`{}` could not review any file", self.command));
        }

        issues.sort_by_key(|i| i.severity);
        tracing::info!(
            files = reviewed,
            issues = issues.len(),
            "Design review complete"
        );
        ReviewResult::completed(issues)
    }
}
