//! Activity log - human-readable build progress in `.stratum/activity.md`
//!
//! Every write is fail-open: a broken log never stops a build.

use chrono::Utc;
use std::path::{Path, PathBuf};
use stratum_core::fail_open::fail_open;
use stratum_core::STRATUM_DIR;
use stratum_verify::VerificationResult;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Characters of agent output shown in a log entry
const ACTIVITY_LOG_PREVIEW_CHARS: usize = 300;

pub struct ActivityLogger {
    output_path: PathBuf,
}

impl ActivityLogger {
    pub fn new(project_root: &Path) -> Self {
        Self {
            output_path: project_root.join(STRATUM_DIR).join("activity.md"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.output_path
    }

    pub async fn log_build_start(&self, total_phases: usize, resume_index: usize) {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let content = if resume_index == 0 {
            format!("# Build started {}\n\n{} phases planned\n\n", timestamp, total_phases)
        } else {
            format!(
                "# Build resumed {}\n\nContinuing at phase {} of {}\n\n",
                timestamp,
                resume_index + 1,
                total_phases
            )
        };
        self.append("activity::log_build_start", &content).await;
    }

    pub async fn log_phase_start(&self, index: usize, total: usize, name: &str, compressed: bool) {
        let timestamp = Utc::now().format("%H:%M:%S");
        let view = if compressed { "compressed" } else { "full" };
        let content = format!(
            "## Phase {}/{}: {}\n**Time**: {}\n**Context**: {}\n\n",
            index + 1,
            total,
            name,
            timestamp,
            view
        );
        self.append("activity::log_phase_start", &content).await;
    }

    pub async fn log_builder_output(&self, label: &str, touched: &[String], output: &str) {
        let mut content = format!("### {}\n", label);
        if touched.is_empty() {
            content.push_str("No file changes\n");
        } else {
            for path in touched {
                content.push_str(&format!("- `{}`\n", path));
            }
        }
        let preview: String = output.trim().chars().take(ACTIVITY_LOG_PREVIEW_CHARS).collect();
        if !preview.is_empty() {
            content.push_str(&format!("\n> {}\n", preview.replace('\n', "\n> ")));
        }
        content.push('\n');
        self.append("activity::log_builder_output", &content).await;
    }

    pub async fn log_verification(&self, result: &VerificationResult) {
        let status = if result.passed { "PASS" } else { "FAIL" };
        let content = format!("**Verification ({})**: {} - {}\n\n", result.level, status, result.summary);
        self.append("activity::log_verification", &content).await;
    }

    /// Free-form one-line note
    pub async fn log_note(&self, note: &str) {
        self.append("activity::log_note", &format!("**Note**: {}\n\n", note))
            .await;
    }

    pub async fn log_build_end(&self, summary: &str) {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let content = format!("---\n\n**Finished {}**: {}\n\n", timestamp, summary);
        self.append("activity::log_build_end", &content).await;
    }

    async fn append(&self, operation: &str, content: &str) {
        fail_open(operation, || async {
            if let Some(parent) = self.output_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.output_path)
                .await?;
            file.write_all(content.as_bytes()).await?;
            file.flush().await?;
            Ok(())
        })
        .await;
    }
}
