//! Dev server smoke check

use crate::detect::{package_scripts, PackageManager};
use crate::review::{Issue, ReviewResult, VisualReviewer};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use stratum_core::Severity;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStdout, Command};

const DEFAULT_SCRIPTS: &[&str] = &["dev", "start"];

/// Lines that mean the dev server is accepting connections
fn is_ready_line(line: &str) -> bool {
    let lower = line.to_lowercase();
    ["localhost", "ready", "listening", "compiled successfully"]
        .iter()
        .any(|marker| lower.contains(marker))
}

async fn wait_for_ready(stdout: ChildStdout) -> bool {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(line = %line, "dev server");
        if is_ready_line(&line) {
            return true;
        }
    }
    false
}

/// Starts the package's dev server and waits for a ready signal
pub struct DevServerCheck {
    script: Option<String>,
    startup_timeout: Duration,
}

impl DevServerCheck {
    pub fn new(startup_timeout: Duration) -> Self {
        Self {
            script: None,
            startup_timeout,
        }
    }

    /// Use this script name instead of `dev` / `start`
    pub fn with_script(mut self, script: Option<String>) -> Self {
        self.script = script;
        self
    }

    fn find_script(&self, project: &Path) -> Option<String> {
        let scripts = package_scripts(project);
        match &self.script {
            Some(name) => scripts.contains_key(name).then(|| name.clone()),
            None => DEFAULT_SCRIPTS
                .iter()
                .find(|name| scripts.contains_key(**name))
                .map(|name| name.to_string()),
        }
    }
}

#[async_trait]
impl VisualReviewer for DevServerCheck {
    async fn review(&self, project: &Path, _spec: &str) -> ReviewResult {
        let Some(script) = self.find_script(project) else {
            return ReviewResult::skipped("no dev server script");
        };
        let manager = PackageManager::detect(project);

        tracing::info!(script = %script, "Starting dev server for visual check");

        let mut child = match Command::new(manager.program())
            .args(["run", &script])
            .current_dir(project)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Dev server failed to launch: {}", e);
                return ReviewResult::skipped(format!("failed to launch dev server: {}", e));
            }
        };

        let Some(stdout) = child.stdout.take() else {
            return ReviewResult::skipped("dev server output unavailable");
        };

        let ready = tokio::time::timeout(self.startup_timeout, wait_for_ready(stdout)).await;

        if let Err(e) = child.kill().await {
            tracing::warn!("Failed to stop dev server: {}", e);
        }

        match ready {
            Ok(true) => ReviewResult::completed(Vec::new()),
            Ok(false) => ReviewResult::completed(vec![Issue::new(
                Severity::Serious,
                format!("Dev server (`{} run {}`) exited before becoming ready", manager.program(), script),
            )]),
            Err(_) => ReviewResult::completed(vec![Issue::new(
                Severity::Serious,
                format!(
                    "Dev server did not become ready within {}s",
                    self.startup_timeout.as_secs()
                ),
            )]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ready_lines() {
        assert!(is_ready_line("  ➜  Local:   http://localhost:5173/"));
        assert!(is_ready_line("ready - started server on 0.0.0.0:3000"));
        assert!(!is_ready_line("building..."));
    }

    #[test]
    fn test_script_lookup() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"scripts":{"start":"node server.js","preview":"vite preview"}}"#,
        )
        .unwrap();

        let check = DevServerCheck::new(Duration::from_secs(1));
        assert_eq!(check.find_script(dir.path()).as_deref(), Some("start"));

        let check = check.with_script(Some("preview".to_string()));
        assert_eq!(check.find_script(dir.path()).as_deref(), Some("preview"));

        let check = DevServerCheck::new(Duration::from_secs(1)).with_script(Some("serve".to_string()));
        assert!(check.find_script(dir.path()).is_none());
    }

    #[tokio::test]
    async fn test_skipped_without_package() {
        let dir = TempDir::new().unwrap();
        let result = DevServerCheck::new(Duration::from_secs(1))
            .review(dir.path(), "")
            .await;
        assert!(!result.ran);
        assert_eq!(result.note.as_deref(), Some("no dev server script"));
    }
}
